// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The single-IF stream paging store.

Each record holds one IF's worth of the current processing stream: the
polarization- and channel-combined visibility of every baseline of every
integration. The record index is the IF index; reads and writes
transfer a baseline range of a single integration.
*/

use std::path::Path;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use crate::rec_file::{FileMode, RecFile, RecFileError};


/// One stream visibility in amplitude/phase form.
///
/// The sign of the weight encodes the flag status: positive for a good
/// visibility, negative for a flagged one, zero for a deleted one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PolarVis {
    /// Amplitude of the visibility.
    pub amp: f32,
    /// Phase of the visibility (radians).
    pub phs: f32,
    /// Weight of the visibility (1/variance), sign-encoding the flag
    /// status.
    pub wt: f32,
}

#[derive(Error, Debug)]
pub enum IfStoreError {
    #[error("{0}")]
    RecFile(#[from] RecFileError),

    #[error("IF index {cif} out of range (nif {nif})")]
    BadIf { cif: usize, nif: usize },

    #[error("Out of range baseline indexes {ba}..{bb} (nbase {nbase})")]
    BadBaseRange { ba: usize, bb: usize, nbase: usize },

    #[error("Integration index {ut} out of range (ntime {ntime})")]
    BadRecord { ut: usize, ntime: usize },

    #[error("Short read of integration {ut} from the IF stream file")]
    ShortRead { ut: usize },
}

/// The IF (ifdata) stream paging store.
pub struct IfStore {
    rio: RecFile,
    /// A buffer of sufficient size to hold one integration of one IF.
    buf: Vec<PolarVis>,
    /// The index of the first baseline transferred.
    first: usize,
    /// The number of baselines transferred.
    count: usize,
    nbase: usize,
    ntime: usize,
    nif: usize,
    /// The IF that reads and writes address.
    cif: usize,
}

impl IfStore {
    /// Create a new IF stream scratch file in `dir`.
    pub fn create(
        dir: &Path,
        nif: usize,
        nbase: usize,
        ntime: usize,
    ) -> Result<IfStore, IfStoreError> {
        let rio = RecFile::open(
            &dir.join("ifdata.scr"),
            FileMode::Scratch,
            nbase * ntime * std::mem::size_of::<PolarVis>(),
        )?;
        Ok(IfStore {
            rio,
            buf: vec![PolarVis::default(); nbase],
            first: 0,
            count: nbase,
            nbase,
            ntime,
            nif,
            cif: 0,
        })
    }

    pub fn nif(&self) -> usize {
        self.nif
    }

    pub fn nbase(&self) -> usize {
        self.nbase
    }

    pub fn ntime(&self) -> usize {
        self.ntime
    }

    /// The one-integration baseline buffer.
    pub fn buffer(&self) -> &[PolarVis] {
        &self.buf
    }

    pub fn buffer_mut(&mut self) -> &mut [PolarVis] {
        &mut self.buf
    }

    /// Select the IF and inclusive baseline range addressed by
    /// subsequent reads and writes.
    pub fn set_range(&mut self, cif: usize, ba: usize, bb: usize) -> Result<(), IfStoreError> {
        if cif >= self.nif {
            return Err(IfStoreError::BadIf {
                cif,
                nif: self.nif,
            });
        }
        let (ba, bb) = if ba <= bb { (ba, bb) } else { (bb, ba) };
        if bb >= self.nbase {
            return Err(IfStoreError::BadBaseRange {
                ba,
                bb,
                nbase: self.nbase,
            });
        }
        self.cif = cif;
        self.first = ba;
        self.count = bb - ba + 1;
        Ok(())
    }

    fn check_ut(&self, ut: usize) -> Result<(), IfStoreError> {
        if ut >= self.ntime {
            Err(IfStoreError::BadRecord {
                ut,
                ntime: self.ntime,
            })
        } else {
            Ok(())
        }
    }

    /// Read the selected baseline range of integration `ut` of the
    /// selected IF.
    pub fn read(&mut self, ut: usize) -> Result<(), IfStoreError> {
        self.check_ut(ut)?;
        self.rio.seek(
            self.cif as u64,
            ((ut * self.nbase + self.first) * std::mem::size_of::<PolarVis>()) as u64,
        )?;
        let slice = &mut self.buf[self.first..self.first + self.count];
        if self.rio.read_items(slice)? < self.count {
            return Err(IfStoreError::ShortRead { ut });
        }
        Ok(())
    }

    /// Write the selected baseline range of integration `ut` of the
    /// selected IF.
    pub fn write(&mut self, ut: usize) -> Result<(), IfStoreError> {
        self.check_ut(ut)?;
        self.rio.seek(
            self.cif as u64,
            ((ut * self.nbase + self.first) * std::mem::size_of::<PolarVis>()) as u64,
        )?;
        let slice = &self.buf[self.first..self.first + self.count];
        self.rio.write_items(slice)?;
        Ok(())
    }

    /// Zero the baseline buffer.
    pub fn clear(&mut self) {
        self.buf.fill(PolarVis::default());
    }

    /// Push pending I/O to the operating system.
    pub fn flush(&mut self) -> Result<(), IfStoreError> {
        Ok(self.rio.flush()?)
    }
}
