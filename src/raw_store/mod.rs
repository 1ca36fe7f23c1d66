// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The raw visibility paging store.

Each record holds one integration: every IF, spectral-line channel,
baseline and polarization of one time sample. A movable window over the
(channel, IF, polarization, baseline) axes selects the contiguous slice
of the single in-memory integration buffer that reads and writes
transfer.
*/

use std::path::Path;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use crate::rec_file::{FileMode, RecFile, RecFileError};


/// One complex visibility as stored in the raw data file.
///
/// The sign of the weight encodes the flag status: positive for a good
/// visibility, negative for a flagged one, zero for a deleted one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct CmplxVis {
    /// Real part of the visibility.
    pub re: f32,
    /// Imaginary part of the visibility.
    pub im: f32,
    /// Weight of the visibility (1/variance), sign-encoding the flag
    /// status.
    pub wt: f32,
}

#[derive(Error, Debug)]
pub enum RawStoreError {
    #[error("{0}")]
    RecFile(#[from] RecFileError),

    #[error("Out of range {axis} indexes {a}..{b} (limit {limit})")]
    BadRange {
        axis: &'static str,
        a: usize,
        b: usize,
        limit: usize,
    },

    #[error("Integration index {ut} out of range (ntime {ntime})")]
    BadRecord { ut: usize, ntime: usize },

    #[error("Short read of integration {ut} from the raw visibility file")]
    ShortRead { ut: usize },
}

/// The raw (uvdata) visibility paging store.
pub struct RawStore {
    rio: RecFile,
    /// A buffer of sufficient size to hold one whole integration.
    buf: Vec<CmplxVis>,
    /// The integration currently in `buf`, if any.
    buf_ut: Option<usize>,
    /// The number of visibilities per integration.
    nvis: usize,
    /// The flat index of the first visibility of the current window.
    first: usize,
    /// The number of visibilities the current window transfers.
    nbuff: usize,
    ntime: usize,
    nbase: usize,
    nchan: usize,
    nif: usize,
    npol: usize,
    /// Indexing offsets between consecutive polarizations, baselines,
    /// channels and IFs in `buf`.
    soff: usize,
    boff: usize,
    coff: usize,
    ioff: usize,
    // The current window, inclusive at both ends.
    ca: usize,
    cb: usize,
    ia: usize,
    ib: usize,
    sa: usize,
    sb: usize,
    ba: usize,
    bb: usize,
}

impl RawStore {
    /// Create a new raw visibility scratch file in `dir` and its
    /// associated integration buffer.
    pub fn create(
        dir: &Path,
        ntime: usize,
        nbase: usize,
        nchan: usize,
        nif: usize,
        npol: usize,
    ) -> Result<RawStore, RawStoreError> {
        let nvis = nbase * nchan * nif * npol;
        let rio = RecFile::open(
            &dir.join("uvdata.scr"),
            FileMode::Scratch,
            nvis * std::mem::size_of::<CmplxVis>(),
        )?;
        let soff = 1;
        let boff = soff * npol;
        let coff = boff * nbase;
        let ioff = coff * nchan;
        Ok(RawStore {
            rio,
            buf: vec![CmplxVis::default(); nvis],
            buf_ut: None,
            nvis,
            first: 0,
            nbuff: nvis,
            ntime,
            nbase,
            nchan,
            nif,
            npol,
            soff,
            boff,
            coff,
            ioff,
            ca: 0,
            cb: nchan - 1,
            ia: 0,
            ib: nif - 1,
            sa: 0,
            sb: npol - 1,
            ba: 0,
            bb: nbase - 1,
        })
    }

    pub fn ntime(&self) -> usize {
        self.ntime
    }

    pub fn nbase(&self) -> usize {
        self.nbase
    }

    pub fn nchan(&self) -> usize {
        self.nchan
    }

    pub fn nif(&self) -> usize {
        self.nif
    }

    pub fn npol(&self) -> usize {
        self.npol
    }

    /// The number of visibilities per integration record.
    pub fn nvis(&self) -> usize {
        self.nvis
    }

    /// The integration whose data is currently in the buffer.
    pub fn buffer_ut(&self) -> Option<usize> {
        self.buf_ut
    }

    /// The whole integration buffer.
    pub fn buffer(&self) -> &[CmplxVis] {
        &self.buf
    }

    pub fn buffer_mut(&mut self) -> &mut [CmplxVis] {
        &mut self.buf
    }

    /// The window over baseline indexes, inclusive.
    pub fn base_range(&self) -> (usize, usize) {
        (self.ba, self.bb)
    }

    /// The window over channel indexes, inclusive.
    pub fn chan_range(&self) -> (usize, usize) {
        (self.ca, self.cb)
    }

    /// The window over IF indexes, inclusive.
    pub fn if_range(&self) -> (usize, usize) {
        (self.ia, self.ib)
    }

    /// The window over polarization indexes, inclusive.
    pub fn pol_range(&self) -> (usize, usize) {
        (self.sa, self.sb)
    }

    /// The flat buffer index of a named visibility.
    pub fn vis_index(&self, cif: usize, chan: usize, base: usize, pol: usize) -> usize {
        cif * self.ioff + chan * self.coff + base * self.boff + pol * self.soff
    }

    /// The `npol` polarized visibilities of one (IF, channel, baseline)
    /// cell.
    pub fn pol_slice(&self, cif: usize, chan: usize, base: usize) -> &[CmplxVis] {
        let i = self.vis_index(cif, chan, base, 0);
        &self.buf[i..i + self.npol]
    }

    pub fn pol_slice_mut(&mut self, cif: usize, chan: usize, base: usize) -> &mut [CmplxVis] {
        let i = self.vis_index(cif, chan, base, 0);
        &mut self.buf[i..i + self.npol]
    }

    /// Recompute the window origin and extent from the per-axis ranges.
    fn update_window(&mut self) {
        self.first =
            self.ca * self.coff + self.ia * self.ioff + self.sa * self.soff + self.ba * self.boff;
        self.nbuff = (self.ib - self.ia) * self.ioff
            + (self.cb - self.ca) * self.coff
            + (self.bb - self.ba) * self.boff
            + (self.sb - self.sa) * self.soff
            + 1;
    }

    fn order_and_check(
        axis: &'static str,
        mut a: usize,
        mut b: usize,
        limit: usize,
    ) -> Result<(usize, usize), RawStoreError> {
        if a > b {
            std::mem::swap(&mut a, &mut b);
        }
        if b >= limit {
            return Err(RawStoreError::BadRange { axis, a, b, limit });
        }
        Ok((a, b))
    }

    /// Set the range of spectral-line channels transferred by
    /// subsequent reads and writes.
    pub fn set_chan_range(&mut self, ca: usize, cb: usize) -> Result<(), RawStoreError> {
        let (a, b) = Self::order_and_check("spectral-line channel", ca, cb, self.nchan)?;
        self.ca = a;
        self.cb = b;
        self.update_window();
        Ok(())
    }

    /// Set the range of IFs transferred by subsequent reads and writes.
    pub fn set_if_range(&mut self, ia: usize, ib: usize) -> Result<(), RawStoreError> {
        let (a, b) = Self::order_and_check("IF", ia, ib, self.nif)?;
        self.ia = a;
        self.ib = b;
        self.update_window();
        Ok(())
    }

    /// Set the range of polarizations transferred by subsequent reads
    /// and writes.
    pub fn set_pol_range(&mut self, sa: usize, sb: usize) -> Result<(), RawStoreError> {
        let (a, b) = Self::order_and_check("polarization", sa, sb, self.npol)?;
        self.sa = a;
        self.sb = b;
        self.update_window();
        Ok(())
    }

    /// Set the range of baselines transferred by subsequent reads and
    /// writes.
    pub fn set_base_range(&mut self, ba: usize, bb: usize) -> Result<(), RawStoreError> {
        let (a, b) = Self::order_and_check("baseline", ba, bb, self.nbase)?;
        self.ba = a;
        self.bb = b;
        self.update_window();
        Ok(())
    }

    /// Open the window to all axes.
    pub fn set_full_window(&mut self) -> Result<(), RawStoreError> {
        self.set_chan_range(0, self.nchan - 1)?;
        self.set_if_range(0, self.nif - 1)?;
        self.set_pol_range(0, self.npol - 1)?;
        self.set_base_range(0, self.nbase - 1)
    }

    fn check_ut(&self, ut: usize) -> Result<(), RawStoreError> {
        if ut >= self.ntime {
            Err(RawStoreError::BadRecord {
                ut,
                ntime: self.ntime,
            })
        } else {
            Ok(())
        }
    }

    /// Read the windowed portion of integration `ut` into the
    /// corresponding portion of the buffer.
    pub fn read(&mut self, ut: usize) -> Result<(), RawStoreError> {
        self.check_ut(ut)?;
        self.buf_ut = Some(ut);
        self.rio.seek(
            ut as u64,
            (self.first * std::mem::size_of::<CmplxVis>()) as u64,
        )?;
        let slice = &mut self.buf[self.first..self.first + self.nbuff];
        if self.rio.read_items(slice)? < self.nbuff {
            return Err(RawStoreError::ShortRead { ut });
        }
        Ok(())
    }

    /// Write the windowed portion of the buffer to integration `ut`.
    pub fn write(&mut self, ut: usize) -> Result<(), RawStoreError> {
        self.check_ut(ut)?;
        self.buf_ut = Some(ut);
        self.rio.seek(
            ut as u64,
            (self.first * std::mem::size_of::<CmplxVis>()) as u64,
        )?;
        let slice = &self.buf[self.first..self.first + self.nbuff];
        self.rio.write_items(slice)?;
        Ok(())
    }

    /// Zero the whole integration buffer, optionally associating it
    /// with a new integration.
    pub fn clear(&mut self, ut: Option<usize>) {
        self.buf.fill(CmplxVis::default());
        self.buf_ut = ut;
    }

    /// Push pending I/O to the operating system.
    pub fn flush(&mut self) -> Result<(), RawStoreError> {
        Ok(self.rio.flush()?)
    }
}
