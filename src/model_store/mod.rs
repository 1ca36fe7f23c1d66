// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The UV model paging store.

Each record holds one IF's worth of model visibilities: an (amplitude,
phase) pair per baseline per integration. Reads and writes always
transfer a whole integration's baselines for one IF.
*/

use std::path::Path;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use crate::rec_file::{FileMode, RecFile, RecFileError};


/// One model visibility.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ModelVis {
    /// Amplitude of the model visibility.
    pub amp: f32,
    /// Phase of the model visibility (radians).
    pub phs: f32,
}

#[derive(Error, Debug)]
pub enum ModelStoreError {
    #[error("{0}")]
    RecFile(#[from] RecFileError),

    #[error("IF index {cif} out of range (nif {nif})")]
    BadIf { cif: usize, nif: usize },

    #[error("Integration index {ut} out of range (ntime {ntime})")]
    BadRecord { ut: usize, ntime: usize },

    #[error("Short read of integration {ut} from the UV model file")]
    ShortRead { ut: usize },
}

/// The UV model (uvmodel) paging store.
pub struct ModelStore {
    rio: RecFile,
    /// A buffer holding one integration's baseline model visibilities.
    buf: Vec<ModelVis>,
    ntime: usize,
    nbase: usize,
    nif: usize,
}

impl ModelStore {
    /// Create a new UV model scratch file in `dir`.
    pub fn create(
        dir: &Path,
        ntime: usize,
        nbase: usize,
        nif: usize,
    ) -> Result<ModelStore, ModelStoreError> {
        let rio = RecFile::open(
            &dir.join("uvmodel.scr"),
            FileMode::Scratch,
            ntime * nbase * std::mem::size_of::<ModelVis>(),
        )?;
        Ok(ModelStore {
            rio,
            buf: vec![ModelVis::default(); nbase],
            ntime,
            nbase,
            nif,
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
    pub fn buffer(&self) -> &[ModelVis] {
        &self.buf
    }

    pub fn buffer_mut(&mut self) -> &mut [ModelVis] {
        &mut self.buf
    }

    fn check(&self, ut: usize, cif: usize) -> Result<(), ModelStoreError> {
        if ut >= self.ntime {
            return Err(ModelStoreError::BadRecord {
                ut,
                ntime: self.ntime,
            });
        }
        if cif >= self.nif {
            return Err(ModelStoreError::BadIf {
                cif,
                nif: self.nif,
            });
        }
        Ok(())
    }

    /// Read the model visibilities of one integration of one IF.
    pub fn read(&mut self, ut: usize, cif: usize) -> Result<(), ModelStoreError> {
        self.check(ut, cif)?;
        self.rio.seek(
            cif as u64,
            (ut * self.nbase * std::mem::size_of::<ModelVis>()) as u64,
        )?;
        if self.rio.read_items(&mut self.buf)? < self.nbase {
            return Err(ModelStoreError::ShortRead { ut });
        }
        Ok(())
    }

    /// Write the model visibilities of one integration of one IF.
    pub fn write(&mut self, ut: usize, cif: usize) -> Result<(), ModelStoreError> {
        self.check(ut, cif)?;
        self.rio.seek(
            cif as u64,
            (ut * self.nbase * std::mem::size_of::<ModelVis>()) as u64,
        )?;
        self.rio.write_items(&self.buf)?;
        Ok(())
    }

    /// Zero the baseline buffer.
    pub fn clear_buffer(&mut self) {
        self.buf.fill(ModelVis::default());
    }

    /// Push pending I/O to the operating system.
    pub fn flush(&mut self) -> Result<(), ModelStoreError> {
        Ok(self.rio.flush()?)
    }
}
