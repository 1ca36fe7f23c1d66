// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Structs and helper methods for Error handling

use thiserror::Error;

/// VisilibError subtypes
#[derive(Error, Debug)]
pub enum VisilibError {
    /// An error derived from `RecFileError`.
    #[error("{0}")]
    RecFile(#[from] crate::rec_file::error::RecFileError),

    /// An error derived from `RawStoreError`.
    #[error("{0}")]
    RawStore(#[from] crate::raw_store::RawStoreError),

    /// An error derived from `IfStoreError`.
    #[error("{0}")]
    IfStore(#[from] crate::if_store::IfStoreError),

    /// An error derived from `ModelStoreError`.
    #[error("{0}")]
    ModelStore(#[from] crate::model_store::ModelStoreError),

    /// An error derived from `ChanListError`.
    #[error("{0}")]
    ChanList(#[from] crate::chan_list::ChanListError),

    /// An error derived from `TimeIndexError`.
    #[error("{0}")]
    TimeIndex(#[from] crate::time_index::TimeIndexError),

    /// An error derived from `PolError`.
    #[error("{0}")]
    Polarization(#[from] crate::polarization::PolError),

    /// An error derived from `BeamError`.
    #[error("{0}")]
    Beam(#[from] crate::beam::error::BeamError),

    /// An error derived from `ModelError`.
    #[error("{0}")]
    Model(#[from] crate::model::error::ModelError),

    /// An error derived from `ModelTableError`.
    #[error("{0}")]
    ModelTable(#[from] crate::model_table::ModelTableError),

    /// An error derived from `ObsError`.
    #[error("{0}")]
    Observation(#[from] crate::observation::error::ObsError),
}
