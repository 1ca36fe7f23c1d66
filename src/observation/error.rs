// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Errors associated with operations on an observation.
*/

use thiserror::Error;

use super::ObsState;
use crate::beam::error::BeamError;
use crate::if_store::IfStoreError;
use crate::model::ModelError;
use crate::model_store::ModelStoreError;
use crate::polarization::PolError;
use crate::raw_store::RawStoreError;
use crate::rec_file::RecFileError;
use crate::time_index::TimeIndexError;

#[derive(Error, Debug)]
pub enum ObsError {
    /// The observation has not reached the state the operation needs.
    #[error("{op}: {state}")]
    State { op: &'static str, state: ObsState },

    #[error("IF {cif} is unavailable (nif = {nif})")]
    IfIndex { cif: usize, nif: usize },

    #[error("Sub-array index {isub} out of range (nsub = {nsub})")]
    SubIndex { isub: usize, nsub: usize },

    #[error("Integration index {ut} out of range")]
    UtIndex { ut: usize },

    #[error("Baseline index {base} out of range")]
    BaseIndex { base: usize },

    #[error("Station index {itel} out of range")]
    TelIndex { itel: usize },

    #[error("There is no baseline between antennas {ta} and {tb}")]
    NoSuchBaseline { ta: usize, tb: usize },

    #[error("Model component index {index} out of range")]
    ComponentIndex { index: usize },

    #[error("None of the chosen ranges of channels exist")]
    NoChannels,

    #[error("{0}")]
    Polarization(#[from] PolError),

    #[error("Weight scale factor must be finite and positive")]
    BadWeightScale,

    #[error("Averaging bin width must be at least 1 second")]
    BadBinWidth,

    #[error("Can't flush edits without a selection to define their channels")]
    EditsNeedSelection,

    #[error("There is no IF paging file to retrieve IF {0} from")]
    NoIfStore(usize),

    #[error("There is no UV model paging file to retrieve IF {0} from")]
    NoModelStore(usize),

    #[error("{0}")]
    RawStore(#[from] RawStoreError),

    #[error("{0}")]
    IfStore(#[from] IfStoreError),

    #[error("{0}")]
    ModelStore(#[from] ModelStoreError),

    #[error("{0}")]
    RecFile(#[from] RecFileError),

    #[error("{0}")]
    Index(#[from] TimeIndexError),

    #[error("{0}")]
    Beam(#[from] BeamError),

    #[error("{0}")]
    Model(#[from] ModelError),
}
