// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
A library for managing radio-interferometry visibility data sets.

An [`observation::Observation`] holds a visibility data set in three
disk-backed paged stores while the caller selects a processing stream
(a polarization plus a set of frequency-channel ranges), pages single
IFs into memory, applies calibration and geometric corrections, edits
flags, maintains a UV-synchronized sky model and coherently averages
the data in time.
*/

#[macro_use]
extern crate lazy_static;

pub mod antenna;
pub mod average;
pub mod baseline;
pub mod beam;
pub mod chan_list;
pub mod checksum;
pub mod edit;
pub mod error;
pub mod if_store;
pub mod model;
pub mod model_store;
pub mod model_table;
pub mod observation;
pub mod polarization;
pub mod projection;
pub mod raw_store;
pub mod rec_file;
pub mod subarray;
pub mod time_index;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-exports.
pub use antenna::{Antenna, AntennaSite};
pub use baseline::{BaseCor, Baseline};
pub use beam::{AntennaBeams, VoltageBeam};
pub use chan_list::{ChanList, ChanRange};
pub use edit::{BaseSpec, EditOp, EditTarget};
pub use error::VisilibError;
pub use if_store::PolarVis;
pub use model::{MapWindow, ModComp, ModShape, Model};
pub use model_store::ModelVis;
pub use model_table::ModelTable;
pub use observation::{ObsState, Observation};
pub use polarization::{PolSelector, Stokes};
pub use projection::Proj;
pub use raw_store::CmplxVis;
pub use rec_file::{FileMode, RecFile};
pub use subarray::{Integration, Subarray, TelCor, VisFlags, Visibility};
pub use time_index::{IntRec, TimeOp};

/// The longest antenna name stored in an observation.
pub const MAX_ANT_NAME: usize = 16;

/// The number of seconds in a UTC day.
pub const DAYSEC: f64 = 86400.0;

/// Milli-arcseconds to radians.
pub const MAS_TO_RAD: f64 = std::f64::consts::PI / 180.0 / 3600.0 / 1000.0;

/// Radians to milli-arcseconds.
pub const RAD_TO_MAS: f64 = 1.0 / MAS_TO_RAD;

/// Degrees to radians.
pub const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// Radians to degrees.
pub const RAD_TO_DEG: f64 = 180.0 / std::f64::consts::PI;
