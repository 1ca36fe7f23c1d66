// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Errors associated with antenna voltage beams.
*/

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BeamError {
    #[error("A voltage beam needs at least 2 samples, not {0}")]
    TooFewSamples(usize),

    #[error("Invalid sampling binwidth ({0})")]
    BadBinWidth(f32),

    #[error("Invalid antenna beam frequency ({0})")]
    BadFrequency(f32),
}
