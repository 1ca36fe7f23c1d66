// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Errors associated with model components and model files.
*/

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid model component reference frequency")]
    BadRefFreq,

    #[error("Unknown component type ({code}) on line {line} of the model")]
    UnknownShape { code: i64, line: usize },

    #[error("Error at field {field} on line {line} of the model")]
    BadField { field: usize, line: usize },

    #[error("Too many fields on line {line} of the model")]
    TooManyFields { line: usize },

    #[error("Unexpected escape character on line {0} of the model")]
    BadEscape(usize),

    #[error("Error reading model: {0}")]
    Io(#[from] std::io::Error),
}
