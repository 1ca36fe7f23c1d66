// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Errors associated with record-oriented scratch-file I/O.
*/

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecFileError {
    #[error("Illegal record length of {0} bytes")]
    BadRecordLength(usize),

    #[error("Readonly access requested for non-existent file {0}")]
    ReadOnlyNew(PathBuf),

    #[error("Unable to find an unused scratch name for {0} within 999 versions")]
    ScratchNamesExhausted(PathBuf),

    #[error("Unable to open file {name}: {source}")]
    Open {
        name: PathBuf,
        source: std::io::Error,
    },

    #[error("Error positioning file {name}: {source}")]
    Seek {
        name: PathBuf,
        source: std::io::Error,
    },

    #[error("Error reading from file {name}: {source}")]
    Read {
        name: PathBuf,
        source: std::io::Error,
    },

    #[error("Error writing to file {name}: {source}")]
    Write {
        name: PathBuf,
        source: std::io::Error,
    },

    #[error("File {0} has an unrecovered I/O error")]
    Sticky(PathBuf),

    #[error("File {0} is not open for writing")]
    NotWritable(PathBuf),
}
