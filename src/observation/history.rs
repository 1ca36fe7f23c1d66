// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The observation history file.

History is append-only; each record is exactly 80 characters,
space-padded. Clearing the history simply resets the line count, so the
next append starts overwriting from record zero.
*/

use std::path::Path;

use regex::Regex;

use crate::rec_file::{FileMode, RecFile, RecFileError};

/// The fixed length of one history line.
pub const HISTORY_LINE_LEN: usize = 80;

lazy_static! {
    /// Matches history records carrying an applied weight scale.
    static ref RE_WTSCAL: Regex = Regex::new(r"AIPS WTSCAL\s*=\s*([-+]?[0-9.]+(?:[eEdD][-+]?[0-9]+)?)").unwrap();
}

/// The append-only history scratch file of an observation.
pub struct History {
    rio: RecFile,
    nline: usize,
}

impl History {
    /// Create the history scratch file in `dir`.
    pub fn create(dir: &Path) -> Result<History, RecFileError> {
        let rio = RecFile::open(
            &dir.join("history.scr"),
            FileMode::Scratch,
            HISTORY_LINE_LEN,
        )?;
        Ok(History { rio, nline: 0 })
    }

    /// The number of history lines.
    pub fn len(&self) -> usize {
        self.nline
    }

    pub fn is_empty(&self) -> bool {
        self.nline == 0
    }

    /// Append one line of history. Only the first 80 characters are
    /// used; shorter lines are space-padded.
    pub fn append(&mut self, line: &str) -> Result<(), RecFileError> {
        let mut rec = [b' '; HISTORY_LINE_LEN];
        for (slot, byte) in rec.iter_mut().zip(line.bytes()) {
            *slot = byte;
        }
        self.rio.seek(self.nline as u64, 0)?;
        self.rio.write_items(&rec)?;
        self.nline += 1;
        Ok(())
    }

    /// Read back one line of history, without its padding.
    pub fn line(&mut self, index: usize) -> Result<String, RecFileError> {
        let mut rec = [0u8; HISTORY_LINE_LEN];
        self.rio.seek(index as u64, 0)?;
        self.rio.read_items(&mut rec)?;
        Ok(String::from_utf8_lossy(&rec).trim_end().to_string())
    }

    /// Effectively clear all history by resetting the line count.
    pub fn clear(&mut self) {
        self.nline = 0;
    }
}

/// Scan one history line for an `AIPS WTSCAL = <value>` record and
/// return the scale it carries. The absolute value is the weight-scale
/// factor; the sign is kept for application at data ingest.
pub fn parse_wtscal(line: &str) -> Option<f32> {
    let caps = RE_WTSCAL.captures(line)?;
    let text = caps.get(1).unwrap().as_str().replace(['d', 'D'], "e");
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_lines_are_padded_to_80_chars() {
        let tdir = TempDir::new("visilib").unwrap();
        let mut his = History::create(tdir.path()).unwrap();
        his.append("A FIRST HISTORY LINE").unwrap();
        his.append("A SECOND").unwrap();
        assert_eq!(his.len(), 2);
        assert_eq!(his.line(0).unwrap(), "A FIRST HISTORY LINE");
        assert_eq!(his.line(1).unwrap(), "A SECOND");
    }

    #[test]
    fn test_clear_restarts_from_record_zero() {
        let tdir = TempDir::new("visilib").unwrap();
        let mut his = History::create(tdir.path()).unwrap();
        his.append("OLD").unwrap();
        his.clear();
        assert!(his.is_empty());
        his.append("NEW").unwrap();
        assert_eq!(his.line(0).unwrap(), "NEW");
    }

    #[test]
    fn test_parse_wtscal() {
        assert_eq!(parse_wtscal("AIPS WTSCAL = 2.5"), Some(2.5));
        assert_eq!(parse_wtscal("AIPS WTSCAL =-1.0"), Some(-1.0));
        assert_eq!(parse_wtscal("AIPS WTSCAL = 1.0D2"), Some(100.0));
        assert_eq!(parse_wtscal("AIPS SORT ORDER = TB"), None);
    }
}
