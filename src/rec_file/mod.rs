// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Record-oriented binary I/O on scratch files.

A `RecFile` addresses a binary file as a sequence of fixed-length
logical records whose total size may exceed what a single native seek
offset can express when multiplied out. All of the visibility paging
stores are built on this type.
*/

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytemuck::Pod;

pub mod error;
pub use error::RecFileError;


/// The highest `_N` postfix tried when searching for an unused scratch
/// file name.
const MAX_SCRATCH_VERSION: u32 = 999;

/// The disposition of the file being opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileMode {
    /// An existing file, opened for reading and writing.
    Old,
    /// A new file, created (or truncated) for reading and writing.
    New,
    /// An existing file, opened for reading only.
    ReadOnly,
    /// A scratch file. The directory entry is removed as soon as the
    /// file is open, so the file disappears when the process exits.
    Scratch,
}

/// The nature of the last I/O operation on the file.
///
/// A position operation must separate a read from a write in either
/// direction, so the file records what it last did and injects a no-op
/// seek when the direction changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LastIo {
    Read,
    Write,
    Seek,
}

/// A record-addressable binary file.
pub struct RecFile {
    file: File,
    /// The name the file was opened (and possibly unlinked) under.
    name: PathBuf,
    writable: bool,
    last_io: LastIo,
    /// The length of one logical record in bytes.
    rec_len: u64,
    /// The max record count coverable by one native seek step.
    rec_lim: i64,
    /// The record within which the file pointer currently lies.
    rec_num: u64,
    /// The byte offset of the file pointer into record `rec_num`.
    rec_off: u64,
    /// True after an unrecovered I/O error. Cleared only by `rewind`.
    sticky: bool,
    /// True if the last read hit the end of the file.
    eof: bool,
}

impl RecFile {
    /// Open a binary file for record-oriented I/O.
    ///
    /// `rec_len` is the size of one logical record in bytes. It is used
    /// solely as an aid to specifying file positions in `seek`.
    pub fn open(path: &Path, mode: FileMode, rec_len: usize) -> Result<RecFile, RecFileError> {
        if rec_len == 0 {
            return Err(RecFileError::BadRecordLength(rec_len));
        }
        let (file, name) = match mode {
            FileMode::ReadOnly => {
                if !path.exists() {
                    return Err(RecFileError::ReadOnlyNew(path.to_path_buf()));
                }
                let f = File::open(path).map_err(|source| RecFileError::Open {
                    name: path.to_path_buf(),
                    source,
                })?;
                (f, path.to_path_buf())
            }
            FileMode::Old => {
                let f = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(path)
                    .map_err(|source| RecFileError::Open {
                        name: path.to_path_buf(),
                        source,
                    })?;
                (f, path.to_path_buf())
            }
            FileMode::New => {
                let f = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|source| RecFileError::Open {
                        name: path.to_path_buf(),
                        source,
                    })?;
                (f, path.to_path_buf())
            }
            FileMode::Scratch => {
                let (f, name) = open_scratch(path)?;
                // Remove the directory entry now so that the file is
                // reclaimed when the last handle closes, however the
                // process exits.
                let _ = fs::remove_file(&name);
                (f, name)
            }
        };
        Ok(RecFile {
            file,
            name,
            writable: mode != FileMode::ReadOnly,
            last_io: LastIo::Seek,
            rec_len: rec_len as u64,
            rec_lim: i64::MAX / rec_len as i64,
            rec_num: 0,
            rec_off: 0,
            sticky: false,
            eof: false,
        })
    }

    /// The name the file was opened under.
    pub fn name(&self) -> &Path {
        &self.name
    }

    /// True if a previous I/O error has not been cleared by `rewind`.
    pub fn had_error(&self) -> bool {
        self.sticky
    }

    /// True if the last read stopped at the end of the file.
    pub fn at_eof(&self) -> bool {
        self.eof
    }

    /// Return the current file position as (record index, byte offset
    /// within that record).
    pub fn tell(&self) -> (u64, u64) {
        (self.rec_num, self.rec_off)
    }

    fn check_usable(&self) -> Result<(), RecFileError> {
        if self.sticky {
            Err(RecFileError::Sticky(self.name.clone()))
        } else {
            Ok(())
        }
    }

    /// Position the file at byte `rec_off` of record `rec_num`.
    ///
    /// The position change is decomposed into a byte adjustment within
    /// the record followed by whole-record jumps of at most
    /// `i64::MAX / rec_len` records each, so that very large files can
    /// be addressed without overflowing the native offset type.
    /// On error the file is rewound.
    pub fn seek(&mut self, rec_num: u64, rec_off: u64) -> Result<(), RecFileError> {
        self.check_usable()?;
        let mut rec_dif = rec_num as i64 - self.rec_num as i64;
        let mut off_dif = rec_off as i64 - self.rec_off as i64;
        let rec_len = self.rec_len as i64;
        while off_dif >= rec_len {
            rec_dif += 1;
            off_dif -= rec_len;
        }
        while off_dif <= -rec_len {
            rec_dif -= 1;
            off_dif += rec_len;
        }
        // Already positioned?
        if rec_dif == 0 && off_dif == 0 {
            return Ok(());
        }
        if off_dif != 0 {
            if let Err(source) = self.file.seek(SeekFrom::Current(off_dif)) {
                let name = self.name.clone();
                self.rewind();
                return Err(RecFileError::Seek { name, source });
            }
            self.last_io = LastIo::Seek;
        }
        while rec_dif != 0 {
            let step = rec_dif.clamp(-self.rec_lim, self.rec_lim);
            if let Err(source) = self.file.seek(SeekFrom::Current(step * rec_len)) {
                let name = self.name.clone();
                self.rewind();
                return Err(RecFileError::Seek { name, source });
            }
            self.last_io = LastIo::Seek;
            rec_dif -= step;
        }
        self.rec_num = rec_num;
        self.rec_off = rec_off;
        self.eof = false;
        Ok(())
    }

    /// Read up to `buf.len()` items from the current file position.
    ///
    /// Returns the number of complete items read. This differs from
    /// the requested count only at the end of the file; any other short
    /// read is an I/O error and leaves the file in its sticky error
    /// state.
    pub fn read_items<T: Pod>(&mut self, buf: &mut [T]) -> Result<usize, RecFileError> {
        self.check_usable()?;
        // Switching from writing to reading requires a position
        // operation in between.
        if self.last_io == LastIo::Write {
            if let Err(source) = self.file.seek(SeekFrom::Current(0)) {
                self.sticky = true;
                return Err(RecFileError::Seek {
                    name: self.name.clone(),
                    source,
                });
            }
        }
        self.last_io = LastIo::Read;
        let item_size = std::mem::size_of::<T>();
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(buf);
        let mut nread = 0usize;
        while nread < bytes.len() {
            match self.file.read(&mut bytes[nread..]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => nread += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    self.sticky = true;
                    return Err(RecFileError::Read {
                        name: self.name.clone(),
                        source,
                    });
                }
            }
        }
        let nobj = nread / item_size;
        self.advance((nobj * item_size) as u64);
        Ok(nobj)
    }

    /// Write `buf` at the current file position.
    pub fn write_items<T: Pod>(&mut self, buf: &[T]) -> Result<(), RecFileError> {
        self.check_usable()?;
        if !self.writable {
            return Err(RecFileError::NotWritable(self.name.clone()));
        }
        // Switching from reading to writing requires a position
        // operation in between.
        if self.last_io == LastIo::Read {
            if let Err(source) = self.file.seek(SeekFrom::Current(0)) {
                self.sticky = true;
                return Err(RecFileError::Seek {
                    name: self.name.clone(),
                    source,
                });
            }
        }
        self.last_io = LastIo::Write;
        let bytes: &[u8] = bytemuck::cast_slice(buf);
        let mut nsent = 0usize;
        while nsent < bytes.len() {
            match self.file.write(&bytes[nsent..]) {
                Ok(0) => {
                    self.sticky = true;
                    return Err(RecFileError::Write {
                        name: self.name.clone(),
                        source: std::io::Error::from(ErrorKind::WriteZero),
                    });
                }
                Ok(n) => nsent += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    self.sticky = true;
                    return Err(RecFileError::Write {
                        name: self.name.clone(),
                        source,
                    });
                }
            }
        }
        self.advance(bytes.len() as u64);
        Ok(())
    }

    /// Update the recorded file position after `nbytes` of sequential
    /// I/O.
    fn advance(&mut self, nbytes: u64) {
        let total = self.rec_off + nbytes;
        self.rec_num += total / self.rec_len;
        self.rec_off = total % self.rec_len;
    }

    /// Rewind the file to the start of record 0.
    ///
    /// This also clears any sticky error and EOF status, mirroring the
    /// advertised behavior of `rewind()`.
    pub fn rewind(&mut self) {
        let _ = self.file.seek(SeekFrom::Start(0));
        self.rec_num = 0;
        self.rec_off = 0;
        self.sticky = false;
        self.eof = false;
        self.last_io = LastIo::Seek;
    }

    /// Rewind the file, then write `npad` runs of `chunk_len` zero
    /// bytes, then rewind again.
    pub fn pad(&mut self, chunk_len: usize, npad: u64) -> Result<(), RecFileError> {
        self.check_usable()?;
        self.rewind();
        if chunk_len == 0 || npad == 0 {
            return Ok(());
        }
        if !self.writable {
            return Err(RecFileError::NotWritable(self.name.clone()));
        }
        self.last_io = LastIo::Write;
        let zeros = vec![0u8; chunk_len];
        for _ in 0..npad {
            if let Err(source) = self.file.write_all(&zeros) {
                self.sticky = true;
                return Err(RecFileError::Write {
                    name: self.name.clone(),
                    source,
                });
            }
        }
        self.rewind();
        Ok(())
    }

    /// Push pending I/O to the operating system.
    pub fn flush(&mut self) -> Result<(), RecFileError> {
        self.check_usable()?;
        self.file.flush().map_err(|source| RecFileError::Write {
            name: self.name.clone(),
            source,
        })
    }
}

/// Create a scratch file under an unambiguous name.
///
/// The basis name is used as-is if no file of that name exists;
/// otherwise `_N` postfixes are tried for the lowest N for which no
/// file exists.
fn open_scratch(path: &Path) -> Result<(File, PathBuf), RecFileError> {
    for ver in 0..=MAX_SCRATCH_VERSION {
        let candidate = if ver == 0 {
            path.to_path_buf()
        } else {
            let mut name = path.as_os_str().to_os_string();
            name.push(format!("_{}", ver));
            PathBuf::from(name)
        };
        match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(f) => return Ok((f, candidate)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(source) => {
                return Err(RecFileError::Open {
                    name: candidate,
                    source,
                })
            }
        }
    }
    Err(RecFileError::ScratchNamesExhausted(path.to_path_buf()))
}
