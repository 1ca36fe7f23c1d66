// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The global time index.

All sub-array integrations are merged into one flat, time-ordered
record list. Each entry locates an integration by sub-array and slot;
its position in the list is the integration's scratch-file record
number.
*/

use thiserror::Error;

use crate::subarray::Subarray;


/// The location of one indexed integration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntRec {
    /// The index of the owning sub-array.
    pub isub: usize,
    /// The integration slot within that sub-array.
    pub islot: usize,
}

#[derive(Error, Debug)]
pub enum TimeIndexError {
    #[error("Inconsistent integration count: sub-arrays hold {found}, {expected} allocated")]
    CountMismatch { found: usize, expected: usize },

    #[error("Out of order integration record number {irec} at index {pos}")]
    OutOfOrder { irec: usize, pos: usize },
}

/// Merge the integrations of all sub-arrays into record order.
///
/// Each sub-array's integrations are already internally ordered; the
/// merge repeatedly takes the sub-array whose next unused integration
/// has the lowest record number. Every emitted integration's recorded
/// record number must equal its position in the emitted order, and the
/// total must equal `expected`; either mismatch is a fatal ingest
/// error.
pub fn build_index(subs: &[Subarray], expected: usize) -> Result<Vec<IntRec>, TimeIndexError> {
    let found: usize = subs.iter().map(|s| s.ntime()).sum();
    if found != expected {
        return Err(TimeIndexError::CountMismatch { found, expected });
    }
    let mut cursor = vec![0usize; subs.len()];
    let mut rec = Vec::with_capacity(expected);
    for pos in 0..expected {
        // Pick the sub-array whose next integration has the lowest
        // record number. There are rarely enough sub-arrays to warrant
        // anything cleverer than a linear scan.
        let mut best: Option<(usize, usize)> = None;
        for (isub, sub) in subs.iter().enumerate() {
            if cursor[isub] < sub.ntime() {
                let irec = sub.integs[cursor[isub]].irec;
                if best.map_or(true, |(_, best_irec)| irec < best_irec) {
                    best = Some((isub, irec));
                }
            }
        }
        // `found == expected` guarantees a candidate exists.
        let (isub, irec) = best.unwrap();
        if irec != pos {
            return Err(TimeIndexError::OutOfOrder { irec, pos });
        }
        rec.push(IntRec {
            isub,
            islot: cursor[isub],
        });
        cursor[isub] += 1;
    }
    Ok(rec)
}

/// Relational operators for time-stamp searches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeOp {
    /// The latest time < t.
    Before,
    /// The latest time <= t.
    AtOrBefore,
    /// The time nearest t.
    Nearest,
    /// The earliest time >= t.
    AtOrAfter,
    /// The earliest time > t.
    After,
}

/// Binary search an ascending sequence of `n` time stamps for the
/// index matching the relational test `op` against `t`. `time_of`
/// maps an index to its time stamp.
pub fn search_times<F>(n: usize, t: f64, op: TimeOp, time_of: F) -> Option<usize>
where
    F: Fn(usize) -> f64,
{
    if n == 0 {
        return None;
    }
    // Bracket t between neighboring samples.
    let mut lo: i64 = 0;
    let mut hi: i64 = n as i64 - 1;
    while lo <= hi {
        let mid = (lo + hi) / 2;
        if t < time_of(mid as usize) {
            hi = mid - 1;
        } else {
            lo = mid + 1;
        }
    }
    std::mem::swap(&mut lo, &mut hi);
    let mut lo = lo.clamp(0, n as i64 - 1) as usize;
    let mut hi = hi.clamp(0, n as i64 - 1) as usize;
    let mut lo_t = time_of(lo);
    let mut hi_t = time_of(hi);
    // Arrange for lo <= best <= hi.
    let (best, best_t) = if t - lo_t < hi_t - t {
        (lo, lo_t)
    } else {
        (hi, hi_t)
    };
    if lo == best && lo > 0 {
        lo -= 1;
        lo_t = time_of(lo);
    }
    if hi == best && hi < n - 1 {
        hi += 1;
        hi_t = time_of(hi);
    }
    match op {
        TimeOp::Before => {
            if best_t < t {
                Some(best)
            } else if lo_t < t {
                Some(lo)
            } else {
                None
            }
        }
        TimeOp::AtOrBefore => {
            if best_t <= t {
                Some(best)
            } else if lo_t <= t {
                Some(lo)
            } else {
                None
            }
        }
        TimeOp::Nearest => Some(best),
        TimeOp::AtOrAfter => {
            if best_t >= t {
                Some(best)
            } else if hi_t >= t {
                Some(hi)
            } else {
                None
            }
        }
        TimeOp::After => {
            if best_t > t {
                Some(best)
            } else if hi_t > t {
                Some(hi)
            } else {
                None
            }
        }
    }
}
