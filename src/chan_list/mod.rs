// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Ordered, disjoint sets of spectral-line channel ranges.

Channel ranges are kept in a contiguous array in ascending channel
order. The ranges are normally traversed in inner loops of the stream
selection pipeline, so array access matters more than insertion cost.
*/

use std::fmt;

use thiserror::Error;


/// The capacity growth increment of the range array. The most common
/// number of ranges is 1, and more than a handful is rare.
const RANGE_BLOCK: usize = 5;

/// One inclusive range of 0-relative channel indexes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChanRange {
    /// First channel of the range.
    pub ca: usize,
    /// Last channel of the range.
    pub cb: usize,
}

#[derive(Error, Debug)]
pub enum ChanListError {
    #[error("Bad channel number in channel-range text: {0:?}")]
    Parse(String),

    #[error("Channel numbers are 1-relative; 0 is not a valid channel")]
    ZeroChannel,
}

/// An ordered set of disjoint channel ranges.
#[derive(Clone, Debug, Default)]
pub struct ChanList {
    ranges: Vec<ChanRange>,
    /// Cached lowest selected channel.
    ca: usize,
    /// Cached highest selected channel.
    cb: usize,
}

impl ChanList {
    /// Create a new, empty channel-range list.
    pub fn new() -> ChanList {
        ChanList::default()
    }

    /// The ranges of the list in ascending channel order.
    pub fn ranges(&self) -> &[ChanRange] {
        &self.ranges
    }

    pub fn num_ranges(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The lowest and highest selected channels. Only meaningful when
    /// the list is non-empty.
    pub fn bounds(&self) -> (usize, usize) {
        (self.ca, self.cb)
    }

    /// The total number of selected channels.
    pub fn num_channels(&self) -> usize {
        self.ranges.iter().map(|r| r.cb - r.ca + 1).sum()
    }

    /// Add a range of channels to the list.
    ///
    /// If the new range touches or overlaps existing ranges it is
    /// merged with them, absorbing any ranges it spans; otherwise it is
    /// inserted so as to keep the list in ascending channel order. The
    /// two ends may be given in either order.
    pub fn add(&mut self, ca: usize, cb: usize) {
        let (ca, cb) = if ca <= cb { (ca, cb) } else { (cb, ca) };
        // Find the first existing range that the new range could merge
        // with. There are unlikely to be enough ranges to warrant a
        // binary search.
        let mut irange = 0;
        while irange < self.ranges.len() && ca > self.ranges[irange].cb + 1 {
            irange += 1;
        }
        // Extend an existing range?
        if irange < self.ranges.len()
            && (ca + 1 >= self.ranges[irange].ca || cb + 1 >= self.ranges[irange].ca)
        {
            if ca < self.ranges[irange].ca {
                self.ranges[irange].ca = ca;
            }
            if cb > self.ranges[irange].cb {
                // Find the last range overlapped by the extension.
                let mut ir = self.ranges.len() - 1;
                while ir > irange && cb + 1 < self.ranges[ir].ca {
                    ir -= 1;
                }
                self.ranges[irange].cb = cb.max(self.ranges[ir].cb);
                // Remove the absorbed ranges.
                self.ranges.drain(irange + 1..=ir);
            }
        } else {
            // Insert a new range at `irange`.
            if self.ranges.len() % RANGE_BLOCK == 0 {
                self.ranges.reserve(RANGE_BLOCK);
            }
            self.ranges.insert(irange, ChanRange { ca, cb });
        }
        self.ca = self.ranges[0].ca;
        self.cb = self.ranges[self.ranges.len() - 1].cb;
    }

    /// Truncate the list to refer only to channels below `nchan`,
    /// returning the number of ranges that remain. Note that this may
    /// leave the list empty; the caller must handle that case.
    pub fn truncate(&mut self, nchan: usize) -> usize {
        if !self.ranges.is_empty() {
            // Find the first range whose upper bound exceeds nchan-1.
            let mut ir = 0;
            while ir < self.ranges.len() && self.ranges[ir].cb < nchan {
                ir += 1;
            }
            if ir < self.ranges.len() {
                log::warn!(
                    "Restricting channel ranges to the available {} channels.",
                    nchan
                );
                if self.ranges[ir].ca >= nchan {
                    self.ranges.truncate(ir);
                } else {
                    self.ranges[ir].cb = nchan - 1;
                    self.ranges.truncate(ir + 1);
                }
            }
        }
        if self.ranges.is_empty() {
            self.ca = 0;
            self.cb = 0;
        } else {
            self.ca = self.ranges[0].ca;
            self.cb = self.ranges[self.ranges.len() - 1].cb;
        }
        self.ranges.len()
    }

    /// Construct a new list from the sub-set of this list that falls in
    /// the window of `nchan` channels starting `coff` channels into
    /// this list's channel domain. Ranges are translated by `-coff` and
    /// clipped to `[0, nchan-1]`; the result may be empty.
    pub fn subset(&self, coff: usize, nchan: usize) -> ChanList {
        let mut out = ChanList::new();
        let coff = coff as isize;
        for range in &self.ranges {
            let ca = range.ca as isize - coff;
            let cb = range.cb as isize - coff;
            if ca < nchan as isize && cb >= 0 {
                let ca = ca.max(0) as usize;
                let cb = (cb as usize).min(nchan - 1);
                out.add(ca, cb);
            }
        }
        out
    }

    /// Parse the text form written by `Display`: comma-separated
    /// 1-relative channel numbers, taken in pairs, with a trailing lone
    /// number standing for a single-channel range.
    pub fn parse(text: &str) -> Result<ChanList, ChanListError> {
        let mut cl = ChanList::new();
        let mut pending: Option<usize> = None;
        for tok in text.split(',') {
            let tok = tok.trim();
            if tok.is_empty() && pending.is_none() && cl.is_empty() {
                continue;
            }
            let chan: usize = tok
                .parse()
                .map_err(|_| ChanListError::Parse(tok.to_string()))?;
            if chan == 0 {
                return Err(ChanListError::ZeroChannel);
            }
            match pending.take() {
                None => pending = Some(chan - 1),
                Some(ca) => cl.add(ca, chan - 1),
            }
        }
        if let Some(ca) = pending {
            cl.add(ca, ca);
        }
        Ok(cl)
    }
}

impl PartialEq for ChanList {
    fn eq(&self, other: &ChanList) -> bool {
        self.ranges == other.ranges
    }
}

impl Eq for ChanList {}

/// Formats the ranges as comma-separated 1-relative channel pairs,
/// e.g. `"1, 8, 12, 12"`.
impl fmt::Display for ChanList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            write!(
                f,
                "{}{}, {}",
                if i > 0 { ", " } else { "" },
                range.ca + 1,
                range.cb + 1
            )?;
        }
        Ok(())
    }
}
