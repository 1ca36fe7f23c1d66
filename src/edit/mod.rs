// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Deferred flag editing.

Edits requested by the user are applied immediately to the in-memory
visibilities of the resident IF, but their application to the paging
files is deferred: each integration keeps a FIFO list of pending edit
operations, and a flush walks the affected sub-windows of the raw and
IF stream files in one deterministic pass. The number of buffered edits
is bounded; reaching the bound forces a flush.
*/

use crate::baseline::Baseline;
use crate::observation::{ObsError, ObsState, Observation};
use crate::subarray::VisFlags;
use crate::time_index::IntRec;


/// The number of edit operations per nominal buffer block.
pub const EDITS_PER_BLOCK: usize = 256;

/// The maximum number of blocks of buffered edits allowed before a
/// flush is forced.
pub const MAX_EDIT_BLOCKS: usize = 10;

/// What an edit operation applies to within one integration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditTarget {
    /// Only the baseline at this index.
    Baseline(usize),
    /// Every baseline of the antenna at this index.
    Antenna(usize),
    /// Every baseline of the sub-array.
    AllBaselines,
}

/// One deferred flag/unflag operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EditOp {
    /// The single IF the edit applies to, or None for all IFs.
    pub cif: Option<usize>,
    /// The baselines the edit applies to.
    pub target: EditTarget,
    /// If true, edit only the channels of the current stream
    /// selection; otherwise edit all channels.
    pub sel_chan: bool,
    /// True to flag, false to unflag.
    pub flag: bool,
}

impl EditOp {
    /// True if the edit covers the given IF.
    pub fn applies_to_if(&self, cif: usize) -> bool {
        self.cif.map_or(true, |c| c == cif)
    }

    /// True if the edit covers the given baseline.
    pub fn selects(&self, base: usize, bl: &Baseline) -> bool {
        match self.target {
            EditTarget::Baseline(index) => base == index,
            EditTarget::Antenna(index) => bl.uses_antenna(index),
            EditTarget::AllBaselines => true,
        }
    }
}

/// The bookkeeping for the observation-wide edit buffer.
#[derive(Default)]
pub struct EditQueue {
    nqueued: usize,
}

impl EditQueue {
    pub fn new() -> EditQueue {
        EditQueue::default()
    }

    /// The total number of buffered edits across all integrations.
    pub fn len(&self) -> usize {
        self.nqueued
    }

    pub fn is_empty(&self) -> bool {
        self.nqueued == 0
    }

    /// True once the buffer has reached its bound and must be flushed
    /// before accepting more edits.
    pub fn is_full(&self) -> bool {
        self.nqueued >= EDITS_PER_BLOCK * MAX_EDIT_BLOCKS
    }

    pub(crate) fn added(&mut self) {
        self.nqueued += 1;
    }

    pub(crate) fn reset(&mut self) {
        self.nqueued = 0;
    }
}

/// The channel/baseline bounding rectangle of the edits of one
/// integration within one IF.
#[derive(Clone, Copy, Debug, Default)]
struct EditRange {
    cmin: usize,
    cmax: usize,
    bmin: usize,
    bmax: usize,
    nedit: usize,
}

impl Observation {
    /// Apply an edit to one integration, immediately in memory where
    /// the resident IF is covered, and queue it for application to the
    /// paging files.
    ///
    /// `cif` restricts the edit to one IF (None edits all IFs), and
    /// `sel_chan` restricts it to the channels of the current stream
    /// selection. Edits refer to the current channel selection, so a
    /// stream must have been selected.
    pub fn edit_integration(
        &mut self,
        isub: usize,
        ut: usize,
        cif: Option<usize>,
        flag: bool,
        target: EditTarget,
        sel_chan: bool,
    ) -> Result<(), ObsError> {
        self.require(ObsState::Selected, "edit_integration")?;
        if isub >= self.nsub {
            return Err(ObsError::SubIndex {
                isub,
                nsub: self.nsub,
            });
        }
        if ut >= self.subs[isub].ntime() {
            return Err(ObsError::UtIndex { ut });
        }
        if let Some(c) = cif {
            if c >= self.nif {
                return Err(ObsError::IfIndex {
                    cif: c,
                    nif: self.nif,
                });
            }
        }
        match target {
            EditTarget::Baseline(index) => {
                if index >= self.subs[isub].nbase() {
                    return Err(ObsError::BaseIndex { base: index });
                }
            }
            EditTarget::Antenna(index) => {
                if index >= self.subs[isub].nstat() {
                    return Err(ObsError::TelIndex { itel: index });
                }
            }
            EditTarget::AllBaselines => (),
        }
        self.flag_baseline_weights(cif)?;
        // If the edit refers to the IF that is currently in memory,
        // apply it to the in-memory visibilities at once so the caller
        // sees the result without waiting for a flush.
        if self.state >= ObsState::IfResident && cif.map_or(true, |c| Some(c) == self.stream.cif) {
            let sub = &mut self.subs[isub];
            let baselines = &sub.baselines;
            let integ = &mut sub.integs[ut];
            let op = EditOp {
                cif,
                target,
                sel_chan,
                flag,
            };
            for (base, vis) in integ.vis.iter_mut().enumerate() {
                if op.selects(base, &baselines[base]) {
                    if flag {
                        vis.bad.insert(VisFlags::FLAGGED);
                    } else {
                        vis.bad.remove(VisFlags::FLAGGED);
                    }
                }
            }
        }
        // Force a flush when the buffer bound has been reached.
        if self.edits.is_full() {
            self.flush_edits()?;
        }
        self.subs[isub].integs[ut].edits.push(EditOp {
            cif,
            target,
            sel_chan,
            flag,
        });
        self.edits.added();
        Ok(())
    }

    /// The channel/baseline rectangle that the pending edits of one
    /// integration touch in one IF.
    fn edit_range(&self, isub: usize, islot: usize, cif: usize) -> EditRange {
        let sub = &self.subs[isub];
        let integ = &sub.integs[islot];
        let cl = self.ifs[cif].cl.as_ref();
        let mut er = EditRange::default();
        let mut first = true;
        for ed in &integ.edits {
            if !ed.applies_to_if(cif) || (ed.sel_chan && cl.is_none()) {
                continue;
            }
            let (ba, bb) = match ed.target {
                EditTarget::Baseline(index) => (index, index),
                EditTarget::Antenna(index) => {
                    let mut ba = None;
                    let mut bb = None;
                    for (b, bl) in sub.baselines.iter().enumerate() {
                        if bl.uses_antenna(index) {
                            if ba.is_none() {
                                ba = Some(b);
                            }
                            bb = Some(b);
                        }
                    }
                    match (ba, bb) {
                        (Some(ba), Some(bb)) => (ba, bb),
                        _ => continue,
                    }
                }
                EditTarget::AllBaselines => (0, sub.nbase() - 1),
            };
            let (ca, cb) = match (ed.sel_chan, cl) {
                (true, Some(cl)) => cl.bounds(),
                _ => (0, self.nchan - 1),
            };
            er.nedit += 1;
            if first {
                first = false;
                er.cmin = ca;
                er.cmax = cb;
                er.bmin = ba;
                er.bmax = bb;
            } else {
                er.cmin = er.cmin.min(ca);
                er.cmax = er.cmax.max(cb);
                er.bmin = er.bmin.min(ba);
                er.bmax = er.bmax.max(bb);
            }
        }
        er
    }

    /// Apply all pending edits to the raw and IF stream paging files,
    /// then discard them.
    pub fn flush_edits(&mut self) -> Result<(), ObsError> {
        self.require(ObsState::Allocated, "flush_edits")?;
        if self.edits.is_empty() {
            return Ok(());
        }
        // Edits are tied to a channel-range selection, so flushing
        // without one is an error and the stale edits are discarded.
        if !self.ready(ObsState::Selected) {
            self.discard_edits();
            return Err(ObsError::EditsNeedSelection);
        }
        log::info!("Applying {} buffered edits.", self.edits.len());
        self.flush_edits_to_raw()?;
        self.flush_edits_to_ifstore()?;
        self.discard_edits();
        Ok(())
    }

    /// Apply pending edits to the raw visibility file.
    fn flush_edits_to_raw(&mut self) -> Result<(), ObsError> {
        for irec in 0..self.nrec {
            let IntRec { isub, islot } = self.rec[irec];
            if self.subs[isub].integs[islot].edits.is_empty() {
                continue;
            }
            for cif in 0..self.nif {
                let er = self.edit_range(isub, islot, cif);
                if er.nedit == 0 {
                    continue;
                }
                self.raw.set_if_range(cif, cif)?;
                self.raw.set_pol_range(0, self.npol - 1)?;
                self.raw.set_chan_range(er.cmin, er.cmax)?;
                self.raw.set_base_range(er.bmin, er.bmax)?;
                self.raw.read(irec)?;
                // Flip the weight signs of the selected cells.
                let raw = &mut self.raw;
                let sub = &self.subs[isub];
                let integ = &sub.integs[islot];
                let cl = self.ifs[cif].cl.as_ref();
                for ed in &integ.edits {
                    if !ed.applies_to_if(cif) || (ed.sel_chan && cl.is_none()) {
                        continue;
                    }
                    for (base, bl) in sub.baselines.iter().enumerate() {
                        if !ed.selects(base, bl) {
                            continue;
                        }
                        let full_range = [crate::chan_list::ChanRange {
                            ca: 0,
                            cb: self.nchan - 1,
                        }];
                        let ranges = match (ed.sel_chan, cl) {
                            (true, Some(cl)) => cl.ranges(),
                            _ => &full_range[..],
                        };
                        for range in ranges {
                            for chan in range.ca..=range.cb {
                                let pols = raw.pol_slice_mut(cif, chan, base);
                                for pol in pols {
                                    pol.wt = if ed.flag {
                                        -pol.wt.abs()
                                    } else {
                                        pol.wt.abs()
                                    };
                                }
                            }
                        }
                    }
                }
                self.raw.write(irec)?;
            }
        }
        self.raw.flush()?;
        Ok(())
    }

    /// Apply pending edits to the IF stream file, if one exists.
    fn flush_edits_to_ifstore(&mut self) -> Result<(), ObsError> {
        if self.ifdata.is_none() {
            return Ok(());
        }
        let mut next = 0;
        while let Some(cif) = self.next_if(next, true, 1) {
            next = cif + 1;
            for irec in 0..self.nrec {
                let IntRec { isub, islot } = self.rec[irec];
                if self.subs[isub].integs[islot].edits.is_empty() {
                    continue;
                }
                let er = self.edit_range(isub, islot, cif);
                if er.nedit == 0 {
                    continue;
                }
                let ip = self.ifdata.as_mut().unwrap();
                ip.set_range(cif, er.bmin, er.bmax)?;
                ip.read(irec)?;
                let sub = &self.subs[isub];
                let integ = &sub.integs[islot];
                for ed in &integ.edits {
                    if !ed.applies_to_if(cif) {
                        continue;
                    }
                    for (base, bl) in sub.baselines.iter().enumerate() {
                        if !ed.selects(base, bl) {
                            continue;
                        }
                        let dvis = &mut ip.buffer_mut()[base];
                        dvis.wt = if ed.flag {
                            -dvis.wt.abs()
                        } else {
                            dvis.wt.abs()
                        };
                    }
                }
                ip.write(irec)?;
            }
        }
        if let Some(ip) = self.ifdata.as_mut() {
            ip.flush()?;
        }
        Ok(())
    }

    /// Drop the per-integration edit lists and reset the buffer count.
    fn discard_edits(&mut self) {
        for sub in &mut self.subs {
            for integ in &mut sub.integs {
                integ.edits.clear();
            }
        }
        self.edits.reset();
    }

    /// Apply still-buffered edits to visibilities that have just been
    /// read from the IF stream file. Only the in-memory copies are
    /// touched; flushing is what commits edits to the stores.
    pub(crate) fn apply_pending_edits(&mut self, cif: usize) -> Result<(), ObsError> {
        if self.state != ObsState::RawIfResident {
            return Err(ObsError::State {
                op: "apply_pending_edits",
                state: self.state,
            });
        }
        if cif >= self.nif {
            return Err(ObsError::IfIndex {
                cif,
                nif: self.nif,
            });
        }
        // Nothing to do for an unsampled IF or an empty buffer.
        if self.ifs[cif].cl.is_none() || self.edits.is_empty() {
            return Ok(());
        }
        for sub in &mut self.subs {
            let baselines = &sub.baselines;
            for integ in &mut sub.integs {
                let edits = &integ.edits;
                let vis = &mut integ.vis;
                for ed in edits {
                    if !ed.applies_to_if(cif) {
                        continue;
                    }
                    for (base, v) in vis.iter_mut().enumerate() {
                        if ed.selects(base, &baselines[base]) {
                            if ed.flag {
                                v.bad.insert(VisFlags::FLAGGED);
                            } else {
                                v.bad.remove(VisFlags::FLAGGED);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// A structured baseline-selection specification for time-range
/// editing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaseSpec {
    /// Every baseline of every sub-array.
    All,
    /// Every baseline of one sub-array.
    Subarray(usize),
    /// Every baseline of one antenna of one sub-array.
    Antenna { isub: usize, itel: usize },
    /// One baseline of one sub-array.
    Baseline { isub: usize, ta: usize, tb: usize },
}

impl Observation {
    /// Flag or unflag a selection of baselines over a range of times.
    ///
    /// The time limits are UTC Modified Julian Dates; a limit of 0.0
    /// stands for the corresponding end of the observation. If
    /// `all_scopes` is true all channels of all IFs are edited,
    /// otherwise just the currently selected channels.
    pub fn edit_baselines(
        &mut self,
        flag: bool,
        spec: BaseSpec,
        all_scopes: bool,
        mjd1: f64,
        mjd2: f64,
    ) -> Result<(), ObsError> {
        self.require(ObsState::Selected, "edit_baselines")?;
        log::info!(
            "{} {:?} in {} channels.",
            if flag { "Flagging" } else { "Unflagging" },
            spec,
            if all_scopes {
                "all"
            } else {
                "the currently selected"
            }
        );
        let uta = if mjd1 == 0.0 {
            self.rec_integ(0).ut
        } else {
            (mjd1 - self.date.utc_ref) * crate::DAYSEC
        };
        let utb = if mjd2 == 0.0 {
            self.rec_integ(self.nrec - 1).ut
        } else {
            (mjd2 - self.date.utc_ref) * crate::DAYSEC
        };
        let (sa, sb) = match spec {
            BaseSpec::All => (0, self.nsub - 1),
            BaseSpec::Subarray(isub)
            | BaseSpec::Antenna { isub, .. }
            | BaseSpec::Baseline { isub, .. } => (isub, isub),
        };
        for irec in 0..self.nrec {
            let IntRec { isub, islot } = self.rec[irec];
            let ut = self.subs[isub].integs[islot].ut;
            if !(ut >= uta && ut <= utb && isub >= sa && isub <= sb) {
                continue;
            }
            match spec {
                BaseSpec::All | BaseSpec::Subarray(_) => {
                    for base in 0..self.subs[isub].nbase() {
                        self.edit_integration(
                            isub,
                            islot,
                            None,
                            flag,
                            EditTarget::Baseline(base),
                            !all_scopes,
                        )?;
                    }
                }
                BaseSpec::Antenna { itel, .. } => {
                    self.edit_integration(
                        isub,
                        islot,
                        None,
                        flag,
                        EditTarget::Antenna(itel),
                        !all_scopes,
                    )?;
                }
                BaseSpec::Baseline { ta, tb, .. } => {
                    let base = self.subs[isub]
                        .baseline_index(ta, tb)
                        .ok_or(ObsError::NoSuchBaseline { ta, tb })?;
                    self.edit_integration(
                        isub,
                        islot,
                        None,
                        flag,
                        EditTarget::Baseline(base),
                        !all_scopes,
                    )?;
                }
            }
        }
        Ok(())
    }
}
