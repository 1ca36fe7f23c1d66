// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Application, adjustment and reversal of telescope and baseline
//! calibration corrections.
//!
//! Corrections are recorded per (integration, IF, antenna) and per
//! (baseline, IF) and are applied to visibilities on swap-in, so the
//! scratch files always hold uncorrected data. Mutating a correction
//! also mutates all affected in-memory visibilities synchronously.

use super::{ObsError, ObsState, Observation};
use crate::subarray::VisFlags;

impl Observation {
    /// Apply the recorded telescope corrections of one IF to the
    /// freshly read visibilities in memory.
    pub(crate) fn apply_telcor(&mut self, cif: usize) -> Result<(), ObsError> {
        // Corrections may only be applied to uncorrected visibilities.
        if self.state != ObsState::RawIfResident {
            return Err(ObsError::State {
                op: "apply_telcor",
                state: self.state,
            });
        }
        for sub in &mut self.subs {
            let baselines = &sub.baselines;
            for integ in &mut sub.integs {
                let tcor = &integ.tcor[cif];
                for (base, vis) in integ.vis.iter_mut().enumerate() {
                    let ta_cor = &tcor[baselines[base].ant_a];
                    let tb_cor = &tcor[baselines[base].ant_b];
                    vis.phs += ta_cor.phs_cor - tb_cor.phs_cor;
                    let gcor = ta_cor.amp_cor * tb_cor.amp_cor;
                    if gcor > 0.0 {
                        vis.amp *= gcor;
                        // The weight is a reciprocal variance.
                        vis.wt /= gcor * gcor;
                    }
                    if ta_cor.bad {
                        vis.bad.insert(VisFlags::ANT_A_BAD);
                    }
                    if tb_cor.bad {
                        vis.bad.insert(VisFlags::ANT_B_BAD);
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply the recorded per-baseline corrections of one IF to the
    /// freshly read visibilities in memory.
    pub(crate) fn apply_base_cor(&mut self, cif: usize) -> Result<(), ObsError> {
        if self.state != ObsState::RawIfResident {
            return Err(ObsError::State {
                op: "apply_base_cor",
                state: self.state,
            });
        }
        for sub in &mut self.subs {
            let baselines = &sub.baselines;
            for integ in &mut sub.integs {
                for (base, vis) in integ.vis.iter_mut().enumerate() {
                    let bcor = &baselines[base].bcor[cif];
                    let mut amp_cor = bcor.amp_cor;
                    if amp_cor <= 0.0 {
                        amp_cor = 1.0;
                    }
                    vis.phs += bcor.phs_cor;
                    vis.amp *= amp_cor;
                    vis.wt /= amp_cor * amp_cor;
                }
            }
        }
        Ok(())
    }

    /// Undo recorded telescope amplitude and/or phase corrections
    /// and/or correction flags for all IFs, optionally resetting the
    /// recorded corrections to null values. If an IF is resident its
    /// visibilities are modified accordingly.
    pub fn uncalibrate(&mut self, doamp: bool, dophs: bool, doflag: bool, doreset: bool) {
        if !self.ready(ObsState::Indexed) || !(doamp || dophs || doflag) {
            return;
        }
        if doamp || doflag {
            let _ = self.flag_baseline_weights(None);
        }
        // Remove applied corrections from any resident IF.
        if let Some(cif) = self.current_if() {
            for sub in &mut self.subs {
                let baselines = &sub.baselines;
                for integ in &mut sub.integs {
                    let tcor = &integ.tcor[cif];
                    for (base, vis) in integ.vis.iter_mut().enumerate() {
                        let ta_cor = &tcor[baselines[base].ant_a];
                        let tb_cor = &tcor[baselines[base].ant_b];
                        if dophs {
                            vis.phs -= ta_cor.phs_cor - tb_cor.phs_cor;
                        }
                        if doamp {
                            let gcor = ta_cor.amp_cor * tb_cor.amp_cor;
                            if gcor > 0.0 {
                                vis.amp /= gcor;
                                vis.wt *= gcor * gcor;
                            }
                        }
                        if doflag {
                            vis.bad.remove(VisFlags::ANT_A_BAD | VisFlags::ANT_B_BAD);
                        }
                    }
                }
            }
        }
        // Reset the recorded corrections themselves.
        if doreset {
            for sub in &mut self.subs {
                for integ in &mut sub.integs {
                    for tcor in &mut integ.tcor {
                        for cor in tcor.iter_mut() {
                            if dophs {
                                cor.phs_cor = 0.0;
                            }
                            if doamp {
                                cor.amp_cor = 1.0;
                            }
                            if doflag {
                                cor.bad = false;
                            }
                        }
                    }
                }
            }
        }
    }

    fn check_telcor_target(
        &self,
        isub: usize,
        cif: usize,
        ut: usize,
        itel: usize,
    ) -> Result<(), ObsError> {
        if isub >= self.nsub {
            return Err(ObsError::SubIndex {
                isub,
                nsub: self.nsub,
            });
        }
        if cif >= self.nif {
            return Err(ObsError::IfIndex {
                cif,
                nif: self.nif,
            });
        }
        if ut >= self.subs[isub].ntime() {
            return Err(ObsError::UtIndex { ut });
        }
        if itel >= self.subs[isub].nstat() {
            return Err(ObsError::TelIndex { itel });
        }
        Ok(())
    }

    /// Flag or unflag a telescope correction and propagate the flags
    /// to all affected in-memory visibilities.
    pub fn edit_telcor(
        &mut self,
        isub: usize,
        cif: usize,
        ut: usize,
        itel: usize,
        doflag: bool,
    ) -> Result<(), ObsError> {
        self.check_telcor_target(isub, cif, ut, itel)?;
        self.subs[isub].integs[ut].tcor[cif][itel].bad = doflag;
        self.flag_baseline_weights(Some(cif))?;
        if self.current_if() == Some(cif) {
            let sub = &mut self.subs[isub];
            let baselines = &sub.baselines;
            let integ = &mut sub.integs[ut];
            for (base, vis) in integ.vis.iter_mut().enumerate() {
                let bl = &baselines[base];
                if bl.ant_a == itel {
                    if doflag {
                        vis.bad.insert(VisFlags::ANT_A_BAD);
                    } else {
                        vis.bad.remove(VisFlags::ANT_A_BAD);
                    }
                } else if bl.ant_b == itel {
                    if doflag {
                        vis.bad.insert(VisFlags::ANT_B_BAD);
                    } else {
                        vis.bad.remove(VisFlags::ANT_B_BAD);
                    }
                }
            }
        }
        Ok(())
    }

    /// Adjust a telescope correction by an amplitude factor and a
    /// phase offset, propagating the change to all affected in-memory
    /// visibilities.
    pub fn adjust_telcor(
        &mut self,
        isub: usize,
        cif: usize,
        ut: usize,
        itel: usize,
        amp_cor: f32,
        phs_cor: f32,
    ) -> Result<(), ObsError> {
        self.check_telcor_target(isub, cif, ut, itel)?;
        // Zero and negative amplitude corrections are meaningless.
        let amp_cor = if amp_cor <= 0.0 { 1.0 } else { amp_cor };
        {
            let tcor = &mut self.subs[isub].integs[ut].tcor[cif][itel];
            tcor.amp_cor *= amp_cor;
            tcor.phs_cor += phs_cor;
        }
        self.flag_baseline_weights(Some(cif))?;
        if self.current_if() == Some(cif) {
            let sub = &mut self.subs[isub];
            let baselines = &sub.baselines;
            let integ = &mut sub.integs[ut];
            for (base, vis) in integ.vis.iter_mut().enumerate() {
                let bl = &baselines[base];
                if bl.ant_a == itel {
                    vis.phs += phs_cor;
                    vis.amp *= amp_cor;
                    vis.wt /= amp_cor * amp_cor;
                } else if bl.ant_b == itel {
                    vis.phs -= phs_cor;
                    vis.amp *= amp_cor;
                    vis.wt /= amp_cor * amp_cor;
                }
            }
        }
        Ok(())
    }

    /// Clear the recorded correction of a telescope, removing its
    /// effect from all affected in-memory visibilities.
    pub fn clear_telcor(
        &mut self,
        isub: usize,
        cif: usize,
        ut: usize,
        itel: usize,
    ) -> Result<(), ObsError> {
        self.check_telcor_target(isub, cif, ut, itel)?;
        let (amp_cor, phs_cor) = {
            let tcor = &mut self.subs[isub].integs[ut].tcor[cif][itel];
            let amp = if tcor.amp_cor <= 0.0 {
                1.0
            } else {
                tcor.amp_cor
            };
            let phs = tcor.phs_cor;
            tcor.amp_cor = 1.0;
            tcor.phs_cor = 0.0;
            (amp, phs)
        };
        self.flag_baseline_weights(Some(cif))?;
        if self.current_if() == Some(cif) {
            let sub = &mut self.subs[isub];
            let baselines = &sub.baselines;
            let integ = &mut sub.integs[ut];
            for (base, vis) in integ.vis.iter_mut().enumerate() {
                let bl = &baselines[base];
                if bl.ant_a == itel {
                    vis.phs -= phs_cor;
                    vis.amp /= amp_cor;
                    vis.wt *= amp_cor * amp_cor;
                } else if bl.ant_b == itel {
                    vis.phs += phs_cor;
                    vis.amp /= amp_cor;
                    vis.wt *= amp_cor * amp_cor;
                }
            }
        }
        Ok(())
    }

    /// Install a per-baseline correction, propagating the incremental
    /// change to the resident IF's in-memory visibilities.
    pub fn set_base_cor(
        &mut self,
        isub: usize,
        base: usize,
        cif: usize,
        amp_cor: f32,
        phs_cor: f32,
    ) -> Result<(), ObsError> {
        if isub >= self.nsub {
            return Err(ObsError::SubIndex {
                isub,
                nsub: self.nsub,
            });
        }
        if cif >= self.nif {
            return Err(ObsError::IfIndex {
                cif,
                nif: self.nif,
            });
        }
        if base >= self.subs[isub].nbase() {
            return Err(ObsError::BaseIndex { base });
        }
        let amp_cor = if amp_cor <= 0.0 { 1.0 } else { amp_cor };
        let (old_amp, old_phs) = {
            let bcor = &mut self.subs[isub].baselines[base].bcor[cif];
            let old = (bcor.amp_cor, bcor.phs_cor);
            bcor.amp_cor = amp_cor;
            bcor.phs_cor = phs_cor;
            old
        };
        self.flag_baseline_weights(Some(cif))?;
        if self.current_if() == Some(cif) {
            let old_amp = if old_amp <= 0.0 { 1.0 } else { old_amp };
            let damp = amp_cor / old_amp;
            let dphs = phs_cor - old_phs;
            for integ in &mut self.subs[isub].integs {
                let vis = &mut integ.vis[base];
                vis.phs += dphs;
                vis.amp *= damp;
                vis.wt /= damp * damp;
            }
        }
        Ok(())
    }

    /// Reset every per-baseline correction to unity.
    pub fn clear_base_cors(&mut self) {
        for sub in &mut self.subs {
            for bl in &mut sub.baselines {
                for bcor in &mut bl.bcor {
                    *bcor = Default::default();
                }
            }
        }
    }

    /// Apply the recorded telescope and baseline corrections to the
    /// raw-store integration buffer in place.
    ///
    /// The region corrected is the intersection of the current window
    /// with the baselines of the buffered integration's sub-array.
    /// Used when averaging, so that recorded corrections freeze into
    /// the averaged data.
    pub(crate) fn raw_store_calibrate(&mut self) -> Result<(), ObsError> {
        self.require(ObsState::Indexed, "raw_store_calibrate")?;
        let ut = match self.raw.buffer_ut() {
            Some(ut) => ut,
            None => return Err(ObsError::UtIndex { ut: usize::MAX }),
        };
        let (isub, islot) = self.rec_slot(ut);
        let raw = &mut self.raw;
        let sub = &self.subs[isub];
        let integ = &sub.integs[islot];
        let (ba, mut bb) = raw.base_range();
        // The buffer is dimensioned for the largest sub-array;
        // restrict to the baselines this sub-array has.
        bb = bb.min(sub.nbase() - 1);
        if ba > bb {
            return Ok(());
        }
        let (ia, ib) = raw.if_range();
        let (ca, cb) = raw.chan_range();
        let (sa, sb) = raw.pol_range();
        for cif in ia..=ib {
            let tcor = &integ.tcor[cif];
            for base in ba..=bb {
                let bl = &sub.baselines[base];
                let bcor = &bl.bcor[cif];
                // Combine the telescope and baseline contributions to
                // the correction of this baseline.
                let mut amp_cor = tcor[bl.ant_a].amp_cor * tcor[bl.ant_b].amp_cor * bcor.amp_cor;
                let phs_cor = tcor[bl.ant_a].phs_cor - tcor[bl.ant_b].phs_cor + bcor.phs_cor;
                let (sinphi, cosphi) = phs_cor.sin_cos();
                let bad_cor = tcor[bl.ant_a].bad || tcor[bl.ant_b].bad;
                if amp_cor <= 0.0 {
                    amp_cor = 1.0;
                }
                for chan in ca..=cb {
                    let pols = raw.pol_slice_mut(cif, chan, base);
                    for cvis in pols[sa..=sb].iter_mut() {
                        let re = cvis.re;
                        let im = cvis.im;
                        let wt = cvis.wt;
                        // (re + i im) * amp_cor * exp(i phs_cor).
                        cvis.re = amp_cor * (re * cosphi - im * sinphi);
                        cvis.im = amp_cor * (re * sinphi + im * cosphi);
                        cvis.wt = if bad_cor && wt > 0.0 { -wt } else { wt } / (amp_cor * amp_cor);
                    }
                }
            }
        }
        Ok(())
    }
}
