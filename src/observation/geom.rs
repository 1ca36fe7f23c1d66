// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Geometric transformations of the UV data.
//!
//! Shifts, rotations and weight scaling are recorded in the
//! observation and applied to whichever IF is in memory; the scratch
//! files are never mutated by geometry. The recorded transformations
//! are re-applied every time an IF is swapped in.

use super::{ObsError, ObsState, Observation};
use crate::subarray::VisFlags;

impl Observation {
    /// Rotate the phases of the resident visibilities (data and model)
    /// by the phase-center shift (east, north), using the UVW scale of
    /// the resident IF.
    pub(crate) fn rotate_memory_phases(&mut self, east: f32, north: f32) {
        let uvscale = self.stream.uvscale;
        let twopi = std::f32::consts::TAU;
        for sub in &mut self.subs {
            for integ in &mut sub.integs {
                for vis in &mut integ.vis {
                    let phi = twopi * (east * vis.u + north * vis.v) * uvscale;
                    vis.phs += phi;
                    vis.modphs += phi;
                }
            }
        }
    }

    /// Shift the phase center of the observation eastward and
    /// northward (radians).
    ///
    /// The shift is added to the recorded totals; the phases of any
    /// resident visibilities are rotated by `2 pi (de u + dn v)` with
    /// (u, v) in wavelengths; model component positions move with the
    /// data, and the stored UV model of every IF is rotated to match.
    pub fn shift(&mut self, east: f32, north: f32) -> Result<(), ObsError> {
        self.require(ObsState::Indexed, "shift")?;
        self.geom.east += east;
        self.geom.north += north;
        // Move the model components with the data.
        self.model.shift_positions(east, north);
        self.newmod.shift_positions(east, north);
        self.cmodel.shift_positions(east, north);
        self.cnewmod.shift_positions(east, north);
        if self.ready(ObsState::RawIfResident) {
            self.rotate_memory_phases(east, north);
        }
        // Keep the stored UV model phases consistent with the shifted
        // component positions.
        if self.has_model {
            self.shift_model_store(east, north)?;
        }
        Ok(())
    }

    /// Undo the recorded phase-center shift entirely, returning the
    /// recorded totals to zero. The output writer brackets
    /// "unshifted" exports with this and a following re-shift.
    pub fn unshift(&mut self) -> Result<(), ObsError> {
        let east = self.geom.east;
        let north = self.geom.north;
        self.shift(-east, -north)
    }

    /// Rotate the phases of the stored UV model of every sampled IF to
    /// track a phase-center shift.
    fn shift_model_store(&mut self, east: f32, north: f32) -> Result<(), ObsError> {
        if self.uvmodel.is_none() {
            return Ok(());
        }
        let twopi = std::f32::consts::TAU;
        let mut next = 0;
        while let Some(cif) = self.next_if(next, true, 1) {
            next = cif + 1;
            let uvscale = self.uv_scale(cif)?;
            for irec in 0..self.nrec {
                let (isub, islot) = self.rec_slot(irec);
                let uvp = self.uvmodel.as_mut().unwrap();
                uvp.read(irec, cif)?;
                let integ = &self.subs[isub].integs[islot];
                let nbase = self.subs[isub].nbase();
                let uvp = self.uvmodel.as_mut().unwrap();
                for base in 0..nbase {
                    let vis = &integ.vis[base];
                    let phi = twopi * (east * vis.u + north * vis.v) * uvscale;
                    uvp.buffer_mut()[base].phs += phi;
                }
                uvp.write(irec, cif)?;
            }
        }
        Ok(())
    }

    /// Rotate the UVW coordinates of the observation clockwise by
    /// `angle` radians. The rotation is recorded, and any resident
    /// visibilities are rotated immediately.
    pub fn rotate(&mut self, angle: f32) -> Result<(), ObsError> {
        self.require(ObsState::Indexed, "rotate")?;
        self.geom.uvangle += angle;
        if self.ready(ObsState::RawIfResident) {
            let (sin_ang, cos_ang) = angle.sin_cos();
            for sub in &mut self.subs {
                for integ in &mut sub.integs {
                    for vis in &mut integ.vis {
                        let u = vis.u;
                        let v = vis.v;
                        vis.u = u * cos_ang + v * sin_ang;
                        vis.v = v * cos_ang - u * sin_ang;
                    }
                }
            }
        }
        Ok(())
    }

    /// Change the weight scale factor applied to the stream.
    ///
    /// The factor is absolute: the resident weights and per-baseline
    /// weight sums are multiplied by `scale / previous_scale`, and the
    /// scale is re-applied on every swap.
    pub fn scale_weights(&mut self, scale: f32) -> Result<(), ObsError> {
        self.require(ObsState::Indexed, "scale_weights")?;
        if !(scale > 0.0) || !scale.is_finite() {
            return Err(ObsError::BadWeightScale);
        }
        let mult = scale / self.geom.wtscale;
        self.geom.wtscale *= mult;
        for sub in &mut self.subs {
            for integ in &mut sub.integs {
                for vis in &mut integ.vis {
                    if !vis.bad.intersects(VisFlags::DELETED) {
                        vis.wt *= mult;
                    }
                }
            }
        }
        for sub in &mut self.subs {
            for bl in &mut sub.baselines {
                for wtsum in &mut bl.wtsum {
                    *wtsum *= mult;
                }
            }
        }
        Ok(())
    }

    /// Apply the recorded phase-center shift to the whole raw-store
    /// integration buffer in place.
    ///
    /// The phase shift advances by a fixed amount per frequency
    /// channel for a given (u, v), so the per-channel sines and
    /// cosines follow from one evaluation per baseline and IF by the
    /// angle-sum recurrence.
    pub fn raw_store_shift(&mut self) -> Result<(), ObsError> {
        self.require(ObsState::Indexed, "raw_store_shift")?;
        if self.geom.east == 0.0 && self.geom.north == 0.0 {
            return Ok(());
        }
        let ut = match self.raw.buffer_ut() {
            Some(ut) => ut,
            None => return Err(ObsError::UtIndex { ut: usize::MAX }),
        };
        let (isub, islot) = self.rec_slot(ut);
        let raw = &mut self.raw;
        let sub = &self.subs[isub];
        let integ = &sub.integs[islot];
        let (ba, mut bb) = raw.base_range();
        bb = bb.min(sub.nbase() - 1);
        if ba > bb {
            return Ok(());
        }
        let (ia, ib) = raw.if_range();
        let (ca, cb) = raw.chan_range();
        let (sa, sb) = raw.pol_range();
        let twopi = std::f64::consts::TAU;
        for cif in ia..=ib {
            let ifp = &self.ifs[cif];
            let freq = ifp.freq + ca as f64 * ifp.df;
            let df = ifp.df;
            for base in ba..=bb {
                let vis = &integ.vis[base];
                let shift = twopi
                    * (self.geom.east as f64 * vis.u as f64
                        + self.geom.north as f64 * vis.v as f64);
                let (mut sinphs, mut cosphs) = (freq * shift).sin_cos();
                let (sininc, cosinc) = (df * shift).sin_cos();
                for chan in ca..=cb {
                    let pols = raw.pol_slice_mut(cif, chan, base);
                    for cvis in pols[sa..=sb].iter_mut() {
                        if cvis.wt != 0.0 {
                            let re = cvis.re as f64;
                            let im = cvis.im as f64;
                            cvis.re = (re * cosphs - im * sinphs) as f32;
                            cvis.im = (re * sinphs + im * cosphs) as f32;
                        }
                    }
                    // Advance to the phase of the next channel.
                    let cphs = cosphs * cosinc - sinphs * sininc;
                    let sphs = cosphs * sininc + sinphs * cosinc;
                    cosphs = cphs;
                    sinphs = sphs;
                }
            }
        }
        Ok(())
    }
}
