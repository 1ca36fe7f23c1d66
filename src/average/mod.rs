// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Coherent time averaging.

Averaging bins every sub-array's integrations onto a regular time grid
and replaces the raw store with one holding a single averaged
integration per bin. Recorded calibrations are applied while reading,
so they freeze into the averaged data; afterwards the data model is
shrunk to the new integration counts and the previous stream selection
is re-established.
*/

use crate::observation::{ObsError, ObsState, Observation};
use crate::raw_store::{CmplxVis, RawStore};
use crate::subarray::Subarray;

#[cfg(test)]
mod test;

/// The smallest variance a scatter-derived weight may be formed from.
const MIN_VARIANCE: f32 = 1.0e-16;

/// One pending averaging bin of one sub-array.
#[derive(Clone, Copy, Debug)]
struct SolBin {
    isub: usize,
    /// The first contributing integration slot.
    start: usize,
    /// The number of contributing integrations.
    ntime: usize,
    /// The bin-center time stamp, which the output integration takes.
    mid: f64,
    /// The output integration slot within the sub-array.
    out_slot: usize,
}

/// Assign every integration of every sub-array to a bin of the regular
/// `avtime` grid anchored at `origin`, and order the bins by center
/// time. A sample landing exactly on a bin boundary opens the next
/// bin.
fn plan_bins(subs: &[Subarray], origin: f64, avtime: f64) -> Vec<SolBin> {
    let mut bins: Vec<SolBin> = Vec::new();
    for (isub, sub) in subs.iter().enumerate() {
        let mut slot = 0;
        let mut out_slot = 0;
        while slot < sub.ntime() {
            let ut = sub.integs[slot].ut;
            let ibin = ((ut - origin) / avtime).floor();
            let end = origin + (ibin + 1.0) * avtime;
            let mid = origin + (ibin + 0.5) * avtime;
            let start = slot;
            while slot < sub.ntime() && sub.integs[slot].ut < end {
                slot += 1;
            }
            bins.push(SolBin {
                isub,
                start,
                ntime: slot - start,
                mid,
                out_slot,
            });
            out_slot += 1;
        }
    }
    bins.sort_by(|a, b| a.mid.partial_cmp(&b.mid).unwrap());
    bins
}

#[derive(Clone, Copy, Default)]
struct ScatSum {
    /// The number of points in the sum.
    n: u32,
    /// Running mean of re^2 + im^2.
    sqr_mean: f32,
}

/// The running state of one averaging bin.
///
/// Running weighted means preserve precision over long bins. Flagged
/// samples seed a mean only until the first unflagged sample arrives,
/// at which point the mean restarts from that sample; thereafter
/// flagged samples are ignored.
struct VisAverager {
    nvis: usize,
    nbase: usize,
    scat: Option<Vec<ScatSum>>,
    /// Per-baseline signed weight sums of the u,v,w means.
    bwt: Vec<f32>,
    u: Vec<f32>,
    v: Vec<f32>,
    w: Vec<f32>,
    dt: Vec<f32>,
}

impl VisAverager {
    fn new(nvis: usize, nbmax: usize, scatter: bool) -> VisAverager {
        VisAverager {
            nvis,
            nbase: nbmax,
            scat: scatter.then(|| vec![ScatSum::default(); nvis]),
            bwt: vec![0.0; nbmax],
            u: vec![0.0; nbmax],
            v: vec![0.0; nbmax],
            w: vec![0.0; nbmax],
            dt: vec![0.0; nbmax],
        }
    }

    /// Reset the sums for a new bin of `nbase` baselines.
    fn start_bin(&mut self, nbase: usize) {
        self.nbase = nbase;
        if let Some(scat) = self.scat.as_mut() {
            scat.fill(ScatSum::default());
        }
        self.bwt.fill(0.0);
        self.u.fill(0.0);
        self.v.fill(0.0);
        self.w.fill(0.0);
        self.dt.fill(0.0);
    }

    /// Fold one input visibility into the running mean held in
    /// `out[ivis]`.
    fn acc_data(&mut self, out: &mut [CmplxVis], ivis: usize, re: f32, im: f32, wt: f32) {
        // Deleted samples contribute nothing.
        if wt == 0.0 {
            return;
        }
        let cvis = &mut out[ivis];
        if cvis.wt == 0.0 || (cvis.wt < 0.0 && wt > 0.0) {
            // Seed the mean: either this is the first sample, or the
            // first unflagged sample has arrived to supplant a mean
            // seeded from flagged ones.
            cvis.wt = wt;
            cvis.re = re;
            cvis.im = im;
            if let Some(scat) = self.scat.as_mut() {
                scat[ivis].sqr_mean = re * re + im * im;
                scat[ivis].n = 1;
            }
        } else if wt > 0.0 || cvis.wt < 0.0 {
            cvis.wt += wt;
            let runwt = wt / cvis.wt;
            cvis.re += runwt * (re - cvis.re);
            cvis.im += runwt * (im - cvis.im);
            if let Some(scat) = self.scat.as_mut() {
                let s = &mut scat[ivis];
                s.sqr_mean += runwt * (re * re + im * im - s.sqr_mean);
                s.n += 1;
            }
        }
    }

    /// Fold one input sample into the running mean u,v,w of its
    /// baseline and accumulate its integration time.
    fn acc_uvw(&mut self, base: usize, u: f32, v: f32, w: f32, wt: f32, dt: f32) {
        if wt == 0.0 {
            return;
        }
        if self.bwt[base] == 0.0 || (self.bwt[base] < 0.0 && wt > 0.0) {
            self.bwt[base] = wt;
            self.u[base] = u;
            self.v[base] = v;
            self.w[base] = w;
            self.dt[base] = dt;
        } else if wt > 0.0 || self.bwt[base] < 0.0 {
            self.bwt[base] += wt;
            let runwt = wt / self.bwt[base];
            self.u[base] += runwt * (u - self.u[base]);
            self.v[base] += runwt * (v - self.v[base]);
            self.w[base] += runwt * (w - self.w[base]);
            self.dt[base] += dt;
        }
    }

    /// Finish the bin held in `out`: replace weights with
    /// scatter-derived ones where requested, and flag zero-amplitude
    /// vector means.
    fn end_bin(&mut self, out: &mut [CmplxVis]) {
        // Clear the u,v,w means of baselines with no samples.
        for base in 0..self.nbase {
            if self.bwt[base] == 0.0 {
                self.u[base] = 0.0;
                self.v[base] = 0.0;
                self.w[base] = 0.0;
            }
        }
        if let Some(scat) = self.scat.as_ref() {
            for (cvis, s) in out[..self.nvis].iter_mut().zip(scat) {
                if cvis.wt == 0.0 {
                    continue;
                }
                let new_wt = if s.n < 2 {
                    // Too few points for a scatter estimate: keep the
                    // input weight but flag the point.
                    -cvis.wt.abs()
                } else {
                    let n = s.n as f32;
                    let variance =
                        0.5 * (s.sqr_mean - cvis.im * cvis.im - cvis.re * cvis.re) / (n - 1.0);
                    1.0 / variance.max(MIN_VARIANCE)
                };
                // Don't let a new weight unflag a flagged visibility.
                cvis.wt = if cvis.wt > 0.0 {
                    new_wt
                } else {
                    -new_wt.abs()
                };
            }
        }
        // Vector averaging can produce exactly zero amplitude from
        // good samples; such visibilities become deleted.
        for cvis in out[..self.nvis].iter_mut() {
            if cvis.wt != 0.0 && cvis.re == 0.0 && cvis.im == 0.0 {
                cvis.wt = 0.0;
            }
        }
    }
}

impl Observation {
    /// Coherently average the whole data set onto a regular time grid
    /// of `avtime` seconds.
    ///
    /// With `scatter`, output weights are derived from the sample
    /// scatter within each bin instead of summing input weights, and
    /// the recorded weight scale resets to 1. Calibration and baseline
    /// corrections freeze into the averaged data and are cleared. The
    /// previous stream selection, if any, is re-established afterwards
    /// with its model kept.
    pub fn average(&mut self, avtime: f64, scatter: bool) -> Result<(), ObsError> {
        self.require(ObsState::Indexed, "average")?;
        if avtime < 1.0 {
            return Err(ObsError::BadBinWidth);
        }
        let was_select = self.ready(ObsState::Selected);
        self.flush_edits()?;
        log::info!("Averaging into {} second bins.", avtime);
        // Bin centers sit on a regular grid anchored at the start of
        // the observation.
        let bins = plan_bins(&self.subs, self.date.ut, avtime);
        let new_nrec = bins.len();
        let mut out = RawStore::create(
            &self.scratch_dir,
            new_nrec,
            self.nbmax,
            self.nchan,
            self.nif,
            self.npol,
        )?;
        let mut aver = VisAverager::new(self.raw.nvis(), self.nbmax, scatter);
        self.raw.set_full_window()?;
        for (out_rec, bin) in bins.iter().enumerate() {
            let nbase = self.subs[bin.isub].nbase();
            aver.start_bin(nbase);
            out.clear(Some(out_rec));
            for k in 0..bin.ntime {
                let islot = bin.start + k;
                let in_rec = self.subs[bin.isub].integs[islot].irec;
                self.raw.read(in_rec)?;
                // Apply recorded corrections while the data passes
                // through.
                self.raw_store_calibrate()?;
                let integ = &self.subs[bin.isub].integs[islot];
                for cif in 0..self.nif {
                    for chan in 0..self.nchan {
                        for base in 0..nbase {
                            let vis = integ.vis[base];
                            let ivis0 = self.raw.vis_index(cif, chan, base, 0);
                            for pol in 0..self.npol {
                                let cv = self.raw.buffer()[ivis0 + pol];
                                aver.acc_data(out.buffer_mut(), ivis0 + pol, cv.re, cv.im, cv.wt);
                                aver.acc_uvw(base, vis.u, vis.v, vis.w, cv.wt, vis.dt);
                            }
                        }
                    }
                }
            }
            aver.end_bin(out.buffer_mut());
            out.write(out_rec)?;
            // The output integration adopts the bin center time and
            // the averaged baseline geometry.
            let integ = &mut self.subs[bin.isub].integs[bin.out_slot];
            integ.ut = bin.mid;
            integ.irec = out_rec;
            for base in 0..nbase {
                integ.vis[base].u = aver.u[base];
                integ.vis[base].v = aver.v[base];
                integ.vis[base].w = aver.w[base];
                integ.vis[base].dt = aver.dt[base];
            }
        }
        out.flush()?;
        // Corrections are now frozen into the averaged data.
        self.uncalibrate(true, true, true, true);
        self.clear_base_cors();
        if scatter {
            // The weights came from the data scatter, so any previous
            // scale no longer applies.
            self.geom.wtscale = 1.0;
        }
        // Replace the raw store and shrink the data model.
        self.raw = out;
        let mut per_sub = vec![0usize; self.nsub];
        for bin in &bins {
            per_sub[bin.isub] = per_sub[bin.isub].max(bin.out_slot + 1);
        }
        for (sub, &nbin) in self.subs.iter_mut().zip(&per_sub) {
            sub.integs.truncate(nbin);
        }
        self.nrec = new_nrec;
        self.rec = Vec::new();
        if self.nif > 1 {
            self.ifdata = Some(crate::if_store::IfStore::create(
                &self.scratch_dir,
                self.nif,
                self.nbmax,
                new_nrec,
            )?);
            self.uvmodel = Some(crate::model_store::ModelStore::create(
                &self.scratch_dir,
                new_nrec,
                self.nbmax,
                self.nif,
            )?);
        }
        self.date.cav_time = avtime;
        self.state = ObsState::DataLoaded;
        self.build_index()?;
        // Re-establish the stream that was selected before averaging.
        if was_select {
            let cl = self.stream.cl.clone();
            let pol = self.stream.pol.as_ref().map(|p| p.stokes);
            self.select(true, cl, pol)?;
        }
        Ok(())
    }
}
