// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Stream selection: composing the IF stream file from the raw store.

use super::{ObsError, ObsState, Observation};
use crate::chan_list::ChanList;
use crate::polarization::{PolSelector, Stokes};
use crate::raw_store::CmplxVis;
use crate::subarray::VisFlags;
use crate::time_index::IntRec;

impl Observation {
    /// Resolve a polarization request against the recorded
    /// polarizations. A request of None means: the current stream's
    /// polarization if any, else I, else the first recorded
    /// polarization.
    pub fn resolve_pol(&self, want: Option<Stokes>) -> Result<PolSelector, ObsError> {
        match want {
            Some(stokes) => Ok(PolSelector::resolve(&self.pols, stokes)?),
            None => {
                if let Some(pol) = &self.stream.pol {
                    if self.ready(ObsState::Selected) {
                        return Ok(PolSelector::resolve(&self.pols, pol.stokes)?);
                    }
                }
                PolSelector::resolve(&self.pols, Stokes::I)
                    .or_else(|_| PolSelector::resolve(&self.pols, self.pols[0]))
                    .map_err(ObsError::from)
            }
        }
    }

    /// Validate and install a new channel/polarization selection.
    /// On success the state drops to Indexed, to record that the new
    /// selection has not been composed yet. On failure nothing is
    /// changed.
    fn install_selection(
        &mut self,
        cl: Option<ChanList>,
        pol: Option<Stokes>,
    ) -> Result<(), ObsError> {
        self.require(ObsState::Indexed, "install_selection")?;
        // Find out how to obtain the requested polarization, falling
        // back to the default when a literal request is unavailable.
        let obpol = match self.resolve_pol(pol) {
            Ok(obpol) => obpol,
            Err(e) => {
                if pol.is_some() {
                    log::warn!("{}; substituting the default polarization.", e);
                    self.resolve_pol(None)?
                } else {
                    return Err(e);
                }
            }
        };
        // Install a new channel list when one was given, or when none
        // has ever been installed.
        if self.stream.cl.is_none() || cl.is_some() {
            // With no explicit request, default to every channel.
            let mut cl = cl.unwrap_or_else(|| {
                let mut def = ChanList::new();
                def.add(0, self.nctotal - 1);
                def
            });
            // Clip to the recorded channels; an empty result leaves
            // the observation as it was on entry.
            if cl.truncate(self.nctotal) < 1 {
                return Err(ObsError::NoChannels);
            }
            // Split the global channel list into per-IF lists before
            // touching the current selection.
            let if_cls: Vec<Option<ChanList>> = self
                .ifs
                .iter()
                .map(|ifp| {
                    let sub = cl.subset(ifp.coff, self.nchan);
                    (!sub.is_empty()).then_some(sub)
                })
                .collect();
            self.state = ObsState::Indexed;
            self.stream.cl = Some(cl);
            for (ifp, if_cl) in self.ifs.iter_mut().zip(if_cls) {
                ifp.cl = if_cl;
            }
        } else {
            self.state = ObsState::Indexed;
        }
        self.stream.pol = Some(obpol);
        Ok(())
    }

    /// Select a new processing stream and compose it into the IF
    /// stream file.
    ///
    /// Passing None for `cl` keeps the current channel selection (or
    /// defaults to all channels); passing None for `pol` keeps the
    /// current polarization (or defaults to I, then to the first
    /// recorded polarization). With `keep_model` false, the model of
    /// the outgoing selection is parked in the model table and any
    /// model previously parked for the incoming selection is restored;
    /// with it true the current model follows the new selection.
    pub fn select(
        &mut self,
        keep_model: bool,
        cl: Option<ChanList>,
        pol: Option<Stokes>,
    ) -> Result<(), ObsError> {
        self.require(ObsState::Indexed, "select")?;
        // Pending edits refer to the outgoing selection.
        self.flush_edits()?;
        // Preserve the established model components in the tentative
        // model; their UV representation dies with the old selection.
        self.merge_model(false)?;
        if !keep_model && self.ready(ObsState::Selected) {
            self.record_select_model()?;
        }
        self.install_selection(cl, pol)?;
        self.flag_baseline_weights(None)?;
        if !keep_model {
            self.install_select_model()?;
        }
        {
            let stream = &self.stream;
            log::info!(
                "Selecting polarization: {}, channels: {}",
                stream.pol.as_ref().unwrap().stokes,
                stream.cl.as_ref().unwrap()
            );
        }
        // Compose the stream IF by IF.
        for cif in 0..self.nif {
            self.compose_if(cif)?;
        }
        if let Some(ip) = self.ifdata.as_mut() {
            ip.flush()?;
        }
        self.stream.cif = None;
        self.state = ObsState::Selected;
        // A single IF is already resident; run the correction pipeline
        // on it directly.
        if self.nif == 1 {
            if let Err(e) = self.init_if(0) {
                self.state = ObsState::Selected;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Compose one IF of the stream: combine the selected channels and
    /// polarization of every integration into one visibility per
    /// baseline, in memory and in the IF stream file.
    fn compose_if(&mut self, cif: usize) -> Result<(), ObsError> {
        let Some(if_cl) = self.ifs[cif].cl.clone() else {
            // No channels of this IF are sampled: zero-fill its
            // records.
            log::info!("Reading IF {} channels: (none)", cif + 1);
            if let Some(ip) = self.ifdata.as_mut() {
                ip.set_range(cif, 0, self.nbmax - 1)?;
                ip.clear();
                for irec in 0..self.nrec {
                    ip.write(irec)?;
                }
            }
            return Ok(());
        };
        log::info!(
            "Reading IF {} channels: {}",
            cif + 1,
            if_cl
                .ranges()
                .iter()
                .map(|r| format!(
                    "{}..{}",
                    self.ifs[cif].coff + r.ca + 1,
                    self.ifs[cif].coff + r.cb + 1
                ))
                .collect::<Vec<_>>()
                .join(" ")
        );
        let (ca, cb) = if_cl.bounds();
        self.raw.set_chan_range(ca, cb)?;
        self.raw.set_pol_range(0, self.npol - 1)?;
        self.raw.set_base_range(0, self.nbmax - 1)?;
        self.raw.set_if_range(cif, cif)?;
        let obpol = *self.stream.pol.as_ref().unwrap();
        // Pass 1: read the raw store an integration at a time and
        // combine the selected channels into the in-memory
        // visibilities.
        for irec in 0..self.nrec {
            self.raw.read(irec)?;
            let IntRec { isub, islot } = self.rec[irec];
            let raw = &self.raw;
            let sub = &mut self.subs[isub];
            let nbase = sub.baselines.len();
            let integ = &mut sub.integs[islot];
            for base in 0..nbase {
                let mut deleted = false;
                let mut flagged = false;
                let mut npts = 0u32;
                let mut sum = CmplxVis::default();
                'chans: for range in if_cl.ranges() {
                    for chan in range.ca..=range.cb {
                        let cur = obpol.get(raw.pol_slice(cif, chan, base));
                        if cur.wt == 0.0 {
                            deleted = true;
                            break 'chans;
                        }
                        if cur.wt < 0.0 {
                            flagged = true;
                        }
                        npts += 1;
                        sum.re += cur.re;
                        sum.im += cur.im;
                        // Accumulate the variance sum.
                        sum.wt += 1.0 / cur.wt.abs();
                    }
                }
                // Convert the sum into a mean.
                if deleted || sum.wt == 0.0 || npts == 0 {
                    sum = CmplxVis::default();
                } else {
                    sum.re /= npts as f32;
                    sum.im /= npts as f32;
                    sum.wt = (npts * npts) as f32 / sum.wt;
                }
                let vis = &mut integ.vis[base];
                if deleted || (sum.re == 0.0 && sum.im == 0.0) {
                    vis.amp = 0.0;
                    vis.phs = 0.0;
                    vis.wt = 0.0;
                    vis.bad = VisFlags::DELETED;
                } else {
                    vis.amp = (sum.re * sum.re + sum.im * sum.im).sqrt();
                    vis.phs = sum.im.atan2(sum.re);
                    vis.wt = sum.wt;
                    vis.bad = if flagged {
                        VisFlags::FLAGGED
                    } else {
                        VisFlags::empty()
                    };
                }
            }
        }
        // Pass 2: copy the composed IF to the stream file, encoding
        // the flag state in the weight sign.
        if self.ifdata.is_some() {
            self.ifdata
                .as_mut()
                .unwrap()
                .set_range(cif, 0, self.nbmax - 1)?;
            for irec in 0..self.nrec {
                let IntRec { isub, islot } = self.rec[irec];
                let integ = &self.subs[isub].integs[islot];
                let nbase = self.subs[isub].baselines.len();
                let ip = self.ifdata.as_mut().unwrap();
                ip.clear();
                for base in 0..nbase {
                    let vis = &integ.vis[base];
                    let dvis = &mut ip.buffer_mut()[base];
                    dvis.amp = vis.amp;
                    dvis.phs = vis.phs;
                    dvis.wt = if !vis.bad.intersects(VisFlags::DELETED | VisFlags::FLAGGED) {
                        vis.wt
                    } else if vis.bad.intersects(VisFlags::FLAGGED) {
                        -vis.wt
                    } else {
                        0.0
                    };
                }
                ip.write(irec)?;
            }
        }
        Ok(())
    }

    /// Park the current model in the model table under the outgoing
    /// selection. This leaves the whole model in the tentative list.
    pub(crate) fn record_select_model(&mut self) -> Result<(), ObsError> {
        self.require(ObsState::Selected, "record_select_model")?;
        self.merge_model(false)?;
        let cl = self.stream.cl.clone().unwrap();
        let pol = self.stream.pol.as_ref().unwrap().stokes;
        self.mtab
            .insert(&self.newmod, &cl, pol, self.geom.east, self.geom.north);
        Ok(())
    }

    /// Replace the current model with any model parked for the newly
    /// installed selection, clearing the current model either way.
    pub(crate) fn install_select_model(&mut self) -> Result<(), ObsError> {
        // The tentative and established models of the old selection
        // are obsolete.
        self.clear_model(true, true, false)?;
        let cl = self.stream.cl.clone().unwrap();
        let pol = self.stream.pol.as_ref().unwrap().stokes;
        if let Some(newmod) = self
            .mtab
            .remove(&cl, pol, self.geom.east, self.geom.north)
        {
            if !newmod.is_empty() {
                log::info!("Restored previously made model of latest selection.");
            }
            self.newmod = newmod;
        }
        Ok(())
    }
}
