// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Model bookkeeping and UV-model synchronization.
//!
//! The established model is the part of the sky model whose Fourier
//! transform is baked into the model visibilities, in memory and in
//! the UV model paging file; the tentative model has no UV
//! representation. Every operation that moves components into or out
//! of the established lists updates the UV representation to match.

use super::{ObsError, ObsState, Observation};
use crate::beam;
use crate::model::{self, MapWindow, ModComp, Model};
use crate::subarray::VisFlags;

/// Convert a cartesian contribution to polar form and add it to an
/// amplitude/phase pair.
fn add_cart_to_polar(amp: &mut f32, phs: &mut f32, re: f32, im: f32) {
    let (sinp, cosp) = phs.sin_cos();
    let re0 = *amp * cosp + re;
    let im0 = *amp * sinp + im;
    *amp = (re0 * re0 + im0 * im0).sqrt();
    *phs = im0.atan2(re0);
}

impl Observation {
    /// Add or subtract the UV representation of a set of components
    /// from the model visibilities of every sampled IF.
    ///
    /// This quietly does nothing when no stream has been selected;
    /// model components recorded without a selection are realized by
    /// the next selection.
    fn fix_model(&mut self, comps: Vec<ModComp>, add: bool) -> Result<(), ObsError> {
        if !self.ready(ObsState::Selected) || comps.is_empty() {
            return Ok(());
        }
        let old_if = self.current_if();
        log::info!(
            "{} {} model components {} the UV plane model.",
            if add { "Adding" } else { "Extracting" },
            comps.len(),
            if add { "to" } else { "from" },
        );
        self.has_model = true;
        let mut next = 0;
        while let Some(cif) = self.next_if(next, true, 1) {
            next = cif + 1;
            let freq = self.sel_freq(Some(cif))? as f32;
            self.swap_to(cif)?;
            let uvscale = self.stream.uvscale;
            for isub in 0..self.nsub {
                for islot in 0..self.subs[isub].ntime() {
                    for base in 0..self.subs[isub].nbase() {
                        let vis = self.subs[isub].integs[islot].vis[base];
                        // Deleted visibilities often carry garbage UVW
                        // coordinates; flagged ones still get a model
                        // in case they are later unflagged.
                        if vis.bad.intersects(VisFlags::DELETED) {
                            continue;
                        }
                        let u = vis.u * uvscale;
                        let v = vis.v * uvscale;
                        let mut re = 0.0;
                        let mut im = 0.0;
                        for cmp in &comps {
                            let radius = self.pointing_offset(cmp.x, cmp.y);
                            let pb = beam::baseline_response(
                                &self.subs[isub],
                                base,
                                freq as f64,
                                radius,
                            );
                            let (amp, phs) = model::component_visibility(cmp, pb, freq, u, v);
                            let (sinp, cosp) = phs.sin_cos();
                            re += amp * cosp;
                            im += amp * sinp;
                        }
                        if !add {
                            re = -re;
                            im = -im;
                        }
                        let vis = &mut self.subs[isub].integs[islot].vis[base];
                        add_cart_to_polar(&mut vis.modamp, &mut vis.modphs, re, im);
                    }
                }
            }
            self.write_if_model(cif)?;
        }
        self.restore_if(old_if)?;
        // The zero-spacing model amplitude is the sum of the component
        // fluxes.
        let modamp: f32 = comps.iter().map(|c| c.flux).sum();
        self.uvzero.modamp += if add { modamp } else { -modamp };
        Ok(())
    }

    /// Add a model to the established or tentative model of the
    /// observation, prepending or appending its components. Adding to
    /// the established model computes and adds its UV representation
    /// first. `mod_` is left empty.
    pub fn add_model(
        &mut self,
        mod_: &mut Model,
        established: bool,
        continuum: bool,
        append: bool,
    ) -> Result<(), ObsError> {
        self.require(ObsState::Indexed, "add_model")?;
        if mod_.is_empty() {
            return Ok(());
        }
        if established {
            self.fix_model(mod_.comps().to_vec(), true)?;
            let target = if continuum {
                &mut self.cmodel
            } else {
                &mut self.model
            };
            target.concat(mod_, true, append);
            log::info!(
                "The established {}model now contains {} components and {} Jy",
                if continuum { "continuum " } else { "" },
                target.ncmp(),
                target.total_flux()
            );
        } else {
            let target = if continuum {
                &mut self.cnewmod
            } else {
                &mut self.newmod
            };
            target.concat(mod_, true, append);
        }
        Ok(())
    }

    /// Either establish the tentative models (promote), or demote the
    /// established models back to the heads of the tentative lists,
    /// clearing their UV representation.
    pub fn merge_model(&mut self, promote: bool) -> Result<(), ObsError> {
        self.require(ObsState::Indexed, "merge_model")?;
        if promote {
            let mut newmod = std::mem::take(&mut self.newmod);
            let mut cnewmod = std::mem::take(&mut self.cnewmod);
            self.add_model(&mut newmod, true, false, true)?;
            self.add_model(&mut cnewmod, true, true, true)?;
        } else {
            let mut model = std::mem::take(&mut self.model);
            let mut cmodel = std::mem::take(&mut self.cmodel);
            self.add_model(&mut model, false, false, false)?;
            self.add_model(&mut cmodel, false, true, false)?;
            // The established lists are now empty; their UV
            // representation goes too.
            self.clear_model(true, false, false)?;
        }
        Ok(())
    }

    /// Append the normal models to the continuum models, or prepend
    /// the continuum models back to the normal models.
    pub fn set_continuum(&mut self, to_continuum: bool) -> Result<(), ObsError> {
        self.require(ObsState::Indexed, "set_continuum")?;
        if to_continuum {
            let mut newmod = std::mem::take(&mut self.newmod);
            self.cnewmod.concat(&mut newmod, true, true);
            let mut model = std::mem::take(&mut self.model);
            self.cmodel.concat(&mut model, true, true);
        } else {
            let mut cnewmod = std::mem::take(&mut self.cnewmod);
            self.newmod.concat(&mut cnewmod, true, false);
            let mut cmodel = std::mem::take(&mut self.cmodel);
            self.model.concat(&mut cmodel, true, false);
        }
        Ok(())
    }

    /// Keep only the components of the established and tentative
    /// models that lie inside (or, with `keep_inside` false, outside)
    /// the given windows. The UV representation of the discarded part
    /// of the established model is subtracted.
    pub fn window_model(
        &mut self,
        windows: &[MapWindow],
        keep_inside: bool,
    ) -> Result<(), ObsError> {
        self.require(ObsState::Indexed, "window_model")?;
        if windows.is_empty() {
            return Ok(());
        }
        if !self.model.is_empty() {
            let ncmp = self.model.ncmp();
            let inside = self.model.partition_windows(windows);
            let outside = std::mem::replace(&mut self.model, inside);
            // self.model now holds the inside partition; swap if the
            // outside partition is the one to keep.
            let discard = if keep_inside {
                outside
            } else {
                std::mem::replace(&mut self.model, outside)
            };
            self.fix_model(discard.comps().to_vec(), false)?;
            log::info!(
                "The established model now contains {} of the original {} components.",
                self.model.ncmp(),
                ncmp
            );
        }
        if !self.newmod.is_empty() {
            let inside = self.newmod.partition_windows(windows);
            let outside = std::mem::replace(&mut self.newmod, inside);
            if !keep_inside {
                self.newmod = outside;
            }
        }
        Ok(())
    }

    /// Clear the established and/or tentative and/or continuum models.
    ///
    /// Clearing the established model zeroes the model visibilities in
    /// memory and in the UV model file, resets the zero-spacing model
    /// amplitude and drops `has_model`. Established continuum
    /// components surviving such a clear are preserved by prepending
    /// them to the tentative continuum model, so that the next
    /// selection re-establishes them.
    pub fn clear_model(&mut self, old: bool, new: bool, continuum: bool) -> Result<(), ObsError> {
        self.require(ObsState::Indexed, "clear_model")?;
        // Always clear the model visibilities when the established
        // model is targeted; also take the cheap path when clearing
        // the continuum while no normal established model exists.
        if old || (continuum && self.model.is_empty()) {
            for sub in &mut self.subs {
                for integ in &mut sub.integs {
                    for vis in &mut integ.vis {
                        vis.modamp = 0.0;
                        vis.modphs = 0.0;
                    }
                }
            }
            if self.uvmodel.is_some() {
                for cif in 0..self.nif {
                    self.write_if_model(cif)?;
                }
            }
            self.uvzero.modamp = 0.0;
            self.has_model = false;
        } else if continuum {
            // An established normal model remains, so the continuum's
            // UV contribution has to be subtracted instead.
            let comps = self.cmodel.comps().to_vec();
            self.fix_model(comps, false)?;
        }
        if continuum {
            self.cmodel.clear();
            self.cnewmod.clear();
        }
        if old {
            self.model.clear();
        }
        if new {
            self.newmod.clear();
        }
        // Re-attach surviving established continuum components to the
        // tentative continuum list.
        if !self.has_model && !self.cmodel.is_empty() {
            let mut cmodel = std::mem::take(&mut self.cmodel);
            self.cnewmod.concat(&mut cmodel, true, false);
        }
        Ok(())
    }

    /// Re-partition the models so that every component with a free
    /// parameter sits in the tentative model and every fixed component
    /// in the established model, preserving temporal order. The
    /// continuum models are established wholesale, since they are
    /// never fitted.
    pub fn partition_variable(&mut self) -> Result<(), ObsError> {
        self.require(ObsState::Indexed, "partition_variable")?;
        log::info!("Partitioning the model into established and variable parts.");
        let mut tmpmod = Model::new();
        // Establish the tentative continuum model.
        let mut cnewmod = std::mem::take(&mut self.cnewmod);
        self.add_model(&mut cnewmod, true, true, true)?;
        // Move the variable components of the tentative model aside.
        if !self.newmod.is_empty() {
            self.newmod.partition_variable(&mut tmpmod);
            // Establish the fixed components that remain.
            if !self.newmod.is_empty() {
                let mut fixed = std::mem::take(&mut self.newmod);
                self.add_model(&mut fixed, true, false, true)?;
            }
        }
        // Move the variable components of the established model into
        // the (now empty) tentative model and subtract their UV
        // representation.
        if !self.model.is_empty() {
            let mut model = std::mem::take(&mut self.model);
            let mut newmod = std::mem::take(&mut self.newmod);
            model.partition_variable(&mut newmod);
            self.model = model;
            self.newmod = newmod;
            if !self.newmod.is_empty() {
                let comps = self.newmod.comps().to_vec();
                self.fix_model(comps, false)?;
            }
        }
        // Append the original tentative variables last, preserving the
        // established-first temporal order.
        if !tmpmod.is_empty() {
            self.add_model(&mut tmpmod, false, false, true)?;
        }
        log::info!(
            "The fixed established model contains {} components ({} Jy).",
            self.model.ncmp(),
            self.model.total_flux()
        );
        log::info!(
            "The variable part of the model contains {} components ({} Jy).",
            self.newmod.ncmp(),
            self.newmod.total_flux()
        );
        Ok(())
    }

    /// Add a single component to the established or tentative model.
    pub fn add_component(&mut self, cmp: ModComp, established: bool) -> Result<(), ObsError> {
        self.require(ObsState::Indexed, "add_component")?;
        if established {
            // The UV representation must be computed before the
            // component can be merged away into an existing delta.
            self.fix_model(vec![cmp], true)?;
            self.model.add(cmp, true)?;
        } else {
            self.newmod.add(cmp, true)?;
        }
        Ok(())
    }

    /// Remove the component at `index` of the established or
    /// tentative model, returning it.
    pub fn remove_component(
        &mut self,
        index: usize,
        established: bool,
    ) -> Result<ModComp, ObsError> {
        self.require(ObsState::Indexed, "remove_component")?;
        let list = if established {
            &mut self.model
        } else {
            &mut self.newmod
        };
        if index >= list.ncmp() {
            return Err(ObsError::ComponentIndex { index });
        }
        let cmp = list.remove(index);
        if established {
            self.fix_model(vec![cmp], false)?;
        }
        Ok(cmp)
    }
}
