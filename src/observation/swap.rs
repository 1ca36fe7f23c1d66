// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Paging a single IF of the selected stream into memory.

use super::{ObsError, ObsState, Observation};
use crate::subarray::VisFlags;
use crate::time_index::IntRec;

impl Observation {
    /// The IF currently resident in memory, if corrections have been
    /// applied to it.
    pub fn current_if(&self) -> Option<usize> {
        if self.ready(ObsState::IfResident) {
            self.stream.cif
        } else {
            None
        }
    }

    /// Restore an IF previously reported by [`Observation::current_if`].
    /// None means there was no resident IF, and nothing is done.
    pub fn restore_if(&mut self, cif: Option<usize>) -> Result<(), ObsError> {
        match cif {
            None => Ok(()),
            Some(cif) => self.swap_to(cif),
        }
    }

    /// Make the given IF the resident IF: read its stream visibilities
    /// and UV model from the paging files and apply the recorded
    /// corrections. If the IF is already resident nothing is done.
    pub fn swap_to(&mut self, cif: usize) -> Result<(), ObsError> {
        self.require(ObsState::Selected, "swap_to")?;
        if cif >= self.nif {
            return Err(ObsError::IfIndex {
                cif,
                nif: self.nif,
            });
        }
        // A single-IF observation is permanently resident, though its
        // state can have been demoted below IfResident.
        if (self.ready(ObsState::IfResident) && self.stream.cif == Some(cif)) || self.nif == 1 {
            self.state = ObsState::IfResident;
            return Ok(());
        }
        let unsampled = self.ifs[cif].cl.is_none();
        if self.ifdata.is_none() {
            return Err(ObsError::NoIfStore(cif));
        }
        if self.uvmodel.is_none() {
            return Err(ObsError::NoModelStore(cif));
        }
        self.ifdata
            .as_mut()
            .unwrap()
            .set_range(cif, 0, self.nbmax - 1)?;
        // The previous resident IF is invalid from here on.
        self.state = ObsState::Selected;
        for irec in 0..self.nrec {
            let IntRec { isub, islot } = self.rec[irec];
            let ip = self.ifdata.as_mut().unwrap();
            if unsampled {
                ip.clear();
            } else {
                ip.read(irec)?;
            }
            let nbase = self.subs[isub].nbase();
            let integ = &mut self.subs[isub].integs[islot];
            let dvis = self.ifdata.as_ref().unwrap().buffer();
            for base in 0..nbase {
                let vis = &mut integ.vis[base];
                vis.amp = dvis[base].amp;
                vis.phs = dvis[base].phs;
                let wt = dvis[base].wt;
                if wt > 0.0 {
                    vis.wt = wt;
                    vis.bad = VisFlags::empty();
                } else if wt < 0.0 {
                    vis.wt = -wt;
                    vis.bad = VisFlags::FLAGGED;
                } else {
                    vis.wt = 0.0;
                    vis.bad = VisFlags::DELETED;
                }
            }
        }
        self.read_if_model(cif)?;
        if let Err(e) = self.init_if(cif) {
            self.state = ObsState::Selected;
            return Err(e);
        }
        Ok(())
    }

    /// Apply recorded corrections to freshly read stream visibilities
    /// and promote the observation to `IfResident`.
    ///
    /// This is the only place corrections touch data: the scratch
    /// files always hold uncorrected visibilities, and the recorded
    /// corrections are re-applied on every swap.
    pub(crate) fn init_if(&mut self, cif: usize) -> Result<(), ObsError> {
        self.state = ObsState::RawIfResident;
        self.stream.cif = Some(cif);
        self.stream.uvscale = self.uv_scale(cif)?;
        if self.ifs[cif].cl.is_some() {
            self.apply_telcor(cif)?;
            self.apply_base_cor(cif)?;
            self.apply_pending_edits(cif)?;
            if self.geom.east != 0.0 || self.geom.north != 0.0 {
                self.rotate_memory_phases(self.geom.east, self.geom.north);
            }
            if self.geom.wtscale != 1.0 {
                let wtscale = self.geom.wtscale;
                for sub in &mut self.subs {
                    for integ in &mut sub.integs {
                        for vis in &mut integ.vis {
                            vis.wt *= wtscale;
                        }
                    }
                }
            }
        }
        self.state = ObsState::IfResident;
        Ok(())
    }

    /// Read the UV model of an IF into the in-memory model
    /// visibilities. If the model of that IF is already in memory
    /// nothing is done; otherwise any resident IF is invalidated.
    pub(crate) fn read_if_model(&mut self, cif: usize) -> Result<(), ObsError> {
        self.require(ObsState::Selected, "read_if_model")?;
        if cif >= self.nif {
            return Err(ObsError::IfIndex {
                cif,
                nif: self.nif,
            });
        }
        if (self.ready(ObsState::IfResident) && self.stream.cif == Some(cif)) || self.nif == 1 {
            return Ok(());
        }
        if self.uvmodel.is_none() {
            return Err(ObsError::NoModelStore(cif));
        }
        self.state = ObsState::Selected;
        for irec in 0..self.nrec {
            let IntRec { isub, islot } = self.rec[irec];
            let uvp = self.uvmodel.as_mut().unwrap();
            uvp.read(irec, cif)?;
            let nbase = self.subs[isub].nbase();
            let integ = &mut self.subs[isub].integs[islot];
            let mvis = self.uvmodel.as_ref().unwrap().buffer();
            for base in 0..nbase {
                integ.vis[base].modamp = mvis[base].amp;
                integ.vis[base].modphs = mvis[base].phs;
            }
        }
        Ok(())
    }

    /// Write the in-memory UV model of an IF back to the model paging
    /// file. With a single IF there is no model file, and the call is
    /// a no-op.
    pub(crate) fn write_if_model(&mut self, cif: usize) -> Result<(), ObsError> {
        self.require(ObsState::Indexed, "write_if_model")?;
        if cif >= self.nif {
            return Err(ObsError::IfIndex {
                cif,
                nif: self.nif,
            });
        }
        if self.nif == 1 {
            return Ok(());
        }
        if self.uvmodel.is_none() {
            return Err(ObsError::NoModelStore(cif));
        }
        for irec in 0..self.nrec {
            let IntRec { isub, islot } = self.rec[irec];
            let nbase = self.subs[isub].nbase();
            let integ = &self.subs[isub].integs[islot];
            let uvp = self.uvmodel.as_mut().unwrap();
            uvp.clear_buffer();
            for base in 0..nbase {
                uvp.buffer_mut()[base].amp = integ.vis[base].modamp;
                uvp.buffer_mut()[base].phs = integ.vis[base].modphs;
            }
            uvp.write(irec, cif)?;
        }
        Ok(())
    }
}
