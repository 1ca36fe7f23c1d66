// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The main interface to a visibility data set.

An `Observation` owns everything belonging to one data set: the three
paging stores, the sub-array data model, the global time index, the
stream selection, the sky models and their UV representations, the
deferred-edit buffer, the beam registry and the history file. The
ingest collaborator allocates it, fills the raw store and the data
model, and indexes it; everything after that happens through the
methods here and in the sibling modules.
*/

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};

use crate::beam::AntennaBeams;
use crate::chan_list::ChanList;
use crate::edit::EditQueue;
use crate::if_store::IfStore;
use crate::model::Model;
use crate::model_store::ModelStore;
use crate::model_table::ModelTable;
use crate::polarization::{PolSelector, Stokes};
use crate::projection::{self, Proj};
use crate::raw_store::RawStore;
use crate::subarray::{Integration, Subarray};
use crate::time_index::{self, IntRec, TimeOp};

pub mod error;
pub mod history;
mod calib;
mod geom;
mod modops;
mod select;
mod swap;

pub use error::ObsError;
pub use history::History;

#[cfg(test)]
mod test;

/// The initialization states of an observation, in increasing order of
/// readiness. A state implies the invariants of every lower state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObsState {
    /// Capacity reserved, no data.
    Allocated,
    /// The raw store has been populated by the ingest collaborator.
    DataLoaded,
    /// Sub-array integrations have been merged into the global index.
    Indexed,
    /// A channel/polarization stream has been selected.
    Selected,
    /// Uncorrected stream visibilities of one IF are in memory.
    RawIfResident,
    /// Corrected stream visibilities of one IF are in memory.
    IfResident,
}

/// Shown to the user when an operation finds the observation in too
/// low a state.
impl fmt::Display for ObsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ObsState::Allocated => "No data read yet",
            ObsState::DataLoaded => "Integrations have not yet been indexed",
            ObsState::Indexed => "No data stream selected yet",
            ObsState::Selected => "No IF in memory",
            ObsState::RawIfResident => "IF corrections pending",
            ObsState::IfResident => "Ready",
        };
        write!(f, "{}", msg)
    }
}

/// Reference-date bookkeeping. All integration times are measured in
/// seconds from the start of `year`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObsDate {
    /// The year of observation, e.g. 1992.
    pub year: i32,
    /// The UTC Modified Julian Date at the start of `year`.
    pub utc_ref: f64,
    /// The time of the first integration (seconds into `year`).
    pub ut: f64,
    /// Apparent sidereal time at `ut` (radians).
    pub app_st: f64,
    /// Coherent averaging time applied so far (seconds).
    pub cav_time: f64,
    /// Incoherent averaging time applied so far (seconds).
    pub iav_time: f64,
}

impl ObsDate {
    /// Reference-date info for a given year.
    pub fn for_year(year: i32) -> ObsDate {
        ObsDate {
            year,
            utc_ref: mjd_of_year_start(year),
            ..Default::default()
        }
    }
}

/// The UTC Modified Julian Date of the start of a year.
pub fn mjd_of_year_start(year: i32) -> f64 {
    // The MJD epoch is 1858 November 17.
    let epoch = NaiveDate::from_ymd_opt(1858, 11, 17).unwrap();
    let start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
    debug_assert_eq!(start.year(), year);
    (start - epoch).num_days() as f64
}

/// Miscellaneous descriptive header values, kept only so that an
/// output file can reproduce its input.
#[derive(Clone, Debug, Default)]
pub struct ObsHeader {
    pub origin: Option<String>,
    pub date_obs: Option<String>,
    pub telescope: Option<String>,
    pub instrument: Option<String>,
    pub observer: Option<String>,
    pub bunit: Option<String>,
    pub equinox: f64,
}

/// The source observed.
#[derive(Clone, Debug, Default)]
pub struct Source {
    pub name: String,
    /// The epoch of `ra` and `dec`.
    pub epoch: f64,
    /// Epoch mean right ascension (radians).
    pub ra: f64,
    /// Epoch mean declination (radians).
    pub dec: f64,
    /// Apparent right ascension at the date of observation (radians).
    pub app_ra: f64,
    /// Apparent declination at the date of observation (radians).
    pub app_dec: f64,
    /// Estimated total flux (Jy).
    pub tot_flux: f64,
    /// True if an explicit pointing center has been specified.
    pub have_obs: bool,
    /// The RA of the pointing center (radians).
    pub obsra: f64,
    /// The Dec of the pointing center (radians).
    pub obsdec: f64,
    /// Eastward offset of the pointing center from the source
    /// position (radians).
    pub east: f32,
    /// Northward offset of the pointing center from the source
    /// position (radians).
    pub north: f32,
}

/// The parameters of the currently selected processing stream.
#[derive(Clone, Debug, Default)]
pub struct UvStream {
    /// The selected channel ranges, in the global channel domain.
    pub cl: Option<ChanList>,
    /// The selected polarization and its synthesis recipe.
    pub pol: Option<PolSelector>,
    /// The IF currently in memory.
    pub cif: Option<usize>,
    /// Multiplier taking UVW coordinates of the resident IF from
    /// light-seconds to wavelengths.
    pub uvscale: f32,
}

/// Geometric transformations applied to the in-memory data with
/// respect to the data in the scratch files.
#[derive(Clone, Copy, Debug)]
pub struct UvGeometry {
    /// Eastward phase-center shift applied to phases (radians).
    pub east: f32,
    /// Northward phase-center shift applied to phases (radians).
    pub north: f32,
    /// Clockwise rotation applied to UVW coordinates (radians).
    pub uvangle: f32,
    /// Scale factor applied to weights.
    pub wtscale: f32,
}

impl Default for UvGeometry {
    fn default() -> UvGeometry {
        UvGeometry {
            east: 0.0,
            north: 0.0,
            uvangle: 0.0,
            wtscale: 1.0,
        }
    }
}

/// An optional zero-spacing flux.
#[derive(Clone, Copy, Debug, Default)]
pub struct UvZero {
    /// Estimated zero-spacing amplitude.
    pub amp: f32,
    /// Zero-spacing UV-model amplitude.
    pub modamp: f32,
    /// The weight to assign the zero-spacing flux.
    pub wt: f32,
}

/// One intermediate-frequency band.
#[derive(Clone, Debug, Default)]
pub struct IfBand {
    /// Center frequency of the first spectral-line channel (Hz).
    pub freq: f64,
    /// Signed frequency offset between channels (Hz).
    pub df: f64,
    /// Total bandwidth (Hz).
    pub bw: f64,
    /// Offset of channel 0 within the global channel index space.
    pub coff: usize,
    /// The channels of this IF used by the current stream, or None if
    /// the IF is unsampled.
    pub cl: Option<ChanList>,
    /// True when the per-baseline weight sums of this IF are stale.
    pub wtsum_stale: bool,
}

/// A visibility data set and everything that belongs to it.
pub struct Observation {
    /// Current readiness state.
    pub state: ObsState,
    /// The number of sub-arrays.
    pub nsub: usize,
    /// The total number of integrations in all sub-arrays.
    pub nrec: usize,
    /// The number of IFs.
    pub nif: usize,
    /// The number of recorded polarizations.
    pub npol: usize,
    /// The number of spectral-line channels per IF.
    pub nchan: usize,
    /// The max number of baselines in any sub-array.
    pub nbmax: usize,
    /// The total number of channels in all IFs.
    pub nctotal: usize,
    /// True if model visibilities currently exist.
    pub has_model: bool,
    /// True if the recorded visibility integration times are usable.
    pub have_inttim: bool,
    /// Reference date info.
    pub date: ObsDate,
    /// Miscellaneous descriptive header values.
    pub header: ObsHeader,
    /// Spherical coordinate projection of the UVW coordinates.
    pub proj: Proj,
    /// The current stream selection.
    pub stream: UvStream,
    /// Geometric transformations applied to the in-memory data.
    pub geom: UvGeometry,
    /// Zero-spacing flux.
    pub uvzero: UvZero,
    /// Source characteristics.
    pub source: Source,
    /// The recorded polarizations, in recorded order.
    pub pols: Vec<Stokes>,
    /// The IF descriptors.
    pub ifs: Vec<IfBand>,
    /// The sub-arrays.
    pub subs: Vec<Subarray>,
    /// The global time index; empty until `build_index` runs.
    pub rec: Vec<IntRec>,
    /// The raw visibility paging store.
    pub raw: RawStore,
    /// The IF stream paging store; allocated only when nif > 1.
    pub ifdata: Option<IfStore>,
    /// The UV model paging store; allocated only when nif > 1.
    pub uvmodel: Option<ModelStore>,
    /// The history file.
    pub history: History,
    /// The established model.
    pub model: Model,
    /// The tentative model.
    pub newmod: Model,
    /// The established continuum model.
    pub cmodel: Model,
    /// The tentative continuum model.
    pub cnewmod: Model,
    /// Models parked per stream selection.
    pub mtab: ModelTable,
    /// Deferred-edit bookkeeping.
    pub edits: EditQueue,
    /// The interned voltage beams of the observation's antennas.
    pub beams: AntennaBeams,
    /// The directory holding the scratch files.
    pub(crate) scratch_dir: PathBuf,
}

impl Observation {
    /// Allocate an observation and its scratch files.
    ///
    /// The ingest collaborator then fills the sub-arrays and the raw
    /// store, sets the IF, date, source and projection fields, calls
    /// [`Observation::set_data_loaded`] and [`Observation::build_index`].
    /// The IF and UV model stores exist only when there is more than
    /// one IF; a single IF is permanently resident.
    #[allow(clippy::too_many_arguments)]
    pub fn allocate(
        scratch_dir: &Path,
        nrec: usize,
        nbmax: usize,
        nsub: usize,
        nif: usize,
        pols: &[Stokes],
        nchan: usize,
    ) -> Result<Observation, ObsError> {
        let npol = pols.len();
        let history = History::create(scratch_dir)?;
        let raw = RawStore::create(scratch_dir, nrec, nbmax, nchan, nif, npol)?;
        let (ifdata, uvmodel) = if nif > 1 {
            (
                Some(IfStore::create(scratch_dir, nif, nbmax, nrec)?),
                Some(ModelStore::create(scratch_dir, nrec, nbmax, nif)?),
            )
        } else {
            (None, None)
        };
        Ok(Observation {
            state: ObsState::Allocated,
            nsub,
            nrec,
            nif,
            npol,
            nchan,
            nbmax,
            nctotal: nif * nchan,
            has_model: false,
            have_inttim: false,
            date: ObsDate::default(),
            header: ObsHeader::default(),
            proj: Proj::Sin,
            stream: UvStream::default(),
            geom: UvGeometry::default(),
            uvzero: UvZero::default(),
            source: Source::default(),
            pols: pols.to_vec(),
            ifs: (0..nif)
                .map(|_| IfBand {
                    wtsum_stale: true,
                    ..Default::default()
                })
                .collect(),
            subs: (0..nsub).map(|_| Subarray::new(nif)).collect(),
            rec: Vec::new(),
            raw,
            ifdata,
            uvmodel,
            history,
            model: Model::new(),
            newmod: Model::new(),
            cmodel: Model::new(),
            cnewmod: Model::new(),
            mtab: ModelTable::new(),
            edits: EditQueue::new(),
            beams: AntennaBeams::new(),
            scratch_dir: scratch_dir.to_path_buf(),
        })
    }

    /// True when the observation has reached at least the given state.
    pub fn ready(&self, state: ObsState) -> bool {
        self.state >= state
    }

    /// Check that the observation has reached at least the given
    /// state, naming the failing operation otherwise.
    pub(crate) fn require(&self, state: ObsState, op: &'static str) -> Result<(), ObsError> {
        if self.ready(state) {
            Ok(())
        } else {
            Err(ObsError::State {
                op,
                state: self.state,
            })
        }
    }

    /// Mark the raw store as populated by the ingest collaborator.
    pub fn set_data_loaded(&mut self) {
        self.state = ObsState::DataLoaded;
    }

    /// Merge the sub-array integrations into the global time index.
    pub fn build_index(&mut self) -> Result<(), ObsError> {
        self.require(ObsState::DataLoaded, "build_index")?;
        self.state = ObsState::DataLoaded;
        self.rec = time_index::build_index(&self.subs, self.nrec)?;
        self.state = ObsState::Indexed;
        Ok(())
    }

    /// The integration behind a global record index.
    pub fn rec_integ(&self, irec: usize) -> &Integration {
        let IntRec { isub, islot } = self.rec[irec];
        &self.subs[isub].integs[islot]
    }

    /// The global record index whose integration time matches the
    /// relational test `op` against `t`.
    pub fn find_time(&self, t: f64, op: TimeOp) -> Option<usize> {
        if !self.ready(ObsState::Indexed) {
            return None;
        }
        time_index::search_times(self.nrec, t, op, |i| self.rec_integ(i).ut)
    }

    /// Iterate IF indexes from `cif` by `step`, optionally skipping
    /// IFs that have no selected channels, returning the next suitable
    /// index or None when the range is exhausted.
    pub fn next_if(&self, cif: usize, skip_empty: bool, step: i64) -> Option<usize> {
        if cif >= self.nif {
            return None;
        }
        let mut cif = cif as i64;
        match step {
            s if s < 0 => {
                while cif >= 0 && skip_empty && self.ifs[cif as usize].cl.is_none() {
                    cif -= 1;
                }
                (cif >= 0).then_some(cif as usize)
            }
            s if s > 0 => {
                while (cif as usize) < self.nif && skip_empty && self.ifs[cif as usize].cl.is_none()
                {
                    cif += 1;
                }
                ((cif as usize) < self.nif).then_some(cif as usize)
            }
            _ => (!skip_empty || self.ifs[cif as usize].cl.is_some()).then_some(cif as usize),
        }
    }

    /// The indexes of all IFs sampled by the current selection.
    pub fn sampled_ifs(&self) -> Vec<usize> {
        (0..self.nif)
            .filter(|&cif| self.ifs[cif].cl.is_some())
            .collect()
    }

    fn check_if(&self, cif: usize, _op: &'static str) -> Result<(), ObsError> {
        if cif >= self.nif {
            Err(ObsError::IfIndex {
                cif,
                nif: self.nif,
            })
        } else {
            Ok(())
        }
    }

    /// The mean frequency of the selected channels of one IF, or of
    /// all IFs when `cif` is None (Hz).
    pub fn sel_freq(&self, cif: Option<usize>) -> Result<f64, ObsError> {
        self.require(ObsState::Selected, "sel_freq")?;
        let (bif, eif) = match cif {
            None => (0, self.nif - 1),
            Some(c) => {
                self.check_if(c, "sel_freq")?;
                (c, c)
            }
        };
        let mut w_f_sum = 0.0;
        let mut w_sum = 0.0;
        for ifp in &self.ifs[bif..=eif] {
            if let Some(cl) = &ifp.cl {
                // sc is twice the sum of the selected channel indexes.
                let mut sc = 0usize;
                let mut nc = 0usize;
                for r in cl.ranges() {
                    let n = r.cb - r.ca + 1;
                    nc += n;
                    sc += n * (r.ca + r.cb);
                }
                if nc > 0 {
                    w_f_sum += ifp.df.abs() * (nc as f64 * ifp.freq + 0.5 * sc as f64 * ifp.df);
                    w_sum += nc as f64 * ifp.df.abs();
                }
            }
        }
        Ok(if w_sum > 0.0 {
            w_f_sum / w_sum
        } else {
            self.ifs[(bif + eif) / 2].freq
        })
    }

    /// The total bandwidth of the selected channels of one IF, or of
    /// all IFs when `cif` is None (Hz).
    pub fn sel_bandwidth(&self, cif: Option<usize>) -> Result<f64, ObsError> {
        self.require(ObsState::Selected, "sel_bandwidth")?;
        let (bif, eif) = match cif {
            None => (0, self.nif - 1),
            Some(c) => {
                self.check_if(c, "sel_bandwidth")?;
                (c, c)
            }
        };
        let mut bw = 0.0;
        for ifp in &self.ifs[bif..=eif] {
            if let Some(cl) = &ifp.cl {
                bw += cl.num_channels() as f64 * ifp.df.abs();
            }
        }
        Ok(bw)
    }

    /// The factor that scales UVW coordinates of a given IF from
    /// light-seconds to wavelengths.
    pub fn uv_scale(&self, cif: usize) -> Result<f32, ObsError> {
        Ok(self.sel_freq(Some(cif))? as f32)
    }

    /// Mark the per-baseline weight sums of one IF (or all IFs, with
    /// None) as stale with respect to the visibility weights.
    pub fn flag_baseline_weights(&mut self, cif: Option<usize>) -> Result<(), ObsError> {
        if !self.ready(ObsState::Selected) {
            return Ok(());
        }
        match cif {
            None => {
                for ifp in &mut self.ifs {
                    ifp.wtsum_stale = true;
                }
            }
            Some(c) => {
                self.check_if(c, "flag_baseline_weights")?;
                self.ifs[c].wtsum_stale = true;
            }
        }
        Ok(())
    }

    /// Recompute the stale per-baseline weight sums of one IF (or all
    /// IFs, with None). Each stale IF is swapped in and its unflagged
    /// visibility weights summed per baseline; the caller's resident
    /// IF is restored afterwards.
    pub fn update_baseline_weights(&mut self, cif: Option<usize>) -> Result<(), ObsError> {
        if !self.ready(ObsState::Selected) {
            return Ok(());
        }
        let (bif, eif) = match cif {
            None => (0, self.nif - 1),
            Some(c) => {
                self.check_if(c, "update_baseline_weights")?;
                (c, c)
            }
        };
        let old_if = self.current_if();
        let mut next = bif;
        while let Some(cif) = self.next_if(next, true, 1) {
            if cif > eif {
                break;
            }
            next = cif + 1;
            if !self.ifs[cif].wtsum_stale {
                continue;
            }
            self.swap_to(cif)?;
            for sub in &mut self.subs {
                for bl in &mut sub.baselines {
                    bl.wtsum[cif] = 0.0;
                }
                for integ in &sub.integs {
                    for (base, vis) in integ.vis.iter().enumerate() {
                        if vis.bad.is_empty() {
                            sub.baselines[base].wtsum[cif] += vis.wt;
                        }
                    }
                }
            }
            self.ifs[cif].wtsum_stale = false;
        }
        self.restore_if(old_if)?;
        Ok(())
    }

    /// Specify the pointing center of the observation explicitly, for
    /// observations whose headers don't carry one.
    pub fn set_obs_radec(&mut self, obsra: f64, obsdec: f64) {
        self.source.have_obs = true;
        self.source.obsra = obsra;
        self.source.obsdec = obsdec;
        self.source.east =
            projection::radec_to_l(self.source.ra, self.source.dec, obsra, obsdec, self.proj)
                as f32;
        self.source.north =
            projection::radec_to_m(self.source.ra, self.source.dec, obsra, obsdec, self.proj)
                as f32;
    }

    /// The radial offset of a map position from the pointing center
    /// (radians).
    pub fn pointing_offset(&self, x: f32, y: f32) -> f32 {
        let east = self.source.east + x - self.geom.east;
        let north = self.source.north + y - self.geom.north;
        (east * east + north * north).sqrt()
    }

    /// Append a line to the observation history.
    pub fn add_history(&mut self, line: &str) -> Result<(), ObsError> {
        Ok(self.history.append(line)?)
    }
}

// Borrow-friendly helpers shared by the sibling modules.
impl Observation {
    /// The per-sub-array ownership of a global record index, as plain
    /// indices.
    pub(crate) fn rec_slot(&self, irec: usize) -> (usize, usize) {
        let IntRec { isub, islot } = self.rec[irec];
        (isub, islot)
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            r#"Observation (
    source:              {source},
    year:                {year},
    state:               {state:?},

    num sub-arrays:      {nsub},
    num integrations:    {nrec},
    num IFs:             {nif},
    num channels/IF:     {nchan},
    num polarizations:   {npol},
    polarizations:       {pols:?},
    max baselines:       {nbmax},

    selected channels:   {chans},
    selected pol:        {pol},
    resident IF:         {cif},

    shift east, north:   {east:.3e}, {north:.3e} rad,
    UV rotation:         {uvangle:.3e} rad,
    weight scale:        {wtscale},

    established model:   {nold} components ({oldflux} Jy),
    tentative model:     {nnew} components ({newflux} Jy),
    parked models:       {ntab},
    buffered edits:      {nedit},
)"#,
            source = self.source.name,
            year = self.date.year,
            state = self.state,
            nsub = self.nsub,
            nrec = self.nrec,
            nif = self.nif,
            nchan = self.nchan,
            npol = self.npol,
            pols = self.pols,
            nbmax = self.nbmax,
            chans = self
                .stream
                .cl
                .as_ref()
                .map_or("(none)".to_string(), |cl| cl.to_string()),
            pol = self
                .stream
                .pol
                .as_ref()
                .map_or("(none)".to_string(), |p| p.stokes.to_string()),
            cif = self
                .stream
                .cif
                .map_or("(none)".to_string(), |c| (c + 1).to_string()),
            east = self.geom.east,
            north = self.geom.north,
            uvangle = self.geom.uvangle,
            wtscale = self.geom.wtscale,
            nold = self.model.ncmp(),
            oldflux = self.model.total_flux(),
            nnew = self.newmod.ncmp(),
            newflux = self.newmod.total_flux(),
            ntab = self.mtab.len(),
            nedit = self.edits.len(),
        )
    }
}
