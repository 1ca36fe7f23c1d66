// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Sub-arrays, integrations and in-memory visibilities.

Each sub-array is a self-contained instrument: its own antennas,
baselines and time samples. The visibilities held here are the
in-memory form of the currently resident IF.
*/

use std::ops::{BitOr, BitOrAssign};

use crate::antenna::Antenna;
use crate::baseline::Baseline;
use crate::edit::EditOp;
use crate::time_index::{search_times, TimeOp};

/// Bitmask flag states of one in-memory visibility.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VisFlags(u32);

impl VisFlags {
    /// The visibility has been deleted.
    pub const DELETED: VisFlags = VisFlags(1);
    /// The visibility has been flagged.
    pub const FLAGGED: VisFlags = VisFlags(2);
    /// The correction of the first antenna of the baseline is flagged.
    pub const ANT_A_BAD: VisFlags = VisFlags(4);
    /// The correction of the second antenna of the baseline is flagged.
    pub const ANT_B_BAD: VisFlags = VisFlags(8);

    pub const fn empty() -> VisFlags {
        VisFlags(0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if any of the given flag bits are set.
    pub fn intersects(self, other: VisFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// True if all of the given flag bits are set.
    pub fn contains(self, other: VisFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: VisFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: VisFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for VisFlags {
    type Output = VisFlags;
    fn bitor(self, rhs: VisFlags) -> VisFlags {
        VisFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for VisFlags {
    fn bitor_assign(&mut self, rhs: VisFlags) {
        self.0 |= rhs.0;
    }
}

/// One in-memory visibility of the currently resident IF.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Visibility {
    /// Visibility amplitude.
    pub amp: f32,
    /// Model amplitude.
    pub modamp: f32,
    /// Visibility phase (radians).
    pub phs: f32,
    /// Model phase (radians).
    pub modphs: f32,
    /// Visibility weight (1/variance).
    pub wt: f32,
    /// U coordinate (light-seconds).
    pub u: f32,
    /// V coordinate (light-seconds).
    pub v: f32,
    /// W coordinate (light-seconds).
    pub w: f32,
    /// The integration time, or 0.0 if not known.
    pub dt: f32,
    /// Flag status.
    pub bad: VisFlags,
}

/// One telescope amplitude/phase correction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TelCor {
    /// Amplitude correction factor.
    pub amp_cor: f32,
    /// Phase correction offset (radians).
    pub phs_cor: f32,
    /// True if the correction has been flagged as bad.
    pub bad: bool,
}

impl Default for TelCor {
    fn default() -> TelCor {
        TelCor {
            amp_cor: 1.0,
            phs_cor: 0.0,
            bad: false,
        }
    }
}

/// One integration (time sample) of a sub-array.
#[derive(Clone, Default)]
pub struct Integration {
    /// Start time of the integration (seconds into the reference
    /// year).
    pub ut: f64,
    /// Sequential record number in the scratch files, which is also
    /// the integration's slot in the global time index.
    pub irec: usize,
    /// One visibility per baseline of the resident IF.
    pub vis: Vec<Visibility>,
    /// Per-IF tables of one telescope correction per antenna.
    pub tcor: Vec<Vec<TelCor>>,
    /// Edits waiting to be applied to the scratch files.
    pub edits: Vec<EditOp>,
}

/// The otherwise unused items of a binary antenna table, kept so that
/// an output file can reproduce its input.
#[derive(Clone, Debug, Default)]
pub struct AnTable {
    /// Array center coordinates.
    pub array_xyz: [f64; 3],
    /// GST at time 0 on the reference date (degrees).
    pub gst0: f64,
    /// Earth rotation rate (degrees/day).
    pub deg_per_day: f64,
    /// Sub-array reference frequency (Hz).
    pub ref_freq: f64,
    /// Polar X,Y position at the reference date (meters).
    pub polar_xy: [f64; 2],
    /// UT1-UTC (seconds).
    pub ut1_utc: f64,
    /// Data time - UTC (seconds).
    pub dat_utc: f64,
    pub array_name: String,
    pub pol_type: String,
    pub time_system: String,
    /// Sub-array reference date, DD/MM/YY.
    pub ref_date: String,
}

/// One telescope sub-array of an observation.
pub struct Subarray {
    /// The gap used to delimit scans (seconds).
    pub scan_gap: f64,
    /// Original file time = UTC time + dat_utc (seconds).
    pub dat_utc: f64,
    /// Number of IFs; always equal to the parent observation's.
    pub nif: usize,
    /// The antennas of the sub-array.
    pub antennas: Vec<Antenna>,
    /// The baselines of the sub-array.
    pub baselines: Vec<Baseline>,
    /// Binary antenna-table info, or None.
    pub an_table: Option<AnTable>,
    /// The polarization reference antenna, if one is defined.
    pub p_refant: Option<usize>,
    /// Per-IF R-L phase differences of the reference antenna.
    pub p_diff: Vec<f64>,
    /// The integrations of the sub-array, in time order.
    pub integs: Vec<Integration>,
}

impl Subarray {
    /// Create an empty sub-array for an observation with `nif` IFs.
    pub fn new(nif: usize) -> Subarray {
        Subarray {
            scan_gap: 0.0,
            dat_utc: 0.0,
            nif,
            antennas: Vec::new(),
            baselines: Vec::new(),
            an_table: None,
            p_refant: None,
            p_diff: vec![0.0; nif],
            integs: Vec::new(),
        }
    }

    pub fn nstat(&self) -> usize {
        self.antennas.len()
    }

    pub fn nbase(&self) -> usize {
        self.baselines.len()
    }

    pub fn ntime(&self) -> usize {
        self.integs.len()
    }

    /// Add a baseline between two existing antennas. The antenna
    /// indexes may be given in either order.
    pub fn add_baseline(&mut self, ant_a: usize, ant_b: usize) {
        let (a, b) = if ant_a < ant_b {
            (ant_a, ant_b)
        } else {
            (ant_b, ant_a)
        };
        self.baselines.push(Baseline::new(a, b, self.nif));
    }

    /// The index of the baseline joining two antennas, if it exists.
    pub fn baseline_index(&self, ta: usize, tb: usize) -> Option<usize> {
        let (a, b) = if ta < tb { (ta, tb) } else { (tb, ta) };
        self.baselines
            .iter()
            .position(|bl| bl.ant_a == a && bl.ant_b == b)
    }

    /// Allocate `ntime` integrations, each with one visibility per
    /// baseline and one correction per (IF, antenna). Integration
    /// record indexes and times must be filled in by the caller.
    pub fn alloc_integrations(&mut self, ntime: usize) {
        let nbase = self.nbase();
        let nstat = self.nstat();
        self.integs = (0..ntime)
            .map(|_| Integration {
                ut: 0.0,
                irec: 0,
                vis: vec![Visibility::default(); nbase],
                tcor: vec![vec![TelCor::default(); nstat]; self.nif],
                edits: Vec::new(),
            })
            .collect();
    }

    /// The integration slot whose time stamp matches the relational
    /// test `op` against `t`, or None.
    pub fn find_time(&self, t: f64, op: TimeOp) -> Option<usize> {
        search_times(self.integs.len(), t, op, |i| self.integs[i].ut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_bit_operations() {
        let mut flags = VisFlags::empty();
        assert!(flags.is_empty());
        flags.insert(VisFlags::FLAGGED);
        flags.insert(VisFlags::ANT_A_BAD);
        assert!(flags.contains(VisFlags::FLAGGED));
        assert!(flags.intersects(VisFlags::ANT_A_BAD | VisFlags::ANT_B_BAD));
        assert!(!flags.contains(VisFlags::ANT_A_BAD | VisFlags::ANT_B_BAD));
        flags.remove(VisFlags::FLAGGED);
        assert!(!flags.intersects(VisFlags::FLAGGED));
    }

    #[test]
    fn test_baseline_index_lookup() {
        let mut sub = Subarray::new(1);
        for i in 0..3 {
            sub.antennas
                .push(Antenna::new(&format!("ANT{}", i), i, 0.0, 0.0, 0.0));
        }
        sub.add_baseline(0, 1);
        sub.add_baseline(0, 2);
        sub.add_baseline(2, 1);
        // Antenna order is normalized to ant_a < ant_b.
        assert_eq!(sub.baselines[2].ant_a, 1);
        assert_eq!(sub.baselines[2].ant_b, 2);
        assert_eq!(sub.baseline_index(2, 0), Some(1));
        assert_eq!(sub.baseline_index(1, 2), Some(2));
        assert_eq!(sub.baseline_index(0, 0), None);
    }

    #[test]
    fn test_alloc_integrations_shapes() {
        let mut sub = Subarray::new(2);
        for i in 0..3 {
            sub.antennas
                .push(Antenna::new(&format!("ANT{}", i), i, 0.0, 0.0, 0.0));
        }
        sub.add_baseline(0, 1);
        sub.add_baseline(0, 2);
        sub.add_baseline(1, 2);
        sub.alloc_integrations(4);
        assert_eq!(sub.ntime(), 4);
        assert_eq!(sub.integs[0].vis.len(), 3);
        assert_eq!(sub.integs[0].tcor.len(), 2);
        assert_eq!(sub.integs[0].tcor[0].len(), 3);
    }
}
