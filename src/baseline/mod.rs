// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Structs and helper methods for baseline metadata
*/

use std::fmt;

/// A time-invariant per-IF amplitude and phase correction for one
/// baseline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BaseCor {
    /// Amplitude correction factor.
    pub amp_cor: f32,
    /// Phase correction offset (radians).
    pub phs_cor: f32,
}

impl Default for BaseCor {
    fn default() -> BaseCor {
        BaseCor {
            amp_cor: 1.0,
            phs_cor: 0.0,
        }
    }
}

/// One baseline of a sub-array.
///
/// The two antenna indexes always satisfy `ant_a < ant_b`.
#[derive(Clone)]
pub struct Baseline {
    /// Index of the first antenna in the sub-array antenna array.
    pub ant_a: usize,
    /// Index of the second antenna in the sub-array antenna array.
    pub ant_b: usize,
    /// Baseline hour-angle offset (radians).
    pub boff: f64,
    /// Baseline XY distance (meters).
    pub bxy: f64,
    /// Baseline Z distance (meters).
    pub bz: f64,
    /// Per-IF time-invariant gain corrections.
    pub bcor: Vec<BaseCor>,
    /// Per-IF sums of visibility weights. Stale whenever the owning
    /// IF's staleness flag is raised; refreshed lazily.
    pub wtsum: Vec<f32>,
}

impl Baseline {
    /// Create a baseline between two antennas of a sub-array, with
    /// unity corrections in each of `nif` IFs.
    pub fn new(ant_a: usize, ant_b: usize, nif: usize) -> Baseline {
        debug_assert!(ant_a < ant_b);
        Baseline {
            ant_a,
            ant_b,
            boff: 0.0,
            bxy: 0.0,
            bz: 0.0,
            bcor: vec![BaseCor::default(); nif],
            wtsum: vec![0.0; nif],
        }
    }

    /// True if the baseline involves the given antenna.
    pub fn uses_antenna(&self, itel: usize) -> bool {
        self.ant_a == itel || self.ant_b == itel
    }
}

impl fmt::Debug for Baseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ant_a, self.ant_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_baseline_has_unity_corrections() {
        let bl = Baseline::new(0, 2, 3);
        assert_eq!(bl.bcor.len(), 3);
        assert!(bl.bcor.iter().all(|c| c.amp_cor == 1.0 && c.phs_cor == 0.0));
        assert!(bl.uses_antenna(0));
        assert!(bl.uses_antenna(2));
        assert!(!bl.uses_antenna(1));
    }
}
