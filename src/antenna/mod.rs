// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Structs and helper methods for antenna metadata
*/

use std::fmt;
use std::rc::Rc;

use crate::beam::VoltageBeam;
use crate::MAX_ANT_NAME;

/// Where an antenna is: on the ground, or in orbit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AntennaSite {
    /// A ground station with earth-centered coordinates in meters.
    Ground { x: f64, y: f64, z: f64 },
    /// A satellite station described by its orbital elements.
    Orbit {
        /// Semi-major axis of the orbit (meters).
        semi_major: f64,
        /// Eccentricity of the orbit.
        eccentricity: f64,
        /// Inclination of the orbit to the equator (degrees).
        inclination: f64,
        /// Right ascension of the ascending node (degrees).
        ra_ascending: f64,
        /// The argument of perigee (degrees).
        arg_perigee: f64,
        /// The mean anomaly at the reference time (degrees).
        mean_anomaly: f64,
    },
}

/// One antenna of a sub-array.
#[derive(Clone)]
pub struct Antenna {
    /// The antenna name, at most [`MAX_ANT_NAME`] characters.
    pub name: String,
    /// The antenna-table antenna number.
    pub number: usize,
    /// If set, self-calibration must not change this antenna's gain.
    pub fixed_gain: bool,
    /// Extra weight to apply to this antenna in self-calibration.
    pub selfcal_weight: f32,
    /// The station location.
    pub site: AntennaSite,
    /// The voltage beam of the antenna, if one has been assigned.
    pub beam: Option<Rc<VoltageBeam>>,
}

impl Antenna {
    /// Create a ground-station antenna. The name is truncated to
    /// [`MAX_ANT_NAME`] characters.
    pub fn new(name: &str, number: usize, x: f64, y: f64, z: f64) -> Antenna {
        let name: String = name.chars().take(MAX_ANT_NAME).collect();
        Antenna {
            name,
            number,
            fixed_gain: false,
            selfcal_weight: 1.0,
            site: AntennaSite::Ground { x, y, z },
            beam: None,
        }
    }
}

impl fmt::Debug for Antenna {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
