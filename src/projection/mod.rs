// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Spherical coordinate projections.

Conversions between equatorial coordinates and projected direction
cosine offsets, for the two projections that UVW coordinates are
interpreted in. See AIPS Memo 27 for the geometry.
*/

use std::fmt;

#[cfg(test)]
mod test;

/// Recognized spherical coordinate projections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Proj {
    /// Sin (orthographic) projection.
    Sin,
    /// North-Celestial-Pole projection.
    Ncp,
}

impl Proj {
    /// The FITS name of the projection.
    pub fn name(&self) -> &'static str {
        match self {
            Proj::Sin => "SIN",
            Proj::Ncp => "NCP",
        }
    }

    /// Look up a projection from its 3-character FITS name.
    pub fn parse(name: &str) -> Option<Proj> {
        match name {
            "SIN" => Some(Proj::Sin),
            "NCP" => Some(Proj::Ncp),
            _ => None,
        }
    }
}

impl fmt::Display for Proj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Return the Right Ascension corresponding to easterly and northerly
/// projected direction cosine offsets from a reference position.
/// All angles in radians; `l` and `m` must lie in -1..1.
pub fn lm_to_ra(ra: f64, dec: f64, l: f64, m: f64, proj: Proj) -> f64 {
    if !(-1.0..=1.0).contains(&l) || !(-1.0..=1.0).contains(&m) {
        return 0.0;
    }
    let tmp = match proj {
        Proj::Sin => dec.cos() * (1.0 - l * l - m * m).abs().sqrt() - m * dec.sin(),
        Proj::Ncp => dec.cos() - m * dec.sin(),
    };
    if tmp != 0.0 {
        ra + l.atan2(tmp)
    } else {
        0.0
    }
}

/// Return the Declination corresponding to easterly and northerly
/// projected direction cosine offsets from a reference position.
pub fn lm_to_dec(_ra: f64, dec: f64, l: f64, m: f64, proj: Proj) -> f64 {
    if !(-1.0..=1.0).contains(&l) || !(-1.0..=1.0).contains(&m) {
        return 0.0;
    }
    match proj {
        Proj::Sin => {
            let tmp = m * dec.cos() + dec.sin() * (1.0 - l * l - m * m).abs().sqrt();
            if tmp.abs() <= 1.0 {
                tmp.asin()
            } else {
                0.0
            }
        }
        Proj::Ncp => {
            let tmp = dec.cos() - m * dec.sin();
            if tmp == 0.0 {
                return 0.0;
            }
            let c = l.atan2(tmp).cos();
            if c == 0.0 {
                return 0.0;
            }
            let ratio = tmp / c;
            if ratio.abs() <= 1.0 {
                ratio.acos() * if dec < 0.0 { -1.0 } else { 1.0 }
            } else {
                0.0
            }
        }
    }
}

/// The easterly projected direction cosine offset of a position from a
/// reference position.
pub fn radec_to_l(ref_ra: f64, _ref_dec: f64, ra: f64, dec: f64, proj: Proj) -> f64 {
    match proj {
        Proj::Sin | Proj::Ncp => dec.cos() * (ra - ref_ra).sin(),
    }
}

/// The northerly projected direction cosine offset of a position from a
/// reference position.
pub fn radec_to_m(ref_ra: f64, ref_dec: f64, ra: f64, dec: f64, proj: Proj) -> f64 {
    match proj {
        Proj::Sin => {
            dec.sin() * ref_dec.cos() - dec.cos() * ref_dec.sin() * (ra - ref_ra).cos()
        }
        Proj::Ncp => {
            let sin_ref = ref_dec.sin();
            if sin_ref == 0.0 {
                log::warn!("The NCP projection isn't defined at dec=0.");
                return 0.0;
            }
            (ref_dec.cos() - dec.cos() * (ra - ref_ra).cos()) / sin_ref
        }
    }
}
