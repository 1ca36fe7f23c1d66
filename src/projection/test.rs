// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::*;
use float_cmp::approx_eq;

#[test]
fn test_projection_names() {
    assert_eq!(Proj::Sin.name(), "SIN");
    assert_eq!(Proj::parse("NCP"), Some(Proj::Ncp));
    assert_eq!(Proj::parse("TAN"), None);
}

#[test]
fn test_sin_projection_round_trip() {
    let ra0 = 1.2;
    let dec0 = 0.6;
    // A small offset a few arcminutes away.
    let l = 1.0e-3;
    let m = -4.0e-4;
    let ra = lm_to_ra(ra0, dec0, l, m, Proj::Sin);
    let dec = lm_to_dec(ra0, dec0, l, m, Proj::Sin);
    let l2 = radec_to_l(ra0, dec0, ra, dec, Proj::Sin);
    let m2 = radec_to_m(ra0, dec0, ra, dec, Proj::Sin);
    assert!(approx_eq!(f64, l, l2, epsilon = 1e-12));
    assert!(approx_eq!(f64, m, m2, epsilon = 1e-12));
}

#[test]
fn test_ncp_projection_round_trip() {
    let ra0 = 0.3;
    let dec0 = 1.0;
    let l = 5.0e-4;
    let m = 2.0e-4;
    let ra = lm_to_ra(ra0, dec0, l, m, Proj::Ncp);
    let dec = lm_to_dec(ra0, dec0, l, m, Proj::Ncp);
    let l2 = radec_to_l(ra0, dec0, ra, dec, Proj::Ncp);
    let m2 = radec_to_m(ra0, dec0, ra, dec, Proj::Ncp);
    assert!(approx_eq!(f64, l, l2, epsilon = 1e-12));
    assert!(approx_eq!(f64, m, m2, epsilon = 1e-12));
}

#[test]
fn test_zero_offset_maps_to_reference() {
    let ra0 = 2.0;
    let dec0 = -0.4;
    assert!(approx_eq!(
        f64,
        lm_to_ra(ra0, dec0, 0.0, 0.0, Proj::Sin),
        ra0,
        epsilon = 1e-14
    ));
    assert!(approx_eq!(
        f64,
        lm_to_dec(ra0, dec0, 0.0, 0.0, Proj::Sin),
        dec0,
        epsilon = 1e-14
    ));
}
