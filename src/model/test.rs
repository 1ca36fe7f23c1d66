// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::*;
use float_cmp::approx_eq;
use std::io::BufReader;

fn gaussian(flux: f32, x: f32, y: f32, major: f32) -> ModComp {
    ModComp {
        shape: ModShape::Gaussian,
        free: FreeParams::empty(),
        flux,
        x,
        y,
        major,
        ratio: 1.0,
        phi: 0.0,
        freq0: 0.0,
        spcind: 0.0,
    }
}

#[test]
fn test_coincident_deltas_merge_on_add() {
    let mut mod_ = Model::new();
    mod_.add(ModComp::delta(1.0, 0.0, 0.0), true).unwrap();
    mod_.add(ModComp::delta(0.5, 0.0, 0.0), true).unwrap();
    mod_.add(ModComp::delta(0.25, 1.0e-8, 0.0), true).unwrap();
    assert_eq!(mod_.ncmp(), 2);
    assert!(approx_eq!(f32, mod_.total_flux(), 1.75, epsilon = 1e-6));
    assert_eq!(mod_.comps()[0].flux, 1.5);
    assert!(mod_.is_delta_only());
    assert!(mod_.is_squashed());
}

#[test]
fn test_spectral_index_requires_reference_frequency() {
    let mut mod_ = Model::new();
    let mut cmp = ModComp::delta(1.0, 0.0, 0.0);
    cmp.spcind = -0.7;
    assert!(matches!(
        mod_.add(cmp, false),
        Err(ModelError::BadRefFreq)
    ));
    cmp.freq0 = 1.0e9;
    mod_.add(cmp, false).unwrap();
    assert!(!mod_.is_delta_only());
}

#[test]
fn test_merge_rescales_flux_to_target_reference_frequency() {
    let mut mod_ = Model::new();
    let mut a = ModComp::delta(1.0, 0.0, 0.0);
    a.spcind = 1.0;
    a.freq0 = 1.0e9;
    let mut b = ModComp::delta(1.0, 0.0, 0.0);
    b.spcind = 1.0;
    b.freq0 = 2.0e9;
    mod_.add(a, true).unwrap();
    mod_.add(b, true).unwrap();
    // b's flux scales by (1e9/2e9)^1 = 0.5 before merging.
    assert_eq!(mod_.ncmp(), 1);
    assert!(approx_eq!(f32, mod_.comps()[0].flux, 1.5, epsilon = 1e-6));
}

#[test]
fn test_squash_merges_across_the_list() {
    let mut mod_ = Model::new();
    mod_.add(ModComp::delta(1.0, 0.0, 0.0), false).unwrap();
    mod_.add(gaussian(2.0, 0.0, 0.0, 1.0e-8), false).unwrap();
    mod_.add(ModComp::delta(0.5, 0.0, 0.0), false).unwrap();
    assert!(!mod_.is_squashed());
    mod_.squash();
    // The two deltas merge; the gaussian survives untouched.
    assert_eq!(mod_.ncmp(), 2);
    assert_eq!(mod_.comps()[0].flux, 1.5);
    assert!(approx_eq!(f32, mod_.total_flux(), 3.5, epsilon = 1e-6));
}

#[test]
fn test_concat_append_and_prepend() {
    let mut a = Model::new();
    a.add(ModComp::delta(1.0, 1.0e-8, 0.0), false).unwrap();
    let mut b = Model::new();
    b.add(ModComp::delta(2.0, 2.0e-8, 0.0), false).unwrap();

    a.concat(&mut b, false, true);
    assert_eq!(a.ncmp(), 2);
    assert!(b.is_empty());
    assert_eq!(a.comps()[1].flux, 2.0);

    let mut c = Model::new();
    c.add(ModComp::delta(3.0, 3.0e-8, 0.0), false).unwrap();
    a.concat(&mut c, false, false);
    // Prepending puts c's component first.
    assert_eq!(a.ncmp(), 3);
    assert_eq!(a.comps()[0].flux, 3.0);
    assert!(approx_eq!(f32, a.total_flux(), 6.0, epsilon = 1e-6));
}

#[test]
fn test_partition_variable_preserves_order() {
    let mut fixed = Model::new();
    let mut var = Model::new();
    let mut c1 = ModComp::delta(1.0, 1.0e-8, 0.0);
    c1.free = FreeParams::FLUX;
    let c2 = ModComp::delta(2.0, 2.0e-8, 0.0);
    let mut c3 = ModComp::delta(3.0, 3.0e-8, 0.0);
    c3.free = FreeParams::CENTER;
    fixed.add(c1, false).unwrap();
    fixed.add(c2, false).unwrap();
    fixed.add(c3, false).unwrap();

    fixed.partition_variable(&mut var);
    assert_eq!(fixed.ncmp(), 1);
    assert_eq!(fixed.comps()[0].flux, 2.0);
    assert_eq!(var.ncmp(), 2);
    assert_eq!(var.comps()[0].flux, 1.0);
    assert_eq!(var.comps()[1].flux, 3.0);
}

#[test]
fn test_window_partitioning() {
    let mut mod_ = Model::new();
    mod_.add(ModComp::delta(1.0, 0.5, 0.5), false).unwrap();
    mod_.add(ModComp::delta(2.0, 5.0, 5.0), false).unwrap();
    let win = MapWindow {
        xa: 0.0,
        xb: 1.0,
        ya: 1.0,
        yb: 0.0,
    };
    let inside = mod_.partition_windows(&[win]);
    assert_eq!(inside.ncmp(), 1);
    assert_eq!(inside.comps()[0].flux, 1.0);
    assert_eq!(mod_.ncmp(), 1);
    assert_eq!(mod_.comps()[0].flux, 2.0);
}

#[test]
fn test_text_round_trip() {
    let mut mod_ = Model::new();
    mod_.add(ModComp::delta(1.25, 0.0, 0.0), false).unwrap();
    let mut gauss = gaussian(0.5, 4.8e-9, -4.8e-9, 2.4e-9);
    gauss.ratio = 0.5;
    gauss.free = FreeParams::FLUX;
    mod_.add(gauss, false).unwrap();

    let mut text = Vec::new();
    mod_.write(&mut text, 0.0, 0.0, None).unwrap();

    let mut back = Model::new();
    let n = back
        .read_from(&mut BufReader::new(&text[..]), 0.0, 0.0, false)
        .unwrap();
    assert_eq!(n, 2);
    assert_eq!(back.ncmp(), 2);
    let d = &back.comps()[0];
    assert_eq!(d.shape, ModShape::Delta);
    assert!(approx_eq!(f32, d.flux, 1.25, epsilon = 1e-5));
    let g = &back.comps()[1];
    assert_eq!(g.shape, ModShape::Gaussian);
    assert!(g.free.contains(FreeParams::FLUX));
    assert!(approx_eq!(f32, g.x, 4.8e-9, epsilon = 1e-12));
    assert!(approx_eq!(f32, g.y, -4.8e-9, epsilon = 1e-12));
    assert!(approx_eq!(f32, g.major, 2.4e-9, epsilon = 1e-12));
    assert!(approx_eq!(f32, g.ratio, 0.5, epsilon = 1e-5));
}

#[test]
fn test_parse_defaults() {
    // Three fields make a delta.
    let mut mod_ = Model::new();
    mod_.parse_component_line("2.0 10.0 45.0", 1, 0.0, 0.0, false)
        .unwrap();
    assert_eq!(mod_.comps()[0].shape, ModShape::Delta);
    assert_eq!(mod_.comps()[0].ratio, 1.0);

    // Six fields with a nonzero major axis make a gaussian.
    let mut mod_ = Model::new();
    mod_.parse_component_line("2.0 10.0 45.0 3.0 0.8 10.0", 1, 0.0, 0.0, false)
        .unwrap();
    assert_eq!(mod_.comps()[0].shape, ModShape::Gaussian);

    // A zero major axis forces a delta and discards the axis fields.
    let mut mod_ = Model::new();
    mod_.parse_component_line("2.0 10.0 45.0 0.0 0.8v 10.0", 1, 0.0, 0.0, false)
        .unwrap();
    let cmp = &mod_.comps()[0];
    assert_eq!(cmp.shape, ModShape::Delta);
    assert_eq!(cmp.ratio, 1.0);
    assert!(!cmp.free.contains(FreeParams::RATIO));

    // Comment and blank lines add nothing.
    let mut mod_ = Model::new();
    assert!(!mod_
        .parse_component_line("! a comment", 1, 0.0, 0.0, false)
        .unwrap());
    assert!(!mod_.parse_component_line("", 2, 0.0, 0.0, false).unwrap());

    // An unknown shape code is rejected.
    let mut mod_ = Model::new();
    assert!(matches!(
        mod_.parse_component_line("2.0 10.0 45.0 3.0 0.8 10.0 9", 3, 0.0, 0.0, false),
        Err(ModelError::UnknownShape { code: 9, line: 3 })
    ));
}

#[test]
fn test_continuation_lines_join() {
    let text = b"1.0 10.0 \\\n 45.0\n";
    let mut reader = BufReader::new(&text[..]);
    let mut nline = 0;
    let line = read_logical_line(&mut reader, &mut nline).unwrap().unwrap();
    assert_eq!(line, "1.0 10.0  45.0");
    assert_eq!(nline, 2);
    assert!(read_logical_line(&mut reader, &mut nline).unwrap().is_none());
}

#[test]
fn test_free_parameter_markers() {
    let mut mod_ = Model::new();
    mod_.parse_component_line("1.0v 10.0v 45.0 3.0 0.8 10.0v 1", 1, 0.0, 0.0, false)
        .unwrap();
    let cmp = &mod_.comps()[0];
    assert!(cmp.free.contains(FreeParams::FLUX));
    assert!(cmp.free.contains(FreeParams::CENTER));
    assert!(cmp.free.contains(FreeParams::PHI));
    assert!(!cmp.free.contains(FreeParams::MAJOR));
}

#[test]
fn test_cut_truncates_at_first_weak_component() {
    let mut mod_ = Model::new();
    mod_.add(ModComp::delta(2.0, 1.0e-8, 0.0), false).unwrap();
    mod_.add(ModComp::delta(0.1, 2.0e-8, 0.0), false).unwrap();
    mod_.add(ModComp::delta(3.0, 3.0e-8, 0.0), false).unwrap();
    mod_.cut(1.0);
    // Everything from the first sub-threshold component on is dropped,
    // even stronger components after it.
    assert_eq!(mod_.ncmp(), 1);
    assert_eq!(mod_.total_flux(), 2.0);
}

#[test]
fn test_delta_component_visibility() {
    // A centered delta has constant amplitude and zero phase.
    let cmp = ModComp::delta(1.5, 0.0, 0.0);
    let (amp, phs) = component_visibility(&cmp, 1.0, 1.0e9, 1000.0, 2000.0);
    assert_eq!(amp, 1.5);
    assert_eq!(phs, 0.0);

    // The primary-beam factor scales the flux.
    let (amp, _) = component_visibility(&cmp, 0.5, 1.0e9, 1000.0, 2000.0);
    assert_eq!(amp, 0.75);

    // An offset delta picks up the Fourier phase of its position.
    let cmp = ModComp::delta(1.0, 1.0e-6, 0.0);
    let (_, phs) = component_visibility(&cmp, 1.0, 1.0e9, 1000.0, 0.0);
    assert!(approx_eq!(
        f32,
        phs,
        std::f32::consts::TAU * 1.0e-3,
        epsilon = 1e-6
    ));
}

#[test]
fn test_gaussian_visibility_falls_with_baseline_length() {
    let cmp = gaussian(1.0, 0.0, 0.0, 1.0e-8);
    let (a0, _) = component_visibility(&cmp, 1.0, 1.0e9, 0.0, 0.0);
    let (a1, _) = component_visibility(&cmp, 1.0, 1.0e9, 1.0e6, 0.0);
    let (a2, _) = component_visibility(&cmp, 1.0, 1.0e9, 1.0e7, 0.0);
    assert!(approx_eq!(f32, a0, 1.0, epsilon = 1e-4));
    assert!(a1 > a2);
    assert!(a2 >= 0.0);
}

#[test]
fn test_bessel_functions_match_known_values() {
    // J0(0)=1, J1(0)=0, and the first zero of J0 is near 2.404826.
    assert!(approx_eq!(f64, besj0(0.0), 1.0, epsilon = 1e-7));
    assert!(approx_eq!(f64, besj1(0.0), 0.0, epsilon = 1e-7));
    assert!(besj0(2.404826).abs() < 1e-5);
    // J1 is odd.
    assert!(approx_eq!(
        f64,
        besj1(-1.5),
        -besj1(1.5),
        epsilon = 1e-9
    ));
    // Large-argument values stay bounded by the asymptotic envelope.
    assert!(besj0(50.0).abs() < 0.2);
    assert!(besj1(50.0).abs() < 0.2);
}
