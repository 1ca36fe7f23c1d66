// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::observation::ObsError;
use crate::polarization::Stokes;
use crate::raw_store::CmplxVis;
use crate::test_helpers::{build_obs, fill_raw, standard_obs};
use float_cmp::approx_eq;
use tempdir::TempDir;

#[test]
fn test_two_second_bins_pair_up_integrations() {
    let tdir = TempDir::new("visilib").unwrap();
    // 4 integrations at t = 0, 1, 2, 3 s with identical unit
    // visibilities of weight 1.
    let mut ob = build_obs(tdir.path(), 1, &[Stokes::I], 1, &[0.0, 1.0, 2.0, 3.0]);
    fill_raw(&mut ob, |_, _, _, _, _| CmplxVis {
        re: 1.0,
        im: 0.0,
        wt: 1.0,
    });
    ob.set_data_loaded();
    ob.build_index().unwrap();
    let u_in: Vec<f32> = ob.subs[0].integs[0].vis.iter().map(|v| v.u).collect();

    ob.average(2.0, false).unwrap();

    // Two output integrations at the bin centers.
    assert_eq!(ob.nrec, 2);
    assert_eq!(ob.subs[0].ntime(), 2);
    assert_eq!(ob.subs[0].integs[0].ut, 1.0);
    assert_eq!(ob.subs[0].integs[1].ut, 3.0);

    // Each output cell is the weighted mean with summed weight.
    ob.raw.set_full_window().unwrap();
    for ut in 0..2 {
        ob.raw.read(ut).unwrap();
        for base in 0..3 {
            let cv = ob.raw.pol_slice(0, 0, base)[0];
            assert!(approx_eq!(f32, cv.re, 1.0, epsilon = 1e-6));
            assert!(approx_eq!(f32, cv.im, 0.0, epsilon = 1e-6));
            assert!(approx_eq!(f32, cv.wt, 2.0, epsilon = 1e-6));
        }
    }

    // U,V,W are the (identical) input coordinates; the integration
    // time is the sum of the inputs.
    for (base, integ_vis) in ob.subs[0].integs[0].vis.iter().enumerate() {
        assert!(approx_eq!(f32, integ_vis.u, u_in[base], epsilon = 1e-12));
        assert!(approx_eq!(f32, integ_vis.dt, 2.0, epsilon = 1e-6));
    }
}

#[test]
fn test_scatter_weights_come_from_the_sample_spread() {
    let tdir = TempDir::new("visilib").unwrap();
    // One bin of two samples with re = 1 and 3.
    let mut ob = build_obs(tdir.path(), 1, &[Stokes::I], 1, &[0.0, 1.0]);
    fill_raw(&mut ob, |ut, _, _, _, _| CmplxVis {
        re: 1.0 + 2.0 * ut as f32,
        im: 0.0,
        wt: 1.0,
    });
    ob.set_data_loaded();
    ob.build_index().unwrap();

    ob.average(2.0, true).unwrap();
    assert_eq!(ob.nrec, 1);

    // mean = 2, <re^2+im^2> = 5, variance = 0.5*(5-4)/(2-1) = 0.5,
    // weight = 1/variance = 2.
    ob.raw.set_full_window().unwrap();
    ob.raw.read(0).unwrap();
    let cv = ob.raw.pol_slice(0, 0, 0)[0];
    assert!(approx_eq!(f32, cv.re, 2.0, epsilon = 1e-6));
    assert!(approx_eq!(f32, cv.wt, 2.0, epsilon = 1e-5));

    // Scatter-derived weights reset the recorded weight scale.
    assert_eq!(ob.geom.wtscale, 1.0);
}

#[test]
fn test_lone_sample_bin_is_flagged_under_scatter() {
    let tdir = TempDir::new("visilib").unwrap();
    // The second bin holds a single sample, too few for a scatter
    // estimate.
    let mut ob = build_obs(tdir.path(), 1, &[Stokes::I], 1, &[0.0, 1.0, 2.0]);
    fill_raw(&mut ob, |ut, _, _, _, _| CmplxVis {
        re: 1.0 + ut as f32,
        im: 0.0,
        wt: 4.0,
    });
    ob.set_data_loaded();
    ob.build_index().unwrap();

    ob.average(2.0, true).unwrap();
    assert_eq!(ob.nrec, 2);
    ob.raw.set_full_window().unwrap();
    ob.raw.read(1).unwrap();
    let cv = ob.raw.pol_slice(0, 0, 0)[0];
    // The input weight magnitude is kept, negated.
    assert!(approx_eq!(f32, cv.wt, -4.0, epsilon = 1e-6));
}

#[test]
fn test_flagged_samples_seed_until_good_data_arrives() {
    let tdir = TempDir::new("visilib").unwrap();
    // One bin: a flagged 10 Jy sample followed by a good 2 Jy sample.
    // The mean must restart from the good sample.
    let mut ob = build_obs(tdir.path(), 1, &[Stokes::I], 1, &[0.0, 1.0]);
    fill_raw(&mut ob, |ut, _, _, _, _| {
        if ut == 0 {
            CmplxVis {
                re: 10.0,
                im: 0.0,
                wt: -1.0,
            }
        } else {
            CmplxVis {
                re: 2.0,
                im: 0.0,
                wt: 1.0,
            }
        }
    });
    ob.set_data_loaded();
    ob.build_index().unwrap();

    ob.average(2.0, false).unwrap();
    ob.raw.set_full_window().unwrap();
    ob.raw.read(0).unwrap();
    let cv = ob.raw.pol_slice(0, 0, 0)[0];
    assert!(approx_eq!(f32, cv.re, 2.0, epsilon = 1e-6));
    assert!(approx_eq!(f32, cv.wt, 1.0, epsilon = 1e-6));
}

#[test]
fn test_all_flagged_bin_averages_the_flagged_samples() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = build_obs(tdir.path(), 1, &[Stokes::I], 1, &[0.0, 1.0]);
    fill_raw(&mut ob, |ut, _, _, _, _| CmplxVis {
        re: 2.0 + 2.0 * ut as f32,
        im: 0.0,
        wt: -1.0,
    });
    ob.set_data_loaded();
    ob.build_index().unwrap();

    ob.average(2.0, false).unwrap();
    ob.raw.set_full_window().unwrap();
    ob.raw.read(0).unwrap();
    let cv = ob.raw.pol_slice(0, 0, 0)[0];
    assert!(approx_eq!(f32, cv.re, 3.0, epsilon = 1e-6));
    assert!(approx_eq!(f32, cv.wt, -2.0, epsilon = 1e-6));
}

#[test]
fn test_deleted_cells_stay_deleted() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = build_obs(tdir.path(), 1, &[Stokes::I], 1, &[0.0, 1.0]);
    fill_raw(&mut ob, |_, _, _, base, _| {
        if base == 1 {
            CmplxVis::default()
        } else {
            CmplxVis {
                re: 1.0,
                im: 0.0,
                wt: 1.0,
            }
        }
    });
    ob.set_data_loaded();
    ob.build_index().unwrap();

    ob.average(2.0, false).unwrap();
    ob.raw.set_full_window().unwrap();
    ob.raw.read(0).unwrap();
    assert_eq!(ob.raw.pol_slice(0, 0, 1)[0].wt, 0.0);
    assert!(ob.raw.pol_slice(0, 0, 0)[0].wt > 0.0);
    // Wholly unsampled baselines lose their U,V,W coordinates.
    assert_eq!(ob.subs[0].integs[0].vis[1].u, 0.0);
}

#[test]
fn test_bin_width_below_one_second_is_rejected() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = build_obs(tdir.path(), 1, &[Stokes::I], 1, &[0.0]);
    fill_raw(&mut ob, |_, _, _, _, _| CmplxVis {
        re: 1.0,
        im: 0.0,
        wt: 1.0,
    });
    ob.set_data_loaded();
    ob.build_index().unwrap();
    assert!(matches!(ob.average(0.5, false), Err(ObsError::BadBinWidth)));
    // Nothing changed.
    assert_eq!(ob.nrec, 1);
}

#[test]
fn test_averaging_reestablishes_the_selection() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());
    ob.select(false, None, Some(Stokes::I)).unwrap();

    ob.average(120.0, false).unwrap();
    // 4 integrations 60 s apart pair into 2 bins.
    assert_eq!(ob.nrec, 2);
    assert!(ob.ready(crate::observation::ObsState::Selected));
    assert_eq!(ob.stream.pol.as_ref().unwrap().stokes, Stokes::I);

    // The averaged stream is still the I combination, now with the
    // weight of two summed integrations.
    ob.swap_to(0).unwrap();
    let vis = &ob.subs[0].integs[0].vis[0];
    assert!(approx_eq!(f32, vis.amp, 1.5, epsilon = 1e-5));
    assert!(approx_eq!(f32, vis.wt, 64.0, epsilon = 1e-3));
}

#[test]
fn test_calibration_freezes_into_averaged_data() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());
    ob.select(false, None, Some(Stokes::I)).unwrap();

    // Double the gain of antenna 0 in every integration of IF 0.
    for ut in 0..4 {
        ob.adjust_telcor(0, 0, ut, 0, 2.0, 0.0).unwrap();
    }
    ob.average(120.0, false).unwrap();

    // The recorded corrections were cleared...
    let tcor = &ob.subs[0].integs[0].tcor[0][0];
    assert_eq!(tcor.amp_cor, 1.0);
    // ...because their effect is now in the data: baselines of
    // antenna 0 doubled in amplitude.
    ob.swap_to(0).unwrap();
    let integ = &ob.subs[0].integs[0];
    assert!(approx_eq!(f32, integ.vis[0].amp, 3.0, epsilon = 1e-4));
    assert!(approx_eq!(f32, integ.vis[2].amp, 1.5, epsilon = 1e-4));
}
