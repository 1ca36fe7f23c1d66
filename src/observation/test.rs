// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::*;
use crate::chan_list::ChanList;
use crate::model::{ModComp, Model};
use crate::subarray::{VisFlags, Visibility};
use crate::test_helpers::{build_obs, fill_raw, standard_obs};
use crate::raw_store::CmplxVis;
use crate::time_index::TimeOp;
use float_cmp::approx_eq;
use tempdir::TempDir;

/// Snapshot the in-memory visibilities of every integration.
fn snapshot(ob: &Observation) -> Vec<Visibility> {
    let mut out = Vec::new();
    for sub in &ob.subs {
        for integ in &sub.integs {
            out.extend_from_slice(&integ.vis);
        }
    }
    out
}

#[test]
fn test_state_machine_gates_operations() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = build_obs(tdir.path(), 2, &[Stokes::RR, Stokes::LL], 4, &[0.0]);

    // Selection requires an indexed observation.
    assert!(matches!(
        ob.select(false, None, None),
        Err(ObsError::State { op: "select", .. })
    ));

    fill_raw(&mut ob, |_, _, _, _, _| CmplxVis {
        re: 1.0,
        im: 0.0,
        wt: 1.0,
    });
    ob.set_data_loaded();
    ob.build_index().unwrap();
    assert_eq!(ob.state, ObsState::Indexed);

    // Swapping requires a selection.
    assert!(matches!(
        ob.swap_to(0),
        Err(ObsError::State { op: "swap_to", .. })
    ));

    ob.select(false, None, None).unwrap();
    assert_eq!(ob.state, ObsState::Selected);
    ob.swap_to(1).unwrap();
    assert_eq!(ob.state, ObsState::IfResident);
    assert_eq!(ob.current_if(), Some(1));
}

#[test]
fn test_index_is_time_ordered() {
    let tdir = TempDir::new("visilib").unwrap();
    let ob = standard_obs(tdir.path());
    assert_eq!(ob.rec.len(), 4);
    let times: Vec<f64> = (0..ob.nrec).map(|i| ob.rec_integ(i).ut).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));

    assert_eq!(ob.find_time(1100.0, TimeOp::AtOrBefore), Some(1));
    assert_eq!(ob.find_time(1100.0, TimeOp::AtOrAfter), Some(2));
}

#[test]
fn test_select_composes_stokes_i_stream() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());

    // The default request synthesizes I from the recorded RR and LL.
    ob.select(false, None, None).unwrap();
    let pol = ob.stream.pol.as_ref().unwrap();
    assert_eq!(pol.stokes, Stokes::I);
    assert_eq!(ob.stream.cl.as_ref().unwrap().bounds(), (0, 7));
    // Both IFs carry 4 selected channels.
    for ifp in &ob.ifs {
        assert_eq!(ifp.cl.as_ref().unwrap().num_channels(), 4);
    }

    ob.swap_to(0).unwrap();
    for sub in &ob.subs {
        for integ in &sub.integs {
            for vis in &integ.vis {
                assert!(approx_eq!(f32, vis.amp, 1.5, epsilon = 1e-6));
                assert!(approx_eq!(f32, vis.phs, 0.0, epsilon = 1e-6));
                // Four channels of weight 8 combine to n^2/sum(1/w).
                assert!(approx_eq!(f32, vis.wt, 32.0, epsilon = 1e-4));
                assert!(vis.bad.is_empty());
            }
        }
    }
}

#[test]
fn test_select_channel_subset_marks_unsampled_ifs() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());

    // Channels 1..3 fall entirely within IF 0.
    let mut cl = ChanList::new();
    cl.add(1, 3);
    ob.select(false, Some(cl), Some(Stokes::I)).unwrap();
    assert!(ob.ifs[0].cl.is_some());
    assert!(ob.ifs[1].cl.is_none());
    assert_eq!(ob.sampled_ifs(), vec![0]);

    // Swapping in the unsampled IF zero-fills it.
    ob.swap_to(1).unwrap();
    for vis in &ob.subs[0].integs[0].vis {
        assert_eq!(vis.wt, 0.0);
        assert!(vis.bad.contains(VisFlags::DELETED));
    }

    // The sampled IF combines its three channels.
    ob.swap_to(0).unwrap();
    let vis = &ob.subs[0].integs[0].vis[0];
    assert!(approx_eq!(f32, vis.amp, 1.5, epsilon = 1e-6));
    assert!(approx_eq!(f32, vis.wt, 24.0, epsilon = 1e-4));
}

#[test]
fn test_selection_out_of_range_channels_is_an_error() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());
    let mut cl = ChanList::new();
    cl.add(100, 200);
    assert!(matches!(
        ob.select(false, Some(cl), Some(Stokes::I)),
        Err(ObsError::NoChannels)
    ));
    // The failed selection left no half-selected state behind.
    assert_eq!(ob.state, ObsState::Indexed);
}

#[test]
fn test_swap_round_trip_preserves_visibilities() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());
    ob.select(false, None, None).unwrap();

    ob.swap_to(0).unwrap();
    let before = snapshot(&ob);
    ob.swap_to(1).unwrap();
    ob.swap_to(0).unwrap();
    let after = snapshot(&ob);
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert!(approx_eq!(f32, a.amp, b.amp, epsilon = 1e-6));
        assert!(approx_eq!(f32, a.phs, b.phs, epsilon = 1e-6));
        assert!(approx_eq!(f32, a.wt, b.wt, epsilon = 1e-4));
        assert_eq!(a.bad, b.bad);
    }
}

#[test]
fn test_reselection_is_idempotent() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());

    ob.select(false, None, Some(Stokes::I)).unwrap();
    ob.swap_to(0).unwrap();
    let first = snapshot(&ob);

    ob.select(false, None, Some(Stokes::I)).unwrap();
    ob.swap_to(0).unwrap();
    let second = snapshot(&ob);
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.amp, b.amp);
        assert_eq!(a.phs, b.phs);
        assert_eq!(a.wt, b.wt);
        assert_eq!(a.modamp, b.modamp);
    }
}

#[test]
fn test_single_if_observation_is_always_resident() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = build_obs(tdir.path(), 1, &[Stokes::I], 4, &[0.0, 60.0]);
    fill_raw(&mut ob, |_, _, _, _, _| CmplxVis {
        re: 2.0,
        im: 0.0,
        wt: 1.0,
    });
    ob.set_data_loaded();
    ob.build_index().unwrap();
    assert!(ob.ifdata.is_none());
    assert!(ob.uvmodel.is_none());

    // Selection of a single-IF data set runs the correction pipeline
    // immediately.
    ob.select(false, None, None).unwrap();
    assert_eq!(ob.state, ObsState::IfResident);
    assert!(approx_eq!(
        f32,
        ob.subs[0].integs[0].vis[0].amp,
        2.0,
        epsilon = 1e-6
    ));
}

#[test]
fn test_weight_scaling_is_multiplicative() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());
    ob.select(false, None, None).unwrap();
    ob.swap_to(0).unwrap();
    let wt0 = ob.subs[0].integs[0].vis[0].wt;

    // scale(2) then scale(6) must equal scale(6) directly, because the
    // recorded factor is absolute.
    ob.scale_weights(2.0).unwrap();
    ob.scale_weights(6.0).unwrap();
    assert!(approx_eq!(
        f32,
        ob.subs[0].integs[0].vis[0].wt,
        wt0 * 6.0,
        epsilon = 1e-3
    ));
    assert!(approx_eq!(f32, ob.geom.wtscale, 6.0, epsilon = 1e-6));

    // The recorded scale survives a swap away and back.
    ob.swap_to(1).unwrap();
    ob.swap_to(0).unwrap();
    assert!(approx_eq!(
        f32,
        ob.subs[0].integs[0].vis[0].wt,
        wt0 * 6.0,
        epsilon = 1e-3
    ));

    assert!(matches!(
        ob.scale_weights(0.0),
        Err(ObsError::BadWeightScale)
    ));
}

#[test]
fn test_shift_is_reversible() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());
    ob.select(false, None, None).unwrap();
    ob.swap_to(0).unwrap();
    let before = snapshot(&ob);

    let east = 2.0e-7;
    let north = -1.0e-7;
    ob.shift(east, north).unwrap();
    // The phases moved.
    assert!(!approx_eq!(
        f32,
        ob.subs[0].integs[0].vis[2].phs,
        before[2].phs,
        epsilon = 1e-6
    ));
    ob.shift(-east, -north).unwrap();
    for (a, b) in snapshot(&ob).iter().zip(&before) {
        assert!(approx_eq!(f32, a.phs, b.phs, epsilon = 1e-4));
    }
    assert!(approx_eq!(f32, ob.geom.east, 0.0, epsilon = 1e-12));
    assert!(approx_eq!(f32, ob.geom.north, 0.0, epsilon = 1e-12));

    // unshift() removes whatever shift is recorded.
    ob.shift(east, north).unwrap();
    ob.unshift().unwrap();
    assert_eq!(ob.geom.east, 0.0);
    assert_eq!(ob.geom.north, 0.0);
}

#[test]
fn test_rotation_rotates_uv_coordinates() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());
    ob.select(false, None, None).unwrap();
    ob.swap_to(0).unwrap();
    let u0 = ob.subs[0].integs[0].vis[0].u;
    let v0 = ob.subs[0].integs[0].vis[0].v;

    let angle = std::f32::consts::FRAC_PI_2;
    ob.rotate(angle).unwrap();
    let vis = &ob.subs[0].integs[0].vis[0];
    assert!(approx_eq!(f32, vis.u, v0, epsilon = 1e-9));
    assert!(approx_eq!(f32, vis.v, -u0, epsilon = 1e-9));
    assert!(approx_eq!(f32, ob.geom.uvangle, angle, epsilon = 1e-6));
}

#[test]
fn test_telescope_corrections_apply_and_clear() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());
    ob.select(false, None, None).unwrap();
    ob.swap_to(0).unwrap();
    let vis0 = ob.subs[0].integs[0].vis[0];

    // Adjust antenna 0 of integration 0 in the resident IF: baselines
    // 0 (0-1) and 1 (0-2) feel it, baseline 2 (1-2) doesn't.
    ob.adjust_telcor(0, 0, 0, 0, 2.0, 0.25).unwrap();
    {
        let integ = &ob.subs[0].integs[0];
        assert!(approx_eq!(f32, integ.vis[0].amp, vis0.amp * 2.0, epsilon = 1e-5));
        assert!(approx_eq!(f32, integ.vis[0].phs, vis0.phs + 0.25, epsilon = 1e-5));
        assert!(approx_eq!(f32, integ.vis[0].wt, vis0.wt / 4.0, epsilon = 1e-4));
        assert!(approx_eq!(f32, integ.vis[2].amp, vis0.amp, epsilon = 1e-5));
    }

    // The correction is recorded, so it survives a swap round trip.
    ob.swap_to(1).unwrap();
    ob.swap_to(0).unwrap();
    assert!(approx_eq!(
        f32,
        ob.subs[0].integs[0].vis[0].amp,
        vis0.amp * 2.0,
        epsilon = 1e-5
    ));

    // Clearing restores the uncorrected values.
    ob.clear_telcor(0, 0, 0, 0).unwrap();
    assert!(approx_eq!(
        f32,
        ob.subs[0].integs[0].vis[0].amp,
        vis0.amp,
        epsilon = 1e-5
    ));

    // Flagging an antenna marks its baselines bad.
    ob.edit_telcor(0, 0, 0, 1, true).unwrap();
    let integ = &ob.subs[0].integs[0];
    assert!(integ.vis[0].bad.contains(VisFlags::ANT_B_BAD));
    assert!(integ.vis[2].bad.contains(VisFlags::ANT_A_BAD));
    assert!(integ.vis[1].bad.is_empty());
}

#[test]
fn test_baseline_weight_sums_update_lazily() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());
    ob.select(false, None, None).unwrap();
    assert!(ob.ifs.iter().all(|ifp| ifp.wtsum_stale));

    ob.update_baseline_weights(None).unwrap();
    assert!(ob.ifs.iter().all(|ifp| !ifp.wtsum_stale));
    for bl in &ob.subs[0].baselines {
        for cif in 0..ob.nif {
            // 4 integrations of weight 32 each.
            assert!(approx_eq!(f32, bl.wtsum[cif], 128.0, epsilon = 1e-3));
        }
    }

    // Without voltage beams every baseline responds with unity, so
    // the weighted mean response is 1.
    let factor = ob.pb_scale_factor(0.0).unwrap();
    assert!(approx_eq!(f32, factor, 1.0, epsilon = 1e-6));
}

#[test]
fn test_delta_flux_correction_for_primary_beam() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());
    ob.select(false, None, None).unwrap();

    // A flat 0.25 primary beam sampled out to 0.04 rad: every antenna
    // gets a 0.5 voltage beam, so every baseline responds with 0.25.
    ob.set_primary_beam(Some((&[0.25, 0.25, 0.25, 0.25], 0.01, 1.0e9)))
        .unwrap();

    // A centered delta's apparent flux is suppressed by the mean
    // response, so the correction divides it back up.
    let mut cmp = ModComp::delta(1.0, 0.0, 0.0);
    ob.pb_correct_delta(&mut cmp).unwrap();
    assert!(approx_eq!(f32, cmp.flux, 4.0, epsilon = 1e-4));

    // Beyond the sampled beam the response is zero; rather than
    // dividing, the flux is forced to zero.
    let mut far = ModComp::delta(1.0, 0.5, 0.0);
    ob.pb_correct_delta(&mut far).unwrap();
    assert_eq!(far.flux, 0.0);
}

#[test]
fn test_established_model_synchronizes_uv_representation() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());
    ob.select(false, None, None).unwrap();

    // Establish a centered 1 Jy delta.
    let mut mod_ = Model::new();
    mod_.add(ModComp::delta(1.0, 0.0, 0.0), false).unwrap();
    ob.add_model(&mut mod_, true, false, true).unwrap();
    assert!(ob.has_model);
    assert_eq!(ob.model.ncmp(), 1);
    assert!(approx_eq!(f32, ob.uvzero.modamp, 1.0, epsilon = 1e-6));

    // Every visibility of every IF has the delta's flat transform.
    for cif in 0..ob.nif {
        ob.swap_to(cif).unwrap();
        for sub in &ob.subs {
            for integ in &sub.integs {
                for vis in &integ.vis {
                    assert!(approx_eq!(f32, vis.modamp, 1.0, epsilon = 1e-5));
                    assert!(approx_eq!(f32, vis.modphs, 0.0, epsilon = 1e-5));
                }
            }
        }
    }

    // Clearing the established model zeroes every model visibility,
    // in memory and in the model store.
    ob.clear_model(true, false, false).unwrap();
    assert!(!ob.has_model);
    assert!(ob.model.is_empty());
    assert_eq!(ob.uvzero.modamp, 0.0);
    for cif in 0..ob.nif {
        ob.swap_to(cif).unwrap();
        for sub in &ob.subs {
            for integ in &sub.integs {
                for vis in &integ.vis {
                    assert_eq!(vis.modamp, 0.0);
                    assert_eq!(vis.modphs, 0.0);
                }
            }
        }
    }
}

#[test]
fn test_offcenter_delta_has_position_phase() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());
    ob.select(false, None, None).unwrap();
    ob.swap_to(0).unwrap();

    let x = 1.0e-7;
    let mut mod_ = Model::new();
    mod_.add(ModComp::delta(1.0, x, 0.0), false).unwrap();
    ob.add_model(&mut mod_, true, false, true).unwrap();

    let uvscale = ob.stream.uvscale;
    for integ in &ob.subs[0].integs {
        for vis in &integ.vis {
            let expect = std::f32::consts::TAU * vis.u * uvscale * x;
            // The phase is reduced by atan2; compare as complex
            // directions.
            assert!(approx_eq!(
                f32,
                (vis.modphs - expect).sin(),
                0.0,
                epsilon = 1e-4
            ));
            assert!(approx_eq!(f32, vis.modamp, 1.0, epsilon = 1e-5));
        }
    }
}

#[test]
fn test_merge_model_promotes_and_demotes() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());
    ob.select(false, None, None).unwrap();

    let mut mod_ = Model::new();
    mod_.add(ModComp::delta(2.0, 0.0, 0.0), false).unwrap();
    ob.add_model(&mut mod_, false, false, true).unwrap();
    assert_eq!(ob.newmod.ncmp(), 1);
    assert!(!ob.has_model);

    // Promotion establishes the tentative model and computes its UV
    // representation.
    ob.merge_model(true).unwrap();
    assert!(ob.newmod.is_empty());
    assert_eq!(ob.model.ncmp(), 1);
    assert!(ob.has_model);
    ob.swap_to(0).unwrap();
    assert!(approx_eq!(
        f32,
        ob.subs[0].integs[0].vis[0].modamp,
        2.0,
        epsilon = 1e-5
    ));

    // Demotion moves the components back and clears the UV model.
    ob.merge_model(false).unwrap();
    assert!(ob.model.is_empty());
    assert_eq!(ob.newmod.ncmp(), 1);
    assert!(!ob.has_model);
    ob.swap_to(0).unwrap();
    assert_eq!(ob.subs[0].integs[0].vis[0].modamp, 0.0);
}

#[test]
fn test_model_table_follows_selection_changes() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());
    ob.select(false, None, Some(Stokes::I)).unwrap();

    let mut mod_ = Model::new();
    mod_.add(ModComp::delta(1.0, 0.0, 0.0), false).unwrap();
    ob.add_model(&mut mod_, false, false, true).unwrap();

    // Selecting RR without keeping the model parks the I model.
    ob.select(false, None, Some(Stokes::RR)).unwrap();
    assert!(ob.newmod.is_empty());
    assert_eq!(ob.mtab.len(), 1);

    // Re-selecting I restores it (and removes the table entry).
    ob.select(false, None, Some(Stokes::I)).unwrap();
    assert_eq!(ob.newmod.ncmp(), 1);
    assert_eq!(ob.mtab.len(), 1); // the RR entry parked in exchange

    // With keep_model the model follows the selection instead.
    let mut mod2 = Model::new();
    mod2.add(ModComp::delta(3.0, 0.0, 0.0), false).unwrap();
    ob.add_model(&mut mod2, false, false, true).unwrap();
    ob.select(true, None, Some(Stokes::LL)).unwrap();
    assert!(!ob.newmod.is_empty());
}

#[test]
fn test_unavailable_polarization_falls_back_to_default() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());
    // Q needs RL and LR, which were not recorded; the default (I) is
    // substituted.
    ob.select(false, None, Some(Stokes::Q)).unwrap();
    assert_eq!(ob.stream.pol.as_ref().unwrap().stokes, Stokes::I);
}

#[test]
fn test_sel_freq_weights_selected_channels() {
    let tdir = TempDir::new("visilib").unwrap();
    let mut ob = standard_obs(tdir.path());
    ob.select(false, None, None).unwrap();
    // IF 0: channels 0..3 of 1.0e9 + n*1.0e6: mean 1.0000015e9.
    let f0 = ob.sel_freq(Some(0)).unwrap();
    assert!(approx_eq!(f64, f0, 1.0e9 + 1.5e6, epsilon = 1.0));
    // All IFs: mean of the two IF means.
    let fall = ob.sel_freq(None).unwrap();
    assert!(approx_eq!(f64, fall, 1.05e9 + 1.5e6, epsilon = 1.0));
    // Selected bandwidth: 8 channels of 1 MHz.
    let bw = ob.sel_bandwidth(None).unwrap();
    assert!(approx_eq!(f64, bw, 8.0e6, epsilon = 1.0));
}

#[test]
fn test_mjd_of_year_start() {
    // MJD 51544 is 2000 January 1.
    assert_eq!(mjd_of_year_start(2000), 51544.0);
    // 1858 November 17 is the MJD epoch itself.
    assert_eq!(mjd_of_year_start(1859), 45.0);
}
