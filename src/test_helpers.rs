// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Helpers for building small synthetic observations in tests.
*/

use std::path::Path;

use crate::antenna::Antenna;
use crate::observation::{ObsDate, Observation};
use crate::polarization::Stokes;
use crate::raw_store::CmplxVis;

/// Build an unindexed observation with one sub-array of 3 antennas and
/// 3 baselines, one integration per entry of `times`, and the given
/// IF/polarization/channel dimensions. The raw store is left empty.
pub(crate) fn build_obs(
    dir: &Path,
    nif: usize,
    pols: &[Stokes],
    nchan: usize,
    times: &[f64],
) -> Observation {
    let nrec = times.len();
    let mut ob = Observation::allocate(dir, nrec, 3, 1, nif, pols, nchan).unwrap();
    ob.date = ObsDate::for_year(2000);
    ob.date.ut = times.first().copied().unwrap_or(0.0);
    ob.source.name = "TEST".to_string();
    for (cif, ifp) in ob.ifs.iter_mut().enumerate() {
        ifp.freq = 1.0e9 + cif as f64 * 1.0e8;
        ifp.df = 1.0e6;
        ifp.bw = nchan as f64 * 1.0e6;
        ifp.coff = cif * nchan;
    }
    {
        let sub = &mut ob.subs[0];
        for i in 0..3 {
            sub.antennas
                .push(Antenna::new(&format!("ANT{}", i + 1), i + 1, 0.0, 0.0, 0.0));
        }
        sub.add_baseline(0, 1);
        sub.add_baseline(0, 2);
        sub.add_baseline(1, 2);
        sub.alloc_integrations(nrec);
        for (slot, integ) in sub.integs.iter_mut().enumerate() {
            integ.ut = times[slot];
            integ.irec = slot;
            for (base, vis) in integ.vis.iter_mut().enumerate() {
                vis.u = (base + 1) as f32 * 1.0e-6;
                vis.v = -((base + 1) as f32) * 2.0e-6;
                vis.w = (base + 1) as f32 * 0.5e-6;
                vis.dt = 1.0;
            }
        }
    }
    ob
}

/// Fill the raw store by evaluating `f(ut, cif, chan, base, pol)` for
/// every cell of every integration.
pub(crate) fn fill_raw<F>(ob: &mut Observation, mut f: F)
where
    F: FnMut(usize, usize, usize, usize, usize) -> CmplxVis,
{
    ob.raw.set_full_window().unwrap();
    for ut in 0..ob.nrec {
        ob.raw.clear(Some(ut));
        for cif in 0..ob.nif {
            for chan in 0..ob.nchan {
                for base in 0..3 {
                    for pol in 0..ob.npol {
                        let i = ob.raw.vis_index(cif, chan, base, pol);
                        ob.raw.buffer_mut()[i] = f(ut, cif, chan, base, pol);
                    }
                }
            }
        }
        ob.raw.write(ut).unwrap();
    }
}

/// The standard test observation: 2 IFs of 4 channels, RR and LL, 4
/// integrations 60 s apart, every cell holding re = 1 + pol, im = 0,
/// wt = 4. Indexed and ready for stream selection.
pub(crate) fn standard_obs(dir: &Path) -> Observation {
    let mut ob = build_obs(
        dir,
        2,
        &[Stokes::RR, Stokes::LL],
        4,
        &[1000.0, 1060.0, 1120.0, 1180.0],
    );
    fill_raw(&mut ob, |_, _, _, _, pol| CmplxVis {
        re: 1.0 + pol as f32,
        im: 0.0,
        wt: 4.0,
    });
    ob.set_data_loaded();
    ob.build_index().unwrap();
    ob
}
