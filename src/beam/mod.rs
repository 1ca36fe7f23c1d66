// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Antenna voltage beams and primary-beam responses.

The voltage beam of an antenna is its voltage response as a function of
angular radius from the beam center, assumed circularly symmetric and
held as a dense radial sample array. Beams are interned: constructing a
beam with attributes identical to an existing one returns a handle to
the existing instance. The primary-beam response of a baseline is the
product of the voltage beams of its two antennas.
*/

use std::rc::{Rc, Weak};

use crate::checksum::CheckSum;
use crate::observation::{ObsError, ObsState, Observation};
use crate::subarray::Subarray;

pub mod error;
pub use error::BeamError;


/// The radial voltage response of one antenna.
#[derive(Debug)]
pub struct VoltageBeam {
    /// Samples of the voltage beam; element i is the response at
    /// radius `i * binwidth`. The beam beyond the last sample is zero.
    samples: Vec<f32>,
    /// The radial width covered by each sample (radians).
    binwidth: f32,
    /// The frequency the samples and binwidth refer to (Hz). Values
    /// at other frequencies scale the radius linearly with frequency.
    freq: f32,
    /// A checksum of the byte image of `samples`, used as the interning
    /// identity.
    sum: u32,
}

impl VoltageBeam {
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn binwidth(&self) -> f32 {
        self.binwidth
    }

    pub fn freq(&self) -> f32 {
        self.freq
    }

    pub fn checksum(&self) -> u32 {
        self.sum
    }

    /// Interpolate the voltage beam at a given radius and frequency.
    ///
    /// Radii below the sampled range clamp to the first sample; radii
    /// at or beyond the end of the sampled range return 0.
    pub fn response(&self, radius: f32, freq: f32) -> f32 {
        let fbin = radius / self.binwidth * (freq / self.freq);
        let ia = fbin.floor() as i64;
        let ib = fbin.ceil() as i64;
        if ia < 0 {
            self.samples[0]
        } else if ib >= self.samples.len() as i64 {
            0.0
        } else if ia == ib {
            self.samples[ia as usize]
        } else {
            let va = self.samples[ia as usize];
            let vb = self.samples[ib as usize];
            va + (fbin - ia as f32) / (ib - ia) as f32 * (vb - va)
        }
    }
}

/// Interpolate an optional voltage beam. An antenna with no assigned
/// beam is taken to have unit response everywhere.
pub fn voltage_beam(vb: Option<&VoltageBeam>, radius: f32, freq: f32) -> f32 {
    vb.map_or(1.0, |vb| vb.response(radius, freq))
}

/// The ensemble of interned voltage beams of an observation.
///
/// To save memory, requests for a beam with the same attributes as an
/// existing one return a handle to the existing instance.
pub struct AntennaBeams {
    beams: Vec<Weak<VoltageBeam>>,
    cksum: CheckSum,
}

impl AntennaBeams {
    pub fn new() -> AntennaBeams {
        AntennaBeams {
            beams: Vec::new(),
            cksum: CheckSum::new(),
        }
    }

    /// Get a handle to a voltage beam with the given attributes,
    /// reusing an existing instance when the checksum of the samples
    /// and the remaining attributes all match.
    pub fn intern(
        &mut self,
        samples: &[f32],
        binwidth: f32,
        freq: f32,
    ) -> Result<Rc<VoltageBeam>, BeamError> {
        if samples.len() < 2 {
            return Err(BeamError::TooFewSamples(samples.len()));
        }
        if binwidth <= 0.0 {
            return Err(BeamError::BadBinWidth(binwidth));
        }
        if freq <= 0.0 {
            return Err(BeamError::BadFrequency(freq));
        }
        let sum = self.cksum.sum(bytemuck::cast_slice(samples));
        // Drop handles to beams nobody references any more.
        self.beams.retain(|w| w.strong_count() > 0);
        for weak in &self.beams {
            if let Some(vb) = weak.upgrade() {
                if vb.sum == sum
                    && vb.samples.len() == samples.len()
                    && vb.binwidth == binwidth
                    && vb.freq == freq
                {
                    return Ok(vb);
                }
            }
        }
        let vb = Rc::new(VoltageBeam {
            samples: samples.to_vec(),
            binwidth,
            freq,
            sum,
        });
        self.beams.push(Rc::downgrade(&vb));
        Ok(vb)
    }

    /// The total number of live references to interned beams.
    pub fn ref_count(&self) -> usize {
        self.beams.iter().map(|w| w.strong_count()).sum()
    }
}

impl Default for AntennaBeams {
    fn default() -> AntennaBeams {
        AntennaBeams::new()
    }
}

/// The primary beam factor of one baseline at a given radius from the
/// pointing center and a given frequency. If neither antenna has a
/// voltage beam the response is 1.
pub fn baseline_response(sub: &Subarray, base: usize, freq: f64, radius: f32) -> f32 {
    let bl = &sub.baselines[base];
    let va = sub.antennas[bl.ant_a].beam.as_deref();
    let vb = sub.antennas[bl.ant_b].beam.as_deref();
    if va.is_none() && vb.is_none() {
        return 1.0;
    }
    voltage_beam(va, radius, freq as f32) * voltage_beam(vb, radius, freq as f32)
}

impl Observation {
    /// Assign a voltage beam to one antenna, or remove its beam by
    /// passing None.
    pub fn set_antenna_beam(
        &mut self,
        isub: usize,
        itel: usize,
        beam: Option<(&[f32], f32, f32)>,
    ) -> Result<(), ObsError> {
        if isub >= self.nsub {
            return Err(ObsError::SubIndex {
                isub,
                nsub: self.nsub,
            });
        }
        if itel >= self.subs[isub].nstat() {
            return Err(ObsError::TelIndex { itel });
        }
        let vb = match beam {
            Some((samples, binwidth, freq)) => {
                Some(self.beams.intern(samples, binwidth, freq)?)
            }
            None => None,
        };
        self.subs[isub].antennas[itel].beam = vb;
        Ok(())
    }

    /// Set the voltage beam of every antenna to the square root of a
    /// given primary beam, or remove all beams by passing None.
    pub fn set_primary_beam(&mut self, beam: Option<(&[f32], f32, f32)>) -> Result<(), ObsError> {
        let vb = match beam {
            Some((samples, binwidth, freq)) => {
                let vsamples: Vec<f32> = samples.iter().map(|s| s.abs().sqrt()).collect();
                Some(self.beams.intern(&vsamples, binwidth, freq)?)
            }
            None => None,
        };
        for sub in &mut self.subs {
            for ant in &mut sub.antennas {
                ant.beam = vb.clone();
            }
        }
        Ok(())
    }

    /// The primary-beam scale factor at a given radius from the
    /// pointing center, averaged over all sub-arrays, baselines and
    /// IFs, weighted by the per-baseline sums of visibility weights.
    pub fn pb_scale_factor(&mut self, radius: f32) -> Result<f32, ObsError> {
        self.require(ObsState::Selected, "pb_scale_factor")?;
        // Bring the per-baseline weight sums up to date.
        self.update_baseline_weights(None)?;
        let mut mean = 0.0f64;
        let mut wtsum = 0.0f64;
        for sub in &self.subs {
            for base in 0..sub.nbase() {
                for cif in 0..self.nif {
                    let wt = sub.baselines[base].wtsum[cif] as f64;
                    if wt > 0.0 {
                        let pb =
                            baseline_response(sub, base, self.ifs[cif].freq, radius) as f64;
                        wtsum += wt;
                        mean += (pb - mean) * wt / wtsum;
                    }
                }
            }
        }
        Ok(mean as f32)
    }

    /// Correct the flux of a delta model component for the combined
    /// primary beams of all baselines in all IFs.
    pub fn pb_correct_delta(&mut self, cmp: &mut crate::model::ModComp) -> Result<(), ObsError> {
        let radius = self.pointing_offset(cmp.x, cmp.y);
        let factor = self.pb_scale_factor(radius)?;
        if factor == 0.0 {
            cmp.flux = 0.0;
        } else {
            cmp.flux /= factor;
        }
        Ok(())
    }
}
