// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Sky-model component lists.

A model is an ordered list of parameterized components (deltas,
Gaussians, disks, ...). Components move between lists rather than
being shared: establishing, demoting, windowing and partitioning a
model all splice components from one list into another, preserving
their order. The text form of a model is one component per line with
optional `v` postfixes marking free parameters.
*/

use std::io::{self, BufRead, Write};

use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

use crate::{DEG_TO_RAD, MAS_TO_RAD, RAD_TO_DEG, RAD_TO_MAS};

pub mod error;
pub use error::ModelError;

#[cfg(test)]
mod test;

/// A bitmap of the free parameters of a model component.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FreeParams(u16);

impl FreeParams {
    /// The component flux is free.
    pub const FLUX: FreeParams = FreeParams(1);
    /// The component center is free.
    pub const CENTER: FreeParams = FreeParams(2);
    /// The major axis is free.
    pub const MAJOR: FreeParams = FreeParams(4);
    /// The axial ratio is free.
    pub const RATIO: FreeParams = FreeParams(8);
    /// The major-axis position angle is free.
    pub const PHI: FreeParams = FreeParams(16);
    /// The spectral index is free.
    pub const SPCIND: FreeParams = FreeParams(32);

    pub const fn empty() -> FreeParams {
        FreeParams(0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: FreeParams) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: FreeParams) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: FreeParams) {
        self.0 &= !other.0;
    }
}

/// Recognized model component shapes. The integer codes are those of
/// the model text format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
pub enum ModShape {
    Delta = 0,
    Gaussian = 1,
    Disk = 2,
    /// An optically-thin spherical shell.
    Shell = 3,
    Ring = 4,
    Rectangle = 5,
    /// A Sunyaev-Zel'dovich profile.
    SzProfile = 6,
}

/// One model component.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModComp {
    /// The component shape.
    pub shape: ModShape,
    /// Which parameters model fitting may vary.
    pub free: FreeParams,
    /// Flux of the component at `freq0` (Jy).
    pub flux: f32,
    /// Eastward offset of the component centroid (radians).
    pub x: f32,
    /// Northward offset of the component centroid (radians).
    pub y: f32,
    /// Major axis (radians).
    pub major: f32,
    /// Axial ratio (minor/major), <= 1.
    pub ratio: f32,
    /// Position angle of the major axis (radians, north through east).
    pub phi: f32,
    /// The reference frequency of the flux (Hz); 0 when no spectral
    /// index is in use.
    pub freq0: f32,
    /// The spectral index of the component flux.
    pub spcind: f32,
}

impl ModComp {
    /// A delta component of a given flux at a given position.
    pub fn delta(flux: f32, x: f32, y: f32) -> ModComp {
        ModComp {
            shape: ModShape::Delta,
            free: FreeParams::empty(),
            flux,
            x,
            y,
            major: 0.0,
            ratio: 1.0,
            phi: 0.0,
            freq0: 0.0,
            spcind: 0.0,
        }
    }

    /// True if this and `other` are delta components at the same
    /// position with the same spectral index, and may therefore be
    /// merged by summing fluxes.
    fn merges_with(&self, other: &ModComp) -> bool {
        self.shape == ModShape::Delta
            && other.shape == ModShape::Delta
            && self.x == other.x
            && self.y == other.y
            && self.spcind == other.spcind
    }

    /// The flux of this component expressed at another component's
    /// reference frequency.
    fn flux_at_ref(&self, target: &ModComp) -> f32 {
        if self.spcind != 0.0 && self.freq0 != target.freq0 {
            self.flux * (target.freq0 / self.freq0).powf(self.spcind)
        } else {
            self.flux
        }
    }
}

/// An axis-aligned rectangular map window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MapWindow {
    pub xa: f32,
    pub xb: f32,
    pub ya: f32,
    pub yb: f32,
}

impl MapWindow {
    /// True if the window contains the given position. The corners may
    /// be given in either order.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let (xa, xb) = if self.xa <= self.xb {
            (self.xa, self.xb)
        } else {
            (self.xb, self.xa)
        };
        let (ya, yb) = if self.ya <= self.yb {
            (self.ya, self.yb)
        } else {
            (self.yb, self.ya)
        };
        x >= xa && x <= xb && y >= ya && y <= yb
    }
}

/// An ordered list of model components.
#[derive(Clone, Debug)]
pub struct Model {
    comps: Vec<ModComp>,
    /// The summed flux of the components.
    flux: f32,
    /// True if all coincident deltas are known to be merged.
    squashed: bool,
    /// True if the model consists only of continuum delta components.
    delta_only: bool,
}

impl Default for Model {
    fn default() -> Model {
        Model::new()
    }
}

impl Model {
    /// Create a new, empty model.
    pub fn new() -> Model {
        Model {
            comps: Vec::new(),
            flux: 0.0,
            // Until proved otherwise the model is squashed and formed
            // from delta components only.
            squashed: true,
            delta_only: true,
        }
    }

    pub fn ncmp(&self) -> usize {
        self.comps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comps.is_empty()
    }

    /// The summed flux of the components (Jy).
    pub fn total_flux(&self) -> f32 {
        self.flux
    }

    pub fn is_squashed(&self) -> bool {
        self.squashed
    }

    pub fn is_delta_only(&self) -> bool {
        self.delta_only
    }

    /// The components in their list order.
    pub fn comps(&self) -> &[ModComp] {
        &self.comps
    }

    /// Remove and return all components, leaving the model empty.
    pub fn take_comps(&mut self) -> Vec<ModComp> {
        let comps = std::mem::take(&mut self.comps);
        self.reset_stats();
        comps
    }

    fn reset_stats(&mut self) {
        self.flux = 0.0;
        self.squashed = true;
        self.delta_only = true;
    }

    /// Remove every component.
    pub fn clear(&mut self) {
        self.comps.clear();
        self.reset_stats();
    }

    /// Append a component, merging coincident deltas when `combine` is
    /// given.
    ///
    /// Fails if the component carries a spectral index (or a free
    /// spectral-index parameter) without a usable reference frequency.
    pub fn add(&mut self, cmp: ModComp, combine: bool) -> Result<(), ModelError> {
        if (cmp.spcind != 0.0 || cmp.free.contains(FreeParams::SPCIND)) && cmp.freq0 <= 0.0 {
            return Err(ModelError::BadRefFreq);
        }
        self.push_merge(cmp, combine);
        Ok(())
    }

    /// Append a pre-validated component, merging coincident deltas
    /// when `combine` is given.
    fn push_merge(&mut self, cmp: ModComp, combine: bool) {
        if combine && cmp.shape == ModShape::Delta {
            for target in &mut self.comps {
                if cmp.merges_with(target) {
                    let flux = cmp.flux_at_ref(target);
                    target.free.insert(cmp.free);
                    target.flux += flux;
                    self.flux += flux;
                    return;
                }
            }
        }
        self.flux += cmp.flux;
        self.squashed = self.comps.is_empty() || (self.squashed && combine);
        self.delta_only = self.delta_only
            && cmp.shape == ModShape::Delta
            && cmp.spcind == 0.0
            && !cmp.free.contains(FreeParams::SPCIND);
        self.comps.push(cmp);
    }

    /// Remove and return the component at `index`.
    pub fn remove(&mut self, index: usize) -> ModComp {
        let cmp = self.comps.remove(index);
        self.flux -= cmp.flux;
        if self.comps.is_empty() {
            self.reset_stats();
        }
        cmp
    }

    /// Merge coincident delta components by summing their fluxes.
    ///
    /// Two deltas merge when they share a position and spectral index;
    /// a nonzero shared spectral index rescales the merged flux to the
    /// surviving component's reference frequency.
    pub fn squash(&mut self) {
        if self.squashed {
            return;
        }
        let comps = std::mem::take(&mut self.comps);
        self.reset_stats();
        for cmp in comps {
            self.push_merge(cmp, cmp.shape == ModShape::Delta);
        }
        self.squashed = true;
    }

    /// Move all of `other`'s components into this model, appending or
    /// prepending, optionally merging coincident deltas. `other` is
    /// left empty.
    pub fn concat(&mut self, other: &mut Model, combine: bool, append: bool) {
        if combine {
            self.squash();
            other.squash();
        }
        // Only appends are directly expressible, so a prepend first
        // swaps the two lists.
        if !append {
            std::mem::swap(self, other);
        }
        for cmp in other.take_comps() {
            self.push_merge(cmp, combine);
        }
    }

    /// Move the components with free parameters into `variable`,
    /// keeping the fixed components here, preserving temporal order on
    /// both sides.
    pub fn partition_variable(&mut self, variable: &mut Model) {
        // First move this model's variable components to the tail of
        // `variable`, then sweep the combined list for fixed ones.
        let mine = self.take_comps();
        for cmp in mine {
            if cmp.free.is_empty() {
                self.push_merge(cmp, true);
            } else {
                variable.push_merge(cmp, true);
            }
        }
        let theirs = variable.take_comps();
        for cmp in theirs {
            if cmp.free.is_empty() {
                self.push_merge(cmp, true);
            } else {
                variable.push_merge(cmp, true);
            }
        }
    }

    /// Partition the components by the given windows. Components lying
    /// inside any window are returned as a new model; the rest remain.
    pub fn partition_windows(&mut self, windows: &[MapWindow]) -> Model {
        let mut inside = Model::new();
        let comps = self.take_comps();
        for cmp in comps {
            if windows.iter().any(|w| w.contains(cmp.x, cmp.y)) {
                inside.push_merge(cmp, false);
            } else {
                self.push_merge(cmp, false);
            }
        }
        inside
    }

    /// Shift the centroids of all components.
    pub fn shift_positions(&mut self, east: f32, north: f32) {
        for cmp in &mut self.comps {
            cmp.x += east;
            cmp.y += north;
        }
    }

    /// Delete every component after the first whose flux falls below
    /// `cut`.
    pub fn cut(&mut self, cut: f32) {
        let keep = self
            .comps
            .iter()
            .position(|c| c.flux < cut)
            .unwrap_or(self.comps.len());
        self.comps.truncate(keep);
        self.flux = self.comps.iter().map(|c| c.flux).sum();
        if self.comps.is_empty() {
            self.reset_stats();
        }
    }

    /// Write the components in the model text format. `east` and
    /// `north` are removed from component positions before writing; if
    /// `cut` is given only components above that flux are written.
    pub fn write<W: Write>(
        &self,
        w: &mut W,
        east: f32,
        north: f32,
        cut: Option<f32>,
    ) -> io::Result<()> {
        writeln!(
            w,
            "! Flux (Jy) Radius (mas)  Theta (deg)  Major (mas)  Axial ratio   Phi (deg) T \\"
        )?;
        writeln!(w, "! Freq (Hz)     SpecIndex")?;
        for cmp in &self.comps {
            if let Some(cut) = cut {
                if cmp.flux <= cut {
                    continue;
                }
            }
            let xpos = (cmp.x - east) as f64;
            let ypos = (cmp.y - north) as f64;
            let (radius, theta) = if xpos == 0.0 && ypos == 0.0 {
                (0.0, 0.0)
            } else {
                (
                    RAD_TO_MAS * (xpos * xpos + ypos * ypos).sqrt(),
                    RAD_TO_DEG * xpos.atan2(ypos),
                )
            };
            let mark = |par: FreeParams| if cmp.free.contains(par) { 'v' } else { ' ' };
            write!(w, "{:>10.6}{}", cmp.flux, mark(FreeParams::FLUX))?;
            write!(w, " {:>11.6}{}", radius, mark(FreeParams::CENTER))?;
            write!(w, " {:>11.6}{}", theta, mark(FreeParams::CENTER))?;
            // Delta components without a reference frequency need no
            // further fields.
            if cmp.shape != ModShape::Delta || cmp.freq0 > 0.0 {
                write!(
                    w,
                    " {:>11.6}{}",
                    cmp.major as f64 * RAD_TO_MAS,
                    mark(FreeParams::MAJOR)
                )?;
                write!(w, " {:>11.6}{}", cmp.ratio, mark(FreeParams::RATIO))?;
                write!(
                    w,
                    " {:>10.6}{}",
                    cmp.phi as f64 * RAD_TO_DEG,
                    mark(FreeParams::PHI)
                )?;
                write!(w, " {}", cmp.shape as i32)?;
                if cmp.freq0 > 0.0 {
                    write!(w, " {:>11.6}", cmp.freq0)?;
                    write!(w, " {:>11.6}{}", cmp.spcind, mark(FreeParams::SPCIND))?;
                }
            }
            writeln!(w)?;
        }
        Ok(())
    }

    /// Read components from a model text stream until end of input,
    /// adding `east`/`north` to the read positions. Returns the number
    /// of components read.
    pub fn read_from<R: BufRead>(
        &mut self,
        reader: &mut R,
        east: f32,
        north: f32,
        combine: bool,
    ) -> Result<usize, ModelError> {
        let mut nread = 0;
        let mut nline = 0;
        while let Some(line) = read_logical_line(reader, &mut nline)? {
            if self.parse_component_line(&line, nline, east, north, combine)? {
                nread += 1;
            }
        }
        log::info!("A total of {} model components were read.", nread);
        Ok(nread)
    }

    /// Parse a single logical model line and add the component it
    /// describes, if any. Returns true if a component was added.
    pub(crate) fn parse_component_line(
        &mut self,
        line: &str,
        nline: usize,
        east: f32,
        north: f32,
        combine: bool,
    ) -> Result<bool, ModelError> {
        // Strip any trailing comment.
        let line = match line.find('!') {
            Some(pos) => &line[..pos],
            None => line,
        };
        let mut flux = 0.0f32;
        let mut radius = 0.0f64;
        let mut theta = 0.0f64;
        let mut major = 0.0f64;
        let mut ratio = 1.0f32;
        let mut phi = 0.0f64;
        let mut type_code = 0i64;
        let mut freq0 = 0.0f32;
        let mut spcind = 0.0f32;
        let mut free = FreeParams::empty();
        let mut nfield = 0;
        for tok in line.split_whitespace() {
            if nfield > 8 {
                return Err(ModelError::TooManyFields { line: nline });
            }
            // A trailing v marks the field as a free parameter.
            let (tok, var) = match tok.strip_suffix(['v', 'V']) {
                Some(rest) if !rest.is_empty() => (rest, true),
                _ => (tok, false),
            };
            let bad = ModelError::BadField {
                field: nfield + 1,
                line: nline,
            };
            let mut m_type = FreeParams::empty();
            match nfield {
                0 => {
                    flux = tok.parse().map_err(|_| bad)?;
                    m_type = FreeParams::FLUX;
                }
                1 => {
                    radius = tok.parse().map_err(|_| bad)?;
                    m_type = FreeParams::CENTER;
                }
                2 => {
                    theta = tok.parse().map_err(|_| bad)?;
                    m_type = FreeParams::CENTER;
                }
                3 => {
                    major = tok.parse().map_err(|_| bad)?;
                    m_type = FreeParams::MAJOR;
                }
                4 => {
                    ratio = tok.parse().map_err(|_| bad)?;
                    m_type = FreeParams::RATIO;
                }
                5 => {
                    phi = tok.parse().map_err(|_| bad)?;
                    m_type = FreeParams::PHI;
                }
                6 => type_code = tok.parse().map_err(|_| bad)?,
                7 => freq0 = tok.parse().map_err(|_| bad)?,
                8 => {
                    spcind = tok.parse().map_err(|_| bad)?;
                    m_type = FreeParams::SPCIND;
                }
                _ => unreachable!(),
            }
            if var {
                free.insert(m_type);
            }
            nfield += 1;
        }
        // Empty lines and zero-flux components are skipped.
        if nfield == 0 || flux == 0.0 {
            return Ok(false);
        }
        // An omitted type is a delta unless a major axis was given, in
        // which case it defaults to a Gaussian. A zero major axis
        // always reduces to a delta.
        if nfield < 7 {
            type_code = if nfield <= 3 || major == 0.0 { 0 } else { 1 };
        }
        if major == 0.0 {
            type_code = 0;
        }
        if type_code == 0 {
            major = 0.0;
            ratio = 1.0;
            phi = 0.0;
            free.remove(FreeParams::MAJOR);
            free.remove(FreeParams::RATIO);
            free.remove(FreeParams::PHI);
        }
        let shape = ModShape::from_i64(type_code).ok_or(ModelError::UnknownShape {
            code: type_code,
            line: nline,
        })?;
        let radius = radius * MAS_TO_RAD;
        let theta = theta * DEG_TO_RAD;
        self.add(
            ModComp {
                shape,
                free,
                flux,
                x: (radius * theta.sin()) as f32 + east,
                y: (radius * theta.cos()) as f32 + north,
                major: (major * MAS_TO_RAD) as f32,
                ratio,
                phi: (phi * DEG_TO_RAD) as f32,
                freq0,
                spcind,
            },
            combine,
        )?;
        Ok(true)
    }
}

/// Read one logical line: a physical line plus any continuation lines
/// joined to it by trailing backslashes. Returns None at end of input.
pub(crate) fn read_logical_line<R: BufRead>(
    reader: &mut R,
    nline: &mut usize,
) -> io::Result<Option<String>> {
    let mut out = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return if out.is_empty() { Ok(None) } else { Ok(Some(out)) };
        }
        *nline += 1;
        let trimmed = line.trim_end();
        if let Some(stripped) = trimmed.strip_suffix('\\') {
            out.push_str(stripped.trim_end());
            out.push(' ');
            continue;
        }
        out.push_str(trimmed);
        return Ok(Some(out));
    }
}

/// Compute the amplitude and phase of a single model component at a
/// given UV coordinate (in wavelengths), scaled by a precomputed
/// primary-beam factor.
pub(crate) fn component_visibility(
    cmp: &ModComp,
    pb: f32,
    freq: f32,
    u: f32,
    v: f32,
) -> (f32, f32) {
    use std::f64::consts::PI;
    // Flux, corrected for the spectral index and the primary beam.
    let spec = if cmp.spcind == 0.0 {
        1.0
    } else {
        (freq / cmp.freq0).powf(cmp.spcind)
    };
    let flux = cmp.flux * spec * pb;
    // All the component shapes are even functions, so the phase is
    // just the Fourier phase at the component centroid.
    let phs = std::f32::consts::TAU * (u * cmp.x + v * cmp.y);
    if cmp.shape == ModShape::Delta {
        return (flux, phs);
    }
    let flux = flux as f64;
    let sinphi = (cmp.phi as f64).sin();
    let cosphi = (cmp.phi as f64).cos();
    let u = u as f64;
    let v = v as f64;
    let tmpa = v * cosphi + u * sinphi;
    let tmpb = cmp.ratio as f64 * (u * cosphi - v * sinphi);
    // Bound the argument away from zero to prevent underflow and
    // divide-by-zero.
    let tmpc = (PI * cmp.major as f64 * (tmpa * tmpa + tmpb * tmpb).sqrt()).max(1.0e-9);
    let amp = match cmp.shape {
        ModShape::Delta => unreachable!(),
        ModShape::Gaussian => {
            if tmpc < 12.0 {
                flux * (-0.3606737602 * tmpc * tmpc).exp()
            } else {
                0.0
            }
        }
        ModShape::Disk => 2.0 * flux * besj1(tmpc) / tmpc,
        ModShape::Shell => 3.0 * flux * (tmpc.sin() - tmpc * tmpc.cos()) / (tmpc * tmpc * tmpc),
        ModShape::Ring => flux * besj0(tmpc),
        ModShape::Rectangle => {
            let arg = PI * cmp.major as f64 * (u * sinphi + v * cosphi);
            flux * if arg.abs() > 0.001 { arg.sin() / arg } else { 1.0 }
        }
        ModShape::SzProfile => flux * if tmpc < 50.0 { (-tmpc).exp() } else { 0.0 } / tmpc,
    };
    (amp as f32, phs)
}

/// The Bessel function J0, by the usual rational approximations.
fn besj0(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 8.0 {
        let y = x * x;
        let p1 = 57568490574.0 + y * (-13362590354.0 + y * (651619640.7
            + y * (-11214424.18 + y * (77392.33017 + y * (-184.9052456)))));
        let p2 = 57568490411.0 + y * (1029532985.0 + y * (9494680.718
            + y * (59272.64853 + y * (267.8532712 + y))));
        p1 / p2
    } else {
        let z = 8.0 / ax;
        let y = z * z;
        let xx = ax - 0.785398164;
        let p1 = 1.0 + y * (-0.1098628627e-2 + y * (0.2734510407e-4
            + y * (-0.2073370639e-5 + y * 0.2093887211e-6)));
        let p2 = -0.1562499995e-1 + y * (0.1430488765e-3 + y * (-0.6911147651e-5
            + y * (0.7621095161e-6 + y * -0.934945152e-7)));
        (0.636619772 / ax).sqrt() * (xx.cos() * p1 - z * xx.sin() * p2)
    }
}

/// The Bessel function J1, by the usual rational approximations.
fn besj1(x: f64) -> f64 {
    let ax = x.abs();
    let ans = if ax < 8.0 {
        let y = x * x;
        let p1 = x * (7.2362614232e10 + y * (-7.895059235e9 + y * (2.423968531e8
            + y * (-2.972611439e6 + y * (1.5704482600e4 + y * -3.016036606e1)))));
        let p2 = 1.44725228442e11 + y * (2.300535178e9 + y * (1.858330474e7
            + y * (9.9447433940e4 + y * (3.769991397e2 + y))));
        p1 / p2
    } else {
        let z = 8.0 / ax;
        let y = z * z;
        let xx = ax - 2.356194491;
        let p1 = 1.0 + y * (0.183105e-2 + y * (-0.3516396496e-4
            + y * (0.2457520174e-5 + y * -0.240337019e-6)));
        let p2 = 0.04687499995 + y * (-0.2002690873e-3 + y * (0.8449199096e-5
            + y * (-0.88228987e-6 + y * 0.105787412e-6)));
        (0.636619772 / ax).sqrt() * (xx.cos() * p1 - z * xx.sin() * p2)
    };
    if x < 0.0 {
        -ans
    } else {
        ans
    }
}
