// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Stokes parameters, polarizations, and stream synthesis recipes.

A processing stream has a single polarization, which is either read
directly from the recorded data or synthesized from two recorded
polarizations. A [`PolSelector`] captures the recipe once, at stream
selection time, so that the per-channel synthesis site is a single
match.
*/

use std::fmt;

use thiserror::Error;

use crate::raw_store::CmplxVis;


/// Recognized stokes parameters and polarizations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stokes {
    I,
    Q,
    U,
    V,
    RR,
    LL,
    RL,
    LR,
    XX,
    YY,
    XY,
    YX,
    /// Pseudo-I: treat RR and LL as interchangeable samples of I.
    PseudoI,
}

impl Stokes {
    /// The conventional short name of the polarization.
    pub fn name(&self) -> &'static str {
        match self {
            Stokes::I => "I",
            Stokes::Q => "Q",
            Stokes::U => "U",
            Stokes::V => "V",
            Stokes::RR => "RR",
            Stokes::LL => "LL",
            Stokes::RL => "RL",
            Stokes::LR => "LR",
            Stokes::XX => "XX",
            Stokes::YY => "YY",
            Stokes::XY => "XY",
            Stokes::YX => "YX",
            Stokes::PseudoI => "PI",
        }
    }

    /// Look up a polarization by its conventional name.
    pub fn parse(name: &str) -> Option<Stokes> {
        match name.trim().to_ascii_uppercase().as_str() {
            "I" => Some(Stokes::I),
            "Q" => Some(Stokes::Q),
            "U" => Some(Stokes::U),
            "V" => Some(Stokes::V),
            "RR" => Some(Stokes::RR),
            "LL" => Some(Stokes::LL),
            "RL" => Some(Stokes::RL),
            "LR" => Some(Stokes::LR),
            "XX" => Some(Stokes::XX),
            "YY" => Some(Stokes::YY),
            "XY" => Some(Stokes::XY),
            "YX" => Some(Stokes::YX),
            "PI" => Some(Stokes::PseudoI),
            _ => None,
        }
    }
}

impl fmt::Display for Stokes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Error, Debug)]
pub enum PolError {
    #[error("Polarization {0} is unavailable")]
    Unavailable(Stokes),
}

/// The stokes parameter a two-hand combination synthesizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PairKind {
    /// I = (RR+LL)/2.
    I,
    /// Q = (RL+LR)/2.
    Q,
    /// U = i(LR-RL)/2.
    U,
    /// V = (RR-LL)/2.
    V,
}

/// How to extract one stream visibility from the recorded polarized
/// visibilities of a single (IF, channel, baseline) cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PolRecipe {
    /// Take the recorded polarization at this index directly.
    Direct(usize),
    /// Combine the two recorded polarizations at these indexes.
    Pair { kind: PairKind, a: usize, b: usize },
    /// Treat RR and LL (whichever are recorded) as samples of I.
    PseudoI { a: usize, b: Option<usize> },
}

/// A stream polarization and its synthesis recipe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PolSelector {
    /// The polarization the recipe produces.
    pub stokes: Stokes,
    recipe: PolRecipe,
}

fn find_stokes(pols: &[Stokes], want: Stokes) -> Option<usize> {
    pols.iter().position(|&p| p == want)
}

impl PolSelector {
    /// Find a way to produce polarization `want` from the recorded
    /// polarizations `pols`.
    ///
    /// A polarization that was recorded directly is always preferred.
    /// Otherwise I and V can be synthesized from RR and LL, Q and U
    /// from RL and LR, and pseudo-I from whichever of RR and LL exist.
    pub fn resolve(pols: &[Stokes], want: Stokes) -> Result<PolSelector, PolError> {
        if let Some(idx) = find_stokes(pols, want) {
            return Ok(PolSelector {
                stokes: want,
                recipe: PolRecipe::Direct(idx),
            });
        }
        let recipe = match want {
            Stokes::PseudoI => {
                let rr = find_stokes(pols, Stokes::RR);
                let ll = find_stokes(pols, Stokes::LL);
                match (rr, ll) {
                    (Some(a), b) => Some(PolRecipe::PseudoI { a, b }),
                    (None, Some(a)) => Some(PolRecipe::PseudoI { a, b: None }),
                    (None, None) => None,
                }
            }
            Stokes::I => Self::pair(pols, PairKind::I, Stokes::RR, Stokes::LL),
            Stokes::V => Self::pair(pols, PairKind::V, Stokes::RR, Stokes::LL),
            Stokes::Q => Self::pair(pols, PairKind::Q, Stokes::RL, Stokes::LR),
            Stokes::U => Self::pair(pols, PairKind::U, Stokes::LR, Stokes::RL),
            _ => None,
        };
        match recipe {
            Some(recipe) => Ok(PolSelector {
                stokes: want,
                recipe,
            }),
            None => Err(PolError::Unavailable(want)),
        }
    }

    fn pair(pols: &[Stokes], kind: PairKind, pa: Stokes, pb: Stokes) -> Option<PolRecipe> {
        match (find_stokes(pols, pa), find_stokes(pols, pb)) {
            (Some(a), Some(b)) => Some(PolRecipe::Pair { kind, a, b }),
            _ => None,
        }
    }

    /// Extract the stream visibility from the `npol` recorded
    /// visibilities of one (IF, channel, baseline) cell.
    pub fn get(&self, pvis: &[CmplxVis]) -> CmplxVis {
        match self.recipe {
            PolRecipe::Direct(idx) => pvis[idx],
            PolRecipe::Pair { kind, a, b } => {
                let avis = pvis[a];
                let bvis = pvis[b];
                // If either visibility is deleted, the combination is
                // deleted and its value is inconsequential.
                if avis.wt == 0.0 || bvis.wt == 0.0 {
                    return CmplxVis::default();
                }
                let (re, im) = match kind {
                    PairKind::I | PairKind::Q => {
                        (0.5 * (avis.re + bvis.re), 0.5 * (avis.im + bvis.im))
                    }
                    PairKind::U => (-0.5 * (avis.im - bvis.im), 0.5 * (avis.re - bvis.re)),
                    PairKind::V => (0.5 * (avis.re - bvis.re), 0.5 * (avis.im - bvis.im)),
                };
                let mut wt = 4.0 / (1.0 / avis.wt.abs() + 1.0 / bvis.wt.abs());
                if avis.wt < 0.0 || bvis.wt < 0.0 {
                    wt = -wt;
                }
                CmplxVis { re, im, wt }
            }
            PolRecipe::PseudoI { a, b } => {
                let avis = pvis[a];
                let bvis = match b {
                    // Only one of RR and LL was recorded.
                    None => return avis,
                    Some(b) => pvis[b],
                };
                if (avis.wt > 0.0 && bvis.wt > 0.0) || (avis.wt < 0.0 && bvis.wt < 0.0) {
                    // Both flagged or both unflagged: a weighted sum
                    // with the shared flag status.
                    let aw = avis.wt.abs();
                    let bw = bvis.wt.abs();
                    CmplxVis {
                        re: (avis.re * aw + bvis.re * bw) / (aw + bw),
                        im: (avis.im * aw + bvis.im * bw) / (aw + bw),
                        wt: avis.wt + bvis.wt,
                    }
                } else if avis.wt > 0.0 {
                    avis
                } else if bvis.wt > 0.0 {
                    bvis
                } else {
                    // Both deleted.
                    CmplxVis::default()
                }
            }
        }
    }
}
