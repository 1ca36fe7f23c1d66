// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
A table of models keyed by stream selection.

When the user changes the stream selection without electing to keep the
current model, the model belonging to the outgoing (channel-range set,
polarization) pair is parked here, and any model previously parked for
the incoming pair is restored. Models are stored unshifted so that the
table stays valid across phase-center shifts.
*/

use std::io::{BufRead, Write};

use thiserror::Error;

use crate::chan_list::ChanList;
use crate::model::{self, Model, ModelError};
use crate::polarization::Stokes;


/// The number of hash buckets. A prime number, for spread.
const MTAB_SIZE: usize = 113;

#[derive(Error, Debug)]
pub enum ModelTableError {
    #[error("Syntax error in select line {line} of the model table")]
    BadSelect { line: usize },

    #[error("Unknown polarization on line {line} of the model table")]
    BadPolarization { line: usize },

    #[error("Missing channel ranges on line {line} of the model table")]
    MissingChannels { line: usize },

    #[error("A model line appeared before any select line; not a multi-model file")]
    MissingSelect,

    #[error("{0}")]
    Model(#[from] ModelError),

    #[error("Error reading model table: {0}")]
    Io(#[from] std::io::Error),
}

struct ModelNode {
    cl: ChanList,
    pol: Stokes,
    model: Model,
}

/// A hash table of models indexed by (channel ranges, polarization).
pub struct ModelTable {
    buckets: Vec<Vec<ModelNode>>,
    nentry: usize,
}

/// The rolling polynomial hash of a selection key. 65599 is a prime
/// close to 2^16.
fn hash_selection(cl: &ChanList) -> u64 {
    let mut h: u64 = 0;
    for range in cl.ranges() {
        h = h
            .wrapping_mul(65599)
            .wrapping_add(range.ca as u64)
            .wrapping_mul(65599)
            .wrapping_add(range.cb as u64);
    }
    h
}

impl ModelTable {
    /// Create a new, empty model table.
    pub fn new() -> ModelTable {
        ModelTable {
            buckets: (0..MTAB_SIZE).map(|_| Vec::new()).collect(),
            nentry: 0,
        }
    }

    /// The number of models in the table.
    pub fn len(&self) -> usize {
        self.nentry
    }

    pub fn is_empty(&self) -> bool {
        self.nentry == 0
    }

    fn bucket_of(&self, cl: &ChanList) -> usize {
        (hash_selection(cl) % self.buckets.len() as u64) as usize
    }

    /// Record a copy of `model` for a selection, replacing any model
    /// already recorded for it. `east`/`north` are the currently
    /// applied position shifts, which are removed from the stored copy
    /// so that the table holds unshifted models.
    pub fn insert(&mut self, model: &Model, cl: &ChanList, pol: Stokes, east: f32, north: f32) {
        let ib = self.bucket_of(cl);
        let mut copy = model.clone();
        copy.shift_positions(-east, -north);
        let bucket = &mut self.buckets[ib];
        if let Some(node) = bucket
            .iter_mut()
            .find(|node| node.pol == pol && node.cl == *cl)
        {
            node.model = copy;
            return;
        }
        bucket.push(ModelNode {
            cl: cl.clone(),
            pol,
            model: copy,
        });
        self.nentry += 1;
    }

    /// Remove and return the model recorded for a selection, if any,
    /// re-applying the given position shifts to it.
    pub fn remove(&mut self, cl: &ChanList, pol: Stokes, east: f32, north: f32) -> Option<Model> {
        let ib = self.bucket_of(cl);
        let bucket = &mut self.buckets[ib];
        let pos = bucket
            .iter()
            .position(|node| node.pol == pol && node.cl == *cl)?;
        let node = bucket.remove(pos);
        self.nentry -= 1;
        let mut model = node.model;
        model.shift_positions(east, north);
        Some(model)
    }

    /// True if a model is recorded for the selection. With `non_empty`
    /// an empty model doesn't count.
    pub fn contains(&self, cl: &ChanList, pol: Stokes, non_empty: bool) -> bool {
        let ib = self.bucket_of(cl);
        self.buckets[ib]
            .iter()
            .any(|node| node.pol == pol && node.cl == *cl && (!non_empty || !node.model.is_empty()))
    }

    /// Delete every entry.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.nentry = 0;
    }

    /// Write every non-empty entry, each headed by a
    /// `select <pol>, <ranges>` line and followed by its model lines,
    /// with a blank line between entries.
    pub fn write<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        let mut first = true;
        for bucket in &self.buckets {
            for node in bucket {
                if node.model.is_empty() {
                    continue;
                }
                if !first {
                    writeln!(w)?;
                }
                first = false;
                writeln!(w, "select {}, {}", node.pol.name(), node.cl)?;
                node.model.write(w, 0.0, 0.0, None)?;
            }
        }
        Ok(())
    }

    /// Restore a table from text previously written by `write`,
    /// replacing the current contents.
    pub fn read_from<R: BufRead>(&mut self, reader: &mut R) -> Result<(), ModelTableError> {
        self.clear();
        let mut nline = 0;
        let mut current: Option<(ChanList, Stokes, Model)> = None;
        while let Some(line) = model::read_logical_line(reader, &mut nline)? {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix("select ") {
                // The previous entry is complete: add it to the table.
                if let Some((cl, pol, model)) = current.take() {
                    self.insert(&model, &cl, pol, 0.0, 0.0);
                }
                let (polname, ranges) = rest
                    .split_once(',')
                    .ok_or(ModelTableError::BadSelect { line: nline })?;
                let pol = Stokes::parse(polname)
                    .ok_or(ModelTableError::BadPolarization { line: nline })?;
                let cl = ChanList::parse(ranges)
                    .map_err(|_| ModelTableError::BadSelect { line: nline })?;
                if cl.is_empty() {
                    return Err(ModelTableError::MissingChannels { line: nline });
                }
                current = Some((cl, pol, Model::new()));
            } else if !trimmed.is_empty() && !trimmed.starts_with('!') {
                match current.as_mut() {
                    Some((_, _, model)) => {
                        model.parse_component_line(&line, nline, 0.0, 0.0, true)?;
                    }
                    None => return Err(ModelTableError::MissingSelect),
                }
            }
        }
        if let Some((cl, pol, model)) = current.take() {
            self.insert(&model, &cl, pol, 0.0, 0.0);
        }
        Ok(())
    }
}

impl Default for ModelTable {
    fn default() -> ModelTable {
        ModelTable::new()
    }
}
