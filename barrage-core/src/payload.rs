use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use rand::rngs::StdRng;

/// How the reader picks rows when seeding a new VU's variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum PayloadMode {
    /// Round-robin through the rows, wrapping at the end.
    Sequential,
    /// A uniformly random row per VU.
    Random,
    /// Every row, with repeated fields exposed under indexed names.
    LoadAll,
}

/// External row data for VU variable seeding, already parsed by the
/// embedding tool (CSV decoding is a collaborator concern).
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub fields: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug)]
pub struct PayloadReader {
    payload: Payload,
    mode: PayloadMode,
    cursor: AtomicUsize,
}

impl PayloadReader {
    pub fn new(payload: Payload, mode: PayloadMode) -> Self {
        Self {
            payload,
            mode,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn mode(&self) -> PayloadMode {
        self.mode
    }

    /// Write this VU's seed variables into `vars`. Field names map to row
    /// values; a row shorter than the field list leaves the excess fields
    /// unset.
    pub fn seed(&self, vars: &mut HashMap<String, String>, rng: &mut StdRng) {
        if self.payload.rows.is_empty() {
            return;
        }

        match self.mode {
            PayloadMode::Sequential => {
                let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.payload.rows.len();
                self.seed_row(vars, idx);
            }
            PayloadMode::Random => {
                let idx = rng.gen_range(0..self.payload.rows.len());
                self.seed_row(vars, idx);
            }
            PayloadMode::LoadAll => {
                for (ri, row) in self.payload.rows.iter().enumerate() {
                    for (field, value) in self.payload.fields.iter().zip(row) {
                        vars.insert(format!("{field}.{ri}"), value.clone());
                    }
                }
            }
        }
    }

    fn seed_row(&self, vars: &mut HashMap<String, String>, idx: usize) {
        let Some(row) = self.payload.rows.get(idx) else {
            return;
        };
        for (field, value) in self.payload.fields.iter().zip(row) {
            vars.insert(field.clone(), value.clone());
        }
    }
}
