//! Attention vector projection.
//!
//! Extracts a `seq_len` vector from a layer tensor for one selected token:
//!
//! | Direction | Single head `h`            | Meaning                          |
//! |-----------|----------------------------|----------------------------------|
//! | Source    | `tensor[h, selected, j]`   | what the selected token attends to |
//! | Target    | `tensor[h, i, selected]`   | what attends to the selected token |
//!
//! Aggregated views reduce the per-head projections with a mean or an
//! elementwise max. Everything here is synchronous and allocation-light; it
//! runs on every selection change.

use crate::{CoreError, LayerTensor, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of the attention matrix the selected token sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Row of the selected token (query view).
    #[default]
    Source,
    /// Column of the selected token (key view).
    Target,
}

/// Reduction used when all heads are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggMode {
    #[default]
    Mean,
    Max,
}

/// A single head or all heads combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum HeadSelection {
    #[default]
    Aggregated,
    Single(usize),
}

impl HeadSelection {
    /// Wire form: `-1` for aggregated, otherwise the head index.
    pub fn as_index(self) -> i64 {
        match self {
            HeadSelection::Aggregated => -1,
            HeadSelection::Single(h) => h as i64,
        }
    }
}

impl From<HeadSelection> for i64 {
    fn from(head: HeadSelection) -> Self {
        head.as_index()
    }
}

impl TryFrom<i64> for HeadSelection {
    type Error = CoreError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            -1 => Ok(HeadSelection::Aggregated),
            h if h >= 0 => Ok(HeadSelection::Single(h as usize)),
            h => Err(CoreError::precondition(format!("head {h} is not -1 or a head index"))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Source => "source",
            Direction::Target => "target",
        })
    }
}

impl FromStr for Direction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "source" => Ok(Direction::Source),
            "target" => Ok(Direction::Target),
            other => Err(CoreError::precondition(format!("unknown direction '{other}'"))),
        }
    }
}

impl fmt::Display for AggMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggMode::Mean => "mean",
            AggMode::Max => "max",
        })
    }
}

impl FromStr for AggMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(AggMode::Mean),
            "max" => Ok(AggMode::Max),
            other => Err(CoreError::precondition(format!("unknown aggregation '{other}'"))),
        }
    }
}

/// Project one token's attention out of `tensor`.
///
/// Out-of-range `selected` or head indices are rejected with
/// [`CoreError::PreconditionViolation`] rather than producing a short vector.
pub fn project(
    tensor: &LayerTensor,
    selected: usize,
    direction: Direction,
    head: HeadSelection,
    agg: AggMode,
) -> Result<Vec<f32>> {
    let seq_len = tensor.seq_len();
    let num_heads = tensor.num_heads();

    if selected >= seq_len {
        return Err(CoreError::precondition(format!(
            "selected token {selected} out of range for seq_len {seq_len}"
        )));
    }

    match head {
        HeadSelection::Single(h) => {
            if h >= num_heads {
                return Err(CoreError::precondition(format!(
                    "head {h} out of range for {num_heads} heads"
                )));
            }
            let mut out = vec![0.0f32; seq_len];
            write_head(tensor, h, selected, direction, &mut out);
            Ok(out)
        }
        HeadSelection::Aggregated => {
            if num_heads == 0 {
                return Err(CoreError::precondition("tensor has no heads"));
            }
            Ok(aggregate(tensor, selected, direction, agg))
        }
    }
}

fn write_head(tensor: &LayerTensor, h: usize, selected: usize, direction: Direction, out: &mut [f32]) {
    match direction {
        Direction::Source => out.copy_from_slice(tensor.row(h, selected)),
        Direction::Target => {
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = tensor.at(h, i, selected);
            }
        }
    }
}

fn aggregate(tensor: &LayerTensor, selected: usize, direction: Direction, agg: AggMode) -> Vec<f32> {
    let seq_len = tensor.seq_len();
    let num_heads = tensor.num_heads();

    match agg {
        AggMode::Mean => {
            let scale = num_heads as f32;
            let mut out = vec![0.0f32; seq_len];
            for h in 0..num_heads {
                accumulate(tensor, h, selected, direction, &mut out, |acc, v| {
                    *acc += v / scale
                });
            }
            out
        }
        AggMode::Max => {
            // Seed with head 0 so a single head reproduces itself exactly.
            let mut out = vec![0.0f32; seq_len];
            write_head(tensor, 0, selected, direction, &mut out);
            for h in 1..num_heads {
                accumulate(tensor, h, selected, direction, &mut out, |acc, v| {
                    *acc = acc.max(v)
                });
            }
            out
        }
    }
}

#[inline]
fn accumulate(
    tensor: &LayerTensor,
    h: usize,
    selected: usize,
    direction: Direction,
    out: &mut [f32],
    mut op: impl FnMut(&mut f32, f32),
) {
    match direction {
        Direction::Source => {
            for (acc, &v) in out.iter_mut().zip(tensor.row(h, selected)) {
                op(acc, v);
            }
        }
        Direction::Target => {
            for (i, acc) in out.iter_mut().enumerate() {
                op(acc, tensor.at(h, i, selected));
            }
        }
    }
}
