//! Parameter grid generation for the search loop
//!
//! A tuning configuration declares each tunable as a (min, max, step) range;
//! this module expands those ranges into the Cartesian product of concrete
//! parameter assignments, lazily, in declaration order.

use crate::error::{Result, TuneError};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Relative tolerance used when deciding whether a step has reached `max`.
/// Repeated float addition drifts, so the comparison is fuzzy.
const STEP_EPSILON: f64 = 1e-9;

/// Declarative description of one tunable parameter.
///
/// `min == max` declares a fixed parameter: the grid dimension has size 1.
/// This degenerate-range convention is also how operational constraints are
/// expressed (e.g. a threshold that is only valid at exactly 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, min: f64, max: f64, step: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            step,
        }
    }

    /// Shorthand for a fixed (single-valued) parameter
    pub fn fixed(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, value, value, 1.0)
    }

    /// Check the spec invariants: finite bounds, min <= max, step > 0
    pub fn validate(&self) -> Result<()> {
        let fail = |message: &str| {
            Err(TuneError::InvalidParameterSpec {
                name: self.name.clone(),
                message: message.to_string(),
            })
        };

        if !self.min.is_finite() || !self.max.is_finite() || !self.step.is_finite() {
            return fail("bounds and step must be finite");
        }
        if self.min > self.max {
            return fail(&format!("min ({}) exceeds max ({})", self.min, self.max));
        }
        if self.step <= 0.0 {
            return fail(&format!("step must be > 0, got {}", self.step));
        }
        Ok(())
    }

    /// Enumerate the grid values for this parameter: `min, min+step, ...`
    /// with `max` always included as the final value, even when the spacing
    /// to the previous value is smaller than `step`. Guarantees both
    /// boundaries are covered by the search.
    pub fn values(&self) -> Vec<f64> {
        let mut values = Vec::new();
        let tolerance = self.step * STEP_EPSILON;

        let mut i = 0u64;
        loop {
            let v = self.min + (i as f64) * self.step;
            if v >= self.max - tolerance {
                break;
            }
            values.push(v);
            i += 1;
        }
        values.push(self.max);
        values
    }

    /// True when the spec pins the parameter to a single value
    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }
}

/// One concrete point in the search grid: an ordered mapping from parameter
/// name to value. Produced by the grid iterator, consumed by exactly one
/// parser invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterAssignment {
    pairs: Vec<(String, f64)>,
}

impl ParameterAssignment {
    pub fn new(pairs: Vec<(String, f64)>) -> Self {
        Self { pairs }
    }

    /// Look up a parameter value by name
    pub fn get(&self, name: &str) -> Option<f64> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// Iterate (name, value) pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl fmt::Display for ParameterAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pairs.is_empty() {
            return write!(f, "(no parameters)");
        }
        let rendered: Vec<String> = self
            .pairs
            .iter()
            .map(|(n, v)| format!("{}={}", n, v))
            .collect();
        write!(f, "{}", rendered.join(", "))
    }
}

impl Serialize for ParameterAssignment {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.pairs.len()))?;
        for (name, value) in &self.pairs {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// The full search grid: the Cartesian product of all parameter ranges.
///
/// Axes follow parameter-declaration order, with the first-declared
/// parameter as the slowest-varying (outer) loop, so the enumeration order
/// is reproducible across runs.
#[derive(Debug, Clone)]
pub struct ParameterGrid {
    axes: Vec<(String, Vec<f64>)>,
}

impl ParameterGrid {
    /// Build the grid axes from the declared specs.
    ///
    /// Fails fast with `InvalidParameterSpec` before any generation begins;
    /// a half-enumerated grid is never observable.
    pub fn new(specs: &[ParameterSpec]) -> Result<Self> {
        for spec in specs {
            spec.validate()?;
        }
        let axes = specs
            .iter()
            .map(|s| (s.name.clone(), s.values()))
            .collect();
        Ok(Self { axes })
    }

    /// Total number of assignments in the grid.
    ///
    /// The product over zero axes is 1: a method with no tunables still has
    /// exactly one (empty) configuration to evaluate.
    pub fn len(&self) -> usize {
        self.axes.iter().map(|(_, values)| values.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lazily iterate all assignments from the beginning.
    ///
    /// The iterator is finite and not resumable mid-grid; calling `iter`
    /// again restarts the enumeration.
    pub fn iter(&self) -> GridIter<'_> {
        GridIter {
            grid: self,
            cursor: vec![0; self.axes.len()],
            exhausted: self.axes.iter().any(|(_, values)| values.is_empty()),
        }
    }
}

/// Odometer-style iterator over the Cartesian product.
/// Materializes one assignment at a time so huge grids stay cheap.
pub struct GridIter<'a> {
    grid: &'a ParameterGrid,
    cursor: Vec<usize>,
    exhausted: bool,
}

impl Iterator for GridIter<'_> {
    type Item = ParameterAssignment;

    fn next(&mut self) -> Option<ParameterAssignment> {
        if self.exhausted {
            return None;
        }

        let pairs = self
            .grid
            .axes
            .iter()
            .zip(&self.cursor)
            .map(|((name, values), &i)| (name.clone(), values[i]))
            .collect();

        // Advance the odometer: last axis fastest, first axis slowest
        let mut advanced = false;
        for (pos, (_, values)) in self.grid.axes.iter().enumerate().rev() {
            self.cursor[pos] += 1;
            if self.cursor[pos] < values.len() {
                advanced = true;
                break;
            }
            self.cursor[pos] = 0;
        }
        if !advanced {
            self.exhausted = true;
        }

        Some(ParameterAssignment::new(pairs))
    }
}
