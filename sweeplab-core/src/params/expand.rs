//! Expansion of a `ParamSpec` into concrete value lists and the lazy
//! Cartesian product over them.

use super::{CombinationKey, NumRange, ParamDef, ParamError, ParamKind, ParamSpec, ParamValue};

/// Parameters whose name starts with this prefix are flags for the
/// flag-forbidden filter.
pub const FLAG_PREFIX: &str = "flag_";

/// Upper bound on the values a single dimension may expand to.
pub const MAX_DIMENSION_VALUES: usize = 1_000_000;

const FLOAT_TOLERANCE: f64 = 1e-9;

pub fn is_flag(name: &str) -> bool {
    name.starts_with(FLAG_PREFIX)
}

/// Ordered mapping name -> concrete values, one entry per parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedParams {
    names: Vec<String>,
    values: Vec<Vec<ParamValue>>,
}

impl ExpandedParams {
    /// Build directly from value lists. Every list must be non-empty.
    pub fn from_lists(lists: Vec<(String, Vec<ParamValue>)>) -> Result<Self, ParamError> {
        let mut names = Vec::with_capacity(lists.len());
        let mut values = Vec::with_capacity(lists.len());
        for (name, list) in lists {
            if list.is_empty() {
                return Err(ParamError::invalid(&name, "expands to no values"));
            }
            names.push(name);
            values.push(list);
        }
        Ok(Self { names, values })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self, name: &str) -> Option<&[ParamValue]> {
        self.position(name).map(|i| self.values[i].as_slice())
    }

    pub fn dimensions(&self) -> &[Vec<ParamValue>] {
        &self.values
    }

    /// Kind shared by every value of each dimension, `None` for mixed lists.
    pub fn kinds(&self) -> Vec<Option<ParamKind>> {
        self.values
            .iter()
            .map(|dim| {
                let kind = dim.first()?.kind();
                dim.iter().all(|v| v.kind() == kind).then_some(kind)
            })
            .collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Positions of the `flag_` dimensions.
    pub fn flag_positions(&self) -> Vec<usize> {
        self.names
            .iter()
            .enumerate()
            .filter(|(_, n)| is_flag(n))
            .map(|(i, _)| i)
            .collect()
    }

    /// Lazy Cartesian product, last dimension varying fastest.
    pub fn combinations(&self) -> CombinationIter<'_> {
        CombinationIter {
            dims: &self.values,
            cursor: vec![0; self.values.len()],
            done: self.values.is_empty(),
        }
    }

    /// First combination in product order.
    pub fn first(&self) -> Option<CombinationKey> {
        self.combinations().next()
    }
}

/// Expand every definition in `spec`, preserving order.
pub fn expand(spec: &ParamSpec) -> Result<ExpandedParams, ParamError> {
    let lists = spec
        .iter()
        .map(|(name, def)| Ok((name.to_string(), expand_def(name, def)?)))
        .collect::<Result<Vec<_>, ParamError>>()?;
    ExpandedParams::from_lists(lists)
}

fn expand_def(name: &str, def: &ParamDef) -> Result<Vec<ParamValue>, ParamError> {
    let values = match def {
        ParamDef::Scalar(v) => vec![v.clone()],
        // A false default is never explored as true.
        ParamDef::Flag(true) => vec![ParamValue::Bool(true), ParamValue::Bool(false)],
        ParamDef::Flag(false) => vec![ParamValue::Bool(false)],
        ParamDef::List(values) => values.clone(),
        ParamDef::Range(NumRange::Int { min, max, step }) => {
            if *step <= 0 || max < min {
                return Err(ParamError::invalid(name, "malformed integer range"));
            }
            let count = max
                .checked_sub(*min)
                .map(|span| span as u64 / *step as u64 + 1)
                .ok_or_else(|| ParamError::invalid(name, "integer range is too wide"))?;
            check_size(name, count)?;
            (0..count as i64).map(|k| ParamValue::Int(min + k * step)).collect()
        }
        ParamDef::Range(NumRange::Float { min, max, step }) => {
            let finite = min.is_finite() && max.is_finite() && step.is_finite();
            if !finite || *step <= 0.0 || max < min {
                return Err(ParamError::invalid(name, "malformed float range"));
            }
            let count = ((max - min) / step + FLOAT_TOLERANCE).floor() as u64 + 1;
            check_size(name, count)?;
            (0..count)
                .map(|k| ParamValue::Float(round10(min + k as f64 * step)))
                .collect()
        }
    };
    Ok(values)
}

fn check_size(name: &str, count: u64) -> Result<(), ParamError> {
    if count > MAX_DIMENSION_VALUES as u64 {
        return Err(ParamError::invalid(
            name,
            format!("expands to {count} values, limit is {MAX_DIMENSION_VALUES}"),
        ));
    }
    Ok(())
}

/// Round to 10 decimals so 0.1 + 2*0.1 lands on 0.3.
fn round10(x: f64) -> f64 {
    (x * 1e10).round() / 1e10
}

/// Count admissible combinations without enumerating them.
///
/// With `flag_forbidden` and at least one flag dimension, the all-falsy flag
/// tuples are subtracted: `total - rest * prod(falsy values per flag)`.
/// Saturates at `u64::MAX`.
pub fn total_combinations(expanded: &ExpandedParams, flag_forbidden: bool) -> u64 {
    if expanded.is_empty() {
        return 0;
    }
    let flags = expanded.flag_positions();
    let mut total: u128 = 1;
    let mut rejected: u128 = 1;
    for (i, dim) in expanded.dimensions().iter().enumerate() {
        let n = dim.len() as u128;
        total = total.saturating_mul(n);
        if flags.contains(&i) {
            let falsy = dim.iter().filter(|v| !v.is_truthy()).count() as u128;
            rejected = rejected.saturating_mul(falsy);
        } else {
            rejected = rejected.saturating_mul(n);
        }
    }
    let admissible = if flag_forbidden && !flags.is_empty() {
        total.saturating_sub(rejected)
    } else {
        total
    };
    u64::try_from(admissible).unwrap_or(u64::MAX)
}

/// True when at least one flag position holds a truthy value, or when there
/// are no flag positions at all.
pub fn passes_flag_filter(values: &[ParamValue], flag_positions: &[usize]) -> bool {
    flag_positions.is_empty() || flag_positions.iter().any(|&i| values[i].is_truthy())
}

/// Odometer over the expanded dimensions.
#[derive(Debug, Clone)]
pub struct CombinationIter<'a> {
    dims: &'a [Vec<ParamValue>],
    cursor: Vec<usize>,
    done: bool,
}

impl Iterator for CombinationIter<'_> {
    type Item = CombinationKey;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = CombinationKey(
            self.cursor
                .iter()
                .zip(self.dims)
                .map(|(&i, dim)| dim[i].clone())
                .collect(),
        );
        // advance, last dimension fastest
        self.done = true;
        for d in (0..self.dims.len()).rev() {
            self.cursor[d] += 1;
            if self.cursor[d] < self.dims[d].len() {
                self.done = false;
                break;
            }
            self.cursor[d] = 0;
        }
        Some(item)
    }
}
