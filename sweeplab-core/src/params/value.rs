//! Concrete parameter values and the structural combination key.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// One concrete parameter value, decided when the parameter file is loaded.
///
/// Floats compare and hash by their bit pattern (with `-0.0` folded into
/// `0.0`) so values can live in hash sets used for resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

fn canonical_bits(x: f64) -> u64 {
    if x == 0.0 {
        0.0f64.to_bits()
    } else if x.is_nan() {
        f64::NAN.to_bits()
    } else {
        x.to_bits()
    }
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => canonical_bits(*a) == canonical_bits(*b),
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ParamValue {}

impl Hash for ParamValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(f) => canonical_bits(*f).hash(state),
            Self::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            // Debug keeps the decimal point so "5.0" never reads back as Int(5)
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl ParamValue {
    /// Inverse of `Display`: the narrowest variant that parses wins.
    pub fn parse(s: &str) -> Self {
        let t = s.trim();
        match t {
            "true" | "True" | "TRUE" => return Self::Bool(true),
            "false" | "False" | "FALSE" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(i) = t.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(x) = t.parse::<f64>() {
            return Self::Float(x);
        }
        Self::Text(t.to_string())
    }

    pub fn kind(&self) -> ParamKind {
        match self {
            Self::Bool(_) => ParamKind::Bool,
            Self::Int(_) => ParamKind::Int,
            Self::Float(_) => ParamKind::Float,
            Self::Text(_) => ParamKind::Text,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(x) if x.fract() == 0.0 && x.is_finite() => Some(*x as i64),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Non-negative integer, e.g. an indicator period.
    pub fn as_usize(&self) -> Option<usize> {
        self.as_i64().and_then(|i| usize::try_from(i).ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness used by the flag-forbidden filter.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(x) => *x != 0.0,
            Self::Text(s) => !s.is_empty(),
        }
    }
}

/// Variant of a `ParamValue`, used to read persisted cells back as the
/// type the parameter was declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    Text,
}

impl ParamKind {
    /// Parse `s` as this variant. Text is taken verbatim; a cell that does
    /// not fit a numeric or bool kind falls back to `ParamValue::parse`.
    pub fn parse(self, s: &str) -> ParamValue {
        let t = s.trim();
        let typed = match self {
            Self::Text => return ParamValue::Text(s.to_string()),
            Self::Bool => match t {
                "true" | "True" | "TRUE" => Some(ParamValue::Bool(true)),
                "false" | "False" | "FALSE" => Some(ParamValue::Bool(false)),
                _ => None,
            },
            Self::Int => t.parse::<i64>().ok().map(ParamValue::Int),
            Self::Float => t.parse::<f64>().ok().map(ParamValue::Float),
        };
        typed.unwrap_or_else(|| ParamValue::parse(s))
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Ordered value tuple identifying one combination, in parameter-name order.
///
/// Equality is structural. TP/SL decoration is carried separately (see
/// `ColumnLabel`) so the same key identifies a combination across grids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CombinationKey(pub Vec<ParamValue>);

impl CombinationKey {
    pub fn values(&self) -> &[ParamValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the key back from the string cells of a persisted row.
    pub fn parse_cells<'a>(cells: impl IntoIterator<Item = &'a str>) -> Self {
        Self(cells.into_iter().map(ParamValue::parse).collect())
    }

    /// Parse cells with a known kind per position. `None`, or a position
    /// past the end of `kinds`, falls back to guessing.
    pub fn parse_typed<'a>(cells: impl IntoIterator<Item = &'a str>, kinds: &[Option<ParamKind>]) -> Self {
        Self(
            cells
                .into_iter()
                .enumerate()
                .map(|(i, cell)| match kinds.get(i).copied().flatten() {
                    Some(kind) => kind.parse(cell),
                    None => ParamValue::parse(cell),
                })
                .collect(),
        )
    }
}

impl fmt::Display for CombinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str(")")
    }
}

// Ordering is only needed for deterministic report output.
impl PartialOrd for ParamValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ParamValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        fn rank(v: &ParamValue) -> u8 {
            match v {
                ParamValue::Bool(_) => 0,
                ParamValue::Int(_) => 1,
                ParamValue::Float(_) => 2,
                ParamValue::Text(_) => 3,
            }
        }
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => {
                f64::from_bits(canonical_bits(*a)).total_cmp(&f64::from_bits(canonical_bits(*b)))
            }
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn display_parse_roundtrip_keeps_variant() {
        for v in [
            ParamValue::Int(5),
            ParamValue::Float(5.0),
            ParamValue::Float(0.05),
            ParamValue::Bool(true),
            ParamValue::Text("close".into()),
        ] {
            assert_eq!(ParamValue::parse(&v.to_string()), v, "value {v}");
        }
    }

    #[test]
    fn parse_accepts_capitalized_bools() {
        assert_eq!(ParamValue::parse("True"), ParamValue::Bool(true));
        assert_eq!(ParamValue::parse("False"), ParamValue::Bool(false));
    }

    #[test]
    fn typed_cells_keep_number_like_text() {
        let kinds = [
            Some(ParamKind::Text),
            Some(ParamKind::Text),
            Some(ParamKind::Float),
            Some(ParamKind::Int),
            None,
        ];
        let key = CombinationKey::parse_typed(["5", "true", "5", "7", "0.5"], &kinds);
        assert_eq!(
            key,
            CombinationKey(vec![
                ParamValue::Text("5".into()),
                ParamValue::Text("true".into()),
                ParamValue::Float(5.0),
                ParamValue::Int(7),
                ParamValue::Float(0.5),
            ])
        );
        // A cell that does not fit its kind is still read.
        assert_eq!(ParamKind::Int.parse("close"), ParamValue::Text("close".into()));
        assert_eq!(ParamValue::Text("5".into()).kind(), ParamKind::Text);
    }

    #[test]
    fn negative_zero_equals_zero() {
        let mut set = HashSet::new();
        set.insert(ParamValue::Float(0.0));
        assert!(set.contains(&ParamValue::Float(-0.0)));
    }

    #[test]
    fn int_and_float_are_distinct() {
        assert_ne!(ParamValue::Int(1), ParamValue::Float(1.0));
    }

    #[test]
    fn key_display() {
        let key = CombinationKey(vec![ParamValue::Int(14), ParamValue::Bool(false)]);
        assert_eq!(key.to_string(), "(14, false)");
    }

    #[test]
    fn accessors() {
        assert_eq!(ParamValue::Float(20.0).as_usize(), Some(20));
        assert_eq!(ParamValue::Int(-1).as_usize(), None);
        assert_eq!(ParamValue::Int(3).as_f64(), Some(3.0));
        assert!(!ParamValue::Bool(false).is_truthy());
    }
}
