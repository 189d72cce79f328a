//! Declarative parameter space and the strategy parameter file.
//!
//! A parameter file has three sections:
//! - `[multi]`: the sweep space (ranges, lists, flags, scalars)
//! - `[single]`: the representative combination used for the warm-up run
//! - `[settings]`: `flag_forbidden`
//!
//! Values are classified once at load time: a table `{ min, max, step }` is a
//! range, an array a list, a boolean a flag, a number or string a scalar.

use serde::{Deserialize, Serialize};

use super::{ParamError, ParamValue};

/// Inclusive arithmetic range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NumRange {
    Int { min: i64, max: i64, step: i64 },
    Float { min: f64, max: f64, step: f64 },
}

/// Definition of one parameter in the space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamDef {
    Scalar(ParamValue),
    /// Boolean with its declared default.
    Flag(bool),
    Range(NumRange),
    List(Vec<ParamValue>),
}

impl ParamDef {
    /// Classify a TOML value. `name` is only used in error messages.
    pub fn from_toml(name: &str, value: &toml::Value) -> Result<Self, ParamError> {
        match value {
            toml::Value::Boolean(b) => Ok(Self::Flag(*b)),
            toml::Value::Integer(i) => Ok(Self::Scalar(ParamValue::Int(*i))),
            toml::Value::Float(x) => Ok(Self::Scalar(ParamValue::Float(*x))),
            toml::Value::String(s) => Ok(Self::Scalar(ParamValue::Text(s.clone()))),
            toml::Value::Array(items) => {
                if items.is_empty() {
                    return Err(ParamError::invalid(name, "list is empty"));
                }
                let values = items
                    .iter()
                    .map(|item| scalar_from_toml(name, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::List(values))
            }
            toml::Value::Table(table) => {
                let field = |key: &str| {
                    table
                        .get(key)
                        .ok_or_else(|| ParamError::invalid(name, format!("range is missing '{key}'")))
                };
                let (min, max, step) = (field("min")?, field("max")?, field("step")?);
                for key in table.keys() {
                    if !matches!(key.as_str(), "min" | "max" | "step") {
                        return Err(ParamError::invalid(name, format!("unknown range key '{key}'")));
                    }
                }
                let range = match (min, max, step) {
                    (toml::Value::Integer(min), toml::Value::Integer(max), toml::Value::Integer(step)) => {
                        NumRange::Int {
                            min: *min,
                            max: *max,
                            step: *step,
                        }
                    }
                    _ => NumRange::Float {
                        min: number(name, "min", min)?,
                        max: number(name, "max", max)?,
                        step: number(name, "step", step)?,
                    },
                };
                range.validate(name)?;
                Ok(Self::Range(range))
            }
            toml::Value::Datetime(_) => Err(ParamError::invalid(name, "datetimes are not supported")),
        }
    }

    /// Inverse of `from_toml`, used when writing templates.
    pub fn to_toml(&self) -> toml::Value {
        match self {
            Self::Scalar(v) => scalar_to_toml(v),
            Self::Flag(b) => toml::Value::Boolean(*b),
            Self::List(values) => toml::Value::Array(values.iter().map(scalar_to_toml).collect()),
            Self::Range(range) => {
                let mut table = toml::Table::new();
                match range {
                    NumRange::Int { min, max, step } => {
                        table.insert("min".into(), toml::Value::Integer(*min));
                        table.insert("max".into(), toml::Value::Integer(*max));
                        table.insert("step".into(), toml::Value::Integer(*step));
                    }
                    NumRange::Float { min, max, step } => {
                        table.insert("min".into(), toml::Value::Float(*min));
                        table.insert("max".into(), toml::Value::Float(*max));
                        table.insert("step".into(), toml::Value::Float(*step));
                    }
                }
                toml::Value::Table(table)
            }
        }
    }
}

impl NumRange {
    fn validate(&self, name: &str) -> Result<(), ParamError> {
        let (min, max, step) = match *self {
            NumRange::Int { min, max, step } => (min as f64, max as f64, step as f64),
            NumRange::Float { min, max, step } => (min, max, step),
        };
        if !(min.is_finite() && max.is_finite() && step.is_finite()) {
            return Err(ParamError::invalid(name, "range bounds must be finite"));
        }
        if step <= 0.0 {
            return Err(ParamError::invalid(name, "range step must be > 0"));
        }
        if max < min {
            return Err(ParamError::invalid(name, "range max must be >= min"));
        }
        Ok(())
    }
}

fn number(name: &str, key: &str, value: &toml::Value) -> Result<f64, ParamError> {
    match value {
        toml::Value::Integer(i) => Ok(*i as f64),
        toml::Value::Float(x) => Ok(*x),
        _ => Err(ParamError::invalid(name, format!("range '{key}' must be a number"))),
    }
}

fn scalar_from_toml(name: &str, value: &toml::Value) -> Result<ParamValue, ParamError> {
    match value {
        toml::Value::Boolean(b) => Ok(ParamValue::Bool(*b)),
        toml::Value::Integer(i) => Ok(ParamValue::Int(*i)),
        toml::Value::Float(x) => Ok(ParamValue::Float(*x)),
        toml::Value::String(s) => Ok(ParamValue::Text(s.clone())),
        _ => Err(ParamError::invalid(name, "list items must be scalars")),
    }
}

fn scalar_to_toml(value: &ParamValue) -> toml::Value {
    match value {
        ParamValue::Bool(b) => toml::Value::Boolean(*b),
        ParamValue::Int(i) => toml::Value::Integer(*i),
        ParamValue::Float(x) => toml::Value::Float(*x),
        ParamValue::Text(s) => toml::Value::String(s.clone()),
    }
}

/// Ordered mapping from parameter name to definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    entries: Vec<(String, ParamDef)>,
}

impl ParamSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. A repeated name replaces the earlier definition
    /// in place.
    pub fn with(mut self, name: impl Into<String>, def: ParamDef) -> Self {
        self.insert(name, def);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, def: ParamDef) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = def,
            None => self.entries.push((name, def)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamDef> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamDef)> {
        self.entries.iter().map(|(n, d)| (n.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn from_toml_table(table: &toml::Table) -> Result<Self, ParamError> {
        let mut spec = Self::new();
        for (name, value) in table {
            spec.insert(name.clone(), ParamDef::from_toml(name, value)?);
        }
        Ok(spec)
    }

    pub fn to_toml_table(&self) -> toml::Table {
        self.entries
            .iter()
            .map(|(name, def)| (name.clone(), def.to_toml()))
            .collect()
    }
}

/// `[settings]` section of a parameter file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSettings {
    /// At least one `flag_` parameter must be true in every combination.
    #[serde(default)]
    pub flag_forbidden: bool,
}

/// A strategy's full parameter file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub multi: ParamSpec,
    pub single: ParamSpec,
    pub settings: ParamSettings,
}

impl StrategyParams {
    pub fn from_toml_str(text: &str) -> Result<Self, ParamError> {
        let root: toml::Table = text.parse().map_err(|e: toml::de::Error| ParamError::Toml(e.to_string()))?;

        let section = |key: &str| -> Result<Option<&toml::Table>, ParamError> {
            match root.get(key) {
                None => Ok(None),
                Some(toml::Value::Table(t)) => Ok(Some(t)),
                Some(_) => Err(ParamError::Toml(format!("'{key}' must be a table"))),
            }
        };

        let multi = section("multi")?
            .map(ParamSpec::from_toml_table)
            .transpose()?
            .ok_or(ParamError::MissingSection("multi"))?;
        let single = section("single")?
            .map(ParamSpec::from_toml_table)
            .transpose()?
            .unwrap_or_default();
        let settings = match section("settings")? {
            Some(t) => {
                let flag_forbidden = match t.get("flag_forbidden") {
                    None => false,
                    Some(toml::Value::Boolean(b)) => *b,
                    Some(_) => {
                        return Err(ParamError::invalid("flag_forbidden", "must be a boolean"));
                    }
                };
                ParamSettings { flag_forbidden }
            }
            None => ParamSettings::default(),
        };

        if multi.is_empty() {
            return Err(ParamError::MissingSection("multi"));
        }

        Ok(Self {
            multi,
            single,
            settings,
        })
    }

    /// Render back to TOML text with `multi`, `single`, `settings` in order.
    /// Ranges are written as inline tables so entry order survives a reparse.
    pub fn to_toml_string(&self) -> String {
        let mut out = String::new();
        for (section, spec) in [("multi", &self.multi), ("single", &self.single)] {
            out.push_str(&format!("[{section}]\n"));
            for (name, def) in spec.iter() {
                out.push_str(&format!("{name} = {}\n", def.to_toml()));
            }
            out.push('\n');
        }
        out.push_str("[settings]\n");
        out.push_str(&format!("flag_forbidden = {}\n", self.settings.flag_forbidden));
        out
    }
}
