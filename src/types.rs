//! Core data types
//!
//! This module defines the cell values carried by metrics tables and the
//! categorical scales used to label them.

use crate::error::ComputeError;
use chrono::NaiveDate;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Date format used for dates on the wire
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single nullable cell of a metrics table.
///
/// Floats are always finite: constructing a `Float` from NaN or an infinity
/// yields `Null`, so "missing" is never conflated with a number.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    /// Build a float cell, mapping non-finite values to `Null`
    pub fn float(v: f64) -> Self {
        if v.is_finite() {
            Value::Float(v)
        } else {
            Value::Null
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Numeric view of the cell; `None` for nulls and non-numeric cells
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Int(_) | Value::Float(_) => 0,
            Value::Text(_) => 1,
            Value::Date(_) => 2,
            Value::Null => 3,
        }
    }
}

impl Ord for Value {
    /// Numbers compare numerically, then text, then dates; nulls sort last.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Value::Null, Value::float)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.serialize_str(&d.format(DATE_FORMAT).to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Scalar {
            Int(i64),
            Float(f64),
            Bool(bool),
            Text(String),
        }

        Ok(match Option::<Scalar>::deserialize(deserializer)? {
            None => Value::Null,
            Some(Scalar::Int(v)) => Value::Int(v),
            Some(Scalar::Float(v)) => Value::float(v),
            Some(Scalar::Bool(b)) => Value::Int(i64::from(b)),
            Some(Scalar::Text(s)) => Value::Text(s),
        })
    }
}

/// Question difficulty on a fixed five-level scale.
///
/// Labels are only ever produced by binning a velocity z-score; the
/// declaration order runs from easiest to hardest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DifficultyLabel {
    #[serde(rename = "1-Easy")]
    Easy,
    #[serde(rename = "2-Normal")]
    Normal,
    #[serde(rename = "3-Intermediate")]
    Intermediate,
    #[serde(rename = "4-Tough")]
    Tough,
    #[serde(rename = "5-Challenging")]
    Challenging,
}

impl DifficultyLabel {
    /// Labels in bin order: lowest velocity z-score first
    pub const BIN_ORDER: [DifficultyLabel; 5] = [
        DifficultyLabel::Challenging,
        DifficultyLabel::Tough,
        DifficultyLabel::Intermediate,
        DifficultyLabel::Normal,
        DifficultyLabel::Easy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyLabel::Easy => "1-Easy",
            DifficultyLabel::Normal => "2-Normal",
            DifficultyLabel::Intermediate => "3-Intermediate",
            DifficultyLabel::Tough => "4-Tough",
            DifficultyLabel::Challenging => "5-Challenging",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        Self::BIN_ORDER.into_iter().find(|l| l.as_str() == label)
    }
}

impl fmt::Display for DifficultyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cut points and labels for binning a numeric column.
///
/// Intervals are right-closed, `(cuts[i], cuts[i + 1]]`, except the first,
/// which also includes its lower bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinSpec {
    #[serde(with = "cut_points")]
    pub cuts: Vec<f64>,
    pub labels: Vec<String>,
}

impl BinSpec {
    /// Create a validated bin specification
    pub fn new(cuts: Vec<f64>, labels: Vec<String>) -> Result<Self, ComputeError> {
        let spec = Self { cuts, labels };
        spec.validate()?;
        Ok(spec)
    }

    /// Default question difficulty bins over velocity z-scores
    pub fn difficulty() -> Self {
        Self {
            cuts: vec![f64::NEG_INFINITY, -1.3, -0.3, 0.3, 1.3, f64::INFINITY],
            labels: DifficultyLabel::BIN_ORDER
                .iter()
                .map(|l| l.as_str().to_string())
                .collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.labels.is_empty() || self.cuts.len() != self.labels.len() + 1 {
            return Err(ComputeError::InvalidArgument(format!(
                "expected {} cut points for {} labels, got {}",
                self.labels.len() + 1,
                self.labels.len(),
                self.cuts.len()
            )));
        }
        if self.cuts.iter().any(|c| c.is_nan()) || self.cuts.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ComputeError::InvalidArgument(
                "cut points must be strictly increasing".to_string(),
            ));
        }
        Ok(())
    }

    /// Label of the interval containing `x`, if any
    pub fn label_for(&self, x: f64) -> Option<&str> {
        if x.is_nan() {
            return None;
        }
        self.labels.iter().enumerate().find_map(|(i, label)| {
            let (lo, hi) = (self.cuts[i], self.cuts[i + 1]);
            let above_lo = x > lo || (i == 0 && x == lo);
            (above_lo && x <= hi).then_some(label.as_str())
        })
    }

    /// Bin a column of optional values into text labels
    pub fn bin(&self, values: &[Option<f64>]) -> Vec<Value> {
        values
            .iter()
            .map(|v| {
                v.and_then(|x| self.label_for(x))
                    .map_or(Value::Null, Value::from)
            })
            .collect()
    }
}

/// Serde helpers writing infinite cut points as `"-inf"` / `"inf"`
mod cut_points {
    use serde::de::{self, Deserializer};
    use serde::ser::{SerializeSeq, Serializer};
    use serde::Deserialize;

    pub fn serialize<S: Serializer>(cuts: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(cuts.len()))?;
        for cut in cuts {
            if cut.is_infinite() {
                seq.serialize_element(if *cut > 0.0 { "inf" } else { "-inf" })?;
            } else {
                seq.serialize_element(cut)?;
            }
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Cut {
            Number(f64),
            Text(String),
        }

        Vec::<Cut>::deserialize(deserializer)?
            .into_iter()
            .map(|cut| match cut {
                Cut::Number(v) => Ok(v),
                Cut::Text(t) => match t.trim().to_ascii_lowercase().as_str() {
                    "inf" | "+inf" | "infinity" => Ok(f64::INFINITY),
                    "-inf" | "-infinity" => Ok(f64::NEG_INFINITY),
                    other => Err(de::Error::custom(format!("invalid cut point: {}", other))),
                },
            })
            .collect()
    }
}
