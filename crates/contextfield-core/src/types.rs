//! Core types for Contextfield

use crate::text::{single_quote, unquote};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Clamp a value into [0, 1]. NaN collapses to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Generate a unique entity id with a readable prefix ("attractor-…").
pub fn new_id(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &uuid[..12])
}

/// A point on the unit square.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

impl Location {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: clamp_unit(x),
            y: clamp_unit(y),
        }
    }

    pub fn center() -> Self {
        Self { x: 0.5, y: 0.5 }
    }

    /// Deterministic placement derived from text, so the same pattern
    /// always lands in the same place.
    pub fn from_text(text: &str) -> Self {
        let h = fnv1a(text.as_bytes());
        let x = (h & 0xFFFF) as f64 / 65535.0;
        let y = ((h >> 16) & 0xFFFF) as f64 / 65535.0;
        Self::new(x, y)
    }

    pub fn distance(&self, other: &Location) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Re-clamp after arbitrary mutation.
    pub fn clamped(self) -> Self {
        Self::new(self.x, self.y)
    }
}

/// 64-bit FNV-1a. Stable across builds and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET_BASIS, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME))
}

impl Default for Location {
    fn default() -> Self {
        Self::center()
    }
}

/// Lifecycle tag shared by attractors, residues and activations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Surfaced,
    Integrated,
    Echo,
    #[default]
    Attractor,
    Transient,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Surfaced => write!(f, "surfaced"),
            Self::Integrated => write!(f, "integrated"),
            Self::Echo => write!(f, "echo"),
            Self::Attractor => write!(f, "attractor"),
            Self::Transient => write!(f, "transient"),
        }
    }
}

/// A typed protocol parameter value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Interpret a raw token: quoted string, bool, int, float, else bare string.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.len() >= 2 {
            let bytes = raw.as_bytes();
            let (first, last) = (bytes[0], bytes[raw.len() - 1]);
            if (first == b'"' || first == b'\'') && first == last {
                return Self::Str(unquote(raw));
            }
        }
        match raw {
            "true" | "True" => return Self::Bool(true),
            "false" | "False" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Self::Float(f);
        }
        Self::Str(raw.to_string())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Str(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ParamValue {
    /// Renders in Pareto-lang literal form (strings quoted).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => {
                if x.fract() == 0.0 && x.is_finite() {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Self::Str(s) => f.write_str(&single_quote(s)),
        }
    }
}
