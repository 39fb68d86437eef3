//! TCS status snapshot
//!
//! One snapshot is the complete answer to a single "get status" call. It is
//! never edited after the fact; a refresh replaces it wholesale.

use crate::error::{TcsError, TcsResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Status field names reported by the Swope TCS
pub mod fields {
    pub const ALT: &str = "Alt";
    pub const AZI: &str = "Azi";
    pub const RA_ICRS: &str = "RA_ICRS";
    pub const DEC_ICRS: &str = "Dec_ICRS";
    pub const TRACKING: &str = "Tracking";
    pub const SLEWING: &str = "Slewing";
    pub const INIT_DONE: &str = "Init_done";
    pub const FOCUS_POS: &str = "FocusPos";
    pub const DOME_AZ: &str = "Dome_az";
    pub const DOME_AUTO: &str = "Dome_auto";
    pub const TUBE_FANS: &str = "Tube_Fans";
    pub const DOME_LIGHTS: &str = "DomeLights";
}

/// A single status value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl StatusValue {
    fn type_name(&self) -> &'static str {
        match self {
            StatusValue::Bool(_) => "bool",
            StatusValue::Int(_) => "integer",
            StatusValue::Float(_) => "float",
            StatusValue::Text(_) => "text",
        }
    }
}

impl From<bool> for StatusValue {
    fn from(v: bool) -> Self {
        StatusValue::Bool(v)
    }
}

impl From<i64> for StatusValue {
    fn from(v: i64) -> Self {
        StatusValue::Int(v)
    }
}

impl From<i32> for StatusValue {
    fn from(v: i32) -> Self {
        StatusValue::Int(v as i64)
    }
}

impl From<f64> for StatusValue {
    fn from(v: f64) -> Self {
        StatusValue::Float(v)
    }
}

impl From<&str> for StatusValue {
    fn from(v: &str) -> Self {
        StatusValue::Text(v.to_string())
    }
}

/// Full TCS status as returned by one remote call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusSnapshot {
    fields: HashMap<String, StatusValue>,
}

impl StatusSnapshot {
    pub fn new(fields: HashMap<String, StatusValue>) -> Self {
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&StatusValue> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn require(&self, field: &str) -> TcsResult<&StatusValue> {
        self.fields
            .get(field)
            .ok_or_else(|| TcsError::MissingField(field.to_string()))
    }

    fn wrong_type(field: &str, expected: &'static str, value: &StatusValue) -> TcsError {
        TcsError::WrongType {
            field: field.to_string(),
            expected,
            actual: value.type_name(),
        }
    }

    /// Numeric field, accepting integer or float encodings
    pub fn get_f64(&self, field: &str) -> TcsResult<f64> {
        match self.require(field)? {
            StatusValue::Float(v) => Ok(*v),
            StatusValue::Int(v) => Ok(*v as f64),
            other => Err(Self::wrong_type(field, "number", other)),
        }
    }

    /// Integer field; floats are accepted when they carry no fraction
    pub fn get_i64(&self, field: &str) -> TcsResult<i64> {
        match self.require(field)? {
            StatusValue::Int(v) => Ok(*v),
            StatusValue::Float(v) if v.fract() == 0.0 => Ok(*v as i64),
            other => Err(Self::wrong_type(field, "integer", other)),
        }
    }

    /// Flag field; the TCS reports some flags as 0/1
    pub fn get_bool(&self, field: &str) -> TcsResult<bool> {
        match self.require(field)? {
            StatusValue::Bool(v) => Ok(*v),
            StatusValue::Int(0) => Ok(false),
            StatusValue::Int(1) => Ok(true),
            other => Err(Self::wrong_type(field, "bool", other)),
        }
    }

    pub fn get_str(&self, field: &str) -> TcsResult<&str> {
        match self.require(field)? {
            StatusValue::Text(v) => Ok(v),
            other => Err(Self::wrong_type(field, "text", other)),
        }
    }
}

impl<K: Into<String>, V: Into<StatusValue>> FromIterator<(K, V)> for StatusSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
