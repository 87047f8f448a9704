use serde::{Deserialize, Serialize};

/// A value stored in a session's open data mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SessionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl SessionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SessionValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SessionValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            SessionValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SessionValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SessionValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            SessionValue::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for SessionValue {
    fn from(v: bool) -> Self {
        SessionValue::Bool(v)
    }
}

impl From<i64> for SessionValue {
    fn from(v: i64) -> Self {
        SessionValue::Int(v)
    }
}

impl From<i32> for SessionValue {
    fn from(v: i32) -> Self {
        SessionValue::Int(i64::from(v))
    }
}

impl From<u32> for SessionValue {
    fn from(v: u32) -> Self {
        SessionValue::Int(i64::from(v))
    }
}

impl From<f64> for SessionValue {
    fn from(v: f64) -> Self {
        SessionValue::Float(v)
    }
}

impl From<String> for SessionValue {
    fn from(v: String) -> Self {
        SessionValue::Text(v)
    }
}

impl From<&str> for SessionValue {
    fn from(v: &str) -> Self {
        SessionValue::Text(v.to_owned())
    }
}

impl From<Vec<u8>> for SessionValue {
    fn from(v: Vec<u8>) -> Self {
        SessionValue::Bytes(v)
    }
}

impl From<serde_json::Value> for SessionValue {
    fn from(v: serde_json::Value) -> Self {
        SessionValue::Json(v)
    }
}
