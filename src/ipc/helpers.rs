use super::error::err;
use serde_json::Value;

/// Error carrier used inside handler bodies; converted to a wire response
/// at the dispatch boundary.
#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: &'static str, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn query_failed(e: anyhow::Error) -> Self {
        Self::new("store_query_failed", e.to_string())
    }

    pub fn write_failed(e: anyhow::Error) -> Self {
        Self::new("store_write_failed", e.to_string())
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Numbers arrive either as JSON numbers or as numeric strings (forms send
/// strings); both are accepted, anything else is a bad_params.
pub fn required_f64(params: &Value, key: &str) -> Result<f64, HandlerErr> {
    match params.get(key) {
        Some(v) => {
            as_f64(v).ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key)))
        }
        None => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

/// Missing or non-numeric fields count as zero, matching how the intake
/// forms treat blank fee components.
pub fn f64_or_zero(params: &Value, key: &str) -> f64 {
    params.get(key).and_then(as_f64).unwrap_or(0.0)
}

pub fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Store ids live outside document bodies; responses carry them inline.
pub fn with_id(id: &str, body: Value) -> Value {
    let mut obj = body.as_object().cloned().unwrap_or_default();
    obj.insert("id".to_string(), Value::String(id.to_string()));
    Value::Object(obj)
}

pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn required_string_array(params: &Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(items) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must contain strings", key)))
        })
        .collect()
}
