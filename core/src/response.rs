//! Response decoding and error detection.
//!
//! # Design
//! `ElpisResponse` is built once from an `HttpResponse` and never changes.
//! In JSON mode the body is parsed eagerly; a body that is not JSON is kept
//! as a `data` string rather than failing, so the caller still sees what the
//! server sent. `check_for_errors` is the single place where server-side
//! failures become `ElpisError`s.

use serde_json::{Map, Value};

use crate::error::ElpisError;
use crate::http::{reason_phrase, HttpResponse};

/// A decoded reply from the Elpis service.
#[derive(Debug, Clone)]
pub struct ElpisResponse {
    status: u16,
    body: Vec<u8>,
    raw: String,
    json: Option<Value>,
    parsed: bool,
    error: Option<String>,
}

/// Message(s) carried by a top-level `error` field, if non-empty.
fn error_message(root: &Value) -> Option<String> {
    let message = match root.get("error")? {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        Value::Null | Value::Bool(false) => String::new(),
        other => other.to_string(),
    };
    (!message.is_empty()).then_some(message)
}

impl ElpisResponse {
    /// Decode a JSON endpoint's reply.
    pub fn json(response: HttpResponse) -> Self {
        let raw = String::from_utf8_lossy(&response.body).into_owned();
        let (root, parsed) = match serde_json::from_str::<Value>(&raw) {
            Ok(value) => (value, true),
            Err(_) => {
                let mut wrapper = Map::new();
                wrapper.insert("data".to_string(), Value::String(raw.clone()));
                (Value::Object(wrapper), false)
            }
        };
        let error = error_message(&root);
        Self {
            status: response.status,
            body: response.body,
            raw,
            json: Some(root),
            parsed,
            error,
        }
    }

    /// Keep a plain-text or foreign-format reply without parsing it.
    pub fn raw(response: HttpResponse) -> Self {
        let raw = String::from_utf8_lossy(&response.body).into_owned();
        Self {
            status: response.status,
            body: response.body,
            raw,
            json: None,
            parsed: false,
            error: None,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some() || !(200..300).contains(&self.status)
    }

    /// Fail with `Server` when the reply carries an error message, or with
    /// `HttpStatus` when the status is not 2xx and there is no message.
    pub fn check_for_errors(&self) -> Result<(), ElpisError> {
        if let Some(message) = &self.error {
            return Err(ElpisError::Server {
                status: self.status,
                message: message.clone(),
            });
        }
        if !(200..300).contains(&self.status) {
            let reason = if self.raw.trim().is_empty() || self.parsed {
                reason_phrase(self.status).to_string()
            } else {
                self.raw.trim().to_string()
            };
            return Err(ElpisError::HttpStatus {
                status: self.status,
                reason,
            });
        }
        Ok(())
    }

    /// The whole parsed body, when decoded in JSON mode.
    pub fn root(&self) -> Option<&Value> {
        self.json.as_ref()
    }

    /// The `data` member, or the root itself when there is none.
    pub fn data(&self) -> Result<&Value, ElpisError> {
        let root = self
            .json
            .as_ref()
            .ok_or_else(|| ElpisError::shape("data", "present (response was not decoded as JSON)"))?;
        Ok(root.get("data").unwrap_or(root))
    }

    /// A named member of `data`.
    pub fn field(&self, name: &str) -> Result<&Value, ElpisError> {
        self.data()?
            .get(name)
            .ok_or_else(|| ElpisError::shape(name, "present"))
    }

    pub fn str_field(&self, name: &str) -> Result<&str, ElpisError> {
        self.field(name)?
            .as_str()
            .ok_or_else(|| ElpisError::shape(name, "a string"))
    }

    pub fn string_list(&self, name: &str) -> Result<Vec<String>, ElpisError> {
        let items = self
            .field(name)?
            .as_array()
            .ok_or_else(|| ElpisError::shape(name, "an array of strings"))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ElpisError::shape(name, "an array of strings"))
            })
            .collect()
    }

    /// The body as text, unparsed.
    pub fn raw_text(&self) -> &str {
        &self.raw
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }
}
