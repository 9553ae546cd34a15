//! The Elpis endpoint table and the shapes their replies are projected into.
//!
//! Each `Endpoint` knows its path under the API base URL, its method, the
//! `Accept` type it asks for and whether its reply is JSON. Each `Shape`
//! turns a checked `ElpisResponse` into the value the client method returns.

use serde_json::Value;

use crate::error::ElpisError;
use crate::http::HttpMethod;
use crate::response::ElpisResponse;
use crate::types::{Lexicon, ModelResults, WordList};

pub const ACCEPT_JSON: &str = "application/json";
pub const ACCEPT_TEXT: &str = "text/plain";
pub const ACCEPT_EAF: &str = "text/x-eaf+xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    DatasetNew,
    DatasetList,
    DatasetLoad,
    DatasetSettings,
    DatasetFiles,
    DatasetPrepare,
    PronDictNew,
    PronDictLoad,
    PronDictList,
    PronDictL2s,
    PronDictGenerateLexicon,
    PronDictSaveLexicon,
    ModelList,
    ModelNew,
    ModelLoad,
    ModelSettings,
    ModelTrain,
    ModelStatus,
    ModelResults,
    TranscriptionNew,
    TranscriptionTranscribe,
    TranscriptionStatus,
    TranscriptionText,
    TranscriptionElan,
    ConfigReset,
}

impl Endpoint {
    /// Path relative to the API base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::DatasetNew => "dataset/new",
            Endpoint::DatasetList => "dataset/list",
            Endpoint::DatasetLoad => "dataset/load",
            Endpoint::DatasetSettings => "dataset/settings",
            Endpoint::DatasetFiles => "dataset/files",
            Endpoint::DatasetPrepare => "dataset/prepare",
            Endpoint::PronDictNew => "pron-dict/new",
            Endpoint::PronDictLoad => "pron-dict/load",
            Endpoint::PronDictList => "pron-dict/list",
            Endpoint::PronDictL2s => "pron-dict/l2s",
            Endpoint::PronDictGenerateLexicon => "pron-dict/generate-lexicon",
            Endpoint::PronDictSaveLexicon => "pron-dict/save-lexicon",
            Endpoint::ModelList => "model/list",
            Endpoint::ModelNew => "model/new",
            Endpoint::ModelLoad => "model/load",
            Endpoint::ModelSettings => "model/settings",
            Endpoint::ModelTrain => "model/train",
            Endpoint::ModelStatus => "model/status",
            Endpoint::ModelResults => "model/results",
            Endpoint::TranscriptionNew => "transcription/new",
            Endpoint::TranscriptionTranscribe => "transcription/transcribe",
            Endpoint::TranscriptionStatus => "transcription/status",
            Endpoint::TranscriptionText => "transcription/text",
            Endpoint::TranscriptionElan => "transcription/elan",
            Endpoint::ConfigReset => "config/reset",
        }
    }

    pub fn method(&self) -> HttpMethod {
        match self {
            Endpoint::DatasetList
            | Endpoint::PronDictList
            | Endpoint::PronDictGenerateLexicon
            | Endpoint::ModelList
            | Endpoint::ModelTrain
            | Endpoint::ModelStatus
            | Endpoint::ModelResults
            | Endpoint::TranscriptionTranscribe
            | Endpoint::TranscriptionStatus
            | Endpoint::TranscriptionText
            | Endpoint::TranscriptionElan => HttpMethod::Get,
            _ => HttpMethod::Post,
        }
    }

    pub fn accept(&self) -> &'static str {
        match self {
            Endpoint::TranscriptionText => ACCEPT_TEXT,
            Endpoint::TranscriptionElan => ACCEPT_EAF,
            _ => ACCEPT_JSON,
        }
    }

    /// Whether the reply is parsed as JSON before projection.
    pub fn replies_json(&self) -> bool {
        self.accept() == ACCEPT_JSON
    }
}

/// Projection from a checked response to a typed result.
pub trait Shape {
    type Output;

    fn project(&self, response: &ElpisResponse) -> Result<Self::Output, ElpisError>;
}

/// No result beyond success.
pub struct Unit;

impl Shape for Unit {
    type Output = ();

    fn project(&self, _response: &ElpisResponse) -> Result<(), ElpisError> {
        Ok(())
    }
}

/// A `data` field holding an array of strings.
pub struct Strings(pub &'static str);

impl Shape for Strings {
    type Output = Vec<String>;

    fn project(&self, response: &ElpisResponse) -> Result<Vec<String>, ElpisError> {
        response.string_list(self.0)
    }
}

/// A `data` field holding an array of objects; yields each object's `name`.
pub struct Names(pub &'static str);

impl Shape for Names {
    type Output = Vec<String>;

    fn project(&self, response: &ElpisResponse) -> Result<Vec<String>, ElpisError> {
        let items = response
            .field(self.0)?
            .as_array()
            .ok_or_else(|| ElpisError::shape(self.0, "an array"))?;
        items
            .iter()
            .map(|item| match item {
                Value::Object(object) => object
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| ElpisError::shape(format!("{}[].name", self.0), "a string")),
                // older servers list bare names
                Value::String(name) => Ok(name.clone()),
                _ => Err(ElpisError::shape(self.0, "an array of named objects")),
            })
            .collect()
    }
}

/// A single string field of `data`.
pub struct Scalar(pub &'static str);

impl Shape for Scalar {
    type Output = String;

    fn project(&self, response: &ElpisResponse) -> Result<String, ElpisError> {
        response.str_field(self.0).map(str::to_string)
    }
}

/// A `data` object of metric name to value. Non-string values are rendered
/// as JSON text.
pub struct StringMap(pub &'static str);

impl Shape for StringMap {
    type Output = ModelResults;

    fn project(&self, response: &ElpisResponse) -> Result<ModelResults, ElpisError> {
        let object = response
            .field(self.0)?
            .as_object()
            .ok_or_else(|| ElpisError::shape(self.0, "an object"))?;
        Ok(object
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect())
    }
}

/// Word frequencies. The service sends the word list as JSON text inside a
/// string field; an inline object is accepted too.
pub struct Frequencies(pub &'static str);

impl Shape for Frequencies {
    type Output = WordList;

    fn project(&self, response: &ElpisResponse) -> Result<WordList, ElpisError> {
        let field = response.field(self.0)?;
        let parsed;
        let object = match field {
            Value::String(text) => {
                parsed = serde_json::from_str::<Value>(text)
                    .map_err(|_| ElpisError::shape(self.0, "a JSON object of counts"))?;
                parsed
                    .as_object()
                    .ok_or_else(|| ElpisError::shape(self.0, "a JSON object of counts"))?
            }
            Value::Object(object) => object,
            _ => return Err(ElpisError::shape(self.0, "a JSON object of counts")),
        };
        object
            .iter()
            .map(|(word, count)| {
                count
                    .as_u64()
                    .map(|n| (word.clone(), n))
                    .ok_or_else(|| {
                        ElpisError::shape(format!("{}.{word}", self.0), "a non-negative integer")
                    })
            })
            .collect()
    }
}

/// A lexicon text field, parsed line by line.
pub struct LexiconText(pub &'static str);

impl Shape for LexiconText {
    type Output = Lexicon;

    fn project(&self, response: &ElpisResponse) -> Result<Lexicon, ElpisError> {
        response.str_field(self.0).map(Lexicon::parse)
    }
}

/// The unparsed body as text.
pub struct Raw;

impl Shape for Raw {
    type Output = String;

    fn project(&self, response: &ElpisResponse) -> Result<String, ElpisError> {
        Ok(response.raw_text().to_string())
    }
}

/// The unparsed body, byte for byte.
pub struct RawBytes;

impl Shape for RawBytes {
    type Output = Vec<u8>;

    fn project(&self, response: &ElpisResponse) -> Result<Vec<u8>, ElpisError> {
        Ok(response.bytes().to_vec())
    }
}

/// The checked response itself, for callers that want fields the typed
/// methods drop.
pub struct Whole;

impl Shape for Whole {
    type Output = ElpisResponse;

    fn project(&self, response: &ElpisResponse) -> Result<ElpisResponse, ElpisError> {
        Ok(response.clone())
    }
}
