//! Blocking client for the Elpis speech-recognition training service.
//!
//! # Overview
//! Elpis exposes dataset, pronunciation-dictionary, model and transcription
//! endpoints under `/api/`. `ElpisClient` wraps each one in a typed method;
//! underneath, a request builder encodes form, JSON or multipart bodies and
//! `ElpisResponse` turns replies into data or an `ElpisError`.
//!
//! # Design
//! - Building and executing are separate. `Request::finish` yields a plain
//!   `HttpRequest`, a `Transport` turns that into an `HttpResponse`, and the
//!   decoder never touches the network. The default transport is `ureq`.
//! - The body encoding is part of the request type, so form and JSON
//!   parameters cannot be mixed on one request.
//! - The endpoint table lives in `endpoint.rs`; client methods only pick an
//!   endpoint, fill in parameters and name the result shape.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod request;
pub mod response;
pub mod transport;
pub mod types;

pub use client::ElpisClient;
pub use config::ElpisConfig;
pub use endpoint::Endpoint;
pub use error::ElpisError;
pub use http::{HttpBody, HttpMethod, HttpRequest, HttpResponse};
pub use request::{FormRequest, GetRequest, JsonRequest, MultipartRequest, Request};
pub use response::ElpisResponse;
pub use transport::{Transport, UreqTransport};
pub use types::{Lexicon, LexiconEntry, ModelResults, WordList};
