//! Request encoders: one builder per body mode.
//!
//! # Design
//! `Request<B>` holds what every request shares (target URL, headers,
//! cookies); the body type `B` decides how parameters are encoded. A request
//! is built as exactly one of `FormRequest`, `JsonRequest`,
//! `MultipartRequest` or `GetRequest`, so form and JSON parameters can never
//! end up on the same request.
//!
//! Building is two-phase. Setters accumulate; `finish` consumes the builder
//! and produces an `HttpRequest` whose headers are complete before any body
//! byte exists. Form parameters are percent-encoded as they are added, JSON
//! fields are serialised once at `finish`. Multipart files are opened at
//! `finish` but not read: the body becomes a reader that streams each file
//! as the transport sends it, so an upload is never held in memory whole.

use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ElpisError;
use crate::http::{HttpBody, HttpMethod, HttpRequest};

/// `application/x-www-form-urlencoded` alphabet: alphanumerics and `-._*`
/// pass through, everything else (space included) becomes `%XX`.
const FORM: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'*');

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=utf-8";

/// Percent-encode one form name or value as UTF-8.
pub fn form_encode(s: &str) -> String {
    utf8_percent_encode(s, FORM).to_string()
}

/// How a body type encodes itself. Implemented by the four body modes.
pub trait Body {
    /// Content type the body needs, if any. Not applied when the caller
    /// already set `Content-Type` explicitly.
    fn content_type(&self) -> Option<String>;

    /// Encoded query string to append to the URL.
    fn query(&self) -> Option<&str> {
        None
    }

    /// Diagnostic rendering used by `Display`.
    fn describe(&self) -> String;

    /// Produce the body. Called once, after headers are final.
    fn into_body(self) -> Result<Option<HttpBody>, ElpisError>;
}

/// A request under construction. See the module docs.
#[derive(Debug, Clone)]
pub struct Request<B> {
    method: HttpMethod,
    url: String,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    body: B,
}

pub type FormRequest = Request<FormBody>;
pub type JsonRequest = Request<JsonBody>;
pub type MultipartRequest = Request<MultipartBody>;
pub type GetRequest = Request<QueryBody>;

fn upsert(pairs: &mut Vec<(String, String)>, name: String, value: String) {
    match pairs.iter_mut().find(|(k, _)| *k == name) {
        Some(slot) => slot.1 = value,
        None => pairs.push((name, value)),
    }
}

impl<B: Body> Request<B> {
    fn with_body(method: HttpMethod, url: impl Into<String>, body: B) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body,
        }
    }

    /// Set a header. Names are case-sensitive; the last value for a name wins.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        upsert(&mut self.headers, name.into(), value.into());
        self
    }

    pub fn accept(self, media_type: impl Into<String>) -> Self {
        self.header("Accept", media_type)
    }

    /// Set the `Authorization` header when a credential is configured.
    pub fn authorization(self, credential: Option<&str>) -> Self {
        match credential {
            Some(value) => self.header("Authorization", value),
            None => self,
        }
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        upsert(&mut self.cookies, name.into(), value.into());
        self
    }

    pub fn cookies<I, K, V>(self, cookies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        cookies
            .into_iter()
            .fold(self, |req, (name, value)| req.cookie(name, value))
    }

    /// Cookies from a flat `[name, value, name, value, ..]` slice. A trailing
    /// unpaired name is ignored.
    pub fn cookie_pairs(self, pairs: &[&str]) -> Self {
        pairs
            .chunks_exact(2)
            .fold(self, |req, pair| req.cookie(pair[0], pair[1]))
    }

    /// The single `Cookie` header value, or `None` for an empty cookie set.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let joined = self
            .cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        Some(joined)
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Consume the builder: finalise headers, then encode the body.
    pub fn finish(self) -> Result<HttpRequest, ElpisError> {
        let cookie_header = self.cookie_header();
        let mut url = self.url;
        if let Some(query) = self.body.query().filter(|q| !q.is_empty()) {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(query);
        }

        let mut headers = self.headers;
        if let Some(content_type) = self.body.content_type() {
            if !headers
                .iter()
                .any(|(k, _)| k.eq_ignore_ascii_case("Content-Type"))
            {
                headers.push(("Content-Type".to_string(), content_type));
            }
        }
        if let Some(cookies) = cookie_header {
            upsert(&mut headers, "Cookie".to_string(), cookies);
        }

        let body = self.body.into_body()?;
        Ok(HttpRequest {
            method: self.method,
            url,
            headers,
            body,
        })
    }
}

impl<B: Body> fmt::Display for Request<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} : {}", self.method, self.url, self.body.describe())
    }
}

// ---------------------------------------------------------------------------
// Form encoding
// ---------------------------------------------------------------------------

/// Url-encoded `name=value` fragments joined by `&`, encoded as they arrive.
#[derive(Debug, Clone, Default)]
pub struct FormEncoder {
    encoded: String,
}

impl FormEncoder {
    pub fn append(&mut self, name: &str, value: &str) {
        if !self.encoded.is_empty() {
            self.encoded.push('&');
        }
        self.encoded.push_str(&form_encode(name));
        self.encoded.push('=');
        self.encoded.push_str(&form_encode(value));
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn is_empty(&self) -> bool {
        self.encoded.is_empty()
    }
}

/// Parameter setters shared by the form body and the GET query string.
macro_rules! form_params {
    ($body:ty) => {
        impl Request<$body> {
            pub fn param(mut self, name: &str, value: impl AsRef<str>) -> Self {
                self.body.0.append(name, value.as_ref());
                self
            }

            /// `None` is a no-op, so optional parameters can be passed straight through.
            pub fn opt_param<S: AsRef<str>>(self, name: &str, value: Option<S>) -> Self {
                match value {
                    Some(value) => self.param(name, value),
                    None => self,
                }
            }

            /// One repeated parameter per element, in order; `None` elements are skipped.
            pub fn param_values<I, S>(self, name: &str, values: I) -> Self
            where
                I: IntoIterator<Item = Option<S>>,
                S: AsRef<str>,
            {
                values
                    .into_iter()
                    .fold(self, |req, value| req.opt_param(name, value))
            }

            pub fn params<I, K, V>(self, params: I) -> Self
            where
                I: IntoIterator<Item = (K, V)>,
                K: AsRef<str>,
                V: AsRef<str>,
            {
                params
                    .into_iter()
                    .fold(self, |req, (name, value)| req.param(name.as_ref(), value))
            }

            /// The encoded parameters accumulated so far.
            pub fn encoded_params(&self) -> &str {
                self.body.0.as_str()
            }
        }
    };
}

/// Body of a `FormRequest`.
#[derive(Debug, Clone, Default)]
pub struct FormBody(FormEncoder);

impl Body for FormBody {
    fn content_type(&self) -> Option<String> {
        Some(FORM_CONTENT_TYPE.to_string())
    }

    fn describe(&self) -> String {
        self.0.as_str().to_string()
    }

    fn into_body(self) -> Result<Option<HttpBody>, ElpisError> {
        if self.0.is_empty() {
            Ok(None)
        } else {
            Ok(Some(HttpBody::Bytes(self.0.encoded.into_bytes())))
        }
    }
}

impl FormRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Request::with_body(HttpMethod::Post, url, FormBody::default())
    }
}

form_params!(FormBody);

/// Query string of a `GetRequest`.
#[derive(Debug, Clone, Default)]
pub struct QueryBody(FormEncoder);

impl Body for QueryBody {
    fn content_type(&self) -> Option<String> {
        None
    }

    fn query(&self) -> Option<&str> {
        Some(self.0.as_str())
    }

    fn describe(&self) -> String {
        self.0.as_str().to_string()
    }

    fn into_body(self) -> Result<Option<HttpBody>, ElpisError> {
        Ok(None)
    }
}

impl GetRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Request::with_body(HttpMethod::Get, url, QueryBody::default())
    }
}

form_params!(QueryBody);

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Fields of a `JsonRequest`, serialised as one object at `finish`.
#[derive(Debug, Clone, Default)]
pub struct JsonBody {
    fields: Map<String, Value>,
}

impl JsonBody {
    fn render(&self) -> Result<String, ElpisError> {
        serde_json::to_string(&self.fields).map_err(|e| ElpisError::Serialization(e.to_string()))
    }
}

impl Body for JsonBody {
    fn content_type(&self) -> Option<String> {
        (!self.fields.is_empty()).then(|| JSON_CONTENT_TYPE.to_string())
    }

    fn describe(&self) -> String {
        self.render().unwrap_or_default()
    }

    fn into_body(self) -> Result<Option<HttpBody>, ElpisError> {
        if self.fields.is_empty() {
            return Ok(None);
        }
        self.render()
            .map(|json| Some(HttpBody::Bytes(json.into_bytes())))
    }
}

impl JsonRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Request::with_body(HttpMethod::Post, url, JsonBody::default())
    }

    /// Insert or overwrite a field. JSON `null` is a no-op.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.body.fields.insert(name.into(), value);
        }
        self
    }

    pub fn opt_param<V: Into<Value>>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.param(name, value),
            None => self,
        }
    }

    /// The fields accumulated so far.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.body.fields
    }
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum PartContent {
    Text(String),
    File(PathBuf),
    Bytes { filename: String, data: Vec<u8> },
}

#[derive(Debug, Clone)]
struct Part {
    name: String,
    content: PartContent,
}

/// Parts of a `MultipartRequest` and the boundary chosen for them.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    parts: Vec<Part>,
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self {
            boundary: format!("----ElpisBoundary{}", Uuid::new_v4().simple()),
            parts: Vec::new(),
        }
    }
}

/// Media type for an uploaded file, by extension.
fn guess_media_type(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("eaf") => "text/x-eaf+xml",
        Some("txt") => "text/plain",
        Some("xml") => "application/xml",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Quotes and line breaks cannot appear inside a quoted header parameter.
fn quote_safe(s: &str) -> String {
    s.replace('"', "%22").replace('\r', "%0D").replace('\n', "%0A")
}

fn write_part_head(out: &mut Vec<u8>, boundary: &str, name: &str, file: Option<&str>) {
    out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", quote_safe(name));
    if let Some(filename) = file {
        disposition.push_str(&format!("; filename=\"{}\"", quote_safe(filename)));
    }
    out.extend_from_slice(disposition.as_bytes());
    out.extend_from_slice(b"\r\n");
    if let Some(filename) = file {
        out.extend_from_slice(format!("Content-Type: {}\r\n", guess_media_type(filename)).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
}

/// Readers drained one after another. Each is dropped as soon as it is
/// exhausted, so a file is closed once its part has been sent.
pub struct Segments {
    pending: VecDeque<Box<dyn Read + Send>>,
}

impl Segments {
    pub fn new(pending: impl IntoIterator<Item = Box<dyn Read + Send>>) -> Self {
        Self {
            pending: pending.into_iter().collect(),
        }
    }
}

impl Read for Segments {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while let Some(front) = self.pending.front_mut() {
            let n = front.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            self.pending.pop_front();
        }
        Ok(0)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

impl Body for MultipartBody {
    fn content_type(&self) -> Option<String> {
        Some(format!("multipart/form-data; boundary={}", self.boundary))
    }

    fn describe(&self) -> String {
        self.parts
            .iter()
            .map(|part| match &part.content {
                PartContent::Text(value) => format!("{}={}", part.name, value),
                PartContent::File(path) => format!("{}=<{}>", part.name, file_name_of(path)),
                PartContent::Bytes { filename, .. } => format!("{}=<{}>", part.name, filename),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Framing and in-memory parts are buffered; file parts are opened here
    /// and streamed. A file that cannot be opened fails the whole body, and
    /// the files opened before it are closed on return.
    fn into_body(self) -> Result<Option<HttpBody>, ElpisError> {
        let boundary = self.boundary;
        let mut segments: Vec<Box<dyn Read + Send>> = Vec::new();
        let mut out = Vec::new();
        for part in self.parts {
            match part.content {
                PartContent::Text(value) => {
                    write_part_head(&mut out, &boundary, &part.name, None);
                    out.extend_from_slice(value.as_bytes());
                }
                PartContent::File(path) => {
                    let file = File::open(&path)?;
                    write_part_head(&mut out, &boundary, &part.name, Some(&file_name_of(&path)));
                    segments.push(Box::new(Cursor::new(std::mem::take(&mut out))));
                    segments.push(Box::new(file));
                }
                PartContent::Bytes { filename, data } => {
                    write_part_head(&mut out, &boundary, &part.name, Some(&filename));
                    out.extend_from_slice(&data);
                }
            }
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        if segments.is_empty() {
            return Ok(Some(HttpBody::Bytes(out)));
        }
        segments.push(Box::new(Cursor::new(out)));
        Ok(Some(HttpBody::Stream(Box::new(Segments::new(segments)))))
    }
}

impl MultipartRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Request::with_body(HttpMethod::Post, url, MultipartBody::default())
    }

    /// An ordinary form-data text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.body.parts.push(Part {
            name: name.into(),
            content: PartContent::Text(value.into()),
        });
        self
    }

    /// A file part; the file is opened when the request is finished and read
    /// while it is sent.
    pub fn file(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.body.parts.push(Part {
            name: name.into(),
            content: PartContent::File(path.into()),
        });
        self
    }

    /// A file part from memory.
    pub fn file_bytes(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.body.parts.push(Part {
            name: name.into(),
            content: PartContent::Bytes {
                filename: filename.into(),
                data: data.into(),
            },
        });
        self
    }

    pub fn boundary(&self) -> &str {
        &self.body.boundary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use percent_encoding::percent_decode_str;
    use std::io::Write;

    const URL: &str = "http://localhost:5000/api/dataset/new";

    fn decode(s: &str) -> String {
        percent_decode_str(s).decode_utf8().unwrap().into_owned()
    }

    #[test]
    fn form_params_roundtrip_through_percent_decoding() {
        let pairs = [
            ("name", "ds1"),
            ("a&b", "c=d"),
            ("with space", "tab\tand+plus"),
            ("māori", "whakapapa ō"),
            ("empty", ""),
        ];
        let req = FormRequest::new(URL).params(pairs);
        let fragments: Vec<&str> = req.encoded_params().split('&').collect();
        assert_eq!(fragments.len(), pairs.len());
        for (fragment, (name, value)) in fragments.iter().zip(pairs) {
            let (n, v) = fragment.split_once('=').unwrap();
            assert_eq!(decode(n), name);
            assert_eq!(decode(v), value);
        }
    }

    #[test]
    fn space_is_percent_encoded() {
        let req = FormRequest::new(URL).param("tier", "Phrase tier");
        assert_eq!(req.encoded_params(), "tier=Phrase%20tier");
    }

    #[test]
    fn none_param_is_noop() {
        let req = FormRequest::new(URL)
            .param("name", "ds1")
            .opt_param::<&str>("missing", None);
        assert_eq!(req.encoded_params(), "name=ds1");
    }

    #[test]
    fn sequence_becomes_repeated_params_skipping_none() {
        let req = FormRequest::new(URL).param_values("id", vec![Some("a"), None, Some("b")]);
        assert_eq!(req.encoded_params(), "id=a&id=b");
    }

    #[test]
    fn form_finish_sets_content_type_and_body() {
        let req = FormRequest::new(URL).param("name", "ds1").finish().unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.header("Content-Type"), Some(FORM_CONTENT_TYPE));
        assert_eq!(req.body_text(), "name=ds1");
    }

    #[test]
    fn empty_form_has_no_body() {
        let req = FormRequest::new(URL).finish().unwrap();
        assert!(req.body.is_none());
    }

    #[test]
    fn json_last_value_wins_and_roundtrips() {
        let req = JsonRequest::new(URL)
            .param("name", "first")
            .param("dataset_name", "ds")
            .param("name", "second")
            .opt_param::<String>("skipped", None)
            .param("null", Value::Null);
        let finished = req.finish().unwrap();
        let body: Value = serde_json::from_str(&finished.body_text()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"name": "second", "dataset_name": "ds"})
        );
    }

    #[test]
    fn json_content_type_is_in_finished_headers() {
        let req = JsonRequest::new(URL).param("tier", "Phrase").finish().unwrap();
        assert_eq!(req.header("Content-Type"), Some(JSON_CONTENT_TYPE));
        assert_eq!(req.body_text(), r#"{"tier":"Phrase"}"#);
    }

    #[test]
    fn json_without_fields_sends_nothing() {
        let req = JsonRequest::new(URL).finish().unwrap();
        assert!(req.body.is_none());
        assert!(req.header("Content-Type").is_none());
    }

    #[test]
    fn explicit_content_type_is_kept() {
        let req = JsonRequest::new(URL)
            .header("Content-Type", "application/vnd.elpis+json")
            .param("a", "b")
            .finish()
            .unwrap();
        let count = req.headers.iter().filter(|(k, _)| k == "Content-Type").count();
        assert_eq!(count, 1);
        assert_eq!(req.header("Content-Type"), Some("application/vnd.elpis+json"));
    }

    #[test]
    fn explicit_content_type_matches_any_case() {
        let req = FormRequest::new(URL)
            .header("content-type", "text/plain")
            .param("name", "ds1")
            .finish()
            .unwrap();
        let content_types: Vec<&str> = req
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("Content-Type"))
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(content_types, ["text/plain"]);
    }

    #[test]
    fn header_last_write_wins() {
        let req = GetRequest::new(URL)
            .header("Accept", "text/plain")
            .header("Accept", "application/json")
            .finish()
            .unwrap();
        assert_eq!(
            req.headers,
            vec![("Accept".to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn cookies_join_into_one_header() {
        let req = GetRequest::new(URL)
            .cookie("session", "abc")
            .cookies([("theme", "dark")])
            .cookie_pairs(&["lang", "mi", "orphan"])
            .cookie("session", "xyz");
        assert_eq!(
            req.cookie_header().as_deref(),
            Some("session=xyz; theme=dark; lang=mi")
        );
        let finished = req.finish().unwrap();
        assert_eq!(
            finished.header("Cookie"),
            Some("session=xyz; theme=dark; lang=mi")
        );
    }

    #[test]
    fn no_cookies_no_header() {
        let req = GetRequest::new(URL);
        assert!(req.cookie_header().is_none());
        assert!(req.finish().unwrap().header("Cookie").is_none());
    }

    #[test]
    fn authorization_only_when_configured() {
        let with = GetRequest::new(URL).authorization(Some("Bearer t")).finish().unwrap();
        assert_eq!(with.header("Authorization"), Some("Bearer t"));
        let without = GetRequest::new(URL).authorization(None).finish().unwrap();
        assert!(without.header("Authorization").is_none());
    }

    #[test]
    fn get_params_go_to_query_string() {
        let req = GetRequest::new("http://localhost:5000/api/model/status")
            .param("name", "m 1")
            .finish()
            .unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "http://localhost:5000/api/model/status?name=m%201");
        assert!(req.body.is_none());
    }

    #[test]
    fn display_shows_method_url_and_body() {
        let form = FormRequest::new(URL).param("name", "ds1");
        assert_eq!(form.to_string(), format!("POST {URL} : name=ds1"));
        let json = JsonRequest::new(URL).param("name", "ds1");
        assert_eq!(json.to_string(), format!(r#"POST {URL} : {{"name":"ds1"}}"#));
    }

    #[test]
    fn multipart_two_files_share_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.eaf");
        std::fs::File::create(&a).unwrap().write_all(b"RIFF").unwrap();
        std::fs::File::create(&b).unwrap().write_all(b"<ANNOTATION_DOCUMENT/>").unwrap();

        let req = MultipartRequest::new("http://localhost:5000/api/dataset/files")
            .file("file", &a)
            .file("file", &b);
        let boundary = req.boundary().to_string();
        let finished = req.finish().unwrap();
        assert!(finished.body.as_ref().unwrap().is_stream());
        let finished = finished.buffered().unwrap();
        let body = finished.body_text();

        assert_eq!(
            finished.header("Content-Type").unwrap(),
            format!("multipart/form-data; boundary={boundary}")
        );
        assert_eq!(body.matches("Content-Disposition: form-data").count(), 2);
        assert!(body.contains(r#"name="file"; filename="a.wav""#));
        assert!(body.contains(r#"name="file"; filename="b.eaf""#));
        assert!(body.contains("Content-Type: audio/wav"));

        let delimiter = format!("--{boundary}\r\n");
        let closing = format!("--{boundary}--\r\n");
        assert_eq!(body.matches(&delimiter).count(), 2);
        assert!(body.starts_with(&delimiter));
        assert!(body.ends_with(&closing));

        // every part sits between two boundary markers
        let parts: Vec<&str> = body.split(&format!("--{boundary}")).collect();
        assert_eq!(parts.len(), 4);
        assert!(parts[1].contains("RIFF"));
        assert!(parts[2].contains("<ANNOTATION_DOCUMENT/>"));
        assert_eq!(parts[3], "--\r\n");
    }

    #[test]
    fn multipart_text_parts_and_in_memory_files() {
        let req = MultipartRequest::new(URL)
            .text("tier", "Phrase")
            .file_bytes("file", "l2s.txt", b"n n\n".to_vec());
        assert_eq!(req.to_string(), format!("POST {URL} : tier=Phrase, file=<l2s.txt>"));
        let body = req.finish().unwrap().body_text();
        assert!(body.contains("name=\"tier\"\r\n\r\nPhrase\r\n"));
        assert!(body.contains("filename=\"l2s.txt\"\r\nContent-Type: text/plain\r\n\r\nn n\n\r\n"));
    }

    #[test]
    fn multipart_file_is_read_while_sending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let req = MultipartRequest::new(URL).text("tier", "Phrase").file("file", &path);
        let boundary = req.boundary().to_string();
        let Some(HttpBody::Stream(mut reader)) = req.finish().unwrap().body else {
            panic!("file parts should stream");
        };

        // drain in small reads, as a socket writer would
        let mut sent = Vec::new();
        let mut chunk = [0u8; 7];
        loop {
            let n = reader.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            sent.extend_from_slice(&chunk[..n]);
        }

        let head = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"tier\"\r\n\r\nPhrase\r\n\
             --{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"long.wav\"\r\n\
             Content-Type: audio/wav\r\n\r\n"
        );
        let tail = format!("\r\n--{boundary}--\r\n");
        let mut expected = head.into_bytes();
        expected.extend_from_slice(&data);
        expected.extend_from_slice(tail.as_bytes());
        assert_eq!(sent, expected);
    }

    #[test]
    fn segments_skip_empty_readers() {
        let parts: Vec<Box<dyn Read + Send>> = vec![
            Box::new(Cursor::new(b"ab".to_vec())),
            Box::new(io::empty()),
            Box::new(Cursor::new(b"cd".to_vec())),
        ];
        let mut text = String::new();
        Segments::new(parts).read_to_string(&mut text).unwrap();
        assert_eq!(text, "abcd");
    }

    #[test]
    fn multipart_boundaries_differ_per_request() {
        let a = MultipartRequest::new(URL);
        let b = MultipartRequest::new(URL);
        assert_ne!(a.boundary(), b.boundary());
    }

    #[test]
    fn multipart_missing_file_is_io_error() {
        let err = MultipartRequest::new(URL)
            .file("file", "/definitely/not/here.wav")
            .finish()
            .unwrap_err();
        assert!(matches!(err, ElpisError::Io(_)));
    }
}
