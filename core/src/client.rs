//! Typed client for the Elpis HTTP API.
//!
//! # Design
//! `ElpisClient` holds the API base URL, an optional credential, the verbose
//! flag and a `Transport`. It has no mutable state and every method takes
//! `&self`. Each operation is one call to `invoke`: pick the endpoint, fill
//! in a request builder, name the shape of the result. A training session
//! runs in this order:
//!
//! 1. `dataset_new`, `dataset_settings`, `dataset_files`, `dataset_prepare`
//! 2. `pron_dict_new`, `pron_dict_l2s`, `pron_dict_generate_lexicon`,
//!    `pron_dict_save_lexicon`
//! 3. `model_new`, `model_settings`, `model_train`, then poll `model_status`
//! 4. `transcription_new`, `transcription_transcribe`, then poll
//!    `transcription_status`, then `transcription_text` / `transcription_elan`
//! 5. `config_reset`
//!
//! The client does not check that order; the service rejects calls made out
//! of sequence and that comes back as `ElpisError::Server`.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info};
use url::Url;

use crate::config::{api_base, ElpisConfig};
use crate::endpoint::{
    Endpoint, Frequencies, LexiconText, Names, Raw, RawBytes, Scalar, Shape, StringMap, Strings,
    Unit,
};
use crate::error::ElpisError;
use crate::http::HttpMethod;
use crate::request::{Body, FormRequest, GetRequest, JsonRequest, MultipartRequest, Request};
use crate::response::ElpisResponse;
use crate::transport::{Transport, UreqTransport};
use crate::types::{read_lexicon_file, Lexicon, ModelResults, WordList};

/// Blocking client for one Elpis service.
#[derive(Debug, Clone)]
pub struct ElpisClient<T = UreqTransport> {
    base_url: Url,
    authorization: Option<String>,
    verbose: bool,
    transport: T,
}

impl ElpisClient<UreqTransport> {
    /// Client for `url` (`/api/` is appended when missing) over HTTP.
    pub fn new(url: &str) -> Result<Self, ElpisError> {
        Self::from_config(ElpisConfig::new(url))
    }

    pub fn from_config(config: ElpisConfig) -> Result<Self, ElpisError> {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl<T: Transport> ElpisClient<T> {
    pub fn with_transport(config: ElpisConfig, transport: T) -> Result<Self, ElpisError> {
        let base_url = Url::parse(&api_base(&config.base_url))?;
        Ok(Self {
            base_url,
            authorization: config.authorization,
            verbose: config.verbose,
            transport,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Absolute URL of an endpoint.
    pub fn url(&self, endpoint: Endpoint) -> Result<String, ElpisError> {
        Ok(self.base_url.join(endpoint.path())?.to_string())
    }

    fn prepare<B: Body>(&self, request: Request<B>, endpoint: Endpoint) -> Request<B> {
        request
            .accept(endpoint.accept())
            .authorization(self.authorization.as_deref())
    }

    // Builders aimed at an endpoint with `Accept` and `Authorization` set.
    // Pair one with `invoke` and the `Whole` shape to reach reply fields the
    // typed methods drop.

    pub fn get_request(&self, endpoint: Endpoint) -> Result<GetRequest, ElpisError> {
        Ok(self.prepare(GetRequest::new(self.url(endpoint)?), endpoint))
    }

    pub fn form_request(&self, endpoint: Endpoint) -> Result<FormRequest, ElpisError> {
        Ok(self.prepare(FormRequest::new(self.url(endpoint)?), endpoint))
    }

    pub fn json_request(&self, endpoint: Endpoint) -> Result<JsonRequest, ElpisError> {
        Ok(self.prepare(JsonRequest::new(self.url(endpoint)?), endpoint))
    }

    pub fn multipart_request(&self, endpoint: Endpoint) -> Result<MultipartRequest, ElpisError> {
        Ok(self.prepare(MultipartRequest::new(self.url(endpoint)?), endpoint))
    }

    /// Send `request`, decode the reply the way `endpoint` expects, surface
    /// server errors, then project the result through `shape`.
    pub fn invoke<B: Body, S: Shape>(
        &self,
        endpoint: Endpoint,
        request: Request<B>,
        shape: S,
    ) -> Result<S::Output, ElpisError> {
        if self.verbose {
            info!(endpoint = endpoint.path(), "{request}");
        } else {
            debug!(endpoint = endpoint.path(), "{request}");
        }

        let request = request.finish()?;
        let response = self.transport.execute(request)?;

        if self.verbose {
            info!(
                endpoint = endpoint.path(),
                status = response.status,
                bytes = response.body.len(),
                "response"
            );
            debug!(body = %String::from_utf8_lossy(&response.body), "response body");
        } else {
            debug!(
                endpoint = endpoint.path(),
                status = response.status,
                bytes = response.body.len(),
                "response"
            );
        }

        let response = if endpoint.replies_json() {
            ElpisResponse::json(response)
        } else {
            ElpisResponse::raw(response)
        };
        response.check_for_errors()?;
        shape.project(&response)
    }

    /// Invoke an endpoint that takes no parameters.
    fn call<S: Shape>(&self, endpoint: Endpoint, shape: S) -> Result<S::Output, ElpisError> {
        match endpoint.method() {
            HttpMethod::Get => self.invoke(endpoint, self.get_request(endpoint)?, shape),
            HttpMethod::Post => self.invoke(endpoint, self.form_request(endpoint)?, shape),
        }
    }

    // -----------------------------------------------------------------------
    // Datasets
    // -----------------------------------------------------------------------

    pub fn dataset_new(&self, name: &str) -> Result<(), ElpisError> {
        let request = self.json_request(Endpoint::DatasetNew)?.param("name", name);
        self.invoke(Endpoint::DatasetNew, request, Unit)
    }

    pub fn dataset_list(&self) -> Result<Vec<String>, ElpisError> {
        self.call(Endpoint::DatasetList, Strings("list"))
    }

    pub fn dataset_load(&self, name: &str) -> Result<(), ElpisError> {
        let request = self.json_request(Endpoint::DatasetLoad)?.param("name", name);
        self.invoke(Endpoint::DatasetLoad, request, Unit)
    }

    /// `tier` names the ELAN tier holding the transcript.
    pub fn dataset_settings(&self, tier: &str) -> Result<(), ElpisError> {
        let request = self.json_request(Endpoint::DatasetSettings)?.param("tier", tier);
        self.invoke(Endpoint::DatasetSettings, request, Unit)
    }

    /// Upload wav recordings and/or ELAN transcripts. Returns every file
    /// uploaded to the dataset so far.
    pub fn dataset_files<I, P>(&self, files: I) -> Result<Vec<String>, ElpisError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let request = files
            .into_iter()
            .fold(self.multipart_request(Endpoint::DatasetFiles)?, |req, file| {
                req.file("file", file.as_ref())
            });
        self.invoke(Endpoint::DatasetFiles, request, Strings("files"))
    }

    /// Build word/frequency lists from the uploaded transcripts.
    pub fn dataset_prepare(&self) -> Result<WordList, ElpisError> {
        self.call(Endpoint::DatasetPrepare, Frequencies("wordlist"))
    }

    // -----------------------------------------------------------------------
    // Pronunciation dictionaries
    // -----------------------------------------------------------------------

    pub fn pron_dict_new(&self, name: &str, dataset_name: &str) -> Result<(), ElpisError> {
        let request = self
            .json_request(Endpoint::PronDictNew)?
            .param("name", name)
            .param("dataset_name", dataset_name);
        self.invoke(Endpoint::PronDictNew, request, Unit)
    }

    pub fn pron_dict_load(&self, name: &str) -> Result<(), ElpisError> {
        let request = self.json_request(Endpoint::PronDictLoad)?.param("name", name);
        self.invoke(Endpoint::PronDictLoad, request, Unit)
    }

    pub fn pron_dict_list(&self) -> Result<Vec<String>, ElpisError> {
        self.call(Endpoint::PronDictList, Names("list"))
    }

    /// Upload the letter-to-sound mapping: one line per orthographic symbol,
    /// a space, then its pronunciation. Lines starting with `#` are comments.
    pub fn pron_dict_l2s(&self, file: impl AsRef<Path>) -> Result<(), ElpisError> {
        let request = self
            .multipart_request(Endpoint::PronDictL2s)?
            .file("file", file.as_ref());
        self.invoke(Endpoint::PronDictL2s, request, Unit)
    }

    /// Pronunciations generated from the dataset's words and the
    /// letter-to-sound mapping.
    pub fn pron_dict_generate_lexicon(&self) -> Result<Lexicon, ElpisError> {
        self.call(Endpoint::PronDictGenerateLexicon, LexiconText("lexicon"))
    }

    /// Replace the dictionary with the contents of a lexicon file.
    pub fn pron_dict_save_lexicon_file(&self, file: impl AsRef<Path>) -> Result<(), ElpisError> {
        let content = read_lexicon_file(file.as_ref())?;
        let request = self
            .json_request(Endpoint::PronDictSaveLexicon)?
            .param("lexicon", content);
        self.invoke(Endpoint::PronDictSaveLexicon, request, Unit)
    }

    /// Replace the dictionary with `lexicon`, staged through a temporary file
    /// that is removed whether or not the upload succeeds.
    pub fn pron_dict_save_lexicon(&self, lexicon: &Lexicon) -> Result<(), ElpisError> {
        let mut staged = tempfile::Builder::new()
            .prefix("pronDictSaveLexicon-")
            .suffix(".txt")
            .tempfile()?;
        staged.write_all(lexicon.to_string().as_bytes())?;
        staged.flush()?;
        self.pron_dict_save_lexicon_file(staged.path())
    }

    // -----------------------------------------------------------------------
    // Models
    // -----------------------------------------------------------------------

    pub fn model_list(&self) -> Result<Vec<String>, ElpisError> {
        self.call(Endpoint::ModelList, Names("list"))
    }

    pub fn model_new(&self, name: &str, pron_dict_name: &str) -> Result<(), ElpisError> {
        let request = self
            .json_request(Endpoint::ModelNew)?
            .param("name", name)
            .param("pron_dict_name", pron_dict_name);
        self.invoke(Endpoint::ModelNew, request, Unit)
    }

    pub fn model_load(&self, name: &str) -> Result<(), ElpisError> {
        let request = self.json_request(Endpoint::ModelLoad)?.param("name", name);
        self.invoke(Endpoint::ModelLoad, request, Unit)
    }

    /// `ngram` is the language model's n-gram order. Sent as a string.
    pub fn model_settings(&self, ngram: u32) -> Result<(), ElpisError> {
        let request = self
            .json_request(Endpoint::ModelSettings)?
            .param("ngram", ngram.to_string());
        self.invoke(Endpoint::ModelSettings, request, Unit)
    }

    /// Start training; returns the training status.
    pub fn model_train(&self) -> Result<String, ElpisError> {
        self.call(Endpoint::ModelTrain, Scalar("status"))
    }

    pub fn model_status(&self) -> Result<String, ElpisError> {
        self.call(Endpoint::ModelStatus, Scalar("status"))
    }

    /// Metrics for the trained model.
    pub fn model_results(&self) -> Result<ModelResults, ElpisError> {
        self.call(Endpoint::ModelResults, StringMap("results"))
    }

    // -----------------------------------------------------------------------
    // Transcription
    // -----------------------------------------------------------------------

    /// Upload the wav recording to transcribe.
    pub fn transcription_new(&self, file: impl AsRef<Path>) -> Result<(), ElpisError> {
        let request = self
            .multipart_request(Endpoint::TranscriptionNew)?
            .file("file", file.as_ref());
        self.invoke(Endpoint::TranscriptionNew, request, Unit)
    }

    /// Start transcribing the last uploaded recording; returns the status.
    pub fn transcription_transcribe(&self) -> Result<String, ElpisError> {
        self.call(Endpoint::TranscriptionTranscribe, Scalar("status"))
    }

    pub fn transcription_status(&self) -> Result<String, ElpisError> {
        self.call(Endpoint::TranscriptionStatus, Scalar("status"))
    }

    /// Plain-text transcript.
    pub fn transcription_text(&self) -> Result<String, ElpisError> {
        self.call(Endpoint::TranscriptionText, Raw)
    }

    /// ELAN transcript with one aligned annotation per word token. The file
    /// is deleted when the returned handle is dropped; use
    /// `NamedTempFile::keep` to hold on to it.
    pub fn transcription_elan(&self) -> Result<NamedTempFile, ElpisError> {
        let eaf = self.call(Endpoint::TranscriptionElan, RawBytes)?;
        let mut file = tempfile::Builder::new()
            .prefix("transcriptionElan-")
            .suffix(".eaf")
            .tempfile()?;
        file.write_all(&eaf)?;
        file.flush()?;
        Ok(file)
    }

    // -----------------------------------------------------------------------
    // Config
    // -----------------------------------------------------------------------

    /// Delete every upload, dataset, dictionary and model on the service.
    pub fn config_reset(&self) -> Result<(), ElpisError> {
        self.call(Endpoint::ConfigReset, Unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Whole;
    use crate::http::{HttpRequest, HttpResponse};
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Replies with canned bodies per API path and records what it was sent.
    #[derive(Debug, Default)]
    struct Canned {
        replies: HashMap<&'static str, (u16, &'static str)>,
        seen: RefCell<Vec<HttpRequest>>,
    }

    impl Canned {
        fn reply(mut self, path: &'static str, status: u16, body: &'static str) -> Self {
            self.replies.insert(path, (status, body));
            self
        }

        fn last(&self) -> HttpRequest {
            self.seen.borrow_mut().pop().unwrap()
        }
    }

    impl Transport for Canned {
        fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ElpisError> {
            let request = request.buffered()?;
            let path = request.url.split("/api/").nth(1).unwrap_or_default();
            let path = path.split('?').next().unwrap_or_default().to_string();
            self.seen.borrow_mut().push(request);
            match self.replies.get(path.as_str()) {
                Some((status, body)) => Ok(HttpResponse::new(*status, *body)),
                None => Err(ElpisError::Transport(format!("connection refused: {path}"))),
            }
        }
    }

    fn client(canned: Canned) -> ElpisClient<Canned> {
        ElpisClient::with_transport(ElpisConfig::new("http://localhost:5000"), canned).unwrap()
    }

    const OK: &str = r#"{"status":200,"data":{}}"#;

    #[test]
    fn base_url_gets_api_suffix() {
        let c = client(Canned::default());
        assert_eq!(c.base_url().as_str(), "http://localhost:5000/api/");
        assert_eq!(
            c.url(Endpoint::PronDictL2s).unwrap(),
            "http://localhost:5000/api/pron-dict/l2s"
        );
    }

    #[test]
    fn malformed_base_url_is_rejected() {
        let err = ElpisClient::with_transport(ElpisConfig::new("not a url"), Canned::default())
            .unwrap_err();
        assert!(matches!(err, ElpisError::InvalidUrl(_)));
        assert!(err.is_transport());
    }

    #[test]
    fn dataset_new_posts_json_name() {
        let c = client(Canned::default().reply("dataset/new", 200, OK));
        c.dataset_new("ds1").unwrap();
        let req = c.transport().last();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://localhost:5000/api/dataset/new");
        assert_eq!(req.header("Accept"), Some("application/json"));
        assert_eq!(req.header("Content-Type"), Some("application/json;charset=utf-8"));
        assert_eq!(req.body_text(), r#"{"name":"ds1"}"#);
        assert!(req.header("Authorization").is_none());
    }

    #[test]
    fn authorization_is_sent_when_configured() {
        let config = ElpisConfig::new("http://localhost:5000/api/").with_authorization("Basic dTpw");
        let c = ElpisClient::with_transport(config, Canned::default().reply("model/status", 200, r#"{"data":{"status":"ready"}}"#))
            .unwrap();
        assert_eq!(c.model_status().unwrap(), "ready");
        assert_eq!(c.transport().last().header("Authorization"), Some("Basic dTpw"));
    }

    #[test]
    fn dataset_list_extracts_names() {
        let c = client(Canned::default().reply("dataset/list", 200, r#"{"data":{"list":["a","b"]}}"#));
        assert_eq!(c.dataset_list().unwrap(), ["a", "b"]);
        assert_eq!(c.transport().last().method, HttpMethod::Get);
    }

    #[test]
    fn server_error_is_domain_error() {
        let c = client(Canned::default().reply("dataset/load", 200, r#"{"error":"dataset not found"}"#));
        let err = c.dataset_load("nope").unwrap_err();
        assert!(err.is_domain());
        assert_eq!(err.server_message(), Some("dataset not found"));
    }

    #[test]
    fn unreachable_service_is_transport_error() {
        let c = client(Canned::default());
        let err = c.model_list().unwrap_err();
        assert!(err.is_transport());
        assert!(!err.is_domain());
    }

    #[test]
    fn model_settings_sends_ngram_as_string() {
        let c = client(Canned::default().reply("model/settings", 200, OK));
        c.model_settings(3).unwrap();
        let body: serde_json::Value = serde_json::from_str(&c.transport().last().body_text()).unwrap();
        assert_eq!(body, serde_json::json!({"ngram": "3"}));
    }

    #[test]
    fn model_new_and_pron_dict_new_send_both_fields() {
        let c = client(
            Canned::default()
                .reply("model/new", 200, OK)
                .reply("pron-dict/new", 200, OK),
        );
        c.pron_dict_new("pd", "ds").unwrap();
        let body: serde_json::Value = serde_json::from_str(&c.transport().last().body_text()).unwrap();
        assert_eq!(body, serde_json::json!({"name": "pd", "dataset_name": "ds"}));
        c.model_new("m", "pd").unwrap();
        let body: serde_json::Value = serde_json::from_str(&c.transport().last().body_text()).unwrap();
        assert_eq!(body, serde_json::json!({"name": "m", "pron_dict_name": "pd"}));
    }

    #[test]
    fn dataset_prepare_posts_without_body() {
        let c = client(Canned::default().reply(
            "dataset/prepare",
            200,
            r#"{"data":{"wordlist":"{\"kia\": 2, \"ora\": 5}"}}"#,
        ));
        let words = c.dataset_prepare().unwrap();
        assert_eq!(words.get("ora"), Some(&5));
        let req = c.transport().last();
        assert_eq!(req.method, HttpMethod::Post);
        assert!(req.body.is_none());
    }

    #[test]
    fn model_results_map() {
        let c = client(Canned::default().reply(
            "model/results",
            200,
            r#"{"data":{"results":{"wer":"21.4","del":"2"}}}"#,
        ));
        let results = c.model_results().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results["wer"], "21.4");
    }

    #[test]
    fn lexicon_roundtrip_through_save() {
        let c = client(
            Canned::default()
                .reply("pron-dict/generate-lexicon", 200, r#"{"data":{"lexicon":"kia k i a\nora o r a\n"}}"#)
                .reply("pron-dict/save-lexicon", 200, OK),
        );
        let mut lexicon = c.pron_dict_generate_lexicon().unwrap();
        lexicon.insert("ora", "ɔ ɾ a");
        c.pron_dict_save_lexicon(&lexicon).unwrap();
        let body: serde_json::Value = serde_json::from_str(&c.transport().last().body_text()).unwrap();
        assert_eq!(body["lexicon"], "kia k i a\nora ɔ ɾ a\n");
    }

    #[test]
    fn dataset_files_uploads_each_file() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("one.wav");
        let eaf = dir.path().join("one.eaf");
        std::fs::write(&wav, b"RIFF").unwrap();
        std::fs::write(&eaf, b"<ANNOTATION_DOCUMENT/>").unwrap();

        let c = client(Canned::default().reply(
            "dataset/files",
            200,
            r#"{"data":{"files":["one.wav","one.eaf"]}}"#,
        ));
        let files = c.dataset_files([&wav, &eaf]).unwrap();
        assert_eq!(files, ["one.wav", "one.eaf"]);

        let req = c.transport().last();
        assert!(req.header("Content-Type").unwrap().starts_with("multipart/form-data; boundary="));
        let body = req.body_text();
        assert!(body.contains(r#"filename="one.wav""#));
        assert!(body.contains(r#"filename="one.eaf""#));
    }

    #[test]
    fn transcription_text_is_raw() {
        let c = client(Canned::default().reply("transcription/text", 200, "kia ora koutou"));
        assert_eq!(c.transcription_text().unwrap(), "kia ora koutou");
        assert_eq!(c.transport().last().header("Accept"), Some("text/plain"));
    }

    #[test]
    fn transcription_elan_lands_in_temp_file() {
        let c = client(Canned::default().reply("transcription/elan", 200, "<ANNOTATION_DOCUMENT/>"));
        let file = c.transcription_elan().unwrap();
        let path = file.path().to_path_buf();
        assert_eq!(c.transport().last().header("Accept"), Some("text/x-eaf+xml"));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("transcriptionElan-"));
        assert_eq!(path.extension().unwrap(), "eaf");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<ANNOTATION_DOCUMENT/>");
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn transcription_elan_keeps_bytes_exactly() {
        let body = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<ANNOTATION_VALUE>M\xe4ori</ANNOTATION_VALUE>".to_vec();
        let reply = body.clone();
        let transport = move |_req: HttpRequest| -> Result<HttpResponse, ElpisError> {
            Ok(HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: reply.clone(),
            })
        };
        let c = ElpisClient::with_transport(ElpisConfig::default(), transport).unwrap();
        let file = c.transcription_elan().unwrap();
        assert_eq!(std::fs::read(file.path()).unwrap(), body);
    }

    #[test]
    fn whole_response_exposes_dropped_fields() {
        let c = client(Canned::default().reply(
            "transcription/new",
            200,
            r#"{"status":200,"data":{"status":"ready","filename":"kia.wav"}}"#,
        ));
        let request = c
            .multipart_request(Endpoint::TranscriptionNew)
            .unwrap()
            .file_bytes("file", "kia.wav", b"RIFF".to_vec());
        let response = c.invoke(Endpoint::TranscriptionNew, request, Whole).unwrap();
        assert_eq!(response.str_field("filename").unwrap(), "kia.wav");
        assert_eq!(response.status(), 200);
        assert_eq!(c.transport().last().header("Accept"), Some("application/json"));
    }

    #[test]
    fn transcription_text_http_error() {
        let c = client(Canned::default().reply("transcription/text", 404, "no transcription"));
        let err = c.transcription_text().unwrap_err();
        assert!(matches!(err, ElpisError::HttpStatus { status: 404, .. }));
    }

    #[test]
    fn config_reset_posts() {
        let c = client(Canned::default().reply("config/reset", 200, OK));
        c.config_reset().unwrap();
        let req = c.transport().last();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://localhost:5000/api/config/reset");
    }
}
