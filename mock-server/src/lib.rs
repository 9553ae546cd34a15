//! In-memory stand-in for the Elpis HTTP API.
//!
//! # Design
//! All state lives in one `Store` behind a tokio `RwLock`. Successful calls
//! reply `{"status":200,"data":{...}}`; failures the real service reports as
//! data (missing dataset, untrained model) reply HTTP 200 with
//! `{"status":500,"error":"..."}`. Training and transcription finish
//! immediately: the call that starts them returns the in-progress status and
//! the next status poll sees the finished one.
//!
//! `POST|GET /api/debug/echo` reflects what the client sent, for checking
//! request encoding over a real socket.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;

#[derive(Debug, Default)]
pub struct Dataset {
    pub files: Vec<String>,
    pub transcripts: Vec<String>,
    pub tier: Option<String>,
    pub wordlist: Option<BTreeMap<String, u64>>,
}

#[derive(Debug, Default)]
pub struct PronDict {
    pub dataset_name: String,
    pub l2s: Option<String>,
    pub lexicon: Option<String>,
}

#[derive(Debug, Default)]
pub struct Model {
    pub pron_dict_name: String,
    pub ngram: u32,
    pub status: String,
}

#[derive(Debug, Default)]
pub struct Transcription {
    pub file: String,
    pub status: String,
    pub text: Option<String>,
}

#[derive(Debug, Default)]
pub struct Store {
    pub datasets: BTreeMap<String, Dataset>,
    pub pron_dicts: BTreeMap<String, PronDict>,
    pub models: BTreeMap<String, Model>,
    pub current_dataset: Option<String>,
    pub current_pron_dict: Option<String>,
    pub current_model: Option<String>,
    pub transcription: Option<Transcription>,
}

pub type Db = Arc<RwLock<Store>>;

/// A failure reported in the Elpis envelope.
#[derive(Debug)]
pub struct Failure(pub String);

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(json!({"status": 500, "error": self.0}))).into_response()
    }
}

impl From<MultipartError> for Failure {
    fn from(err: MultipartError) -> Self {
        Failure(format!("upload failed: {err}"))
    }
}

type Reply = Result<Json<Value>, Failure>;

fn ok(data: Value) -> Reply {
    Ok(Json(json!({"status": 200, "data": data})))
}

fn fail<T>(message: impl Into<String>) -> Result<T, Failure> {
    Err(Failure(message.into()))
}

#[derive(Deserialize)]
pub struct NameBody {
    pub name: String,
}

#[derive(Deserialize)]
pub struct TierBody {
    pub tier: String,
}

#[derive(Deserialize)]
pub struct PronDictBody {
    pub name: String,
    pub dataset_name: String,
}

#[derive(Deserialize)]
pub struct ModelBody {
    pub name: String,
    pub pron_dict_name: String,
}

#[derive(Deserialize)]
pub struct SettingsBody {
    pub ngram: String,
}

#[derive(Deserialize)]
pub struct LexiconBody {
    pub lexicon: String,
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    let api = Router::new()
        .route("/dataset/new", post(dataset_new))
        .route("/dataset/list", get(dataset_list))
        .route("/dataset/load", post(dataset_load))
        .route("/dataset/settings", post(dataset_settings))
        .route("/dataset/files", post(dataset_files))
        .route("/dataset/prepare", post(dataset_prepare))
        .route("/pron-dict/new", post(pron_dict_new))
        .route("/pron-dict/load", post(pron_dict_load))
        .route("/pron-dict/list", get(pron_dict_list))
        .route("/pron-dict/l2s", post(pron_dict_l2s))
        .route("/pron-dict/generate-lexicon", get(pron_dict_generate_lexicon))
        .route("/pron-dict/save-lexicon", post(pron_dict_save_lexicon))
        .route("/model/list", get(model_list))
        .route("/model/new", post(model_new))
        .route("/model/load", post(model_load))
        .route("/model/settings", post(model_settings))
        .route("/model/train", get(model_train))
        .route("/model/status", get(model_status))
        .route("/model/results", get(model_results))
        .route("/transcription/new", post(transcription_new))
        .route("/transcription/transcribe", get(transcription_transcribe))
        .route("/transcription/status", get(transcription_status))
        .route("/transcription/text", get(transcription_text))
        .route("/transcription/elan", get(transcription_elan))
        .route("/config/reset", post(config_reset))
        .route("/debug/echo", get(echo).post(echo))
        .with_state(db);
    Router::new().nest("/api", api)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Uploaded parts as `(file name, bytes)`; fields without a file name are
/// ignored.
async fn uploads(mut multipart: Multipart) -> Result<Vec<(String, Bytes)>, Failure> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        files.push((name, field.bytes().await?));
    }
    Ok(files)
}

/// Words inside `<ANNOTATION_VALUE>` elements of an ELAN document.
pub fn annotation_words(eaf: &str) -> Vec<String> {
    eaf.split("<ANNOTATION_VALUE>")
        .skip(1)
        .filter_map(|rest| rest.split_once("</ANNOTATION_VALUE>"))
        .flat_map(|(value, _)| value.split_whitespace())
        .map(str::to_lowercase)
        .collect()
}

/// Spell `word` with a letter-to-sound table: one `symbol sound` per line,
/// `#` starts a comment. Letters with no entry are kept as they are.
pub fn pronounce(word: &str, l2s: &str) -> String {
    let table: BTreeMap<&str, &str> = l2s
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once(' '))
        .map(|(symbol, sound)| (symbol, sound.trim()))
        .collect();
    word.chars()
        .map(|c| {
            let letter = c.to_string();
            table
                .get(letter.as_str())
                .map(|sound| sound.to_string())
                .unwrap_or(letter)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn current<'a>(name: &'a Option<String>, what: &str) -> Result<&'a str, Failure> {
    match name {
        Some(name) => Ok(name.as_str()),
        None => fail(format!("no {what} loaded")),
    }
}

// --- datasets ---

async fn dataset_new(State(db): State<Db>, Json(input): Json<NameBody>) -> Reply {
    let mut store = db.write().await;
    if store.datasets.contains_key(&input.name) {
        return fail(format!("dataset {} already exists", input.name));
    }
    info!(name = %input.name, "dataset created");
    store.datasets.insert(input.name.clone(), Dataset::default());
    store.current_dataset = Some(input.name);
    ok(json!({}))
}

async fn dataset_list(State(db): State<Db>) -> Reply {
    let store = db.read().await;
    let names: Vec<&String> = store.datasets.keys().collect();
    ok(json!({ "list": names }))
}

async fn dataset_load(State(db): State<Db>, Json(input): Json<NameBody>) -> Reply {
    let mut store = db.write().await;
    if !store.datasets.contains_key(&input.name) {
        return fail("dataset not found");
    }
    store.current_dataset = Some(input.name);
    ok(json!({}))
}

async fn dataset_settings(State(db): State<Db>, Json(input): Json<TierBody>) -> Reply {
    let mut store = db.write().await;
    let name = current(&store.current_dataset, "dataset")?.to_string();
    if let Some(dataset) = store.datasets.get_mut(&name) {
        dataset.tier = Some(input.tier.clone());
    }
    ok(json!({ "settings": { "tier": input.tier } }))
}

async fn dataset_files(State(db): State<Db>, multipart: Multipart) -> Reply {
    let files = uploads(multipart).await?;
    let mut store = db.write().await;
    let name = current(&store.current_dataset, "dataset")?.to_string();
    let Some(dataset) = store.datasets.get_mut(&name) else {
        return fail("dataset not found");
    };
    for (file, bytes) in files {
        if file.ends_with(".eaf") {
            dataset
                .transcripts
                .push(String::from_utf8_lossy(&bytes).into_owned());
        }
        if !dataset.files.contains(&file) {
            dataset.files.push(file);
        }
    }
    ok(json!({ "files": dataset.files }))
}

async fn dataset_prepare(State(db): State<Db>) -> Reply {
    let mut store = db.write().await;
    let name = current(&store.current_dataset, "dataset")?.to_string();
    let Some(dataset) = store.datasets.get_mut(&name) else {
        return fail("dataset not found");
    };
    let mut wordlist = BTreeMap::new();
    for word in dataset.transcripts.iter().flat_map(|t| annotation_words(t)) {
        *wordlist.entry(word).or_insert(0u64) += 1;
    }
    // the service sends the word list as JSON text
    let text = serde_json::to_string(&wordlist).map_err(|e| Failure(e.to_string()))?;
    dataset.wordlist = Some(wordlist);
    ok(json!({ "wordlist": text }))
}

// --- pronunciation dictionaries ---

async fn pron_dict_new(State(db): State<Db>, Json(input): Json<PronDictBody>) -> Reply {
    let mut store = db.write().await;
    if !store.datasets.contains_key(&input.dataset_name) {
        return fail("dataset not found");
    }
    if store.pron_dicts.contains_key(&input.name) {
        return fail(format!("pron dict {} already exists", input.name));
    }
    info!(name = %input.name, dataset = %input.dataset_name, "pron dict created");
    store.pron_dicts.insert(
        input.name.clone(),
        PronDict {
            dataset_name: input.dataset_name,
            ..PronDict::default()
        },
    );
    store.current_pron_dict = Some(input.name);
    ok(json!({}))
}

async fn pron_dict_load(State(db): State<Db>, Json(input): Json<NameBody>) -> Reply {
    let mut store = db.write().await;
    if !store.pron_dicts.contains_key(&input.name) {
        return fail("pron dict not found");
    }
    store.current_pron_dict = Some(input.name);
    ok(json!({}))
}

async fn pron_dict_list(State(db): State<Db>) -> Reply {
    let store = db.read().await;
    let list: Vec<Value> = store
        .pron_dicts
        .iter()
        .map(|(name, pd)| json!({ "name": name, "dataset_name": pd.dataset_name }))
        .collect();
    ok(json!({ "list": list }))
}

async fn pron_dict_l2s(State(db): State<Db>, multipart: Multipart) -> Reply {
    let files = uploads(multipart).await?;
    let mut store = db.write().await;
    let name = current(&store.current_pron_dict, "pron dict")?.to_string();
    let Some((_, bytes)) = files.into_iter().next() else {
        return fail("no letter to sound file uploaded");
    };
    if let Some(pron_dict) = store.pron_dicts.get_mut(&name) {
        pron_dict.l2s = Some(String::from_utf8_lossy(&bytes).into_owned());
    }
    ok(json!({}))
}

async fn pron_dict_generate_lexicon(State(db): State<Db>) -> Reply {
    let mut store = db.write().await;
    let name = current(&store.current_pron_dict, "pron dict")?.to_string();
    let Some(pron_dict) = store.pron_dicts.get(&name) else {
        return fail("pron dict not found");
    };
    let Some(l2s) = pron_dict.l2s.as_deref() else {
        return fail("no letter to sound file");
    };
    let Some(wordlist) = store
        .datasets
        .get(&pron_dict.dataset_name)
        .and_then(|d| d.wordlist.as_ref())
    else {
        return fail("dataset not prepared");
    };
    let lexicon: String = wordlist
        .keys()
        .map(|word| format!("{word} {}\n", pronounce(word, l2s)))
        .collect();
    if let Some(pron_dict) = store.pron_dicts.get_mut(&name) {
        pron_dict.lexicon = Some(lexicon.clone());
    }
    ok(json!({ "lexicon": lexicon }))
}

async fn pron_dict_save_lexicon(State(db): State<Db>, Json(input): Json<LexiconBody>) -> Reply {
    let mut store = db.write().await;
    let name = current(&store.current_pron_dict, "pron dict")?.to_string();
    if let Some(pron_dict) = store.pron_dicts.get_mut(&name) {
        pron_dict.lexicon = Some(input.lexicon);
    }
    ok(json!({}))
}

// --- models ---

async fn model_list(State(db): State<Db>) -> Reply {
    let store = db.read().await;
    let list: Vec<Value> = store
        .models
        .iter()
        .map(|(name, m)| json!({ "name": name, "pron_dict_name": m.pron_dict_name }))
        .collect();
    ok(json!({ "list": list }))
}

async fn model_new(State(db): State<Db>, Json(input): Json<ModelBody>) -> Reply {
    let mut store = db.write().await;
    if !store.pron_dicts.contains_key(&input.pron_dict_name) {
        return fail("pron dict not found");
    }
    if store.models.contains_key(&input.name) {
        return fail(format!("model {} already exists", input.name));
    }
    info!(name = %input.name, pron_dict = %input.pron_dict_name, "model created");
    store.models.insert(
        input.name.clone(),
        Model {
            pron_dict_name: input.pron_dict_name,
            ngram: 1,
            status: "untrained".into(),
        },
    );
    store.current_model = Some(input.name);
    ok(json!({}))
}

async fn model_load(State(db): State<Db>, Json(input): Json<NameBody>) -> Reply {
    let mut store = db.write().await;
    if !store.models.contains_key(&input.name) {
        return fail("model not found");
    }
    store.current_model = Some(input.name);
    ok(json!({}))
}

async fn model_settings(State(db): State<Db>, Json(input): Json<SettingsBody>) -> Reply {
    let Ok(ngram) = input.ngram.trim().parse::<u32>() else {
        return fail(format!("invalid ngram: {}", input.ngram));
    };
    let mut store = db.write().await;
    let name = current(&store.current_model, "model")?.to_string();
    if let Some(model) = store.models.get_mut(&name) {
        model.ngram = ngram;
    }
    ok(json!({ "settings": { "ngram": ngram } }))
}

async fn model_train(State(db): State<Db>) -> Reply {
    let mut store = db.write().await;
    let name = current(&store.current_model, "model")?.to_string();
    if let Some(model) = store.models.get_mut(&name) {
        info!(name = %name, ngram = model.ngram, "model trained");
        model.status = "trained".into();
    }
    ok(json!({ "status": "training" }))
}

async fn model_status(State(db): State<Db>) -> Reply {
    let store = db.read().await;
    let name = current(&store.current_model, "model")?;
    match store.models.get(name) {
        Some(model) => ok(json!({ "status": model.status })),
        None => fail("model not found"),
    }
}

async fn model_results(State(db): State<Db>) -> Reply {
    let store = db.read().await;
    let name = current(&store.current_model, "model")?;
    match store.models.get(name) {
        Some(model) if model.status == "trained" => ok(json!({
            "results": {
                "comparison_val": "0.00",
                "wer": 12.5,
                "count_val": "8",
                "del_val": "0",
                "ins_val": "1",
                "sub_val": "0",
            }
        })),
        Some(_) => fail("model not trained"),
        None => fail("model not found"),
    }
}

// --- transcription ---

async fn transcription_new(State(db): State<Db>, multipart: Multipart) -> Reply {
    let files = uploads(multipart).await?;
    let Some((file, _)) = files.into_iter().next() else {
        return fail("no audio file uploaded");
    };
    let mut store = db.write().await;
    store.transcription = Some(Transcription {
        file: file.clone(),
        status: "ready".into(),
        text: None,
    });
    ok(json!({ "status": "ready", "filename": file }))
}

/// Transcribes as the loaded model's vocabulary, in alphabetical order.
async fn transcription_transcribe(State(db): State<Db>) -> Reply {
    let mut store = db.write().await;
    let name = current(&store.current_model, "model")?;
    let Some(model) = store.models.get(name).filter(|m| m.status == "trained") else {
        return fail("model not trained");
    };
    let text = store
        .pron_dicts
        .get(&model.pron_dict_name)
        .and_then(|pd| store.datasets.get(&pd.dataset_name))
        .and_then(|d| d.wordlist.as_ref())
        .map(|words| words.keys().cloned().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let Some(transcription) = store.transcription.as_mut() else {
        return fail("no audio file uploaded");
    };
    info!(file = %transcription.file, "transcribed");
    transcription.status = "transcribed".into();
    transcription.text = Some(text);
    ok(json!({ "status": "transcribing" }))
}

async fn transcription_status(State(db): State<Db>) -> Reply {
    let store = db.read().await;
    match &store.transcription {
        Some(t) => ok(json!({ "status": t.status })),
        None => fail("no transcription"),
    }
}

async fn transcribed_text(db: &Db) -> Option<String> {
    let store = db.read().await;
    store.transcription.as_ref().and_then(|t| t.text.clone())
}

async fn transcription_text(State(db): State<Db>) -> Response {
    match transcribed_text(&db).await {
        Some(text) => ([(header::CONTENT_TYPE, "text/plain")], text).into_response(),
        None => (StatusCode::NOT_FOUND, "no transcription").into_response(),
    }
}

async fn transcription_elan(State(db): State<Db>) -> Response {
    let Some(text) = transcribed_text(&db).await else {
        return (StatusCode::NOT_FOUND, "no transcription").into_response();
    };
    ([(header::CONTENT_TYPE, "text/x-eaf+xml")], eaf_document(&text)).into_response()
}

/// A minimal ELAN document with one aligned annotation per word, each a
/// second long.
pub fn eaf_document(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut slots = String::new();
    let mut annotations = String::new();
    for (i, word) in words.iter().enumerate() {
        slots.push_str(&format!(
            "    <TIME_SLOT TIME_SLOT_ID=\"ts{}\" TIME_VALUE=\"{}\"/>\n    <TIME_SLOT TIME_SLOT_ID=\"ts{}\" TIME_VALUE=\"{}\"/>\n",
            2 * i + 1,
            i * 1000,
            2 * i + 2,
            (i + 1) * 1000
        ));
        annotations.push_str(&format!(
            "    <ANNOTATION><ALIGNABLE_ANNOTATION ANNOTATION_ID=\"a{}\" TIME_SLOT_REF1=\"ts{}\" TIME_SLOT_REF2=\"ts{}\"><ANNOTATION_VALUE>{word}</ANNOTATION_VALUE></ALIGNABLE_ANNOTATION></ANNOTATION>\n",
            i + 1,
            2 * i + 1,
            2 * i + 2
        ));
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ANNOTATION_DOCUMENT FORMAT=\"3.0\" VERSION=\"3.0\">\n  <TIME_ORDER>\n{slots}  </TIME_ORDER>\n  <TIER LINGUISTIC_TYPE_REF=\"default-lt\" TIER_ID=\"Phrase\">\n{annotations}  </TIER>\n</ANNOTATION_DOCUMENT>\n"
    )
}

// --- config ---

async fn config_reset(State(db): State<Db>) -> Reply {
    *db.write().await = Store::default();
    info!("state reset");
    ok(json!({}))
}

// --- debug ---

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let value_of = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "method": method.as_str(),
        "query": uri.query(),
        "accept": value_of(header::ACCEPT),
        "authorization": value_of(header::AUTHORIZATION),
        "content_type": value_of(header::CONTENT_TYPE),
        "cookie": value_of(header::COOKIE),
        "body": String::from_utf8_lossy(&body),
    }))
}
