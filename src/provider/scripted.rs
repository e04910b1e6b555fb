//! Deterministic provider double with queued responses
//!
//! Responses are consumed in order per capability. Media and voice calls
//! synthesize stable URLs/ids when nothing is queued; text and JSON fail
//! when their queue is empty. Every call is recorded for later assertions.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

use super::{
    FetchedContent, JsonRequest, MediaRequest, Moderation, Provider, ProviderFailure,
    ProviderResult, SearchResult, SpeechRequest, TextRequest,
};
use crate::compiler::voices::{VoiceMap, VoiceRequest};

/// A recorded provider call
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    /// `generate_text`
    Text(TextRequest),
    /// `generate_json`
    Json(JsonRequest),
    /// `generate_image`
    Image(MediaRequest),
    /// `generate_sound`
    Sound(MediaRequest),
    /// `generate_speech`
    Speech(SpeechRequest),
    /// `generate_voice`
    Voice(VoiceRequest),
    /// `moderate`
    Moderate(String),
    /// `fetch_url`
    Fetch(String),
    /// `search_web`
    Search(String),
}

#[derive(Debug, Default)]
struct Script {
    texts: VecDeque<ProviderResult<String>>,
    json: VecDeque<ProviderResult<Value>>,
    images: VecDeque<ProviderResult<String>>,
    sounds: VecDeque<ProviderResult<String>>,
    voices: VecDeque<ProviderResult<String>>,
    moderation: VecDeque<Moderation>,
    pages: HashMap<String, FetchedContent>,
    searches: VecDeque<Vec<SearchResult>>,
    calls: Vec<ProviderCall>,
    media_counter: usize,
}

/// Scripted provider for tests and offline play
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<Script>,
}

impl ScriptedProvider {
    /// Empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text response
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.script.lock().texts.push_back(Ok(text.into()));
        self
    }

    /// Queue a text failure
    pub fn with_text_failure(self, message: impl Into<String>) -> Self {
        self.script
            .lock()
            .texts
            .push_back(Err(ProviderFailure::new("text", message)));
        self
    }

    /// Queue a JSON response
    pub fn with_json(self, value: Value) -> Self {
        self.script.lock().json.push_back(Ok(value));
        self
    }

    /// Queue a JSON failure
    pub fn with_json_failure(self, message: impl Into<String>) -> Self {
        self.script
            .lock()
            .json
            .push_back(Err(ProviderFailure::new("json", message)));
        self
    }

    /// Queue an image URL
    pub fn with_image(self, url: impl Into<String>) -> Self {
        self.script.lock().images.push_back(Ok(url.into()));
        self
    }

    /// Queue a sound URL
    pub fn with_sound(self, url: impl Into<String>) -> Self {
        self.script.lock().sounds.push_back(Ok(url.into()));
        self
    }

    /// Queue a voice id
    pub fn with_voice(self, id: impl Into<String>) -> Self {
        self.script.lock().voices.push_back(Ok(id.into()));
        self
    }

    /// Queue a voice failure
    pub fn with_voice_failure(self, message: impl Into<String>) -> Self {
        self.script
            .lock()
            .voices
            .push_back(Err(ProviderFailure::new("voice", message)));
        self
    }

    /// Queue a moderation verdict
    pub fn with_moderation(self, moderation: Moderation) -> Self {
        self.script.lock().moderation.push_back(moderation);
        self
    }

    /// Serve a page for a URL
    pub fn with_page(self, url: impl Into<String>, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        self.script.lock().pages.insert(
            url.into(),
            FetchedContent {
                content_type: content_type.into(),
                body: body.into(),
            },
        );
        self
    }

    /// Queue search results
    pub fn with_search(self, results: Vec<SearchResult>) -> Self {
        self.script.lock().searches.push_back(results);
        self
    }

    /// All calls made so far
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.script.lock().calls.clone()
    }

    /// Number of recorded calls matching a predicate
    pub fn count(&self, predicate: impl Fn(&ProviderCall) -> bool) -> usize {
        self.script.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    fn synthesize(script: &mut Script, kind: &str) -> String {
        script.media_counter += 1;
        format!("scripted://{}/{}", kind, script.media_counter)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn generate_text(&self, request: &TextRequest) -> ProviderResult<String> {
        let mut script = self.script.lock();
        script.calls.push(ProviderCall::Text(request.clone()));
        script
            .texts
            .pop_front()
            .unwrap_or_else(|| Err(ProviderFailure::new("text", "script exhausted")))
    }

    async fn generate_json(&self, request: &JsonRequest) -> ProviderResult<Value> {
        let mut script = self.script.lock();
        script.calls.push(ProviderCall::Json(request.clone()));
        script
            .json
            .pop_front()
            .unwrap_or_else(|| Err(ProviderFailure::new("json", "script exhausted")))
    }

    async fn generate_image(&self, request: &MediaRequest) -> ProviderResult<String> {
        let mut script = self.script.lock();
        script.calls.push(ProviderCall::Image(request.clone()));
        match script.images.pop_front() {
            Some(result) => result,
            None => Ok(Self::synthesize(&mut script, "image")),
        }
    }

    async fn generate_sound(&self, request: &MediaRequest) -> ProviderResult<String> {
        let mut script = self.script.lock();
        script.calls.push(ProviderCall::Sound(request.clone()));
        match script.sounds.pop_front() {
            Some(result) => result,
            None => Ok(Self::synthesize(&mut script, "sound")),
        }
    }

    async fn generate_speech(&self, request: &SpeechRequest, _voices: &VoiceMap) -> ProviderResult<String> {
        let mut script = self.script.lock();
        script.calls.push(ProviderCall::Speech(request.clone()));
        Ok(Self::synthesize(&mut script, "speech"))
    }

    async fn generate_voice(&self, request: &VoiceRequest) -> ProviderResult<String> {
        let mut script = self.script.lock();
        script.calls.push(ProviderCall::Voice(request.clone()));
        match script.voices.pop_front() {
            Some(result) => result,
            None => Ok(format!("voice-{}", request.name)),
        }
    }

    async fn moderate(&self, text: &str) -> ProviderResult<Moderation> {
        let mut script = self.script.lock();
        script.calls.push(ProviderCall::Moderate(text.to_string()));
        Ok(script.moderation.pop_front().unwrap_or_default())
    }

    async fn fetch_url(&self, url: &str) -> ProviderResult<FetchedContent> {
        let mut script = self.script.lock();
        script.calls.push(ProviderCall::Fetch(url.to_string()));
        script
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| ProviderFailure::new("fetch", format!("no page for {}", url)))
    }

    async fn search_web(&self, query: &str) -> ProviderResult<Vec<SearchResult>> {
        let mut script = self.script.lock();
        script.calls.push(ProviderCall::Search(query.to_string()));
        Ok(script.searches.pop_front().unwrap_or_default())
    }
}
