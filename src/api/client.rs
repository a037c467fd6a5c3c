//! HTTP client for Gemini text translation.

use std::io::{BufRead, BufReader, Read};
use std::time::Duration;

use lazy_static::lazy_static;
use serde_json::{json, Value};

use super::{live, tts, TEXT_MODEL};
use crate::error::ServiceError;
use crate::orchestrator::{language_name, AUTO_LANG};
use crate::service::{
    ChunkStream, TranslationResult, TranslationService, VoiceCallbacks, VoiceSessionConfig,
    VoiceSessionHandle,
};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

lazy_static! {
    /// Shared agent so connections are pooled across requests.
    pub static ref UREQ_AGENT: ureq::Agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build();
}

/// Gemini-backed translation/speech service.
pub struct GeminiService {
    api_key: String,
    tts_voice: String,
}

impl GeminiService {
    pub fn new(api_key: impl Into<String>, tts_voice: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            tts_voice: tts_voice.into(),
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(config.gemini_api_key.clone(), config.tts_voice.clone())
    }

    fn post(&self, method: &str, query: &str, body: Value) -> Result<ureq::Response, ServiceError> {
        let url = format!(
            "{API_BASE}/{TEXT_MODEL}:{method}?{query}key={}",
            self.api_key
        );
        UREQ_AGENT
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(body)
            .map_err(request_error)
    }
}

fn request_error(e: ureq::Error) -> ServiceError {
    match e {
        ureq::Error::Status(code, _) => ServiceError::Network(format!("HTTP {code}")),
        other => ServiceError::Network(other.to_string()),
    }
}

/// Readable name for a prompt; falls back to the raw code for languages
/// isolang does not know.
fn prompt_language(code: &str) -> String {
    language_name(code)
        .map(str::to_string)
        .unwrap_or_else(|| code.to_string())
}

fn translation_instruction(source_lang: &str, target_lang: &str) -> String {
    let target = prompt_language(target_lang);
    if source_lang == AUTO_LANG {
        format!(
            "Translate the following text to {target}. \
             Output ONLY the translation, nothing else."
        )
    } else {
        let source = prompt_language(source_lang);
        format!(
            "Translate the following text from {source} to {target}. \
             Output ONLY the translation, nothing else."
        )
    }
}

/// Concatenated text of the first candidate's parts, if any.
fn first_part_text(value: &Value) -> Option<String> {
    let parts = value
        .pointer("/candidates/0/content/parts")?
        .as_array()?;
    let mut text = String::new();
    for part in parts {
        if let Some(t) = part.get("text").and_then(Value::as_str) {
            text.push_str(t);
        }
    }
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Parse one server-sent-events line into a translation fragment.
/// Returns `None` for keep-alives, terminators and fragments without text.
fn parse_sse_line(line: &str) -> Option<String> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    let value: Value = serde_json::from_str(payload).ok()?;
    first_part_text(&value)
}

struct SseFragments<R: Read> {
    lines: std::io::Lines<BufReader<R>>,
}

impl<R: Read> Iterator for SseFragments<R> {
    type Item = Result<String, ServiceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) => {
                    if let Some(fragment) = parse_sse_line(&line) {
                        return Some(Ok(fragment));
                    }
                }
                Err(e) => return Some(Err(ServiceError::Network(e.to_string()))),
            }
        }
    }
}

impl TranslationService for GeminiService {
    fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<TranslationResult, ServiceError> {
        let instruction = format!(
            "{} Also report the ISO-639-1 code of the language the text is \
             written in and your confidence in that detection.",
            translation_instruction(source_lang, target_lang)
        );
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": format!("{instruction}\n\n{text}") }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "translatedText": { "type": "STRING" },
                        "detectedLanguage": { "type": "STRING" },
                        "confidence": { "type": "NUMBER" }
                    },
                    "required": ["translatedText", "detectedLanguage", "confidence"]
                }
            }
        });

        let response: Value = self
            .post("generateContent", "", body)?
            .into_json()
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?;
        let payload = first_part_text(&response)
            .ok_or_else(|| ServiceError::MalformedResponse("no candidate text".to_string()))?;
        let result: TranslationResult = serde_json::from_str(&payload)
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?;
        if !(0.0..=1.0).contains(&result.confidence) {
            return Err(ServiceError::MalformedResponse(format!(
                "confidence {} out of range",
                result.confidence
            )));
        }
        Ok(result)
    }

    fn translate_stream(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<ChunkStream, ServiceError> {
        let instruction = translation_instruction(source_lang, target_lang);
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": format!("{instruction}\n\n{text}") }]
            }]
        });
        let response = self.post("streamGenerateContent", "alt=sse&", body)?;
        Ok(Box::new(SseFragments {
            lines: BufReader::new(response.into_reader()).lines(),
        }))
    }

    fn translate_document(
        &self,
        base64_content: &str,
        mime_type: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, ServiceError> {
        let instruction = format!(
            "{} Preserve the document's paragraph structure.",
            translation_instruction(source_lang, target_lang)
        );
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "inlineData": { "mimeType": mime_type, "data": base64_content } },
                    { "text": instruction }
                ]
            }]
        });
        let response: Value = self
            .post("generateContent", "", body)?
            .into_json()
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))?;
        first_part_text(&response)
            .ok_or_else(|| ServiceError::MalformedResponse("no candidate text".to_string()))
    }

    fn synthesize_speech(&self, text: &str) -> Result<Vec<u8>, ServiceError> {
        tts::synthesize(&self.api_key, &self.tts_voice, text)
    }

    fn open_voice_session(
        &self,
        config: VoiceSessionConfig,
        callbacks: VoiceCallbacks,
    ) -> Result<Box<dyn VoiceSessionHandle>, ServiceError> {
        live::open_session(&self.api_key, config, callbacks)
    }
}
