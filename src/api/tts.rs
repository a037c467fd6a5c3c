//! Speech synthesis over the Live API.
//!
//! One socket per request: connect, configure for audio-only output,
//! send the text as a completed turn, collect PCM chunks until the
//! service reports the turn finished. Output is raw 16-bit PCM at 24 kHz.

use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use super::live::{connect_live_socket, send_json, wait_setup_complete};
use super::LIVE_MODEL;
use crate::audio::pcm::base64_to_bytes;
use crate::error::ServiceError;

/// No audio and no turn marker for this long means the stream is dead.
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

fn synthesis_setup(voice: &str) -> Value {
    json!({
        "setup": {
            "model": format!("models/{LIVE_MODEL}"),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": voice }
                    }
                },
                "thinkingConfig": { "thinkingBudget": 0 }
            },
            "systemInstruction": {
                "parts": [{
                    "text": "You are a text-to-speech reader. Read the user's \
                             text aloud exactly as written, word for word. Do \
                             not respond conversationally or add commentary. \
                             Start reading immediately."
                }]
            }
        }
    })
}

fn speak_request(text: &str) -> Value {
    json!({
        "clientContent": {
            "turns": [{
                "role": "user",
                "parts": [{ "text": format!("[READ ALOUD VERBATIM]\n\n{text}") }]
            }],
            "turnComplete": true
        }
    })
}

/// PCM bytes carried by one server frame, if any.
fn parse_audio_data(msg: &str) -> Option<Vec<u8>> {
    let value: Value = serde_json::from_str(msg).ok()?;
    let parts = value
        .pointer("/serverContent/modelTurn/parts")?
        .as_array()?;
    for part in parts {
        if let Some(data) = part.pointer("/inlineData/data").and_then(Value::as_str) {
            if let Ok(bytes) = base64_to_bytes(data) {
                return Some(bytes);
            }
        }
    }
    None
}

fn is_turn_complete(msg: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(msg) else {
        return false;
    };
    // TTS responses signal completion through either flag.
    ["/serverContent/turnComplete", "/serverContent/generationComplete"]
        .iter()
        .any(|p| value.pointer(p).and_then(Value::as_bool).unwrap_or(false))
}

pub(crate) fn synthesize(
    api_key: &str,
    voice: &str,
    text: &str,
) -> Result<Vec<u8>, ServiceError> {
    let mut socket = connect_live_socket(api_key, Duration::from_millis(100))?;
    send_json(&mut socket, &synthesis_setup(voice))?;
    wait_setup_complete(&mut socket)?;
    send_json(&mut socket, &speak_request(text))?;

    let mut audio: Vec<u8> = Vec::new();
    let mut last_activity = Instant::now();
    loop {
        match socket.read() {
            Ok(tungstenite::Message::Text(msg)) => {
                if let Some(bytes) = parse_audio_data(&msg) {
                    audio.extend_from_slice(&bytes);
                    last_activity = Instant::now();
                }
                if is_turn_complete(&msg) {
                    break;
                }
            }
            Ok(tungstenite::Message::Binary(data)) => {
                if let Ok(text) = String::from_utf8(data.to_vec()) {
                    if let Some(bytes) = parse_audio_data(&text) {
                        audio.extend_from_slice(&bytes);
                        last_activity = Instant::now();
                    }
                    if is_turn_complete(&text) {
                        break;
                    }
                }
            }
            Ok(tungstenite::Message::Close(_)) => break,
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                if last_activity.elapsed() > INACTIVITY_TIMEOUT {
                    break;
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                if audio.is_empty() {
                    return Err(ServiceError::Network(e.to_string()));
                }
                break;
            }
        }
    }
    let _ = socket.close(None);

    if audio.is_empty() {
        return Err(ServiceError::NoAudioData);
    }
    Ok(audio)
}
