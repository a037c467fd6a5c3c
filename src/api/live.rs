//! Live-session transport: blocking TLS WebSocket to the Gemini Live API.
//!
//! The socket runs with a short read timeout; the reader thread polls and
//! treats `WouldBlock` as "no message yet". Sends go through the same
//! socket under a mutex, so a pending read never starves a send for more
//! than one poll interval.

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Value};

use super::LIVE_MODEL;
use crate::audio::pcm::PcmBlob;
use crate::error::ServiceError;
use crate::service::{SessionMessage, VoiceCallbacks, VoiceSessionConfig, VoiceSessionHandle};

pub(crate) type WsStream = tungstenite::WebSocket<native_tls::TlsStream<TcpStream>>;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const SETUP_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn net_err(e: impl std::fmt::Display) -> ServiceError {
    ServiceError::Network(e.to_string())
}

/// Open a TLS WebSocket to the Live API endpoint. `read_timeout` applies
/// after the handshake; callers polling for messages pass a short one.
pub(crate) fn connect_live_socket(
    api_key: &str,
    read_timeout: Duration,
) -> Result<WsStream, ServiceError> {
    let ws_url = format!(
        "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent?key={api_key}"
    );

    let url = url::Url::parse(&ws_url).map_err(net_err)?;
    let host = url
        .host_str()
        .ok_or_else(|| ServiceError::Network("no host in endpoint URL".to_string()))?;

    let addr = format!("{host}:443")
        .to_socket_addrs()
        .map_err(net_err)?
        .next()
        .ok_or_else(|| ServiceError::Network(format!("could not resolve {host}")))?;

    let tcp = TcpStream::connect_timeout(&addr, HANDSHAKE_TIMEOUT).map_err(net_err)?;
    tcp.set_read_timeout(Some(Duration::from_secs(30))).map_err(net_err)?;
    tcp.set_write_timeout(Some(Duration::from_secs(30))).map_err(net_err)?;
    tcp.set_nodelay(true).map_err(net_err)?;

    let connector = native_tls::TlsConnector::new().map_err(net_err)?;
    let tls = connector.connect(host, tcp).map_err(net_err)?;

    let (socket, _response) = tungstenite::client::client(ws_url.as_str(), tls).map_err(net_err)?;

    socket
        .get_ref()
        .get_ref()
        .set_read_timeout(Some(read_timeout))
        .map_err(net_err)?;

    Ok(socket)
}

pub(crate) fn send_json(socket: &mut WsStream, value: &Value) -> Result<(), ServiceError> {
    socket
        .write(tungstenite::Message::text(value.to_string()))
        .map_err(net_err)?;
    socket.flush().map_err(net_err)
}

/// Block until the service acknowledges the setup message.
pub(crate) fn wait_setup_complete(socket: &mut WsStream) -> Result<(), ServiceError> {
    let started = Instant::now();
    loop {
        match socket.read() {
            Ok(tungstenite::Message::Text(msg)) => {
                if msg.contains("setupComplete") {
                    return Ok(());
                }
            }
            Ok(tungstenite::Message::Binary(data)) => {
                if let Ok(text) = String::from_utf8(data.to_vec()) {
                    if text.contains("setupComplete") {
                        return Ok(());
                    }
                }
            }
            Ok(tungstenite::Message::Close(_)) => {
                return Err(ServiceError::Network(
                    "connection closed during setup".to_string(),
                ));
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                if started.elapsed() > SETUP_TIMEOUT {
                    return Err(ServiceError::Network("setup timed out".to_string()));
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => return Err(net_err(e)),
        }
    }
}

fn session_setup(config: &VoiceSessionConfig) -> Value {
    let mut setup = json!({
        "setup": {
            "model": format!("models/{LIVE_MODEL}"),
            "generationConfig": {
                "responseModalities": ["TEXT"]
            },
            "inputAudioTranscription": {}
        }
    });
    if config.language != crate::orchestrator::AUTO_LANG {
        setup["setup"]["generationConfig"]["speechConfig"] =
            json!({ "languageCode": config.language });
    }
    setup
}

/// Messages the session surfaces from one server frame.
fn parse_server_message(msg: &str) -> Vec<SessionMessage> {
    let Ok(value) = serde_json::from_str::<Value>(msg) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    if let Some(text) = value
        .pointer("/serverContent/inputTranscription/text")
        .and_then(Value::as_str)
    {
        if !text.is_empty() {
            out.push(SessionMessage::Transcript(text.to_string()));
        }
    }
    if value
        .pointer("/serverContent/turnComplete")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        out.push(SessionMessage::TurnComplete);
    }
    out
}

struct GeminiVoiceSession {
    socket: Arc<Mutex<WsStream>>,
    closed: Arc<AtomicBool>,
}

impl VoiceSessionHandle for GeminiVoiceSession {
    fn send(&self, blob: &PcmBlob) -> Result<(), ServiceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ServiceError::Network("session closed".to_string()));
        }
        let msg = json!({
            "realtimeInput": {
                "audio": {
                    "data": blob.data,
                    "mimeType": blob.mime_type
                }
            }
        });
        send_json(&mut self.socket.lock(), &msg)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.socket.lock().close(None);
        }
    }
}

pub(crate) fn open_session(
    api_key: &str,
    config: VoiceSessionConfig,
    callbacks: VoiceCallbacks,
) -> Result<Box<dyn VoiceSessionHandle>, ServiceError> {
    let mut socket = connect_live_socket(api_key, Duration::from_millis(100))?;
    send_json(&mut socket, &session_setup(&config))?;
    wait_setup_complete(&mut socket)?;

    let socket = Arc::new(Mutex::new(socket));
    let closed = Arc::new(AtomicBool::new(false));

    (callbacks.on_open)();

    let reader_socket = socket.clone();
    let reader_closed = closed.clone();
    thread::spawn(move || run_reader(reader_socket, reader_closed, callbacks));

    Ok(Box::new(GeminiVoiceSession { socket, closed }))
}

/// Reader thread: polls the socket, dispatches server frames to the
/// callbacks and reports termination through `on_close` exactly once.
fn run_reader(socket: Arc<Mutex<WsStream>>, closed: Arc<AtomicBool>, callbacks: VoiceCallbacks) {
    loop {
        if closed.load(Ordering::SeqCst) {
            break;
        }
        let result = socket.lock().read();
        match result {
            Ok(tungstenite::Message::Text(msg)) => {
                for message in parse_server_message(&msg) {
                    (callbacks.on_message)(message);
                }
            }
            Ok(tungstenite::Message::Binary(data)) => {
                if let Ok(text) = String::from_utf8(data.to_vec()) {
                    for message in parse_server_message(&text) {
                        (callbacks.on_message)(message);
                    }
                }
            }
            Ok(tungstenite::Message::Close(_)) => {
                closed.store(true, Ordering::SeqCst);
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                if !closed.swap(true, Ordering::SeqCst) {
                    (callbacks.on_error)(net_err(e));
                }
                break;
            }
        }
    }
    (callbacks.on_close)();
}
