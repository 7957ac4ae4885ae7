use crate::captions::WordTiming;
use crate::{logi, logw};
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::path::Path;
use tokio::fs;
use tokio_tungstenite::{connect_async, tungstenite::client::IntoClientRequest, tungstenite::Message};
use tracing::warn;

const WSS_BASE: &str =
    "wss://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1";
const TRUSTED_CLIENT_TOKEN: &str = "6A5AA1D4EAFF4E9FB37E23D68491D6F4";
const CHROME_EXTENSION_ORIGIN: &str = "chrome-extension://jdiccldimpdaibmpdkjnbmckianbfold";
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36 Edg/130.0.0.0";

const OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// Boundary offsets arrive in 100 ns ticks.
const TICKS_PER_SECOND: f64 = 10_000_000.0;

/// Result of one synthesis session: the mp3 bytes plus whatever word
/// boundaries the engine chose to report. The caller handles an empty
/// timing list; the audio alone is still usable.
#[derive(Debug, Clone, Default)]
pub struct Synthesis {
    pub audio: Vec<u8>,
    pub words: Vec<WordTiming>,
}

fn random_hex_id() -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}

fn js_style_timestamp() -> String {
    chrono::Utc::now()
        .format("%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)")
        .to_string()
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn build_ssml(text: &str, voice: &str) -> String {
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='en-US'>\
         <voice name='{}'><prosody pitch='+0Hz' rate='+0%' volume='+0%'>{}</prosody></voice>\
         </speak>",
        voice,
        escape_xml(text)
    )
}

fn speech_config_message(timestamp: &str) -> String {
    format!(
        "X-Timestamp:{}\r\n\
         Content-Type:application/json; charset=utf-8\r\n\
         Path:speech.config\r\n\r\n\
         {{\"context\":{{\"synthesis\":{{\"audio\":{{\"metadataoptions\":{{\
         \"sentenceBoundaryEnabled\":\"false\",\"wordBoundaryEnabled\":\"true\"}},\
         \"outputFormat\":\"{}\"}}}}}}}}",
        timestamp, OUTPUT_FORMAT
    )
}

fn ssml_message(request_id: &str, timestamp: &str, ssml: &str) -> String {
    format!(
        "X-RequestId:{}\r\nContent-Type:application/ssml+xml\r\nX-Timestamp:{}Z\r\nPath:ssml\r\n\r\n{}",
        request_id, timestamp, ssml
    )
}

/// Binary frames carry a big-endian u16 header length, the header text,
/// then the payload. Only `Path:audio` frames hold mp3 data.
fn audio_payload(frame: &[u8]) -> Option<&[u8]> {
    if frame.len() < 2 {
        return None;
    }
    let header_len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    if frame.len() < 2 + header_len {
        return None;
    }
    let header = String::from_utf8_lossy(&frame[2..2 + header_len]);
    if !header.contains("Path:audio") {
        return None;
    }
    Some(&frame[2 + header_len..])
}

fn message_path(text: &str) -> Option<&str> {
    for line in text.split("\r\n") {
        if let Some(path) = line.strip_prefix("Path:") {
            return Some(path.trim());
        }
        if line.is_empty() {
            break;
        }
    }
    None
}

fn message_body(text: &str) -> Option<&str> {
    text.split_once("\r\n\r\n").map(|(_, body)| body)
}

/// `audio.metadata` bodies list boundary events with tick-resolution
/// offsets; convert the word boundaries to seconds.
fn parse_metadata_words(body: &str) -> Vec<WordTiming> {
    let root: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return Vec::new(),
    };

    let mut out = Vec::new();
    let Some(entries) = root.get("Metadata").and_then(|m| m.as_array()) else {
        return out;
    };

    for entry in entries {
        if entry.get("Type").and_then(|t| t.as_str()) != Some("WordBoundary") {
            continue;
        }
        let Some(data) = entry.get("Data") else {
            continue;
        };
        let offset = data.get("Offset").and_then(|v| v.as_f64()).unwrap_or(-1.0);
        let duration = data.get("Duration").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let text = data
            .get("text")
            .and_then(|t| t.get("Text"))
            .and_then(|t| t.as_str())
            .unwrap_or("");

        if offset < 0.0 || text.is_empty() {
            continue;
        }
        out.push(WordTiming {
            offset: offset / TICKS_PER_SECOND,
            duration: duration / TICKS_PER_SECOND,
            text: text.to_string(),
        });
    }

    out
}

/// Synthesize `text` with the named Edge voice. Streams the session until
/// `turn.end`, accumulating audio frames and word-boundary events.
pub async fn synthesize(text: &str, voice: &str) -> Result<Synthesis> {
    let url = format!(
        "{}?TrustedClientToken={}&ConnectionId={}",
        WSS_BASE,
        TRUSTED_CLIENT_TOKEN,
        random_hex_id()
    );

    let mut request = url
        .into_client_request()
        .context("invalid speech endpoint URL")?;
    let headers = request.headers_mut();
    headers.insert("Origin", CHROME_EXTENSION_ORIGIN.parse()?);
    headers.insert("User-Agent", USER_AGENT.parse()?);

    let (mut ws, _resp) = connect_async(request)
        .await
        .context("speech websocket connect failed")?;

    let timestamp = js_style_timestamp();
    ws.send(Message::Text(speech_config_message(&timestamp)))
        .await
        .context("failed to send speech config")?;

    let request_id = random_hex_id();
    let ssml = build_ssml(text, voice);
    ws.send(Message::Text(ssml_message(&request_id, &timestamp, &ssml)))
        .await
        .context("failed to send ssml")?;

    let mut synthesis = Synthesis::default();
    let mut turn_ended = false;

    while let Some(msg) = ws.next().await {
        match msg.context("speech websocket receive failed")? {
            Message::Text(text) => match message_path(&text) {
                Some("audio.metadata") => {
                    if let Some(body) = message_body(&text) {
                        synthesis.words.extend(parse_metadata_words(body));
                    }
                }
                Some("turn.end") => {
                    turn_ended = true;
                    break;
                }
                _ => {}
            },
            Message::Binary(frame) => {
                if let Some(payload) = audio_payload(&frame) {
                    synthesis.audio.extend_from_slice(payload);
                }
            }
            Message::Close(frame) => {
                warn!("speech session closed before turn.end: {:?}", frame);
                break;
            }
            _ => {}
        }
    }

    let _ = ws.close(None).await;

    if synthesis.audio.is_empty() {
        anyhow::bail!("speech session produced no audio (turn.end: {})", turn_ended);
    }
    if synthesis.words.is_empty() {
        logw("Engine reported no word boundaries; caption timing will be derived.");
    }

    logi(format!(
        "Synthesized {} bytes of audio, {} word boundaries",
        synthesis.audio.len(),
        synthesis.words.len()
    ));
    Ok(synthesis)
}

pub async fn write_audio(synthesis: &Synthesis, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await.ok();
    }
    fs::write(dest, &synthesis.audio)
        .await
        .with_context(|| format!("write narration: {}", dest.display()))?;
    Ok(())
}
