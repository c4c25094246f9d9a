//! Wire messages of the live (streaming audio) service.

use serde::{Deserialize, Serialize};

use crate::audio::{AudioChunk, CapturedFrame};
use crate::session::SessionEvent;

// ======================== Client -> server ========================

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: String,
}

#[derive(Serialize, Debug)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LiveGenerationConfig {
    pub response_modalities: Vec<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: LiveGenerationConfig,
    pub system_instruction: Content,
    /// Empty object switches on transcripts of the spoken reply
    pub output_audio_transcription: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

/// First message on every connection.
#[derive(Serialize, Debug)]
pub struct SetupMessage {
    pub setup: Setup,
}

impl SetupMessage {
    pub fn new(model: &str, system_instruction: &str) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        Self {
            setup: Setup {
                model,
                generation_config: LiveGenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                },
                system_instruction: Content::text(None, system_instruction),
                output_audio_transcription: serde_json::Map::new(),
            },
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

impl From<CapturedFrame> for RealtimeInputMessage {
    fn from(frame: CapturedFrame) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![MediaChunk { mime_type: frame.mime_type, data: frame.payload }],
            },
        }
    }
}

/// A typed user turn inside a live session.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ClientContentMessage {
    pub client_content: ClientContent,
}

impl ClientContentMessage {
    pub fn user_text(text: &str) -> Self {
        Self {
            client_content: ClientContent {
                turns: vec![Content::text(Some("user"), text)],
                turn_complete: true,
            },
        }
    }
}

// ======================== Server -> client ========================

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerPart {
    pub inline_data: Option<InlineData>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<ServerPart>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct LiveServerMessage {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
    pub go_away: Option<serde_json::Value>,
}

/// Sample rate from a mime type like `audio/pcm;rate=24000`.
///
/// `None` if the type is not raw PCM; `Some(None)` if it is PCM without a rate.
pub fn pcm_rate(mime_type: &str) -> Option<Option<u32>> {
    let mut params = mime_type.split(';').map(str::trim);
    let essence = params.next()?.to_ascii_lowercase();
    if essence != "audio/pcm" && essence != "audio/l16" {
        return None;
    }
    let rate = params
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, v)| v.trim().parse().ok());
    Some(rate)
}

impl LiveServerMessage {
    /// Translate into session events, in the order the session must apply them:
    /// audio, transcript, turn end, interruption.
    pub fn into_events(self, default_rate: u32, channels: u16) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.setup_complete.is_some() {
            events.push(SessionEvent::Ready);
        }
        if let Some(reason) = self.go_away {
            log::warn!("Live service is closing the session soon: {}", reason);
        }
        let Some(content) = self.server_content else {
            return events;
        };

        for part in content.model_turn.map(|t| t.parts).unwrap_or_default() {
            let Some(inline) = part.inline_data else { continue };
            match pcm_rate(&inline.mime_type) {
                Some(rate) => events.push(SessionEvent::ChunkArrived(AudioChunk {
                    payload: inline.data,
                    sample_rate: rate.unwrap_or(default_rate),
                    channels,
                })),
                // no mime type at all is treated as PCM at the default rate
                None if inline.mime_type.is_empty() => {
                    events.push(SessionEvent::ChunkArrived(AudioChunk {
                        payload: inline.data,
                        sample_rate: default_rate,
                        channels,
                    }))
                }
                None => log::warn!("Ignoring non-PCM inline data: {}", inline.mime_type),
            }
        }

        if let Some(t) = content.output_transcription {
            if !t.text.is_empty() {
                events.push(SessionEvent::Transcription(t.text));
            }
        }
        if content.turn_complete {
            events.push(SessionEvent::TurnComplete);
        }
        if content.interrupted {
            events.push(SessionEvent::Interrupted);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn setup_message_shape() {
        let msg = SetupMessage::new("gemini-live", "Be kind");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            v,
            json!({
                "setup": {
                    "model": "models/gemini-live",
                    "generationConfig": { "responseModalities": ["AUDIO"] },
                    "systemInstruction": { "parts": [{ "text": "Be kind" }] },
                    "outputAudioTranscription": {}
                }
            })
        );
    }

    #[test]
    fn realtime_input_carries_frame() {
        let frame = CapturedFrame { mime_type: "audio/pcm;rate=16000".into(), payload: "AAA=".into() };
        let v = serde_json::to_value(RealtimeInputMessage::from(frame)).unwrap();
        assert_eq!(
            v,
            json!({ "realtimeInput": { "mediaChunks": [{ "mimeType": "audio/pcm;rate=16000", "data": "AAA=" }] } })
        );
    }

    #[test]
    fn client_content_is_a_complete_user_turn() {
        let v = serde_json::to_value(ClientContentMessage::user_text("hi")).unwrap();
        assert_eq!(
            v,
            json!({ "clientContent": { "turns": [{ "role": "user", "parts": [{ "text": "hi" }] }], "turnComplete": true } })
        );
    }

    #[test]
    fn parses_pcm_rates() {
        assert_eq!(pcm_rate("audio/pcm;rate=24000"), Some(Some(24000)));
        assert_eq!(pcm_rate("audio/pcm; rate = 16000"), Some(Some(16000)));
        assert_eq!(pcm_rate("audio/pcm"), Some(None));
        assert_eq!(pcm_rate("audio/mpeg"), None);
    }

    #[test]
    fn server_content_becomes_ordered_events() {
        let raw = json!({
            "serverContent": {
                "modelTurn": { "parts": [
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAAA" } },
                    { "text": "thinking" },
                    { "inlineData": { "mimeType": "audio/pcm", "data": "BBBB" } }
                ] },
                "outputTranscription": { "text": "Namaste" },
                "turnComplete": true,
                "interrupted": true
            }
        });
        let msg: LiveServerMessage = serde_json::from_value(raw).unwrap();
        let events = msg.into_events(22050, 1);

        assert_eq!(events.len(), 5);
        match &events[0] {
            SessionEvent::ChunkArrived(c) => {
                assert_eq!(c.payload, "AAAA");
                assert_eq!(c.sample_rate, 24000);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &events[1] {
            SessionEvent::ChunkArrived(c) => assert_eq!(c.sample_rate, 22050),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(&events[2], SessionEvent::Transcription(t) if t == "Namaste"));
        assert!(matches!(events[3], SessionEvent::TurnComplete));
        assert!(matches!(events[4], SessionEvent::Interrupted));
    }

    #[test]
    fn setup_complete_and_unknown_messages() {
        let ready: LiveServerMessage = serde_json::from_str(r#"{"setupComplete":{}}"#).unwrap();
        assert!(matches!(ready.into_events(24000, 1).as_slice(), [SessionEvent::Ready]));

        let other: LiveServerMessage = serde_json::from_str(r#"{"toolCall":{}}"#).unwrap();
        assert!(other.into_events(24000, 1).is_empty());
    }
}
