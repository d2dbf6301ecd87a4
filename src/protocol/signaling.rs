//! Signaling protocol spoken with the rendezvous server.
//!
//! The client opens a WebSocket to the signaler, announces itself with
//! `client-hello`, and is assigned a client id in the `client-welcome`
//! reply. Every later message carries that id; messages whose id does not
//! match the live session are stale and get dropped by the receiver.

use serde::{Deserialize, Serialize};
use tracing::debug;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Messages exchanged with the signaling server, tagged by `type`.
///
/// Directions (client perspective): `ClientHello`, `Offer` and outbound
/// `IceCandidate` go out; `ClientWelcome`, `Answer`, inbound `IceCandidate`,
/// `HostRegistered` and `HostDisconnected` come in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingMessage {
    /// First message after the socket opens; no payload.
    ClientHello,
    /// Assigns this session its client id.
    #[serde(rename_all = "camelCase")]
    ClientWelcome {
        #[serde(default)]
        client_id: String,
        #[serde(default)]
        has_host: bool,
    },
    /// Local session description, sent after the welcome.
    #[serde(rename_all = "camelCase")]
    Offer {
        client_id: String,
        description: RTCSessionDescription,
    },
    /// Remote session description from the host.
    #[serde(rename_all = "camelCase")]
    Answer {
        client_id: String,
        description: RTCSessionDescription,
    },
    /// Trickled candidate, either direction.
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        client_id: String,
        candidate: RTCIceCandidateInit,
    },
    /// Informational only; a host became available on the signaler.
    HostRegistered,
    /// The host went away; the session tears down on receipt.
    HostDisconnected,
}

impl SignalingMessage {
    /// Parse one text frame. Unknown message types and malformed payloads
    /// are not for us (or not relevant), so they decode to `None`.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(msg) => Some(msg),
            Err(e) => {
                debug!("Ignoring unparseable signaling frame: {}", e);
                None
            }
        }
    }

    /// Encode for transmission as a text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_hello_serializes_with_tag_only() {
        let json = SignalingMessage::ClientHello.to_json().unwrap();
        assert_eq!(json, "{\"type\":\"client-hello\"}");
    }

    #[test]
    fn client_welcome_deserializes_camel_case_fields() {
        let msg =
            SignalingMessage::parse(r#"{"type":"client-welcome","clientId":"abc","hasHost":true}"#)
                .unwrap();
        match msg {
            SignalingMessage::ClientWelcome { client_id, has_host } => {
                assert_eq!(client_id, "abc");
                assert!(has_host);
            }
            other => panic!("expected ClientWelcome, got {:?}", other),
        }
    }

    #[test]
    fn client_welcome_missing_id_defaults_to_empty() {
        let msg = SignalingMessage::parse(r#"{"type":"client-welcome"}"#).unwrap();
        match msg {
            SignalingMessage::ClientWelcome { client_id, has_host } => {
                assert!(client_id.is_empty());
                assert!(!has_host);
            }
            other => panic!("expected ClientWelcome, got {:?}", other),
        }
    }

    const MINI_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

    #[test]
    fn offer_round_trips_description() {
        let original = SignalingMessage::Offer {
            client_id: "c1".into(),
            description: RTCSessionDescription::offer(MINI_SDP.to_string()).unwrap(),
        };
        let json = original.to_json().unwrap();
        assert!(json.contains("\"type\":\"offer\""));
        assert!(json.contains("\"clientId\":\"c1\""));
        match SignalingMessage::parse(&json).unwrap() {
            SignalingMessage::Offer { client_id, description } => {
                assert_eq!(client_id, "c1");
                assert_eq!(description.sdp, MINI_SDP);
            }
            other => panic!("expected Offer, got {:?}", other),
        }
    }

    #[test]
    fn ice_candidate_keeps_init_fields() {
        let json = r#"{
            "type": "ice-candidate",
            "clientId": "c1",
            "candidate": {
                "candidate": "candidate:1 1 UDP 2130706431 192.168.1.7 50000 typ host",
                "sdpMid": "0",
                "sdpMLineIndex": 0
            }
        }"#;
        match SignalingMessage::parse(json).unwrap() {
            SignalingMessage::IceCandidate { client_id, candidate } => {
                assert_eq!(client_id, "c1");
                assert!(candidate.candidate.contains("typ host"));
                assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
            }
            other => panic!("expected IceCandidate, got {:?}", other),
        }
    }

    #[test]
    fn unknown_types_and_garbage_are_ignored() {
        assert!(SignalingMessage::parse(r#"{"type":"host-count","n":3}"#).is_none());
        assert!(SignalingMessage::parse("not json at all").is_none());
        assert!(SignalingMessage::parse(r#"{"no":"type"}"#).is_none());
    }

    #[test]
    fn host_lifecycle_messages_parse() {
        assert!(matches!(
            SignalingMessage::parse(r#"{"type":"host-registered"}"#),
            Some(SignalingMessage::HostRegistered)
        ));
        assert!(matches!(
            SignalingMessage::parse(r#"{"type":"host-disconnected"}"#),
            Some(SignalingMessage::HostDisconnected)
        ));
    }
}
