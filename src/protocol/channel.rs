//! Messages carried over the `controller` data channel.
//!
//! Outbound traffic is `{type:"state", ...}` patches plus a single
//! `{type:"hello", ...}` after the channel opens. State messages are
//! latest-wins: the host applies whichever fields are present, so a patch
//! only carries the controls that actually changed. Inbound traffic is
//! forwarded to subscribers as raw JSON; [`HostReply`] is the typed view
//! UI layers usually want.

use crate::device::DeviceInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One of the nine combined directional-pad outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PadDirection {
    Neutral,
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
}

/// Partial input-state update. Absent fields are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StateMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buttons: Option<HashMap<String, bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpad: Option<PadDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lx: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ly: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ry: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rt: Option<f64>,
}

impl StateMessage {
    pub fn button(name: impl Into<String>, down: bool) -> Self {
        Self {
            buttons: Some(HashMap::from([(name.into(), down)])),
            ..Default::default()
        }
    }

    pub fn dpad(direction: PadDirection) -> Self {
        Self {
            dpad: Some(direction),
            ..Default::default()
        }
    }

    pub fn left_axis(x: f64, y: f64) -> Self {
        Self {
            lx: Some(x),
            ly: Some(y),
            ..Default::default()
        }
    }

    pub fn right_axis(x: f64, y: f64) -> Self {
        Self {
            rx: Some(x),
            ry: Some(y),
            ..Default::default()
        }
    }

    pub fn left_trigger(value: f64) -> Self {
        Self {
            lt: Some(value),
            ..Default::default()
        }
    }

    pub fn right_trigger(value: f64) -> Self {
        Self {
            rt: Some(value),
            ..Default::default()
        }
    }
}

/// Everything the controller sends down the data channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelMessage {
    State(StateMessage),
    #[serde(rename_all = "camelCase")]
    Hello {
        device_tag: String,
        device_info: DeviceInfo,
    },
}

impl ChannelMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Typed view over the host's replies. All fields are optional; anything
/// the host sends beyond these stays accessible through the raw JSON.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HostReply {
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl HostReply {
    /// Interpret an inbound payload as a host reply, if it is shaped like
    /// one. Non-object payloads yield `None`.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_patch_omits_absent_fields() {
        let json = ChannelMessage::State(StateMessage::dpad(PadDirection::UpLeft))
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"type":"state","dpad":"upleft"}"#);
    }

    #[test]
    fn button_patch_carries_single_entry() {
        let json = ChannelMessage::State(StateMessage::button("A", true))
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"type":"state","buttons":{"A":true}}"#);
    }

    #[test]
    fn axis_patch_keeps_zero_values() {
        // 0.0 means "stick centered", not "no change"; it must survive.
        let json = ChannelMessage::State(StateMessage::left_axis(0.0, -1.0))
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"type":"state","lx":0.0,"ly":-1.0}"#);
    }

    #[test]
    fn pad_directions_spell_like_the_host_expects() {
        for (dir, name) in [
            (PadDirection::Neutral, "neutral"),
            (PadDirection::UpRight, "upright"),
            (PadDirection::DownLeft, "downleft"),
        ] {
            assert_eq!(serde_json::to_value(dir).unwrap(), json!(name));
        }
    }

    #[test]
    fn hello_uses_camel_case_keys() {
        let json = ChannelMessage::Hello {
            device_tag: "Linux x86_64 • AB12".into(),
            device_info: DeviceInfo::collect(),
        }
        .to_json()
        .unwrap();
        assert!(json.contains("\"type\":\"hello\""));
        assert!(json.contains("\"deviceTag\":"));
        assert!(json.contains("\"deviceInfo\":"));
    }

    #[test]
    fn host_reply_reads_partial_objects() {
        let ok = HostReply::from_value(&json!({"ok": true, "index": 2})).unwrap();
        assert_eq!(ok.ok, Some(true));
        assert_eq!(ok.index, Some(2));
        assert_eq!(ok.error, None);

        let err = HostReply::from_value(&json!({"ok": false, "error": "slots full"})).unwrap();
        assert_eq!(err.error.as_deref(), Some("slots full"));

        assert!(HostReply::from_value(&json!("plain string")).is_none());
    }
}
