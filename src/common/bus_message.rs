//! Messages carried on the event bus between server, clients and control panels.
//!
//! On the websocket each message is one text frame holding
//! `{"event": "<channel>", "data": <payload>}`.
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::common::box_error::BoxError;

/// per (client identity, output channel) correction values, seconds and dB
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct CompensationProfile {
    pub delay: f64,
    pub gain: f64,
}

/// One click to render.  `target_time` is in the server's time base (seconds).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ClickEvent {
    #[serde(rename = "targetTime")]
    pub target_time: f64,
    pub gain: f64,
    pub duration: f64,
}

/// Key used to look up a stored compensation profile
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClientKey {
    #[serde(rename = "userAgent")]
    pub user_agent: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClientParamsStore {
    #[serde(rename = "userAgent")]
    pub user_agent: String,
    pub output: String,
    pub data: CompensationProfile,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum BusMessage {
    /// T1, client send time
    SyncRequest(f64),
    /// [T1, T2, T3]
    SyncReply([f64; 3]),
    /// full or partial metronome parameters, kept loose so unknown keys survive decoding
    ServerParams(Value),
    Click(ClickEvent),
    ClientParamsStore(ClientParamsStore),
    ClientParamsRequest(ClientKey),
    ClientParams(CompensationProfile),
}

impl BusMessage {
    pub fn from_text(data: &str) -> Result<BusMessage, BoxError> {
        Ok(serde_json::from_str(data)?)
    }
    pub fn to_text(&self) -> Result<String, BoxError> {
        Ok(serde_json::to_string(self)?)
    }
    /// channel name, for logging
    pub fn event(&self) -> &'static str {
        match self {
            BusMessage::SyncRequest(_) => "sync-request",
            BusMessage::SyncReply(_) => "sync-reply",
            BusMessage::ServerParams(_) => "server-params",
            BusMessage::Click(_) => "click",
            BusMessage::ClientParamsStore(_) => "client-params-store",
            BusMessage::ClientParamsRequest(_) => "client-params-request",
            BusMessage::ClientParams(_) => "client-params",
        }
    }
}

impl fmt::Display for BusMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "{{ event: {} }}", self.event()),
        }
    }
}
