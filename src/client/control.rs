//! One-shot control panel: push a partial `server-params` and read back the
//! state the server re-broadcasts.
use std::time::{Duration, Instant};

use log::debug;
use serde_json::{Map, Value};
use simple_error::bail;

use crate::common::{box_error::BoxError, bus_message::BusMessage, bus_socket::BusSocket};

const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Field by field, only what was given
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamsUpdate {
    pub active: Option<bool>,
    pub delay: Option<f64>,
    pub gain: Option<f64>,
    pub period: Option<f64>,
    pub number: Option<i64>,
    pub duration: Option<f64>,
}

impl ParamsUpdate {
    pub fn as_json(&self) -> Value {
        let mut fields = Map::new();
        if let Some(v) = self.active {
            fields.insert("active".to_string(), Value::from(v));
        }
        if let Some(v) = self.delay {
            fields.insert("delay".to_string(), Value::from(v));
        }
        if let Some(v) = self.gain {
            fields.insert("gain".to_string(), Value::from(v));
        }
        if let Some(v) = self.period {
            fields.insert("period".to_string(), Value::from(v));
        }
        if let Some(v) = self.number {
            fields.insert("number".to_string(), Value::from(v));
        }
        if let Some(v) = self.duration {
            fields.insert("duration".to_string(), Value::from(v));
        }
        Value::Object(fields)
    }
    pub fn is_empty(&self) -> bool {
        *self == ParamsUpdate::default()
    }
}

/// Send the update (nothing when it is empty) and return the server state
/// that follows it.
pub fn send_update(url: &str, update: &ParamsUpdate, timeout: Duration) -> Result<Value, BoxError> {
    let mut sock = BusSocket::connect(url, READ_TIMEOUT)?;
    // every connection gets the current state first
    let current = wait_for_params(&mut sock, timeout)?;
    if update.is_empty() {
        sock.close();
        return Ok(current);
    }
    debug!("sending {}", update.as_json());
    sock.send(&BusMessage::ServerParams(update.as_json()))?;
    let merged = wait_for_params(&mut sock, timeout)?;
    sock.close();
    Ok(merged)
}

fn wait_for_params(sock: &mut BusSocket, timeout: Duration) -> Result<Value, BoxError> {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !sock.is_connected() {
            bail!("server closed the connection");
        }
        match sock.get_message()? {
            Some(BusMessage::ServerParams(params)) => return Ok(params),
            Some(other) => debug!("skipping {}", other.event()),
            None => {}
        }
    }
    bail!("no server-params within {:?}", timeout)
}

#[cfg(test)]
mod test_control {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_given_fields_are_sent() {
        let update = ParamsUpdate {
            active: Some(false),
            period: Some(500.0),
            ..ParamsUpdate::default()
        };
        assert_eq!(update.as_json(), json!({"active": false, "period": 500.0}));
        assert!(!update.is_empty());
        assert!(ParamsUpdate::default().is_empty());
        assert_eq!(ParamsUpdate::default().as_json(), json!({}));
    }
}
