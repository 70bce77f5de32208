//! The newline-delimited JSON wire protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::P2pError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum MessageType {
    NewTransaction = 1,
    NewBlock = 2,
    GetBlocks = 3,
    SendBlocks = 4,
    GetPeers = 5,
    SendPeers = 6,
    Error = 7,
    Ping = 8,
    Pong = 9,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Message {
    pub fn new(msg_type: MessageType, payload: Option<Value>) -> Self {
        Message { msg_type, payload }
    }

    pub fn ping() -> Self {
        Message::new(MessageType::Ping, None)
    }

    pub fn pong() -> Self {
        Message::new(MessageType::Pong, None)
    }

    pub fn get_peers() -> Self {
        Message::new(MessageType::GetPeers, None)
    }

    pub fn send_peers(peers: &[(String, u16)]) -> Self {
        let list: Vec<String> = peers.iter().map(|(h, p)| format!("{}:{}", h, p)).collect();
        Message::new(MessageType::SendPeers, Some(serde_json::json!({ "peers": list })))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Message::new(MessageType::Error, Some(serde_json::json!({ "error": message.into() })))
    }

    /// Serializes to a single line (newline-terminated) ready to write to
    /// a socket.
    pub fn to_line(&self) -> String {
        format!("{}\n", serde_json::to_string(self).expect("message always serializes"))
    }

    /// Parses one newline-delimited JSON line into a message, surfacing
    /// the §7(g) "malformed JSON" transport error kind on failure.
    pub fn parse(line: &str) -> Result<Message, P2pError> {
        serde_json::from_str(line.trim()).map_err(P2pError::from)
    }
}

/// Parses the `{peers: ["host:port", ...]}` payload of a SEND_PEERS message.
pub fn parse_peer_list(payload: &Value) -> Vec<(String, u16)> {
    payload
        .get("peers")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|s| {
                    let (host, port) = s.rsplit_once(':')?;
                    Some((host.to_string(), port.parse().ok()?))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_roundtrips_with_no_payload() {
        let line = Message::ping().to_line();
        assert_eq!(line.trim(), r#"{"type":8}"#);
        let parsed = Message::parse(&line).unwrap();
        assert_eq!(parsed.msg_type, MessageType::Ping);
        assert!(parsed.payload.is_none());
    }

    #[test]
    fn send_peers_roundtrips() {
        let msg = Message::send_peers(&[("10.0.0.1".into(), 9000)]);
        let line = msg.to_line();
        let parsed = Message::parse(&line).unwrap();
        let peers = parse_peer_list(&parsed.payload.unwrap());
        assert_eq!(peers, vec![("10.0.0.1".to_string(), 9000)]);
    }
}
