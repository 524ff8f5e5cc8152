// common_models/src/ws_payloads.rs

//! WebSocket 通信中使用的消息类型常量与负载结构体。
//!
//! 线路上的每一帧都是一个带 `type` 字段的 JSON 对象。本模块负责：
//! - 将客户端上行文本解析为 `ClientMessage`；
//! - 定义服务端下行的控制消息（`server_ping`、`pong`、`session_joined`）。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 客户端请求加入会话房间。
pub const JOIN_MESSAGE_TYPE: &str = "join";
/// 旧版前端使用的加入会话指令，语义与 `join` 相同。
pub const UPDATE_SESSION_MESSAGE_TYPE: &str = "update_session";
/// 客户端发起的保活 Ping。
pub const PING_MESSAGE_TYPE: &str = "ping";
/// Pong：服务端对客户端 Ping 的应答，或客户端对 `server_ping` 的应答。
pub const PONG_MESSAGE_TYPE: &str = "pong";
/// 服务端定期发出的健康检查 Ping。
pub const SERVER_PING_MESSAGE_TYPE: &str = "server_ping";
/// 服务端确认客户端已加入会话房间。
pub const SESSION_JOINED_MESSAGE_TYPE: &str = "session_joined";

/// join / update_session 指令的负载。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub session_id: String,
}

/// 解析后的客户端上行消息。
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// 加入（或切换到）某个会话房间。
    Join { session_id: String },
    /// 客户端保活 Ping，服务端回复 Pong。
    Ping,
    /// 对 `server_ping` 的应答。
    Pong,
    /// 其它应用层消息，交给上层的应用处理器。
    Application {
        message_type: Option<String>,
        body: Map<String, Value>,
    },
}

impl ClientMessage {
    /// 解析客户端发送的文本帧。
    ///
    /// 非 JSON、非对象，或 join 指令缺少非空 `sessionId` 时返回错误。
    pub fn parse(text: &str) -> Result<ClientMessage, serde_json::Error> {
        let body: Map<String, Value> = serde_json::from_str(text)?;
        let message_type = body.get("type").and_then(Value::as_str).map(str::to_string);

        match message_type.as_deref() {
            Some(JOIN_MESSAGE_TYPE) | Some(UPDATE_SESSION_MESSAGE_TYPE) => {
                let join: JoinPayload = serde_json::from_value(Value::Object(body))?;
                if join.session_id.trim().is_empty() {
                    return Err(<serde_json::Error as serde::de::Error>::custom(
                        "join 指令的 sessionId 不能为空",
                    ));
                }
                Ok(ClientMessage::Join {
                    session_id: join.session_id,
                })
            }
            Some(PING_MESSAGE_TYPE) => Ok(ClientMessage::Ping),
            Some(PONG_MESSAGE_TYPE) => Ok(ClientMessage::Pong),
            _ => Ok(ClientMessage::Application { message_type, body }),
        }
    }
}

/// 服务端下行的健康检查 Ping：`{"type":"server_ping","timestamp":...}`。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerPingPayload {
    #[serde(rename = "type")]
    pub message_type: String,
    pub timestamp: String,
}

impl ServerPingPayload {
    pub fn now() -> Self {
        Self {
            message_type: SERVER_PING_MESSAGE_TYPE.to_string(),
            timestamp: crate::iso_timestamp_now(),
        }
    }
}

/// 服务端对客户端 Ping 的应答。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PongPayload {
    #[serde(rename = "type")]
    pub message_type: String,
    pub timestamp: String,
}

impl PongPayload {
    pub fn now() -> Self {
        Self {
            message_type: PONG_MESSAGE_TYPE.to_string(),
            timestamp: crate::iso_timestamp_now(),
        }
    }
}

/// 加入会话房间后连接发生的变化。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JoinAction {
    /// 首次加入。
    Set,
    /// 从另一个会话房间切换过来。
    Updated,
    /// 已在该房间中，无变化。
    None,
}

/// `session_joined` 确认消息。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionJoinedPayload {
    #[serde(rename = "type")]
    pub message_type: String,
    pub session_id: String,
    pub action: JoinAction,
    pub timestamp: String,
}

impl SessionJoinedPayload {
    pub fn new(session_id: impl Into<String>, action: JoinAction) -> Self {
        Self {
            message_type: SESSION_JOINED_MESSAGE_TYPE.to_string(),
            session_id: session_id.into(),
            action,
            timestamp: crate::iso_timestamp_now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_join_and_legacy_update_session() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"join","sessionId":"abc"}"#).expect("join 应能解析"),
            ClientMessage::Join { session_id: "abc".to_string() }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"update_session","message":"Updating session ID","sessionId":"xyz"}"#)
                .expect("update_session 应能解析"),
            ClientMessage::Join { session_id: "xyz".to_string() }
        );
    }

    #[test]
    fn test_join_without_session_id_is_an_error() {
        assert!(ClientMessage::parse(r#"{"type":"join"}"#).is_err());
        assert!(ClientMessage::parse(r#"{"type":"join","sessionId":"   "}"#).is_err());
        assert!(ClientMessage::parse(r#"{"type":"join","sessionId":12}"#).is_err());
    }

    #[test]
    fn test_parse_ping_pong_and_application_messages() {
        assert_eq!(ClientMessage::parse(r#"{"type":"ping"}"#).expect("ping"), ClientMessage::Ping);
        assert_eq!(
            ClientMessage::parse(r#"{"type":"pong","timestamp":"2024-01-01T00:00:00Z"}"#).expect("pong"),
            ClientMessage::Pong
        );

        match ClientMessage::parse(r#"{"type":"subscribe","entityType":"resource","entityId":5}"#).expect("subscribe") {
            ClientMessage::Application { message_type, body } => {
                assert_eq!(message_type.as_deref(), Some("subscribe"));
                assert_eq!(body.get("entityId"), Some(&json!(5)));
            }
            other => panic!("subscribe 应作为应用层消息处理，实际为 {:?}", other),
        }

        match ClientMessage::parse(r#"{"message":"no type"}"#).expect("无 type 的对象") {
            ClientMessage::Application { message_type, .. } => assert!(message_type.is_none()),
            other => panic!("预期应用层消息，实际为 {:?}", other),
        }
    }

    #[test]
    fn test_malformed_text_is_rejected() {
        assert!(ClientMessage::parse("hello").is_err());
        assert!(ClientMessage::parse("[]").is_err());
        assert!(ClientMessage::parse("42").is_err());
    }

    #[test]
    fn test_outbound_control_messages_shape() {
        let ping = serde_json::to_value(ServerPingPayload::now()).expect("序列化 server_ping 失败");
        assert_eq!(ping["type"], json!("server_ping"));
        assert!(ping["timestamp"].is_string());

        let joined = serde_json::to_value(SessionJoinedPayload::new("abc", JoinAction::Updated))
            .expect("序列化 session_joined 失败");
        assert_eq!(joined["type"], json!("session_joined"));
        assert_eq!(joined["sessionId"], json!("abc"));
        assert_eq!(joined["action"], json!("updated"));
    }
}
