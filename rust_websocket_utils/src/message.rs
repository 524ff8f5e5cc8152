// rust_websocket_utils/src/message.rs

//! 定义 WebSocket 通信中使用的帧类型。
//!
//! 通知服务的线路协议直接使用 JSON 对象作为文本帧内容（没有额外的信封结构），
//! 因此 `WsMessage` 只区分文本帧与少量控制帧。
//! 业务层通过 `WsMessage::json` 构造下行消息，通过 `deserialize_payload` 解析上行消息。

use crate::error::WsError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_tungstenite::tungstenite::protocol::Message;

/// 在客户端与 WebSocket 服务器之间交换的一帧。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    /// 文本帧，内容为 JSON 文本。
    Text(String),
    /// 协议层 Ping 控制帧。
    Ping(Vec<u8>),
    /// 协议层 Pong 控制帧。
    Pong(Vec<u8>),
    /// 请求关闭连接。
    Close,
}

impl WsMessage {
    /// 将任意可序列化的数据编码为 JSON 文本帧。
    ///
    /// # Returns
    /// 序列化失败时返回 `WsError::SerializationError`。
    pub fn json<T: Serialize>(payload_data: &T) -> Result<WsMessage, WsError> {
        let payload_str = serde_json::to_string(payload_data)
            .map_err(|e| WsError::SerializationError(format!("创建 WsMessage 时序列化载荷失败: {}", e)))?;
        Ok(WsMessage::Text(payload_str))
    }

    /// 文本帧的内容；控制帧返回 `None`。
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(text) => Some(text),
            _ => None,
        }
    }

    /// 将文本帧的 JSON 内容反序列化为目标类型 `T`。
    ///
    /// 控制帧或 JSON 结构不匹配时返回 `WsError::DeserializationError`。
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T, WsError> {
        let text = self
            .as_text()
            .ok_or_else(|| WsError::DeserializationError(format!("控制帧没有可解析的载荷: {:?}", self)))?;
        serde_json::from_str(text)
            .map_err(|e| WsError::DeserializationError(format!("WsMessage 载荷反序列化为目标类型失败: {}, 原始载荷: '{}'", e, text)))
    }

    /// 读取文本帧 JSON 对象中的 `type` 字段，主要用于日志。
    pub fn message_type(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(self.as_text()?).ok()?;
        value.get("type")?.as_str().map(str::to_string)
    }

    /// 转换为底层 `tungstenite` 消息。
    pub fn into_tungstenite(self) -> Message {
        match self {
            WsMessage::Text(text) => Message::Text(text),
            WsMessage::Ping(data) => Message::Ping(data),
            WsMessage::Pong(data) => Message::Pong(data),
            WsMessage::Close => Message::Close(None),
        }
    }
}
