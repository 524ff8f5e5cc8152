// rust_websocket_utils/src/error.rs

//! 定义 WebSocket 工具库相关的错误类型。

use thiserror::Error;

/// WebSocket 工具库的统一错误类型。
#[derive(Error, Debug)]
pub enum WsError {
    /// 当 serde 序列化失败时返回。
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 当 serde 反序列化失败时返回。
    #[error("反序列化错误: {0}")]
    DeserializationError(String),

    /// WebSocket 协议相关的错误，例如握手失败、连接被重置、帧格式不正确等。
    #[error("WebSocket协议错误: {0}")]
    WebSocketProtocolError(#[from] tokio_tungstenite::tungstenite::Error),

    /// 底层 I/O 错误，例如监听地址绑定失败。
    #[error("I/O错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 当尝试向一个已关闭的连接或通道发送消息时发生。
    #[error("发送错误: 通道已关闭")]
    SendErrorClosed,

    /// 无效的 URL 格式。
    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    /// 通用消息错误，用于其他未明确分类的错误（例如收到了非预期的二进制帧）。
    #[error("消息错误: {0}")]
    Message(String),
}

impl WsError {
    /// 此错误是否意味着底层连接已经不可用。
    ///
    /// 反序列化失败只影响单条消息，连接仍可继续使用；协议、I/O 与发送错误则表示连接已断开。
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            WsError::DeserializationError(_) | WsError::SerializationError(_) | WsError::Message(_)
        )
    }
}
