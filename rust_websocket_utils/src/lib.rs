//! `rust_websocket_utils` 是一个提供 WebSocket 通信实用功能的 Rust Crate。
//! 它封装了 `tokio-tungstenite` 的握手、拆分读写端和帧收发细节，
//! 让通知服务端只需处理"连接建立"与"收到一帧"两类事件。
//!
//! 主要模块包括：
//! - `message`: 帧类型 `WsMessage`（文本 JSON、Ping/Pong 控制帧、关闭）。
//! - `error`: 库中统一使用的错误类型 `WsError`。
//! - `server`: 服务端监听、接受连接与逐帧接收。
//! - `client`: 客户端连接，主要供集成测试和运维工具使用。

pub mod client;
pub mod error;
pub mod message;
pub mod server;
