// rust_websocket_utils/src/client/mod.rs

//! WebSocket 客户端模块。
//!
//! 提供连接通知服务器、发送 JSON 文本帧和接收下行消息的功能，
//! 主要供集成测试与运维工具使用（浏览器前端不依赖本模块）。

pub mod transport;
