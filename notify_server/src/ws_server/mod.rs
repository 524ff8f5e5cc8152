//! WebSocket 服务端逻辑模块。

pub mod client_session;
pub mod connection_manager;
pub mod handler;
pub mod heartbeat_monitor;
pub mod message_router;
pub mod notification_hub;
pub mod room_router;
pub mod service;
