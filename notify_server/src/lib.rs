//! `notify_server` 通知服务核心库。
//!
//! 本 Crate 实现预订平台的实时通知层：持有所有浏览器 WebSocket 连接，
//! 按会话房间分组，把 Redis 通知频道桥接到这些连接上，并通过周期性 Ping 维护连接健康。
//!
//! 主要模块包括：
//! - `admin`: 管理 HTTP 接口（健康检查、房间快照、本地发布）。
//! - `config`: 应用配置的加载与默认值。
//! - `error`: 应用特定的错误类型。
//! - `mq`: Redis 通知频道桥接与文件投递目录。
//! - `ws_server`: WebSocket 服务端，处理连接、房间路由、心跳和广播。

pub mod admin;
pub mod config;
pub mod error;
pub mod mq;
pub mod ws_server;
