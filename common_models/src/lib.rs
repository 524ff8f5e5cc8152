//! `common_models` 公共模型库 crate。
//!
//! 本 crate 集中定义了通知服务端 (`notify_server`) 与各类客户端（浏览器前端、
//! 预订平台的请求进程、管理工具）之间共享的线路数据结构。
//!
//! 主要包含以下类型的模型：
//! - **通知 (`notification`)**: 经由 Redis 频道、文件投递目录或管理接口传入，
//!   再扇出到 WebSocket 连接的 `Notification` 及其投递目标 `NotificationTarget`。
//! - **WebSocket 消息负载 (`ws_payloads`)**: 客户端上行消息（加入会话房间、Ping/Pong）
//!   以及服务端下行的控制消息（`server_ping`、`session_joined` 等）。
//! - **通用枚举 (`enums`)**: 连接生命周期状态 `ConnectionState`。
//!
//! 设计原则：
//! - 所有模型都派生 `serde::Serialize` 和 `serde::Deserialize`，字段名遵循前端使用的 camelCase。
//! - 未识别的通知字段原样保留，服务端只读取路由所需的字段。

pub mod enums;
pub mod notification;
pub mod ws_payloads;

/// 生成当前 UTC 时间的 ISO-8601 字符串，用作各类消息的 `timestamp` 字段。
pub fn iso_timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
