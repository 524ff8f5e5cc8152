use std::time::Duration;
use thiserror::Error;

/// 应用的主要错误类型
///
/// 广播 API 本身从不向调用方抛出这些错误；它们只出现在启动、Redis 连接、
/// 文件投递和入站消息解析等内部环节，由调用方记录日志后继续运行。
#[derive(Error, Debug)]
pub enum AppError {
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("通知格式错误: {0}")]
    InvalidNotification(#[from] serde_json::Error),

    #[error("文件投递目录 I/O 错误: {0}")]
    Spool(#[from] std::io::Error),

    #[error("Redis 命令超时 ({0:?})")]
    RedisTimeout(Duration),

    #[error("WebSocket 帧错误: {0}")]
    Frame(#[from] rust_websocket_utils::error::WsError),
}
