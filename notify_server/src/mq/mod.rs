//! 通知的外部输入通道。
//!
//! - `redis_bridge`: Redis 发布/订阅频道。
//! - `file_spool`: Redis 不可用时的文件投递目录。

pub mod file_spool;
pub mod redis_bridge;
