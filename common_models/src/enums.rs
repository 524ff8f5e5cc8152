//! 通用枚举模块。
//!
//! 本模块定义了服务端与管理工具之间共享的枚举类型。
//! 所有枚举都派生 `Serialize`, `Deserialize`, `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`，
//! 以便用于诊断输出和集合操作。

use serde::{Deserialize, Serialize};
use std::fmt;

/// WebSocket 连接的生命周期状态。
///
/// 状态迁移：`Connecting → Open → (JoinedRoom)? → Closing → Closed`，
/// 任意状态都可能因错误直接进入 `Closed`。
/// 管理接口的连接列表用它报告每个连接当前所处的阶段。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// TCP 已接受，WebSocket 握手尚未完成。
    Connecting,
    /// 握手完成，已登记到连接注册表，但尚未加入任何会话房间。
    Open,
    /// 客户端已通过 join 指令加入某个会话房间。
    JoinedRoom,
    /// 已请求关闭（对端断开、心跳超时或写入失败），等待读写任务退出。
    Closing,
    /// 已从注册表中移除。
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Open => "OPEN",
            ConnectionState::JoinedRoom => "JOINED_ROOM",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_connection_state_serialization_matches_display() {
        for state in [
            ConnectionState::Connecting,
            ConnectionState::Open,
            ConnectionState::JoinedRoom,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ] {
            let json = serde_json::to_string(&state).expect("序列化 ConnectionState 失败");
            assert_eq!(json, format!("\"{}\"", state), "{:?} 的 JSON 与 Display 输出不一致", state);
        }
    }

    #[test]
    fn test_connection_state_hash() {
        let mut states = HashSet::new();
        states.insert(ConnectionState::Open);
        states.insert(ConnectionState::Open);
        states.insert(ConnectionState::JoinedRoom);
        assert_eq!(states.len(), 2);
    }
}
