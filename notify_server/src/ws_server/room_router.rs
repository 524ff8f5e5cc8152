//! 把一条出站消息写到目标连接集合上：某个会话房间的全部成员，或全部连接。

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use rust_websocket_utils::message::WsMessage;
use serde_json::Value;

use crate::ws_server::client_session::Delivery;
use crate::ws_server::connection_manager::ConnectionManager;

/// 会话房间路由。
#[derive(Debug, Clone)]
pub struct RoomRouter {
    connection_manager: Arc<ConnectionManager>,
}

/// 为出站 JSON 对象补上 `timestamp` 字段（已有则保持不变），再编码为文本帧。
pub fn outbound_frame(message: &Value) -> Option<WsMessage> {
    let mut message = message.clone();
    if let Value::Object(fields) = &mut message {
        if !fields.contains_key("timestamp") {
            fields.insert(
                "timestamp".to_string(),
                Value::String(common_models::iso_timestamp_now()),
            );
        }
    }
    match WsMessage::json(&message) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("[RoomRouter] 出站消息编码失败: {}", e);
            None
        }
    }
}

impl RoomRouter {
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self { connection_manager }
    }

    /// 向会话房间的所有成员发送消息。
    ///
    /// 房间不存在或为空时返回 `false` 且不产生任何副作用；
    /// 否则返回 `true`，即使个别连接写入失败（失败只记录日志）。
    pub fn send_to_session_room(&self, session_id: &str, message: &Value) -> bool {
        let members = self.connection_manager.room_members(session_id);
        if members.is_empty() {
            debug!("[RoomRouter] 会话房间 '{}' 不存在或为空，消息未发送。", session_id);
            return false;
        }
        let Some(frame) = outbound_frame(message) else {
            return false;
        };

        let mut queued = 0;
        for member in &members {
            if member.deliver(frame.clone()) == Delivery::Queued {
                queued += 1;
            }
        }
        info!(
            "[RoomRouter] 已向会话房间 '{}' 发送消息 ({} / {} 个连接)",
            session_id,
            queued,
            members.len()
        );
        true
    }

    /// 向调用时刻注册的全部连接发送消息，返回成功入队的连接数。
    pub fn broadcast(&self, message: &Value) -> usize {
        let sessions = self.connection_manager.get_all_client_sessions();
        if sessions.is_empty() {
            debug!("[RoomRouter] 当前没有连接，广播被跳过。");
            return 0;
        }
        let Some(frame) = outbound_frame(message) else {
            return 0;
        };

        let queued = sessions
            .iter()
            .filter(|session| session.deliver(frame.clone()) == Delivery::Queued)
            .count();
        info!("[RoomRouter] 广播已发送到 {} / {} 个连接", queued, sessions.len());
        queued
    }

    /// 房间 ID 到成员数量的快照。
    pub fn get_rooms(&self) -> HashMap<String, usize> {
        self.connection_manager.rooms_snapshot()
    }
}
