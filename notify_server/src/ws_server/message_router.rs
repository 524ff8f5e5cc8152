//! 负责处理从客户端接收到的单帧，并根据消息类型进行分发。

use std::sync::Arc;

use common_models::ws_payloads::{ClientMessage, PongPayload, SessionJoinedPayload};
use log::{debug, warn};
use rust_websocket_utils::message::WsMessage;

use super::client_session::ClientSession;
use super::connection_manager::ConnectionManager;
use super::handler::ApplicationHandler;
use crate::error::AppError;

/// 处理从客户端接收到的一帧。
///
/// - `join` / `update_session`：加入会话房间并回复 `session_joined`；
/// - `ping`：回复 `pong`；
/// - `pong` 或协议 Pong 帧：刷新健康状态；
/// - 其他 JSON 对象：交给应用处理器；
/// - 无法解析的文本：记录日志后丢弃，连接保持打开。
///
/// 返回错误只表示回复消息未能构造，调用方记录日志即可。
pub async fn handle_message(
    client_session: &Arc<ClientSession>,
    message: WsMessage,
    connection_manager: &ConnectionManager,
    application_handler: &dyn ApplicationHandler,
) -> Result<(), AppError> {
    let text = match message {
        WsMessage::Text(text) => text,
        WsMessage::Pong(_) => {
            client_session.record_pong().await;
            return Ok(());
        }
        WsMessage::Ping(_) => {
            // 协议层 Ping 由 tungstenite 自动应答
            return Ok(());
        }
        WsMessage::Close => return Ok(()),
    };

    let parsed = match ClientMessage::parse(&text) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(
                "[MessageRouter] 客户端 {}: 无法解析的消息已丢弃: {}。原始内容: '{}'",
                client_session.client_id, e, text
            );
            return Ok(());
        }
    };

    match parsed {
        ClientMessage::Join { session_id } => {
            let action = connection_manager.join_room(client_session, &session_id).await;
            let reply = WsMessage::json(&SessionJoinedPayload::new(session_id, action))?;
            client_session.deliver(reply);
        }
        ClientMessage::Ping => {
            debug!("[MessageRouter] 客户端 {}: 收到 ping，回复 pong。", client_session.client_id);
            client_session.deliver(WsMessage::json(&PongPayload::now())?);
        }
        ClientMessage::Pong => {
            debug!("[MessageRouter] 客户端 {}: 收到 pong。", client_session.client_id);
            client_session.record_pong().await;
        }
        ClientMessage::Application { message_type, body } => {
            application_handler.handle(client_session, message_type.as_deref(), &body);
        }
    }
    Ok(())
}
