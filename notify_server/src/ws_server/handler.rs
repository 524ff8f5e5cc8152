//! 传输层回调。
//!
//! `ConnectionHandler` 描述一个连接从建立到关闭期间传输层触发的四类事件，
//! 与面向其他组件的广播 API (`NotificationHub`) 相互独立。

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, warn};
use rust_websocket_utils::error::WsError;
use rust_websocket_utils::message::WsMessage;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use super::client_session::ClientSession;
use super::connection_manager::ConnectionManager;
use super::message_router;

/// 传输层回调。
pub trait ConnectionHandler: Send + Sync + 'static {
    /// 握手完成，登记新连接。
    fn on_open(&self, addr: SocketAddr, sender: mpsc::Sender<WsMessage>) -> impl Future<Output = Arc<ClientSession>> + Send;

    /// 收到一帧。
    fn on_message(&self, session: &Arc<ClientSession>, message: WsMessage) -> impl Future<Output = ()> + Send;

    /// 连接正常结束（对端关闭、心跳超时或服务端请求关闭）。
    fn on_close(&self, session: &Arc<ClientSession>) -> impl Future<Output = ()> + Send;

    /// 连接因传输错误结束。记录错误后按关闭处理。
    fn on_error(&self, session: &Arc<ClientSession>, error: WsError) -> impl Future<Output = ()> + Send;
}

/// 处理加入房间、Ping/Pong 之外的客户端消息。
pub trait ApplicationHandler: Send + Sync {
    fn handle(&self, session: &ClientSession, message_type: Option<&str>, body: &Map<String, Value>);
}

/// 默认的应用处理器：只记录日志。
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingApplicationHandler;

impl ApplicationHandler for LoggingApplicationHandler {
    fn handle(&self, session: &ClientSession, message_type: Option<&str>, body: &Map<String, Value>) {
        debug!(
            "[ApplicationHandler] 客户端 {}: 未处理的消息 (type: {}, 字段数: {})",
            session.client_id,
            message_type.unwrap_or("<none>"),
            body.len()
        );
    }
}

/// 通知服务的传输回调实现，维护连接注册表。
pub struct NotificationConnectionHandler {
    connection_manager: Arc<ConnectionManager>,
    application_handler: Arc<dyn ApplicationHandler>,
}

impl NotificationConnectionHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self::with_application_handler(connection_manager, Arc::new(LoggingApplicationHandler))
    }

    pub fn with_application_handler(
        connection_manager: Arc<ConnectionManager>,
        application_handler: Arc<dyn ApplicationHandler>,
    ) -> Self {
        Self {
            connection_manager,
            application_handler,
        }
    }
}

impl ConnectionHandler for NotificationConnectionHandler {
    async fn on_open(&self, addr: SocketAddr, sender: mpsc::Sender<WsMessage>) -> Arc<ClientSession> {
        self.connection_manager.add_client(addr, sender)
    }

    async fn on_message(&self, session: &Arc<ClientSession>, message: WsMessage) {
        if let Err(e) = message_router::handle_message(
            session,
            message,
            &self.connection_manager,
            self.application_handler.as_ref(),
        )
        .await
        {
            error!("[WsService] SessionID {}: 处理消息时出错: {}", session.client_id, e);
        }
    }

    async fn on_close(&self, session: &Arc<ClientSession>) {
        self.connection_manager.remove_client(&session.client_id).await;
    }

    async fn on_error(&self, session: &Arc<ClientSession>, error: WsError) {
        warn!(
            "[WsService] SessionID {} (addr: {}): 传输错误，按断开处理: {}",
            session.client_id, session.addr, error
        );
        self.connection_manager.remove_client(&session.client_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_close_and_error_update_registry() {
        let manager = Arc::new(ConnectionManager::new());
        let handler = NotificationConnectionHandler::new(Arc::clone(&manager));
        let addr: SocketAddr = "127.0.0.1:50004".parse().expect("测试地址无效");

        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        let first = handler.on_open(addr, tx1).await;
        let second = handler.on_open(addr, tx2).await;
        assert_ne!(first.client_id, second.client_id, "每个连接都应分配新的 ID");
        assert_eq!(manager.client_count(), 2);

        handler
            .on_message(&first, WsMessage::Text(r#"{"type":"join","sessionId":"A"}"#.to_string()))
            .await;
        assert_eq!(manager.rooms_snapshot().get("A"), Some(&1));

        handler.on_error(&first, WsError::SendErrorClosed).await;
        assert_eq!(manager.client_count(), 1);
        assert!(manager.rooms_snapshot().is_empty());

        handler.on_close(&second).await;
        handler.on_close(&second).await;
        assert_eq!(manager.client_count(), 0);
    }
}
