//! WebSocket 服务端核心服务：监听、为每个连接运行读循环与写任务。

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use rust_websocket_utils::message::WsMessage;
use rust_websocket_utils::server::transport::{
    receive_message, ConnectionHandler as WsConnectionHandler, ServerTransport, WsReceiver,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use crate::config::WebSocketConfig;
use crate::ws_server::handler::ConnectionHandler;

/// WebSocket 服务，封装配置和传输回调。
pub struct WsService<H: ConnectionHandler> {
    config: WebSocketConfig,
    handler: Arc<H>,
}

impl<H: ConnectionHandler> WsService<H> {
    pub fn new(config: WebSocketConfig, handler: Arc<H>) -> Self {
        info!("[WsService] New instance created.");
        Self { config, handler }
    }

    /// 绑定配置中的地址并开始服务。只有绑定失败时才会返回。
    pub async fn start(&self) -> Result<()> {
        let listen_addr = self
            .config
            .listen_addr()
            .context("WebSocket listen address is invalid")?;
        info!("[WsService] Starting WebSocket service on {}...", listen_addr);
        let listener = TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("Failed to bind WebSocket listener on {}", listen_addr))?;
        self.serve(listener).await
    }

    /// 在已绑定的监听器上服务。
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let handler = Arc::clone(&self.handler);
        let outbound_buffer = self.config.outbound_buffer.max(1);

        let on_new_connection = move |ws_conn_handler: WsConnectionHandler, ws_receiver: WsReceiver| {
            let handler = Arc::clone(&handler);
            async move {
                handle_connection(handler, ws_conn_handler, ws_receiver, outbound_buffer).await;
            }
        };

        ServerTransport::serve(listener, on_new_connection)
            .await
            .context("WebSocket server operation failed")?;
        warn!("[WsService] WebSocket server has unexpectedly stopped.");
        Ok(())
    }
}

async fn wait_for_close(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|closed| *closed).await;
}

/// 单个连接的完整生命周期：登记、读写循环、注销。
async fn handle_connection<H: ConnectionHandler>(
    handler: Arc<H>,
    mut ws_conn_handler: WsConnectionHandler,
    mut ws_receiver: WsReceiver,
    outbound_buffer: usize,
) {
    let (tx_to_client, mut rx_from_session) = mpsc::channel::<WsMessage>(outbound_buffer);
    let client_session = handler.on_open(ws_conn_handler.peer_addr(), tx_to_client).await;
    let client_id = client_session.client_id;
    info!(
        "[WsService] New client connected: SessionID={}, Addr={}",
        client_id, client_session.addr
    );

    let session_for_sender = Arc::clone(&client_session);
    let mut sender_close_signal = client_session.close_signal();
    let sender_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = wait_for_close(&mut sender_close_signal) => {
                    debug!("[SenderTask {}] Close signal received, sender task ending.", client_id);
                    break;
                }
                maybe_msg = rx_from_session.recv() => {
                    let Some(ws_msg) = maybe_msg else {
                        debug!("[SenderTask {}] Outbound channel closed, sender task ending.", client_id);
                        break;
                    };
                    if let Err(e) = ws_conn_handler.send_message(ws_msg).await {
                        warn!("[SenderTask {}] Failed to send message to client: {}. Closing connection.", client_id, e);
                        session_for_sender.request_close();
                        break;
                    }
                }
            }
        }
        if let Err(e) = ws_conn_handler.close().await {
            debug!("[SenderTask {}] Close frame not sent: {}", client_id, e);
        }
    });

    let mut close_signal = client_session.close_signal();
    let mut transport_error = None;
    loop {
        tokio::select! {
            biased;
            _ = wait_for_close(&mut close_signal) => {
                info!("[WsService] SessionID {}: Close requested, terminating connection handling.", client_id);
                break;
            }
            received = receive_message(&mut ws_receiver) => match received {
                Some(Ok(ws_msg)) => handler.on_message(&client_session, ws_msg).await,
                Some(Err(ws_err)) if !ws_err.is_fatal() => {
                    warn!("[WsService] SessionID {}: Discarding frame: {}", client_id, ws_err);
                }
                Some(Err(ws_err)) => {
                    transport_error = Some(ws_err);
                    break;
                }
                None => {
                    info!("[WsService] SessionID {}: Client connection closed by peer.", client_id);
                    break;
                }
            }
        }
    }

    client_session.request_close();
    if let Err(e) = sender_task.await {
        error!("[WsService] SessionID {}: Sender task panicked: {:?}", client_id, e);
    }

    match transport_error {
        Some(ws_err) => handler.on_error(&client_session, ws_err).await,
        None => handler.on_close(&client_session).await,
    }
    debug!("[WsService] SessionID {}: Connection cleanup finished.", client_id);
}
