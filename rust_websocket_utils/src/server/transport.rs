// rust_websocket_utils/src/server/transport.rs

//! 包含服务端 WebSocket 监听、接受连接和逐帧收发的逻辑。

use crate::error::WsError;
use crate::message::WsMessage;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Error as TungsteniteError;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

/// 经过 WebSocket 握手后的 TCP 流。
pub type WsStream = WebSocketStream<TcpStream>;
/// 连接的发送端。
pub type WsSender = SplitSink<WsStream, Message>;
/// 连接的接收端。
pub type WsReceiver = SplitStream<WsStream>;

/// 单个 WebSocket 连接的发送端句柄。
///
/// 接收端以 `WsReceiver` 的形式单独交给回调，这样读循环与写任务可以分别持有各自的一半。
pub struct ConnectionHandler {
    ws_sender: WsSender,
    peer_addr: SocketAddr,
}

impl ConnectionHandler {
    fn new(ws_sender: WsSender, peer_addr: SocketAddr) -> Self {
        Self { ws_sender, peer_addr }
    }

    /// 对端地址。
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// 发送一帧。`WsMessage::Close` 会发送关闭帧但不会关闭发送端，关闭请使用 `close`。
    pub async fn send_message(&mut self, message: WsMessage) -> Result<(), WsError> {
        debug!("[ServerTransport] 向 {} 发送帧 (type: {:?})", self.peer_addr, message.message_type());
        self.ws_sender.send(message.into_tungstenite()).await?;
        Ok(())
    }

    /// 发送关闭帧并关闭发送端。对已关闭的连接调用时返回错误，调用方记录日志即可。
    pub async fn close(&mut self) -> Result<(), WsError> {
        self.ws_sender.send(Message::Close(None)).await?;
        self.ws_sender.close().await?;
        Ok(())
    }
}

/// `ServerTransport` 负责 WebSocket 服务端的监听和连接接受。
pub struct ServerTransport;

impl ServerTransport {
    /// 在一个已绑定的监听器上接受连接。
    ///
    /// 每个握手成功的连接都会在独立的 Tokio 任务中调用一次 `on_connect`，
    /// 参数为发送端句柄与接收端。此函数一直运行到进程结束，只在获取本地地址失败时返回。
    pub async fn serve<F, Fut>(listener: TcpListener, on_connect: F) -> Result<(), WsError>
    where
        F: Fn(ConnectionHandler, WsReceiver) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        info!("[ServerTransport] WebSocket 服务器正在监听地址: {}", local_addr);

        loop {
            match listener.accept().await {
                Ok((tcp_stream, peer_addr)) => {
                    debug!("[ServerTransport] 从 {} 接受了新的 TCP 连接", peer_addr);
                    let on_connect_callback = on_connect.clone();

                    tokio::spawn(async move {
                        match accept_async(tcp_stream).await {
                            Ok(ws_stream) => {
                                info!("[ServerTransport] 与 {} 的 WebSocket 握手成功", peer_addr);
                                let (ws_sender, ws_receiver) = ws_stream.split();
                                on_connect_callback(ConnectionHandler::new(ws_sender, peer_addr), ws_receiver).await;
                            }
                            Err(e) => {
                                error!("[ServerTransport] 与 {} 的 WebSocket 握手失败: {}", peer_addr, e);
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("[ServerTransport] 接受 TCP 连接失败: {}。服务器将继续运行。", e);
                }
            }
        }
    }
}

/// 从接收端读取下一帧。
///
/// # Returns
/// - `Some(Ok(WsMessage::Text | Ping | Pong))`：收到一帧。
/// - `Some(Err(..))`：二进制帧（非致命，`WsError::Message`）或底层协议错误（致命）。
/// - `None`：收到 Close 帧或连接已结束。
pub async fn receive_message(ws_receiver: &mut WsReceiver) -> Option<Result<WsMessage, WsError>> {
    loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => break Some(Ok(WsMessage::Text(text))),
            Some(Ok(Message::Ping(data))) => break Some(Ok(WsMessage::Ping(data))),
            Some(Ok(Message::Pong(data))) => break Some(Ok(WsMessage::Pong(data))),
            Some(Ok(Message::Binary(bin))) => {
                warn!("[ServerTransport] 收到非预期的二进制帧，长度 {} 字节", bin.len());
                break Some(Err(WsError::Message("收到了非预期的 WebSocket 二进制消息".to_string())));
            }
            Some(Ok(Message::Close(close_frame))) => {
                debug!("[ServerTransport] 收到 Close 帧: {:?}", close_frame);
                break None;
            }
            Some(Ok(Message::Frame(_))) => continue,
            Some(Err(TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed)) => break None,
            Some(Err(e)) => break Some(Err(WsError::WebSocketProtocolError(e))),
            None => break None,
        }
    }
}
