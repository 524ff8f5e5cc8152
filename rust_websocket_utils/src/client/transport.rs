// rust_websocket_utils/src/client/transport.rs

//! 客户端 WebSocket 传输层。
//!
//! 通知服务的浏览器前端之外，集成测试与运维工具也需要以客户端身份连接服务器，
//! 本模块提供建立连接、发送 JSON 文本帧和逐帧接收的最小封装。

use crate::error::WsError;
use crate::message::WsMessage;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use log::{debug, error, info};
use serde::Serialize;
use tokio_tungstenite::{
    WebSocketStream, connect_async,
    tungstenite::{Error as TungsteniteError, protocol::Message},
};
use url::Url;

/// 可能经过 TLS 加密的客户端 WebSocket 流。
pub type ClientWsStream = WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// 一个活动的客户端 WebSocket 连接。
pub struct ClientConnection {
    pub ws_sender: SplitSink<ClientWsStream, Message>,
    /// 字段设为 `pub`，以便测试直接对接收端调用 `receive_message`。
    pub ws_receiver: SplitStream<ClientWsStream>,
}

impl ClientConnection {
    /// 发送一帧。
    pub async fn send_message(&mut self, message: WsMessage) -> Result<(), WsError> {
        debug!("客户端：准备发送帧 (type: {:?})", message.message_type());
        self.ws_sender.send(message.into_tungstenite()).await?;
        Ok(())
    }

    /// 将数据序列化为 JSON 并作为文本帧发送。
    pub async fn send_json<T: Serialize>(&mut self, payload: &T) -> Result<(), WsError> {
        self.send_message(WsMessage::json(payload)?).await
    }

    /// 发送关闭帧并关闭发送端。
    pub async fn close(&mut self) -> Result<(), WsError> {
        self.ws_sender.send(Message::Close(None)).await?;
        self.ws_sender.close().await?;
        Ok(())
    }
}

/// 连接到指定的 WebSocket 服务器，例如 `ws://127.0.0.1:8081`。
pub async fn connect_client(url_str: &str) -> Result<ClientConnection, WsError> {
    info!("客户端：开始尝试连接到 WebSocket 服务器，URL: {}", url_str);
    let parsed_url =
        Url::parse(url_str).map_err(|e| WsError::InvalidUrl(format!("无效的 WebSocket URL '{}': {}", url_str, e)))?;

    match connect_async(parsed_url.as_str()).await {
        Ok((ws_stream, response)) => {
            info!("客户端：已成功连接到 {} (HTTP 状态码: {})", url_str, response.status());
            let (ws_sender, ws_receiver) = ws_stream.split();
            Ok(ClientConnection { ws_sender, ws_receiver })
        }
        Err(e) => {
            error!("客户端：连接到 {} 失败，错误: {}", url_str, e);
            Err(WsError::WebSocketProtocolError(e))
        }
    }
}

/// 接收下一个文本帧。
///
/// Ping/Pong 控制帧由底层库自动应答，这里直接跳过；收到 Close 帧或流结束时返回 `None`。
pub async fn receive_message(ws_receiver: &mut SplitStream<ClientWsStream>) -> Option<Result<WsMessage, WsError>> {
    loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!("客户端：收到文本帧: '{}'", text);
                break Some(Ok(WsMessage::Text(text)));
            }
            Some(Ok(Message::Binary(_))) => {
                break Some(Err(WsError::Message("客户端收到了非预期的 WebSocket 二进制消息".to_string())));
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
            Some(Ok(Message::Close(close_frame))) => {
                debug!("客户端：收到 Close 控制帧: {:?}", close_frame);
                break None;
            }
            Some(Err(TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed)) | None => break None,
            Some(Err(e)) => {
                error!("客户端：从 WebSocket 流接收消息时发生底层错误: {}", e);
                break Some(Err(WsError::WebSocketProtocolError(e)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::transport::{ConnectionHandler, ServerTransport, WsReceiver, receive_message as server_receive};
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::time::{Duration, timeout};

    async fn echo_handler(mut handler: ConnectionHandler, mut receiver: WsReceiver) {
        while let Some(Ok(frame)) = server_receive(&mut receiver).await {
            if let WsMessage::Text(_) = frame {
                if handler.send_message(frame).await.is_err() {
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_client_send_json_and_receive_echo() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("绑定随机端口失败");
        let addr = listener.local_addr().expect("获取监听地址失败");
        let server = tokio::spawn(ServerTransport::serve(listener, echo_handler));

        let mut client = connect_client(&format!("ws://{}", addr)).await.expect("客户端连接失败");
        client
            .send_json(&json!({"type": "ping", "n": 1}))
            .await
            .expect("发送 JSON 失败");

        let echoed = timeout(Duration::from_secs(5), receive_message(&mut client.ws_receiver))
            .await
            .expect("等待回显超时")
            .expect("连接意外关闭")
            .expect("接收回显失败");
        assert_eq!(echoed.message_type().as_deref(), Some("ping"));

        client.close().await.expect("关闭客户端失败");
        server.abort();
    }

    #[tokio::test]
    async fn test_connect_client_rejects_invalid_url() {
        match connect_client("not a url").await {
            Err(WsError::InvalidUrl(details)) => assert!(details.contains("not a url")),
            Err(other) => panic!("预期 InvalidUrl 错误，实际为 {:?}", other),
            Ok(_) => panic!("无效 URL 不应连接成功"),
        }
    }
}
