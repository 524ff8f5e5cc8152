// rust_websocket_utils/tests/server_transport_integration_test.rs

use futures_util::{SinkExt, StreamExt};
use log::{LevelFilter, info};
use rust_websocket_utils::message::WsMessage;
use rust_websocket_utils::server::transport::{ConnectionHandler, ServerTransport, WsReceiver, receive_message};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as TungsteniteMessage};
use url::Url;

fn init_test_logger() {
    let _ = env_logger::builder().filter_level(LevelFilter::Info).is_test(true).try_init();
}

/// 记录服务端从每个连接收到的帧，并对文本帧回显 `{"echo": <原文>}`。
async fn recording_handler(
    mut handler: ConnectionHandler,
    mut receiver: WsReceiver,
    frames_tx: mpsc::UnboundedSender<(SocketAddr, Option<WsMessage>)>,
) {
    let peer_addr = handler.peer_addr();
    info!("[Test Server] 新的 WebSocket 连接来自 {}", peer_addr);

    loop {
        match receive_message(&mut receiver).await {
            Some(Ok(frame)) => {
                let _ = frames_tx.send((peer_addr, Some(frame.clone())));
                if let WsMessage::Text(text) = frame {
                    let reply = serde_json::json!({ "echo": text });
                    let reply_frame = WsMessage::json(&reply).expect("构造回显帧失败");
                    if handler.send_message(reply_frame).await.is_err() {
                        break;
                    }
                }
            }
            Some(Err(e)) if !e.is_fatal() => continue,
            Some(Err(_)) | None => break,
        }
    }
    // None 表示连接已结束
    let _ = frames_tx.send((peer_addr, None));
}

async fn start_recording_server() -> (SocketAddr, mpsc::UnboundedReceiver<(SocketAddr, Option<WsMessage>)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("无法绑定到随机端口");
    let addr = listener.local_addr().expect("无法获取本地监听地址");
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let on_connect = move |handler: ConnectionHandler, receiver: WsReceiver| {
            recording_handler(handler, receiver, frames_tx.clone())
        };
        let _ = ServerTransport::serve(listener, on_connect).await;
    });
    (addr, frames_rx)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_accepts_connection_and_echoes_text() {
    init_test_logger();
    let (addr, mut frames_rx) = start_recording_server().await;

    let url = Url::parse(&format!("ws://{}", addr)).expect("无法构建 URL");
    let (mut ws_stream, _) = connect_async(url.as_str()).await.expect("客户端连接失败");

    ws_stream
        .send(TungsteniteMessage::Text(r#"{"type":"join","sessionId":"abc"}"#.to_string()))
        .await
        .expect("客户端发送失败");

    let (_, frame) = timeout(Duration::from_secs(5), frames_rx.recv())
        .await
        .expect("等待服务端收到帧超时")
        .expect("记录通道已关闭");
    assert_eq!(frame.and_then(|f| f.message_type()).as_deref(), Some("join"));

    let reply = timeout(Duration::from_secs(5), ws_stream.next())
        .await
        .expect("等待回显超时")
        .expect("连接意外结束")
        .expect("读取回显失败");
    match reply {
        TungsteniteMessage::Text(text) => assert!(text.contains("echo"), "回显内容不符: {}", text),
        other => panic!("预期文本回显，实际为 {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_surfaces_pong_and_reports_close() {
    init_test_logger();
    let (addr, mut frames_rx) = start_recording_server().await;

    let (mut ws_stream, _) = connect_async(format!("ws://{}", addr)).await.expect("客户端连接失败");

    ws_stream.send(TungsteniteMessage::Pong(vec![1, 2])).await.expect("发送 Pong 失败");
    let (_, frame) = timeout(Duration::from_secs(5), frames_rx.recv())
        .await
        .expect("等待 Pong 超时")
        .expect("记录通道已关闭");
    assert_eq!(frame, Some(WsMessage::Pong(vec![1, 2])));

    ws_stream.close(None).await.expect("关闭连接失败");
    let (_, frame) = timeout(Duration::from_secs(5), frames_rx.recv())
        .await
        .expect("等待关闭事件超时")
        .expect("记录通道已关闭");
    assert_eq!(frame, None, "关闭后接收端应返回 None");
}
