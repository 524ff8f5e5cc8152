// notify_server/tests/notification_flow_test.rs

use log::LevelFilter;
use notify_server::config::WebSocketConfig;
use notify_server::ws_server::connection_manager::ConnectionManager;
use notify_server::ws_server::handler::NotificationConnectionHandler;
use notify_server::ws_server::notification_hub::NotificationHub;
use notify_server::ws_server::service::WsService;
use rust_websocket_utils::client::transport::{connect_client, receive_message, ClientConnection};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

fn init_test_logger() {
    let _ = env_logger::builder().filter_level(LevelFilter::Info).is_test(true).try_init();
}

struct TestServer {
    url: String,
    manager: Arc<ConnectionManager>,
    hub: Arc<NotificationHub>,
}

async fn start_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("无法绑定到随机端口");
    let addr = listener.local_addr().expect("无法获取本地监听地址");

    let manager = Arc::new(ConnectionManager::new());
    let hub = Arc::new(NotificationHub::new(Arc::clone(&manager), None));
    let handler = Arc::new(NotificationConnectionHandler::new(Arc::clone(&manager)));
    let service = WsService::new(WebSocketConfig::default(), handler);
    tokio::spawn(async move {
        let _ = service.serve(listener).await;
    });

    TestServer {
        url: format!("ws://{}", addr),
        manager,
        hub,
    }
}

async fn next_json(client: &mut ClientConnection) -> Option<Value> {
    let frame = timeout(Duration::from_secs(5), receive_message(&mut client.ws_receiver))
        .await
        .ok()??
        .ok()?;
    frame.deserialize_payload().ok()
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    condition()
}

async fn join(client: &mut ClientConnection, session_id: &str) {
    client
        .send_json(&json!({"type": "join", "sessionId": session_id}))
        .await
        .expect("发送 join 失败");
    let reply = next_json(client).await.expect("应收到 session_joined 回复");
    assert_eq!(reply["type"], "session_joined");
    assert_eq!(reply["sessionId"], session_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_room_message_reaches_only_joined_clients() {
    init_test_logger();
    let server = start_server().await;

    let mut in_room = connect_client(&server.url).await.expect("客户端 A 连接失败");
    let mut other_room = connect_client(&server.url).await.expect("客户端 B 连接失败");
    join(&mut in_room, "abc").await;
    join(&mut other_room, "xyz").await;
    assert_eq!(server.hub.get_client_count(), 2);

    assert!(server
        .hub
        .send_to_session_room("abc", &json!({"type": "update_partial_applications"})));
    assert!(!server.hub.send_to_session_room("nobody", &json!({"type": "x"})));

    let received = next_json(&mut in_room).await.expect("abc 房间的客户端应收到消息");
    assert_eq!(received["type"], "update_partial_applications");
    assert!(received["timestamp"].is_string());

    // 再广播一条：xyz 房间的客户端收到的第一条消息必须是广播，而不是 abc 房间的消息
    server.hub.broadcast_notification(&json!({"type": "notification", "message": "all"}));
    let first_for_other = next_json(&mut other_room).await.expect("广播应到达所有客户端");
    assert_eq!(first_for_other["message"], "all");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ping_pong_and_disconnect_updates_registry() {
    init_test_logger();
    let server = start_server().await;

    let mut client = connect_client(&server.url).await.expect("客户端连接失败");
    client.send_json(&json!({"type": "ping"})).await.expect("发送 ping 失败");
    let pong = next_json(&mut client).await.expect("应收到 pong");
    assert_eq!(pong["type"], "pong");

    join(&mut client, "abc").await;
    assert_eq!(server.hub.get_rooms().get("abc"), Some(&1));

    client.close().await.expect("关闭客户端失败");
    let manager = Arc::clone(&server.manager);
    assert!(wait_until(|| manager.client_count() == 0).await, "断开后连接应从注册表移除");
    assert!(server.hub.get_rooms().is_empty(), "断开后房间应被删除");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_side_removal_closes_socket() {
    init_test_logger();
    let server = start_server().await;

    let mut client = connect_client(&server.url).await.expect("客户端连接失败");
    let manager = Arc::clone(&server.manager);
    assert!(wait_until(|| manager.client_count() == 1).await);

    let session = server.manager.get_all_client_sessions().remove(0);
    server.manager.remove_client(&session.client_id).await;

    let closed = timeout(Duration::from_secs(5), receive_message(&mut client.ws_receiver))
        .await
        .expect("等待连接关闭超时");
    assert!(closed.is_none(), "被服务端移除的连接应收到关闭帧");
}
