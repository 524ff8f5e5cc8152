//! 管理 HTTP 接口。
//!
//! 独立于 WebSocket 端口运行，提供：
//! - `GET /health`、`GET /wss/health`：连接数、房间数、Redis 状态；
//! - `GET /rooms`：房间 ID 到成员数量；
//! - `GET /connections`：每个连接的状态、房间和心跳情况；
//! - `POST /wss-publish`：请求体为一条通知或会话信封，直接在本地路由。

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use common_models::notification::Notification;
use log::{info, warn};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::config::AdminConfig;
use crate::ws_server::client_session::ConnectionInfo;
use crate::ws_server::notification_hub::{DispatchOutcome, DispatchSource, Feed, NotificationHub};

pub fn create_router(hub: Arc<NotificationHub>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/wss/health", get(health_check))
        .route("/rooms", get(get_rooms))
        .route("/connections", get(get_connections))
        .route("/wss-publish", post(publish))
        .layer(CorsLayer::permissive())
        .with_state(hub)
}

/// 绑定配置中的地址并运行管理接口。
pub async fn serve(config: &AdminConfig, hub: Arc<NotificationHub>) -> Result<()> {
    let listen_addr = config.listen_addr().context("Admin listen address is invalid")?;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind admin listener on {}", listen_addr))?;
    info!("[Admin] 管理接口正在监听 {}", listen_addr);
    axum::serve(listener, create_router(hub))
        .await
        .context("Admin server stopped")
}

async fn health_check(State(hub): State<Arc<NotificationHub>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "clients": hub.get_client_count(),
        "rooms": hub.get_rooms().len(),
        "redisEnabled": hub.is_redis_enabled(),
        "timestamp": common_models::iso_timestamp_now(),
    }))
}

async fn get_rooms(State(hub): State<Arc<NotificationHub>>) -> Json<HashMap<String, usize>> {
    Json(hub.get_rooms())
}

async fn get_connections(State(hub): State<Arc<NotificationHub>>) -> Json<Vec<ConnectionInfo>> {
    Json(hub.get_connections().await)
}

async fn publish(State(hub): State<Arc<NotificationHub>>, body: String) -> impl IntoResponse {
    let notification = match Notification::parse(&body) {
        Ok(notification) => notification,
        Err(e) => {
            warn!("[Admin] /wss-publish 收到无效的请求体: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": "Invalid JSON" })),
            );
        }
    };

    let response = match hub.dispatch(notification, Feed::Notifications, DispatchSource::Admin) {
        DispatchOutcome::Broadcast { delivered } => json!({
            "success": true,
            "route": "broadcast",
            "delivered": delivered,
        }),
        DispatchOutcome::SessionRoom { session_id, delivered } => json!({
            "success": true,
            "route": "session",
            "sessionId": session_id,
            "delivered": delivered,
        }),
        DispatchOutcome::Discarded => json!({
            "success": true,
            "route": "discarded",
        }),
    };
    (StatusCode::OK, Json(response))
}
