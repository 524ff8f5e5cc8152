//! 广播 API。
//!
//! `NotificationHub` 是其它组件（Redis 订阅任务、文件投递目录、管理接口、业务代码）
//! 向浏览器连接推送通知的唯一入口。单个连接的写入失败只记录日志，从不向调用方抛出。

use std::collections::HashMap;
use std::sync::Arc;

use common_models::notification::{EntityId, Notification, NotificationTarget};
use log::{debug, error, info, warn};
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::mq::redis_bridge::RedisBridge;
use crate::ws_server::client_session::ConnectionInfo;
use crate::ws_server::connection_manager::ConnectionManager;
use crate::ws_server::room_router::RoomRouter;

/// 通知的来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchSource {
    Redis,
    Spool,
    Admin,
    Local,
}

/// 输入流。每个 Redis 频道和每种投递文件前缀各对应一个。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// 通知频道：按 `target` 路由。
    Notifications,
    /// 会话频道：只发送给 `sessionId` 对应的房间，从不广播。
    Session,
}

/// 一条通知的路由结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 发送给了全部连接，`delivered` 为成功入队的连接数。
    Broadcast { delivered: usize },
    /// 发送给了会话房间；房间不存在或为空时 `delivered` 为 `false`。
    SessionRoom { session_id: String, delivered: bool },
    /// 需要 `sessionId` 却没有，已丢弃。
    Discarded,
}

pub struct NotificationHub {
    connection_manager: Arc<ConnectionManager>,
    router: RoomRouter,
    redis: Option<Arc<RedisBridge>>,
}

impl NotificationHub {
    /// `redis` 为 `None` 表示 Redis 未配置或启动时连接检查失败。
    pub fn new(connection_manager: Arc<ConnectionManager>, redis: Option<Arc<RedisBridge>>) -> Self {
        info!(
            "[NotificationHub] 广播服务已创建 (Redis 启用: {})",
            redis.is_some()
        );
        Self {
            router: RoomRouter::new(Arc::clone(&connection_manager)),
            connection_manager,
            redis,
        }
    }

    /// 发送给调用时刻注册的全部连接，返回成功入队的连接数。
    pub fn broadcast_notification(&self, message: &Value) -> usize {
        self.router.broadcast(message)
    }

    /// 发送给会话房间。房间不存在或为空时返回 `false`。
    pub fn send_to_session_room(&self, session_id: &str, message: &Value) -> bool {
        self.router.send_to_session_room(session_id, message)
    }

    /// 发布到 Redis 通知频道。Redis 未启用、发布失败或超时时返回 `false`，不会报错。
    pub async fn send_redis_notification(&self, data: &Value) -> bool {
        match serde_json::to_string(data) {
            Ok(payload) => self.publish(Feed::Notifications, &payload).await,
            Err(e) => {
                error!("[NotificationHub] 序列化 Redis 通知失败: {}", e);
                false
            }
        }
    }

    /// 把 `data` 包进会话信封发送给 `session_id` 房间。
    ///
    /// Redis 启用时发布到会话频道，由订阅任务拆开信封后投递；否则直接投递给本地房间。
    pub async fn send_session_message(&self, session_id: &str, data: &Value) -> bool {
        let envelope = Notification::session_envelope(session_id, data.clone());
        if self.redis.is_none() {
            self.dispatch(envelope, Feed::Session, DispatchSource::Local);
            return true;
        }
        match envelope.to_json() {
            Ok(payload) => self.publish(Feed::Session, &payload).await,
            Err(e) => {
                error!("[NotificationHub] 序列化会话消息失败: {}", e);
                false
            }
        }
    }

    /// 发送实体事件（`target = "entity"`）。
    ///
    /// Redis 启用时通过频道发布，由订阅任务回送给所有连接；否则直接发送给本地连接。
    pub async fn send_entity_event(
        &self,
        entity_type: &str,
        entity_id: impl Into<EntityId>,
        event_type: &str,
        data: Option<Map<String, Value>>,
    ) -> bool {
        let notification = Notification::entity_event(entity_type, entity_id, event_type, data);
        if self.redis.is_none() {
            self.dispatch(notification, Feed::Notifications, DispatchSource::Local);
            return true;
        }
        match notification.to_json() {
            Ok(payload) => self.publish(Feed::Notifications, &payload).await,
            Err(e) => {
                error!("[NotificationHub] 序列化实体事件失败: {}", e);
                false
            }
        }
    }

    async fn publish(&self, feed: Feed, payload: &str) -> bool {
        let Some(redis) = &self.redis else {
            debug!("[NotificationHub] Redis 未启用，消息未发布。");
            return false;
        };
        match redis.publish(feed, payload).await {
            Ok(receivers) => {
                debug!(
                    "[NotificationHub] 消息已发布到频道 '{}'，订阅者数量: {}",
                    redis.channel(feed),
                    receivers
                );
                true
            }
            Err(e) => {
                error!("[NotificationHub] 发布到频道 '{}' 失败: {}", redis.channel(feed), e);
                false
            }
        }
    }

    /// 路由一条通知。
    ///
    /// - `type = "session_targeted"` 的会话信封在任何输入流上都只发送给 `sessionId` 房间，
    ///   发送内容是 `data`（缺失时为整个信封）；
    /// - 会话频道上的其它消息整体发送给 `sessionId` 房间；
    /// - 通知频道上 `target = "session"` 的通知发送给 `sessionId` 房间，
    ///   其它（`all`、`entity`、缺失或未知的 `target`）发送给所有连接。
    ///
    /// 需要 `sessionId` 却没有时记录日志并丢弃。
    pub fn dispatch(&self, mut notification: Notification, feed: Feed, source: DispatchSource) -> DispatchOutcome {
        if notification.is_session_envelope() {
            let Some(session_id) = notification.session_id() else {
                warn!("[NotificationHub] 缺少 sessionId 的会话信封已丢弃 (来源: {:?})", source);
                return DispatchOutcome::Discarded;
            };
            let payload = match notification.take_data() {
                Some(data) => data,
                None => notification.into_value(),
            };
            return self.deliver_to_room(session_id, &payload, source);
        }

        let session_id = notification.session_id();
        let routed_to_room = match feed {
            Feed::Session => true,
            Feed::Notifications => notification.target() == Some(NotificationTarget::Session),
        };
        if feed == Feed::Notifications && source == DispatchSource::Redis {
            notification = notification
                .with_field("source", "redis")
                .with_field("received_at", common_models::iso_timestamp_now());
        }
        let value = notification.into_value();

        match (routed_to_room, session_id) {
            (true, Some(session_id)) => self.deliver_to_room(session_id, &value, source),
            (true, None) => {
                warn!(
                    "[NotificationHub] 缺少 sessionId 的会话消息已丢弃 (输入流: {:?}，来源: {:?})",
                    feed, source
                );
                DispatchOutcome::Discarded
            }
            (false, _) => DispatchOutcome::Broadcast {
                delivered: self.router.broadcast(&value),
            },
        }
    }

    fn deliver_to_room(&self, session_id: String, payload: &Value, source: DispatchSource) -> DispatchOutcome {
        let delivered = self.router.send_to_session_room(&session_id, payload);
        if !delivered {
            info!(
                "[NotificationHub] 会话房间 '{}' 当前没有连接 (来源: {:?})",
                session_id, source
            );
        }
        DispatchOutcome::SessionRoom { session_id, delivered }
    }

    /// 解析 JSON 文本后路由。不是 JSON 对象时返回 `AppError::InvalidNotification`。
    pub fn dispatch_raw(&self, text: &str, feed: Feed, source: DispatchSource) -> Result<DispatchOutcome, AppError> {
        let notification = Notification::parse(text)?;
        Ok(self.dispatch(notification, feed, source))
    }

    pub fn get_client_count(&self) -> usize {
        self.connection_manager.client_count()
    }

    pub fn get_rooms(&self) -> HashMap<String, usize> {
        self.router.get_rooms()
    }

    /// 当前所有连接的快照，按连接时间排序。
    pub async fn get_connections(&self) -> Vec<ConnectionInfo> {
        let mut connections = Vec::new();
        for session in self.connection_manager.get_all_client_sessions() {
            connections.push(session.info().await);
        }
        connections.sort_by_key(|info| info.connected_at);
        connections
    }

    pub fn is_redis_enabled(&self) -> bool {
        self.redis.is_some()
    }
}
