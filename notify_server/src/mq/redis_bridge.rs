//! Redis 通知频道桥接。
//!
//! 发布端共享一个多路复用连接；订阅端持有独立的 pub/sub 连接，同时订阅通知频道和会话频道，
//! 订阅断开后按配置的间隔重连。连接检查与发布都有超时，Redis 无响应时不会卡住调用方。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, error, info, warn};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::time::{sleep, timeout};

use crate::config::RedisConfig;
use crate::error::AppError;
use crate::ws_server::notification_hub::{DispatchSource, Feed, NotificationHub};

pub struct RedisBridge {
    client: redis::Client,
    publisher: MultiplexedConnection,
    notification_channel: String,
    session_channel: String,
    reconnect_delay: Duration,
    command_timeout: Duration,
}

/// 在 `limit` 内等待一个 Redis 操作，超时返回 `AppError::RedisTimeout`。
async fn within<T>(limit: Duration, operation: impl Future<Output = Result<T, AppError>>) -> Result<T, AppError> {
    match timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(AppError::RedisTimeout(limit)),
    }
}

impl RedisBridge {
    /// 建立发布连接并用 PING 检查可用性。失败或超时时调用方应以 Redis 未启用的方式继续运行。
    pub async fn connect(config: &RedisConfig) -> Result<Self, AppError> {
        let client = redis::Client::open(config.url())?;
        let command_timeout = config.command_timeout();
        let (publisher, pong) = within(command_timeout, async {
            let mut publisher = client.get_multiplexed_async_connection().await?;
            let pong = redis::cmd("PING").query_async::<_, String>(&mut publisher).await?;
            Ok::<_, AppError>((publisher, pong))
        })
        .await?;
        info!(
            "[RedisBridge] 已连接到 {} (PING -> {})，通知频道: '{}'，会话频道: '{}'",
            config.url(),
            pong,
            config.channel,
            config.session_channel
        );
        Ok(Self {
            client,
            publisher,
            notification_channel: config.channel.clone(),
            session_channel: config.session_channel.clone(),
            reconnect_delay: config.reconnect_delay(),
            command_timeout,
        })
    }

    pub fn channel(&self, feed: Feed) -> &str {
        match feed {
            Feed::Notifications => &self.notification_channel,
            Feed::Session => &self.session_channel,
        }
    }

    fn feed_for(&self, channel: &str) -> Option<Feed> {
        if channel == self.session_channel {
            Some(Feed::Session)
        } else if channel == self.notification_channel {
            Some(Feed::Notifications)
        } else {
            None
        }
    }

    /// 把一条 JSON 文本发布到 `feed` 对应的频道，返回收到消息的订阅者数量。
    pub async fn publish(&self, feed: Feed, payload: &str) -> Result<usize, AppError> {
        let mut connection = self.publisher.clone();
        let channel = self.channel(feed);
        within(self.command_timeout, async move {
            let receivers: usize = connection.publish(channel, payload).await?;
            Ok::<_, AppError>(receivers)
        })
        .await
    }

    /// 订阅两个频道并把收到的消息交给 `hub` 路由。订阅断开后等待 `reconnect_delay` 再重连，永不返回。
    pub async fn run_subscriber(self: Arc<Self>, hub: Arc<NotificationHub>) {
        loop {
            match self.subscribe_once(&hub).await {
                Ok(()) => warn!("[RedisBridge] 订阅流已结束。"),
                Err(e) => error!("[RedisBridge] 订阅失败: {}", e),
            }
            info!("[RedisBridge] {:?} 后重新订阅。", self.reconnect_delay);
            sleep(self.reconnect_delay).await;
        }
    }

    async fn subscribe_once(&self, hub: &NotificationHub) -> Result<(), AppError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(self.notification_channel.as_str()).await?;
        pubsub.subscribe(self.session_channel.as_str()).await?;
        info!(
            "[RedisBridge] 已订阅通知频道 '{}' 与会话频道 '{}'",
            self.notification_channel, self.session_channel
        );

        let mut messages = pubsub.into_on_message();
        while let Some(message) = messages.next().await {
            let Some(feed) = self.feed_for(message.get_channel_name()) else {
                debug!("[RedisBridge] 忽略来自频道 '{}' 的消息", message.get_channel_name());
                continue;
            };
            let payload: String = match message.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("[RedisBridge] 无法读取频道消息内容: {}", e);
                    continue;
                }
            };
            debug!("[RedisBridge] 收到 {:?} 消息: {}", feed, payload);
            match hub.dispatch_raw(&payload, feed, DispatchSource::Redis) {
                Ok(outcome) => debug!("[RedisBridge] 消息已路由: {:?}", outcome),
                Err(e) => warn!("[RedisBridge] 无法解析的消息已丢弃: {}。原始内容: '{}'", e, payload),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_within_times_out_hanging_operation() {
        let limit = Duration::from_millis(50);
        let result = within(limit, std::future::pending::<Result<usize, AppError>>()).await;
        assert!(matches!(result, Err(AppError::RedisTimeout(d)) if d == limit));

        let quick = within(limit, async { Ok::<_, AppError>(3usize) }).await;
        assert_eq!(quick.expect("及时完成的操作不应超时"), 3);
    }

    #[tokio::test]
    async fn test_connect_to_silent_server_times_out() {
        // 接受连接但从不应答的服务端
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("无法绑定到随机端口");
        let addr = listener.local_addr().expect("无法获取本地监听地址");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let config = RedisConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            command_timeout_ms: 200,
            ..RedisConfig::default()
        };
        let started = std::time::Instant::now();
        let result = RedisBridge::connect(&config).await;
        assert!(matches!(result, Err(AppError::RedisTimeout(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
