//! 心跳监视器模块。
//!
//! 按配置的周期向每个连接发送服务端 Ping（JSON `server_ping` 文本帧加一个协议 Ping 帧），
//! 并统计未应答次数。连续未应答达到上限的连接会被关闭并从注册表中移除，
//! 效果与客户端主动断开相同。

use std::sync::Arc;
use std::time::Duration;

use common_models::ws_payloads::ServerPingPayload;
use log::{debug, error, info, warn};
use rust_websocket_utils::message::WsMessage;
use tokio::time::sleep;

use crate::ws_server::client_session::Delivery;
use crate::ws_server::connection_manager::ConnectionManager;

/// 一轮 Ping 的结果。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PingRound {
    /// 本轮发出 Ping 的连接数。
    pub pinged: usize,
    /// 本轮被移除的连接数（超时或写入失败）。
    pub evicted: usize,
}

pub struct HeartbeatMonitor {
    connection_manager: Arc<ConnectionManager>,
    ping_interval: Duration,
    max_missed_pongs: u32,
}

impl HeartbeatMonitor {
    /// `max_missed_pongs` 为 0 时按 1 处理：连接至少要收到一次 Ping 才会因未应答被移除。
    pub fn new(connection_manager: Arc<ConnectionManager>, ping_interval: Duration, max_missed_pongs: u32) -> Self {
        if max_missed_pongs == 0 {
            warn!("[心跳监视器] 未应答上限为 0，已按 1 处理。");
        }
        let max_missed_pongs = max_missed_pongs.max(1);
        info!(
            "[心跳监视器] 创建 HeartbeatMonitor。Ping 周期: {:?}，最多允许连续 {} 次未应答",
            ping_interval, max_missed_pongs
        );
        Self {
            connection_manager,
            ping_interval,
            max_missed_pongs,
        }
    }

    /// 主运行循环，通常通过 `tokio::spawn` 在后台运行直到进程结束。
    pub async fn run(self) {
        info!("[心跳监视器] 后台运行循环已启动，周期 {:?}。", self.ping_interval);
        loop {
            sleep(self.ping_interval).await;
            let round = self.send_server_ping().await;
            debug!(
                "[心跳监视器] 本轮完成: 发出 {} 个 Ping，移除 {} 个连接。",
                round.pinged, round.evicted
            );
        }
    }

    /// 对当前所有连接执行一轮健康检查。
    pub async fn send_server_ping(&self) -> PingRound {
        let mut round = PingRound::default();
        let clients_snapshot = self.connection_manager.get_all_client_sessions();
        if clients_snapshot.is_empty() {
            debug!("[心跳监视器] 当前没有活动连接，跳过本轮 Ping。");
            return round;
        }

        let ping_frame = match WsMessage::json(&ServerPingPayload::now()) {
            Ok(frame) => frame,
            Err(e) => {
                error!("[心跳监视器] 构造 server_ping 消息失败: {}", e);
                return round;
            }
        };

        for client_session in &clients_snapshot {
            let client_id = client_session.client_id;
            let missed = client_session.missed_pongs();

            if missed >= self.max_missed_pongs {
                warn!(
                    "[心跳监视器] 客户端 {} (addr: {}) 连续 {} 次未应答 Ping，断开连接。最后一次 Pong: {}",
                    client_id,
                    client_session.addr,
                    missed,
                    client_session.last_pong.read().await.to_rfc3339()
                );
                if self.connection_manager.remove_client(&client_id).await.is_some() {
                    round.evicted += 1;
                }
                continue;
            }

            client_session.register_ping();
            let text_delivery = client_session.deliver(ping_frame.clone());
            let control_delivery = client_session.deliver(WsMessage::Ping(Vec::new()));

            if text_delivery == Delivery::Closed || control_delivery == Delivery::Closed {
                warn!("[心跳监视器] 向客户端 {} 发送 Ping 失败，连接将被移除。", client_id);
                if self.connection_manager.remove_client(&client_id).await.is_some() {
                    round.evicted += 1;
                }
                continue;
            }
            round.pinged += 1;
        }

        info!(
            "[心跳监视器] 已向 {} 个连接发送服务端 Ping，移除 {} 个连接。",
            round.pinged, round.evicted
        );
        round
    }
}
