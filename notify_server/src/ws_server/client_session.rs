use chrono::{DateTime, Utc};
use common_models::enums::ConnectionState;
use log::{debug, warn};
use rust_websocket_utils::message::WsMessage;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, RwLock};
use uuid::Uuid;

/// 向单个连接投递一帧的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// 已放入该连接的出站队列。
    Queued,
    /// 出站队列已满，此帧被丢弃，连接保持。
    Dropped,
    /// 连接已关闭或正在关闭。
    Closed,
}

/// 管理接口 `GET /connections` 返回的单个连接快照。
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub client_id: Uuid,
    pub addr: SocketAddr,
    pub state: ConnectionState,
    pub room: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub last_pong: DateTime<Utc>,
    pub missed_pongs: u32,
}

/// 代表一个已连接到服务器的 WebSocket 客户端。
///
/// 每个成功建立的 WebSocket 连接都会在服务端对应一个 `ClientSession` 实例，
/// 从 `on_open` 一直存活到 `on_close` / `on_error`。
/// 可变状态（所在房间、最后一次 Pong 时间）通过 `Arc<RwLock<T>>` 包装，
/// 未应答的 Ping 计数使用原子整数。
#[derive(Debug)]
pub struct ClientSession {
    /// 服务端生成的连接 ID (UUID v4)。
    pub client_id: Uuid,

    /// 客户端的网络源地址。
    pub addr: SocketAddr,

    /// 会话创建时间 (UTC)。
    pub creation_time: DateTime<Utc>,

    /// 出站队列的发送端。该连接的写任务是唯一的消费者，
    /// 因此对同一连接的写入按调用顺序送达。
    pub sender: mpsc::Sender<WsMessage>,

    /// 当前所在的会话房间。加入房间之前为 `None`。
    /// 只能通过 `ConnectionManager::join_room` 修改，以保持房间索引一致。
    pub room: Arc<RwLock<Option<String>>>,

    /// 最后一次收到 Pong（JSON `pong` 消息或协议 Pong 帧）的时间。
    pub last_pong: Arc<RwLock<DateTime<Utc>>>,

    /// 连续未应答的服务端 Ping 次数。
    pub missed_pongs: AtomicU32,

    close_tx: watch::Sender<bool>,
}

impl ClientSession {
    pub fn new(addr: SocketAddr, sender: mpsc::Sender<WsMessage>) -> Self {
        let now = Utc::now();
        let (close_tx, _) = watch::channel(false);
        Self {
            client_id: Uuid::new_v4(),
            addr,
            creation_time: now,
            sender,
            room: Arc::new(RwLock::new(None)),
            last_pong: Arc::new(RwLock::new(now)),
            missed_pongs: AtomicU32::new(0),
            close_tx,
        }
    }

    /// 请求关闭连接。读循环和写任务都会观察到此信号并退出。
    ///
    /// 返回值表示这是否是第一次请求关闭。
    pub fn request_close(&self) -> bool {
        let already_closing = self.close_tx.send_replace(true);
        if !already_closing {
            debug!("[ClientSession {}] 已请求关闭连接。", self.client_id);
        }
        !already_closing
    }

    pub fn is_closing(&self) -> bool {
        *self.close_tx.borrow()
    }

    /// 订阅关闭信号。
    pub fn close_signal(&self) -> watch::Receiver<bool> {
        self.close_tx.subscribe()
    }

    /// 当前所在的会话房间。
    pub async fn current_room(&self) -> Option<String> {
        self.room.read().await.clone()
    }

    /// 连接的生命周期状态。已从注册表移除的会话由调用方视为 `Closed`。
    pub async fn state(&self) -> ConnectionState {
        if self.is_closing() {
            ConnectionState::Closing
        } else if self.room.read().await.is_some() {
            ConnectionState::JoinedRoom
        } else {
            ConnectionState::Open
        }
    }

    pub async fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            client_id: self.client_id,
            addr: self.addr,
            state: self.state().await,
            room: self.current_room().await,
            connected_at: self.creation_time,
            last_pong: *self.last_pong.read().await,
            missed_pongs: self.missed_pongs(),
        }
    }

    /// 把一帧放入出站队列，不等待。
    ///
    /// 队列已满时丢弃此帧并记录警告；出站通道已关闭时请求关闭连接。
    pub fn deliver(&self, message: WsMessage) -> Delivery {
        if self.is_closing() {
            debug!("[ClientSession {}] 连接正在关闭，丢弃出站帧。", self.client_id);
            return Delivery::Closed;
        }
        match self.sender.try_send(message) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "[ClientSession {}] 出站队列已满 (addr: {})，本条消息被丢弃。",
                    self.client_id, self.addr
                );
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                warn!("[ClientSession {}] 出站通道已关闭，连接将被关闭。", self.client_id);
                self.request_close();
                Delivery::Closed
            }
        }
    }

    /// 记录一次服务端 Ping，返回当前未应答次数。
    pub fn register_ping(&self) -> u32 {
        self.missed_pongs.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn missed_pongs(&self) -> u32 {
        self.missed_pongs.load(Ordering::SeqCst)
    }

    /// 收到 Pong：清零未应答计数并刷新时间戳。
    pub async fn record_pong(&self) {
        self.missed_pongs.store(0, Ordering::SeqCst);
        *self.last_pong.write().await = Utc::now();
    }
}
