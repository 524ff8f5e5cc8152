//! WebSocket 连接注册表。
//!
//! 记录所有存活的连接以及每个会话房间的成员。房间不单独创建或销毁：
//! 第一个成员加入时出现，最后一个成员离开时被删除。

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use common_models::ws_payloads::JoinAction;
use dashmap::DashMap;
use log::{debug, info};
use rust_websocket_utils::message::WsMessage;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ws_server::client_session::ClientSession;

/// 管理所有活动的 WebSocket 客户端会话及会话房间。
///
/// 由 `main` 显式创建，并通过 `Arc` 共享给传输回调、心跳监视器、Redis 订阅任务和管理接口。
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    /// 所有活动的会话。Key: 连接 ID。
    clients: Arc<DashMap<Uuid, Arc<ClientSession>>>,
    /// 会话房间索引。Key: 原始 sessionId，Value: 成员连接 ID。不保留空房间。
    rooms: Arc<DashMap<String, HashSet<Uuid>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            rooms: Arc::new(DashMap::new()),
        }
    }

    /// 登记一个新连接，初始不属于任何房间。
    pub fn add_client(&self, addr: SocketAddr, sender: mpsc::Sender<WsMessage>) -> Arc<ClientSession> {
        let client_session = Arc::new(ClientSession::new(addr, sender));
        self.clients.insert(client_session.client_id, Arc::clone(&client_session));

        info!(
            "[ConnectionManager] 新客户端连接: id={}, addr={}",
            client_session.client_id, client_session.addr
        );
        debug!("[ConnectionManager] 当前活动客户端总数: {}", self.clients.len());
        client_session
    }

    pub fn get_client(&self, client_id: &Uuid) -> Option<Arc<ClientSession>> {
        self.clients.get(client_id).map(|entry| Arc::clone(entry.value()))
    }

    /// 当前所有会话的快照。快照之后新加入的连接不在其中。
    pub fn get_all_client_sessions(&self) -> Vec<Arc<ClientSession>> {
        self.clients.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// 让连接加入（或切换到）会话房间。
    ///
    /// 若连接在加入过程中被并发移除，加入会被撤销，不会留下孤立的房间成员。
    pub async fn join_room(&self, client_session: &Arc<ClientSession>, room_id: &str) -> JoinAction {
        let client_id = client_session.client_id;
        let mut room_guard = client_session.room.write().await;

        let action = match room_guard.as_deref() {
            Some(current) if current == room_id => JoinAction::None,
            Some(_) => JoinAction::Updated,
            None => JoinAction::Set,
        };

        if let Some(previous) = room_guard.as_deref() {
            if previous != room_id {
                self.leave_room_entry(previous, &client_id);
            }
        }
        self.rooms.entry(room_id.to_string()).or_default().insert(client_id);
        *room_guard = Some(room_id.to_string());
        drop(room_guard);

        if !self.clients.contains_key(&client_id) {
            debug!(
                "[ConnectionManager] 客户端 {} 在加入房间 '{}' 时已被移除，撤销加入。",
                client_id, room_id
            );
            self.leave_room_entry(room_id, &client_id);
            return action;
        }

        info!(
            "[ConnectionManager] 客户端 {} 加入会话房间 '{}' ({:?})",
            client_id, room_id, action
        );
        action
    }

    /// 从注册表和所在房间中移除连接，并请求关闭底层连接。
    ///
    /// 对同一连接重复调用是安全的，之后的调用返回 `None`。
    pub async fn remove_client(&self, client_id: &Uuid) -> Option<Arc<ClientSession>> {
        let (_, session) = match self.clients.remove(client_id) {
            Some(entry) => entry,
            None => {
                debug!("[ConnectionManager] 客户端 {} 已不在注册表中，忽略移除请求。", client_id);
                return None;
            }
        };
        session.request_close();

        let room = session.room.read().await.clone();
        if let Some(room_id) = room.as_deref() {
            self.leave_room_entry(room_id, client_id);
        }

        info!(
            "[ConnectionManager] 客户端断开连接: id={}, addr={}, 房间={}",
            session.client_id,
            session.addr,
            room.as_deref().unwrap_or("N/A")
        );
        debug!("[ConnectionManager] 移除后当前活动客户端总数: {}", self.clients.len());
        Some(session)
    }

    /// 房间中当前仍在注册表里的成员。
    pub fn room_members(&self, room_id: &str) -> Vec<Arc<ClientSession>> {
        let member_ids: Vec<Uuid> = match self.rooms.get(room_id) {
            Some(members) => members.iter().copied().collect(),
            None => return Vec::new(),
        };
        member_ids.iter().filter_map(|id| self.get_client(id)).collect()
    }

    /// 房间 ID 到成员数量的快照。
    pub fn rooms_snapshot(&self) -> HashMap<String, usize> {
        self.rooms
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().len()))
            .collect()
    }

    fn leave_room_entry(&self, room_id: &str, client_id: &Uuid) {
        if let Some(mut members) = self.rooms.get_mut(room_id) {
            members.remove(client_id);
        }
        self.rooms.remove_if(room_id, |_, members| members.is_empty());
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(manager: &ConnectionManager) -> (Arc<ClientSession>, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(8);
        let addr = "127.0.0.1:50000".parse().expect("测试地址无效");
        (manager.add_client(addr, tx), rx)
    }

    #[tokio::test]
    async fn test_client_count_tracks_opens_minus_closes() {
        let manager = ConnectionManager::new();
        let (a, _ra) = open(&manager);
        let (b, _rb) = open(&manager);
        let (_c, _rc) = open(&manager);
        assert_eq!(manager.client_count(), 3);

        assert!(manager.remove_client(&a.client_id).await.is_some());
        assert!(manager.remove_client(&a.client_id).await.is_none(), "重复移除不应影响计数");
        manager.remove_client(&b.client_id).await;
        assert_eq!(manager.client_count(), 1);
        assert!(a.is_closing(), "被移除的连接应收到关闭信号");
    }

    #[tokio::test]
    async fn test_join_switch_and_rejoin_actions() {
        let manager = ConnectionManager::new();
        let (session, _rx) = open(&manager);

        assert_eq!(manager.join_room(&session, "A").await, JoinAction::Set);
        assert_eq!(manager.join_room(&session, "A").await, JoinAction::None);
        assert_eq!(manager.join_room(&session, "B").await, JoinAction::Updated);

        let rooms = manager.rooms_snapshot();
        assert_eq!(rooms.get("B"), Some(&1));
        assert!(!rooms.contains_key("A"), "切换房间后旧的空房间应被删除");
        assert_eq!(session.current_room().await.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_rooms_snapshot_counts_members() {
        let manager = ConnectionManager::new();
        let (c1, _r1) = open(&manager);
        let (c2, _r2) = open(&manager);
        let (c3, _r3) = open(&manager);
        let (_unassigned, _r4) = open(&manager);

        manager.join_room(&c1, "A").await;
        manager.join_room(&c2, "A").await;
        manager.join_room(&c3, "B").await;

        let rooms = manager.rooms_snapshot();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms.get("A"), Some(&2));
        assert_eq!(rooms.get("B"), Some(&1));
        assert_eq!(manager.room_members("A").len(), 2);
        assert!(manager.room_members("missing").is_empty());
    }

    #[tokio::test]
    async fn test_remove_client_drops_empty_room() {
        let manager = ConnectionManager::new();
        let (c1, _r1) = open(&manager);
        let (c2, _r2) = open(&manager);
        manager.join_room(&c1, "A").await;
        manager.join_room(&c2, "A").await;

        manager.remove_client(&c1.client_id).await;
        assert_eq!(manager.rooms_snapshot().get("A"), Some(&1));

        manager.remove_client(&c2.client_id).await;
        assert!(manager.rooms_snapshot().is_empty(), "最后一个成员离开后房间应被删除");
    }

    #[tokio::test]
    async fn test_join_after_removal_leaves_no_orphan() {
        let manager = ConnectionManager::new();
        let (session, _rx) = open(&manager);
        manager.remove_client(&session.client_id).await;

        manager.join_room(&session, "A").await;
        assert!(manager.rooms_snapshot().is_empty(), "已移除的连接不应留在房间中");
        assert!(manager.room_members("A").is_empty());
    }
}
