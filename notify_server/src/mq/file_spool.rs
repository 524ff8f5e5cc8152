//! 文件投递目录：不能连接 Redis 的发布方把通知写成 JSON 文件，
//! 服务端定期扫描、路由并删除这些文件。
//!
//! 通知文件（默认前缀 `websocket_notification_`）按 `target` 路由；
//! 会话文件（默认前缀 `websocket_session_`）只发送给 `sessionId` 对应的房间。
//! 发布方不一定原子地写文件，所以空文件和无法解析的文件要等过了宽限期才删除。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common_models::notification::Notification;
use log::{debug, error, info, warn};
use tokio::time::sleep;
use uuid::Uuid;

use crate::config::FileFallbackConfig;
use crate::error::AppError;
use crate::ws_server::notification_hub::{DispatchSource, Feed, NotificationHub};

const SPOOL_EXTENSION: &str = ".json";

/// 同一毫秒内写入的文件按写入顺序排列。
static ENQUEUE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct NotificationSpool {
    directory: PathBuf,
    file_prefix: String,
    session_file_prefix: Option<String>,
    poll_interval: Duration,
    /// 空文件或无法解析的文件在最后修改后保留的时长，期间视为仍在写入。
    grace_period: Duration,
}

impl NotificationSpool {
    pub fn new(directory: impl Into<PathBuf>, file_prefix: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            directory: directory.into(),
            file_prefix: file_prefix.into(),
            session_file_prefix: None,
            poll_interval,
            grace_period: poll_interval * 2,
        }
    }

    /// 同时扫描会话文件。
    pub fn with_session_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.session_file_prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    pub fn from_config(config: &FileFallbackConfig) -> Self {
        Self::new(config.directory.clone(), config.file_prefix.clone(), config.poll_interval())
            .with_session_prefix(config.session_file_prefix.clone())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// 原子地写入一条通知：先写临时文件再重命名，扫描方不会读到写了一半的文件。
    pub fn enqueue(&self, notification: &Notification) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.directory)?;
        let body = notification.to_json()?;
        let stem = format!(
            "{}{:013}_{:010}_{}",
            self.file_prefix,
            Utc::now().timestamp_millis(),
            ENQUEUE_SEQUENCE.fetch_add(1, Ordering::SeqCst),
            Uuid::new_v4().simple()
        );
        let temp_path = self.directory.join(format!(".{}.tmp", stem));
        let final_path = self.directory.join(format!("{}{}", stem, SPOOL_EXTENSION));

        fs::write(&temp_path, body)?;
        if let Err(e) = fs::rename(&temp_path, &final_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        debug!("[NotificationSpool] 通知已写入 {:?}", final_path);
        Ok(final_path)
    }

    /// 按文件名顺序处理目录中所有匹配前缀的 `.json` 文件，返回路由成功的消息数。
    ///
    /// 路由成功的文件随即删除。空文件和无法解析的文件在宽限期内保留到下一轮，
    /// 超过宽限期后记录日志并删除。无法读取的文件保留到下一轮。
    /// 此函数执行阻塞的文件 I/O，异步上下文中应通过 `run` 或 `spawn_blocking` 调用。
    pub fn check_notification_files(&self, hub: &NotificationHub) -> usize {
        let mut files = match self.pending_files() {
            Ok(files) => files,
            Err(e) => {
                debug!("[NotificationSpool] 无法读取投递目录 {:?}: {}", self.directory, e);
                return 0;
            }
        };
        if files.is_empty() {
            return 0;
        }
        files.sort_by(|(a, _), (b, _)| a.cmp(b));
        debug!("[NotificationSpool] 发现 {} 个待处理文件", files.len());

        let mut dispatched = 0;
        for (path, feed) in files {
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!("[NotificationSpool] 读取文件 {:?} 失败，下一轮重试: {}", path, e);
                    continue;
                }
            };

            if content.trim().is_empty() {
                if self.is_stale(&path) {
                    warn!("[NotificationSpool] 文件 {:?} 超过宽限期仍为空，已删除", path);
                    self.remove(&path);
                } else {
                    debug!("[NotificationSpool] 文件 {:?} 为空，可能仍在写入", path);
                }
                continue;
            }

            match hub.dispatch_raw(&content, feed, DispatchSource::Spool) {
                Ok(outcome) => {
                    dispatched += 1;
                    info!("[NotificationSpool] {:?} 已路由: {:?}", path, outcome);
                    self.remove(&path);
                }
                Err(e) if self.is_stale(&path) => {
                    warn!("[NotificationSpool] 文件 {:?} 格式错误，已丢弃: {}", path, e);
                    self.remove(&path);
                }
                Err(e) => debug!("[NotificationSpool] 文件 {:?} 暂时无法解析，下一轮重试: {}", path, e),
            }
        }
        dispatched
    }

    /// 按配置的间隔循环扫描，永不返回。每轮扫描在阻塞线程池中执行。
    pub async fn run(self, hub: Arc<NotificationHub>) {
        info!(
            "[NotificationSpool] 开始扫描投递目录 {:?} (前缀 '{}' / {:?}，周期 {:?})",
            self.directory, self.file_prefix, self.session_file_prefix, self.poll_interval
        );
        let spool = Arc::new(self);
        loop {
            sleep(spool.poll_interval).await;
            let round_spool = Arc::clone(&spool);
            let round_hub = Arc::clone(&hub);
            let scan = tokio::task::spawn_blocking(move || round_spool.check_notification_files(&round_hub));
            if let Err(e) = scan.await {
                error!("[NotificationSpool] 扫描任务异常结束: {}", e);
            }
        }
    }

    fn is_stale(&self, path: &Path) -> bool {
        match fs::metadata(path).and_then(|metadata| metadata.modified()) {
            Ok(modified) => modified.elapsed().unwrap_or_default() >= self.grace_period,
            Err(_) => true,
        }
    }

    fn remove(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            warn!("[NotificationSpool] 删除文件 {:?} 失败: {}", path, e);
        }
    }

    fn feed_for(&self, name: &str) -> Option<Feed> {
        if !name.ends_with(SPOOL_EXTENSION) {
            return None;
        }
        if name.starts_with(&self.file_prefix) {
            return Some(Feed::Notifications);
        }
        match &self.session_file_prefix {
            Some(prefix) if name.starts_with(prefix.as_str()) => Some(Feed::Session),
            _ => None,
        }
    }

    fn pending_files(&self) -> std::io::Result<Vec<(PathBuf, Feed)>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(feed) = name.to_str().and_then(|name| self.feed_for(name)) else {
                continue;
            };
            if entry.path().is_file() {
                files.push((entry.path(), feed));
            }
        }
        Ok(files)
    }
}
