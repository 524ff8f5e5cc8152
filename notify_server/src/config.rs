use crate::error::AppError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 配置文件的默认文件名
pub const CONFIG_FILE_NAME: &str = "app_settings.json";
/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "NOTIFY_CONFIG";

/// WebSocket 服务端配置
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WebSocketConfig {
    /// WebSocket 服务绑定的主机地址
    pub host: String,
    /// WebSocket 服务监听的端口号
    pub port: u16,
    /// 服务端健康检查 Ping 的间隔（单位：秒）
    pub ping_interval_seconds: u64,
    /// 连续多少次 Ping 未收到 Pong 后断开连接，最小为 1
    pub max_missed_pongs: u32,
    /// 每个连接的出站队列容量
    pub outbound_buffer: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            ping_interval_seconds: 240,
            max_missed_pongs: 2,
            outbound_buffer: 64,
        }
    }
}

impl WebSocketConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, AppError> {
        parse_addr(&self.host, self.port)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_seconds.max(1))
    }

    pub fn max_missed_pongs(&self) -> u32 {
        self.max_missed_pongs.max(1)
    }
}

/// Redis 通知频道配置
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RedisConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// 通知频道，发布与订阅共用
    pub channel: String,
    /// 会话定向消息频道，消息按 `sessionId` 只发送给对应房间
    pub session_channel: String,
    /// 订阅断开后重连前的等待时间（单位：秒）
    pub reconnect_delay_seconds: u64,
    /// 连接与发布的超时时间（单位：毫秒）
    pub command_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "redis".to_string(),
            port: 6379,
            channel: "notifications".to_string(),
            session_channel: "session_messages".to_string(),
            reconnect_delay_seconds: 5,
            command_timeout_ms: 2000,
        }
    }
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_seconds)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms.max(1))
    }

    /// 用 `REDIS_HOST` / `REDIS_PORT` 的值覆盖文件中的设置。无法解析的端口会被忽略。
    pub fn apply_overrides(&mut self, host: Option<String>, port: Option<String>) {
        if let Some(host) = host.filter(|h| !h.trim().is_empty()) {
            self.host = host;
        }
        if let Some(port) = port {
            match port.trim().parse::<u16>() {
                Ok(port) => self.port = port,
                Err(e) => warn!("[配置模块] 忽略无效的 REDIS_PORT '{}': {}", port, e),
            }
        }
    }
}

/// 管理 HTTP 接口配置
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8083,
        }
    }
}

impl AdminConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, AppError> {
        parse_addr(&self.host, self.port)
    }
}

/// 文件投递目录（Redis 不可用时的备用通知通道）配置
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FileFallbackConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    /// 通知文件前缀，只处理以此前缀开头、以 `.json` 结尾的文件
    pub file_prefix: String,
    /// 会话定向消息文件前缀
    pub session_file_prefix: String,
    /// 扫描间隔（单位：毫秒）
    pub poll_interval_ms: u64,
}

impl Default for FileFallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: env::temp_dir(),
            file_prefix: "websocket_notification_".to_string(),
            session_file_prefix: "websocket_session_".to_string(),
            poll_interval_ms: 1000,
        }
    }
}

impl FileFallbackConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

/// 应用的主配置结构体
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub websocket: WebSocketConfig,
    pub redis: RedisConfig,
    pub admin: AdminConfig,
    pub file_fallback: FileFallbackConfig,
}

fn parse_addr(host: &str, port: u16) -> Result<SocketAddr, AppError> {
    format!("{}:{}", host, port)
        .parse()
        .map_err(|e| AppError::ConfigError(format!("无效的监听地址 {}:{}: {}", host, port, e)))
}

/// 加载应用配置：读取配置文件（不存在或损坏时写入默认配置），再应用环境变量覆盖。
pub fn load_config() -> AppConfig {
    let config_file_path = get_config_file_path();
    let mut config = load_or_create_config(&config_file_path);
    config
        .redis
        .apply_overrides(env::var("REDIS_HOST").ok(), env::var("REDIS_PORT").ok());
    info!(
        "[配置模块] 应用配置已加载。WebSocket: {}:{}，Redis: {} (启用: {})，管理接口端口: {}",
        config.websocket.host,
        config.websocket.port,
        config.redis.url(),
        config.redis.enabled,
        config.admin.port
    );
    config
}

/// 获取配置文件路径：优先使用 `NOTIFY_CONFIG`，否则为当前目录下的 `app_settings.json`。
pub fn get_config_file_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(CONFIG_FILE_NAME)
}

/// 从指定路径加载配置；文件缺失或无法解析时返回默认配置并尝试写回文件。
pub fn load_or_create_config(config_file_path: &Path) -> AppConfig {
    match fs::read_to_string(config_file_path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("[配置模块] 已成功从配置文件 {:?} 加载应用配置。", config_file_path);
                config
            }
            Err(e) => {
                warn!(
                    "[配置模块] 警告：从 {:?} 反序列化配置失败: {}. 文件可能已损坏。将使用默认配置并尝试覆盖。",
                    config_file_path, e
                );
                let default_config = AppConfig::default();
                save_config(&default_config, config_file_path);
                default_config
            }
        },
        Err(e) => {
            info!(
                "[配置模块] 未在 {:?} 找到配置文件或读取时发生错误 (错误: {}). 将使用默认配置并尝试创建新文件。",
                config_file_path, e
            );
            let default_config = AppConfig::default();
            save_config(&default_config, config_file_path);
            default_config
        }
    }
}

fn save_config(config: &AppConfig, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("[配置模块] 错误：创建配置目录 {:?} 失败: {}", parent, e);
                return;
            }
        }
    }

    match serde_json::to_string_pretty(config) {
        Ok(content) => {
            if let Err(e) = fs::write(path, content) {
                warn!("[配置模块] 错误：将配置写入文件 {:?} 时失败: {}", path, e);
            } else {
                info!("[配置模块] 已将默认配置保存到 {:?}.", path);
            }
        }
        Err(e) => warn!("[配置模块] 错误：序列化配置信息以便保存时失败: {}", e),
    }
}
