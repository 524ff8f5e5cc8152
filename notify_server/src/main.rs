use log::{error, info, warn, LevelFilter};
use notify_server::admin;
use notify_server::config;
use notify_server::mq::file_spool::NotificationSpool;
use notify_server::mq::redis_bridge::RedisBridge;
use notify_server::ws_server::connection_manager::ConnectionManager;
use notify_server::ws_server::handler::NotificationConnectionHandler;
use notify_server::ws_server::heartbeat_monitor::HeartbeatMonitor;
use notify_server::ws_server::notification_hub::NotificationHub;
use notify_server::ws_server::service::WsService;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // RUST_LOG 可覆盖默认级别
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
    info!("[主程序] 日志系统已初始化 (env_logger)，默认级别: Info。");

    let app_config = config::load_config();

    let connection_manager = Arc::new(ConnectionManager::new());
    info!("[主程序] 连接管理器 (ConnectionManager) 已创建。");

    let redis_bridge = if app_config.redis.enabled {
        match RedisBridge::connect(&app_config.redis).await {
            Ok(bridge) => Some(Arc::new(bridge)),
            Err(e) => {
                warn!(
                    "[主程序] 无法连接 Redis ({})，通知频道不可用: {}",
                    app_config.redis.url(),
                    e
                );
                None
            }
        }
    } else {
        info!("[主程序] 配置中已禁用 Redis。");
        None
    };

    let hub = Arc::new(NotificationHub::new(Arc::clone(&connection_manager), redis_bridge.clone()));

    if let Some(bridge) = redis_bridge {
        let hub_for_subscriber = Arc::clone(&hub);
        tokio::spawn(async move {
            bridge.run_subscriber(hub_for_subscriber).await;
        });
        info!("[主程序] Redis 订阅任务已启动。");
    }

    let heartbeat_monitor = HeartbeatMonitor::new(
        Arc::clone(&connection_manager),
        app_config.websocket.ping_interval(),
        app_config.websocket.max_missed_pongs(),
    );
    tokio::spawn(async move {
        heartbeat_monitor.run().await;
        warn!("[主程序] 警告：心跳监视器任务已意外结束。");
    });

    if app_config.file_fallback.enabled {
        let spool = NotificationSpool::from_config(&app_config.file_fallback);
        let hub_for_spool = Arc::clone(&hub);
        tokio::spawn(async move {
            spool.run(hub_for_spool).await;
        });
    }

    if app_config.admin.enabled {
        let admin_config = app_config.admin.clone();
        let hub_for_admin = Arc::clone(&hub);
        tokio::spawn(async move {
            if let Err(e) = admin::serve(&admin_config, hub_for_admin).await {
                error!("[主程序] 管理接口启动失败: {:#}", e);
            }
        });
    }

    let handler = Arc::new(NotificationConnectionHandler::new(Arc::clone(&connection_manager)));
    let ws_service = WsService::new(app_config.websocket.clone(), handler);
    info!("[主程序] 正在启动 WebSocket 服务...");
    if let Err(e) = ws_service.start().await {
        error!("[主程序] 致命错误：启动 WebSocket 服务时发生严重问题: {:#}", e);
        std::process::exit(1);
    }
}
