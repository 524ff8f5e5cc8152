//! 通知模型。
//!
//! `Notification` 是在 Redis 频道、文件投递目录和管理接口上传输的 JSON 对象。
//! 服务端只宽松地读取路由所需的字段（`target`、`sessionId`、`type`、`data`），
//! 不校验其它字段的类型，整个对象原样转发给客户端。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 会话定向信封的消息类型：`{"type":"session_targeted","sessionId":S,"data":{..}}`。
pub const SESSION_ENVELOPE_TYPE: &str = "session_targeted";

/// 通知的投递目标。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotificationTarget {
    /// 所有当前连接。
    All,
    /// 指定会话房间内的连接，需要 `sessionId`。
    Session,
    /// 与某个业务实体相关的事件。兴趣过滤由客户端完成，服务端按全量广播处理。
    Entity,
}

impl NotificationTarget {
    /// 线路上的取值，未知取值返回 `None`。
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "all" => Some(NotificationTarget::All),
            "session" => Some(NotificationTarget::Session),
            "entity" => Some(NotificationTarget::Entity),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationTarget::All => "all",
            NotificationTarget::Session => "session",
            NotificationTarget::Entity => "entity",
        }
    }
}

/// 构造实体事件时使用的实体标识。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum EntityId {
    Number(i64),
    Text(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Number(n) => write!(f, "{}", n),
            EntityId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        EntityId::Number(value)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::Text(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        EntityId::Text(value)
    }
}

impl From<EntityId> for Value {
    fn from(value: EntityId) -> Self {
        match value {
            EntityId::Number(n) => Value::from(n),
            EntityId::Text(s) => Value::String(s),
        }
    }
}

/// 一条通知：任意 JSON 对象。
///
/// 常见线路格式：
/// ```text
/// { "target"?: "all" | "session" | "entity",
///   "sessionId"?: string, "type"?: string,
///   "entityType"?, "entityId"?, "eventType"?, "data"?, "timestamp"?, ... }
/// ```
/// 只要求是 JSON 对象；字段类型不符的路由字段按缺失处理。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct Notification {
    fields: Map<String, Value>,
}

impl Notification {
    /// 创建一个只带投递目标的通知。
    pub fn new(target: NotificationTarget) -> Self {
        Self::default().with_field("target", target.as_str())
    }

    /// 面向所有连接的通知。
    pub fn broadcast(message_type: &str) -> Self {
        Self::new(NotificationTarget::All).with_field("type", message_type)
    }

    /// 面向某个会话房间的通知。
    pub fn for_session(session_id: impl Into<String>, message_type: &str) -> Self {
        Self::new(NotificationTarget::Session)
            .with_field("sessionId", Value::String(session_id.into()))
            .with_field("type", message_type)
    }

    /// 会话定向信封，`data` 是最终发送给房间内连接的内容。
    pub fn session_envelope(session_id: impl Into<String>, data: Value) -> Self {
        let mut envelope = Self::default()
            .with_field("type", SESSION_ENVELOPE_TYPE)
            .with_field("sessionId", Value::String(session_id.into()))
            .with_field("data", data);
        envelope.ensure_timestamp();
        envelope
    }

    /// 构造一条实体事件通知（`target = "entity"`，`type = "entity_event"`），并填充当前时间戳。
    pub fn entity_event(
        entity_type: impl Into<String>,
        entity_id: impl Into<EntityId>,
        event_type: impl Into<String>,
        data: Option<Map<String, Value>>,
    ) -> Self {
        let entity_id: EntityId = entity_id.into();
        let mut notification = Self::new(NotificationTarget::Entity)
            .with_field("type", "entity_event")
            .with_field("entityType", Value::String(entity_type.into()))
            .with_field("entityId", entity_id)
            .with_field("eventType", Value::String(event_type.into()));
        if let Some(data) = data {
            notification = notification.with_field("data", data);
        }
        notification.ensure_timestamp();
        notification
    }

    /// 设置一个字段，已有的同名字段会被覆盖。
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// `target` 字段。缺失、不是字符串或取值未知时返回 `None`，按全量广播处理。
    pub fn target(&self) -> Option<NotificationTarget> {
        self.fields
            .get("target")
            .and_then(Value::as_str)
            .and_then(NotificationTarget::from_wire)
    }

    /// `sessionId` 字段。数字会转成十进制文本；空字符串和其它类型视为缺失。
    pub fn session_id(&self) -> Option<String> {
        match self.fields.get("sessionId")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// 客户端使用的消息类型（字段 `type`），缺失时返回 `None`。
    pub fn message_type(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }

    pub fn is_session_envelope(&self) -> bool {
        self.message_type() == Some(SESSION_ENVELOPE_TYPE)
    }

    /// 取出 `data` 字段，`null` 视为缺失。
    pub fn take_data(&mut self) -> Option<Value> {
        self.fields.remove("data").filter(|data| !data.is_null())
    }

    /// 若缺少 `timestamp`，填入当前 UTC 时间。已有的时间戳保持不变。
    pub fn ensure_timestamp(&mut self) {
        if !self.fields.contains_key("timestamp") {
            self.fields
                .insert("timestamp".to_string(), Value::String(crate::iso_timestamp_now()));
        }
    }

    /// 从 JSON 文本解析通知。只有非 JSON 文本或非对象的 JSON 才会返回错误。
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// 序列化为 JSON 文本。
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}
