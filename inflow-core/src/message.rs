//! 事件总线消息（Message）
//!
//! 接收后不可变，仅提供只读访问器。
//!
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct Message {
    /// 消息唯一标识
    #[builder(default = Uuid::new_v4())]
    message_id: Uuid,
    /// 目标地址
    #[builder(into)]
    address: String,
    /// 回复地址（请求/应答模式）
    #[builder(into)]
    reply_address: Option<String>,
    #[builder(default)]
    headers: BTreeMap<String, String>,
    /// 消息体
    #[builder(default)]
    body: Value,
    #[builder(default = Utc::now())]
    sent_at: DateTime<Utc>,
}

impl Message {
    pub fn new(address: impl Into<String>, body: Value) -> Self {
        Self::builder().address(address).body(body).build()
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn reply_address(&self) -> Option<&str> {
        self.reply_address.as_deref()
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        self.sent_at
    }
}
