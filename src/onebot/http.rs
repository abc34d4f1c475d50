//! Klient HTTP API OneBot v11 (POST `<base>/<action>`, odpowiedź `{status, retcode, data}`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;
use url::Url;

use super::{ForwardNode, GroupActions, MessageId, PlatformStatus};
use crate::config::OneBot;
use crate::error::{ConfigError, TransportError};

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    retcode: i64,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    wording: Option<String>,
    /// Niektóre adaptery zwracają `messages` na najwyższym poziomie.
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl ApiResponse {
    fn is_ok(&self) -> bool {
        self.retcode == 0 && self.status != "failed"
    }
}

pub struct OneBotHttpClient {
    http: Client,
    base: Url,
    access_token: Option<String>,
    status: Arc<PlatformStatus>,
}

impl OneBotHttpClient {
    pub fn new(cfg: &OneBot, status: Arc<PlatformStatus>) -> Result<Self, ConfigError> {
        let mut raw = cfg.base_url.trim().to_string();
        // Url::join zastępuje ostatni segment ścieżki, jeśli nie ma "/" na końcu
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base = Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl {
            field: "onebot.base_url",
            reason: e.to_string(),
        })?;
        let http = Client::builder()
            .user_agent("TGG-OneBot/1.0")
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "onebot",
                reason: e.to_string(),
            })?;
        Ok(Self {
            http,
            base,
            access_token: cfg.access_token.clone().filter(|t| !t.is_empty()),
            status,
        })
    }

    async fn call(&self, action: &'static str, params: Value) -> Result<ApiResponse, TransportError> {
        if !self.status.is_online() {
            return Err(TransportError::Unavailable);
        }
        let url = self.base.join(action).map_err(|e| TransportError::Decode {
            action,
            reason: e.to_string(),
        })?;

        let mut req = self.http.post(url).json(&params);
        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?.error_for_status()?;
        let body: ApiResponse = resp.json().await?;
        debug!(%action, retcode = body.retcode, status = %body.status, "onebot call");

        if !body.is_ok() {
            return Err(TransportError::Api {
                action,
                retcode: body.retcode,
                message: body
                    .wording
                    .clone()
                    .or_else(|| body.message.clone())
                    .unwrap_or_default(),
            });
        }
        Ok(body)
    }
}

fn message_id_of(data: &Value) -> Option<MessageId> {
    match data.get("message_id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn forward_nodes(body: ApiResponse) -> Result<Vec<ForwardNode>, TransportError> {
    let list = match body.data {
        Value::Object(mut obj) => obj.remove("messages"),
        Value::Array(arr) => Some(Value::Array(arr)),
        _ => None,
    }
    .or_else(|| {
        let mut extra = body.extra;
        extra.remove("messages")
    });

    match list {
        Some(v) => serde_json::from_value(v).map_err(|e| TransportError::Decode {
            action: "get_forward_msg",
            reason: e.to_string(),
        }),
        None => Ok(vec![]),
    }
}

#[async_trait]
impl GroupActions for OneBotHttpClient {
    fn is_available(&self) -> bool {
        self.status.is_online()
    }

    async fn send_group_msg(&self, group_id: i64, text: &str) -> Result<Option<MessageId>, TransportError> {
        let body = self
            .call("send_group_msg", json!({ "group_id": group_id, "message": text }))
            .await?;
        Ok(message_id_of(&body.data))
    }

    async fn delete_msg(&self, message_id: MessageId) -> Result<(), TransportError> {
        self.call("delete_msg", json!({ "message_id": message_id })).await?;
        Ok(())
    }

    async fn set_group_ban(&self, group_id: i64, user_id: i64, duration_secs: u64) -> Result<(), TransportError> {
        self.call(
            "set_group_ban",
            json!({ "group_id": group_id, "user_id": user_id, "duration": duration_secs }),
        )
        .await?;
        Ok(())
    }

    async fn set_group_whole_ban(&self, group_id: i64, enable: bool) -> Result<(), TransportError> {
        self.call("set_group_whole_ban", json!({ "group_id": group_id, "enable": enable }))
            .await?;
        Ok(())
    }

    async fn get_forward_msg(&self, forward_id: &str) -> Result<Vec<ForwardNode>, TransportError> {
        let body = self
            .call("get_forward_msg", json!({ "message_id": forward_id }))
            .await?;
        forward_nodes(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(v: Value) -> ApiResponse {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn message_id_accepts_number_and_string() {
        assert_eq!(message_id_of(&json!({"message_id": 12})), Some(12));
        assert_eq!(message_id_of(&json!({"message_id": "34"})), Some(34));
        assert_eq!(message_id_of(&json!({})), None);
    }

    #[test]
    fn forward_nodes_from_data_or_top_level() {
        let nested = parse(json!({
            "status": "ok", "retcode": 0,
            "data": {"messages": [{"raw_message": "a", "message": [{"type": "text", "data": {"text": "a"}}]}]}
        }));
        let nodes = forward_nodes(nested).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].raw_message.as_deref(), Some("a"));

        let top = parse(json!({
            "status": "ok", "retcode": 0, "data": null,
            "messages": [{"content": [{"type": "text", "data": {"text": "b"}}]}]
        }));
        let nodes = forward_nodes(top).unwrap();
        assert_eq!(nodes[0].message.len(), 1);
    }

    #[test]
    fn failed_status_is_error() {
        let r = parse(json!({"status": "failed", "retcode": 100, "data": null, "wording": "nope"}));
        assert!(!r.is_ok());
        let r = parse(json!({"status": "ok", "retcode": 0}));
        assert!(r.is_ok());
    }

    #[tokio::test]
    async fn offline_gateway_short_circuits() {
        let status = Arc::new(PlatformStatus::default());
        status.set_online(false);
        let client = OneBotHttpClient::new(
            &OneBot {
                base_url: "http://127.0.0.1:1".into(),
                access_token: None,
                timeout_ms: 100,
            },
            status,
        )
        .unwrap();
        assert!(!client.is_available());
        let err = client.delete_msg(1).await.unwrap_err();
        assert!(matches!(err, TransportError::Unavailable));
    }
}
