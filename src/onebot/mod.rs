// src/onebot/mod.rs
//! Granica z platformą czatu (OneBot v11): model zdarzeń, akcje wychodzące, webhook.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::TransportError;

pub mod event;
pub mod http;
pub mod webhook;

pub use event::{ForwardNode, GroupMessage, InboundEvent, MediaRef, MessageId, MetaEvent, Segment};

/// Akcje, których silnik potrzebuje od platformy.
/// Bezstanowy klient współdzielony (Arc) przez detektory i scheduler ciszy nocnej.
#[async_trait]
pub trait GroupActions: Send + Sync {
    /// `false` → "nie da się działać": pomijamy cykl i próbujemy przy następnym zdarzeniu/ticku.
    fn is_available(&self) -> bool;

    /// Zwraca id wysłanej wiadomości (jeśli platforma je podała).
    async fn send_group_msg(&self, group_id: i64, text: &str) -> Result<Option<MessageId>, TransportError>;

    async fn delete_msg(&self, message_id: MessageId) -> Result<(), TransportError>;

    async fn set_group_ban(&self, group_id: i64, user_id: i64, duration_secs: u64) -> Result<(), TransportError>;

    async fn set_group_whole_ban(&self, group_id: i64, enable: bool) -> Result<(), TransportError>;

    async fn get_forward_msg(&self, forward_id: &str) -> Result<Vec<ForwardNode>, TransportError>;
}

/// Stan połączenia z gatewayem, aktualizowany z meta-eventów (lifecycle/heartbeat).
#[derive(Debug)]
pub struct PlatformStatus {
    online: AtomicBool,
}

impl Default for PlatformStatus {
    fn default() -> Self {
        // zakładamy "online" dopóki gateway nie powie inaczej
        Self {
            online: AtomicBool::new(true),
        }
    }
}

impl PlatformStatus {
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    pub fn set_online(&self, online: bool) {
        let prev = self.online.swap(online, Ordering::Relaxed);
        if prev != online {
            if online {
                info!("onebot gateway is online");
            } else {
                warn!("onebot gateway went offline");
            }
        }
    }

    /// lifecycle: connect/enable → online, disable → offline; heartbeat: status.online.
    pub fn observe(&self, meta: &MetaEvent) {
        match meta.meta_event_type.as_str() {
            "lifecycle" => match meta.sub_type.as_deref() {
                Some("connect") | Some("enable") => self.set_online(true),
                Some("disable") => self.set_online(false),
                _ => {}
            },
            "heartbeat" => {
                if let Some(online) = meta
                    .status
                    .as_ref()
                    .and_then(|s| s.get("online"))
                    .and_then(|v| v.as_bool())
                {
                    self.set_online(online);
                }
            }
            _ => {}
        }
    }
}
