#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tigris_groupguard::classifier::TextClassifier;
use tigris_groupguard::curfew::Clock;
use tigris_groupguard::error::{ClassifierError, TransportError};
use tigris_groupguard::onebot::{ForwardNode, GroupActions, MessageId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send { group_id: i64, text: String, id: MessageId },
    Delete(MessageId),
    Ban { group_id: i64, user_id: i64, secs: u64 },
    WholeBan { group_id: i64, enable: bool },
    Forward(String),
}

/// Platforma, która wszystko zapisuje. Wybrane akcje można "zepsuć".
pub struct RecordingPlatform {
    pub calls: Mutex<Vec<Call>>,
    pub forwards: Mutex<HashMap<String, Vec<ForwardNode>>>,
    failing: Mutex<HashSet<&'static str>>,
    panicking: Mutex<HashSet<&'static str>>,
    offline: AtomicBool,
    next_id: AtomicI64,
}

impl Default for RecordingPlatform {
    fn default() -> Self {
        Self {
            calls: Mutex::new(vec![]),
            forwards: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            panicking: Mutex::new(HashSet::new()),
            offline: AtomicBool::new(false),
            next_id: AtomicI64::new(9000),
        }
    }
}

impl RecordingPlatform {
    pub fn fail(&self, action: &'static str) {
        self.failing.lock().unwrap().insert(action);
    }

    pub fn heal(&self, action: &'static str) {
        self.failing.lock().unwrap().remove(action);
    }

    /// Następne wywołanie akcji spanikuje (jednorazowo).
    pub fn panic_once(&self, action: &'static str) {
        self.panicking.lock().unwrap().insert(action);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn with_forward(&self, id: &str, nodes: Vec<ForwardNode>) {
        self.forwards.lock().unwrap().insert(id.to_string(), nodes);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn bans(&self) -> Vec<(i64, u64)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Ban { user_id, secs, .. } => Some((user_id, secs)),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<MessageId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<(MessageId, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send { id, text, .. } => Some((id, text)),
                _ => None,
            })
            .collect()
    }

    pub fn whole_bans(&self) -> Vec<bool> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::WholeBan { enable, .. } => Some(enable),
                _ => None,
            })
            .collect()
    }

    fn check(&self, action: &'static str) -> Result<(), TransportError> {
        let boom = self.panicking.lock().unwrap().remove(action);
        if boom {
            panic!("scripted panic in {action}");
        }
        if self.failing.lock().unwrap().contains(action) {
            return Err(TransportError::Api {
                action,
                retcode: 100,
                message: "scripted failure".into(),
            });
        }
        Ok(())
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl GroupActions for RecordingPlatform {
    fn is_available(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    async fn send_group_msg(&self, group_id: i64, text: &str) -> Result<Option<MessageId>, TransportError> {
        self.check("send_group_msg")?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.record(Call::Send {
            group_id,
            text: text.to_string(),
            id,
        });
        Ok(Some(id))
    }

    async fn delete_msg(&self, message_id: MessageId) -> Result<(), TransportError> {
        self.check("delete_msg")?;
        self.record(Call::Delete(message_id));
        Ok(())
    }

    async fn set_group_ban(&self, group_id: i64, user_id: i64, secs: u64) -> Result<(), TransportError> {
        self.check("set_group_ban")?;
        self.record(Call::Ban { group_id, user_id, secs });
        Ok(())
    }

    async fn set_group_whole_ban(&self, group_id: i64, enable: bool) -> Result<(), TransportError> {
        self.check("set_group_whole_ban")?;
        self.record(Call::WholeBan { group_id, enable });
        Ok(())
    }

    async fn get_forward_msg(&self, forward_id: &str) -> Result<Vec<ForwardNode>, TransportError> {
        self.check("get_forward_msg")?;
        self.record(Call::Forward(forward_id.to_string()));
        self.forwards
            .lock()
            .unwrap()
            .get(forward_id)
            .cloned()
            .ok_or(TransportError::Api {
                action: "get_forward_msg",
                retcode: 404,
                message: "no such forward".into(),
            })
    }
}

/// Klasyfikator zawsze odpowiadający tym samym.
pub struct FixedClassifier(pub &'static str);

#[async_trait]
impl TextClassifier for FixedClassifier {
    async fn classify(&self, _: &str, _: &str) -> Result<String, ClassifierError> {
        Ok(self.0.to_string())
    }
}

/// Zegar ścienny sprzężony z czasem tokio: `base` + czas, który upłynął od utworzenia.
/// Pod `start_paused` przesuwa się razem z `sleep`.
pub struct TokioClock {
    base: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::from_std(self.started.elapsed()).unwrap()
    }
}
