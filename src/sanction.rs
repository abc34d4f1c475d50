// src/sanction.rs
//! Sankcje: tiery → czas wyciszenia + treść ostrzeżenia, wykonanie kary
//! i rejestr samousuwających się ostrzeżeń.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::fingerprint::ContentKind;
use crate::onebot::{GroupActions, GroupMessage, MessageId};

const DEFAULT_DURATION_SECS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SanctionTier {
    Text,
    Image,
    Video,
    Audio,
    File,
    Forward,
    Mixed,
    Chat,
    Poke,
    Unknown,
    Advertisement,
}

impl SanctionTier {
    pub fn default_duration_secs(self) -> u64 {
        match self {
            SanctionTier::Text => 600,
            SanctionTier::Image => 600,
            SanctionTier::Video => 900,
            SanctionTier::Audio => 600,
            SanctionTier::File => 600,
            SanctionTier::Forward => 300,
            SanctionTier::Chat => 1800,
            SanctionTier::Poke => 10_800,
            SanctionTier::Unknown => 10_800,
            SanctionTier::Advertisement => 86_400,
            SanctionTier::Mixed => DEFAULT_DURATION_SECS,
        }
    }

    /// Tier kary za duplikat danego rodzaju treści.
    pub fn for_content(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Text => SanctionTier::Text,
            ContentKind::Image => SanctionTier::Image,
            ContentKind::Video => SanctionTier::Video,
            ContentKind::Audio => SanctionTier::Audio,
            ContentKind::File => SanctionTier::File,
            ContentKind::Forward => SanctionTier::Forward,
            ContentKind::Mixed => SanctionTier::Mixed,
            ContentKind::Unsupported => SanctionTier::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SanctionTier::Text => "text",
            SanctionTier::Image => "image",
            SanctionTier::Video => "video",
            SanctionTier::Audio => "voice message",
            SanctionTier::File => "file",
            SanctionTier::Forward => "chat history",
            SanctionTier::Mixed => "content",
            SanctionTier::Chat => "chat content",
            SanctionTier::Poke => "poke",
            SanctionTier::Unknown => "unsupported message type",
            SanctionTier::Advertisement => "advertisement",
        }
    }
}

/// Czasy wyciszeń (domyślne + nadpisania z configu).
#[derive(Debug, Clone, Default)]
pub struct SanctionTable {
    overrides: HashMap<SanctionTier, u64>,
}

impl SanctionTable {
    pub fn new(overrides: HashMap<SanctionTier, u64>) -> Self {
        Self { overrides }
    }

    pub fn duration_secs(&self, tier: SanctionTier) -> u64 {
        self.overrides
            .get(&tier)
            .copied()
            .unwrap_or_else(|| tier.default_duration_secs())
    }

    /// Standardowe ostrzeżenie dla tieru (poke/chat mają własne teksty z configu).
    pub fn warning(&self, tier: SanctionTier, recall_delay: Duration) -> String {
        let muted = human_duration(self.duration_secs(tier));
        let gone = human_duration(recall_delay.as_secs());
        match tier {
            SanctionTier::Unknown => {
                format!("⚠️ Unsupported message type detected, muted for {muted}. This notice disappears in {gone}.")
            }
            SanctionTier::Advertisement => format!(
                "⚠️ Group advertisement detected in a forwarded message, muted for {muted}. This notice disappears in {gone}."
            ),
            SanctionTier::Chat => {
                format!("⚠️ Chat content detected, muted for {muted}. This notice disappears in {gone}.")
            }
            _ => format!(
                "⚠️ Repeated {} within 24 hours, muted for {muted}. This notice disappears in {gone}.",
                tier.label()
            ),
        }
    }

    /// Jak `warning`, z dopiskiem przed informacją o zniknięciu ostrzeżenia.
    pub fn warning_with_hint(&self, tier: SanctionTier, recall_delay: Duration, hint: &str) -> String {
        let muted = human_duration(self.duration_secs(tier));
        let gone = human_duration(recall_delay.as_secs());
        let hint = hint.trim().trim_end_matches(['.', '。']);
        if hint.is_empty() {
            return self.warning(tier, recall_delay);
        }
        format!(
            "⚠️ {} detected, muted for {muted}. {hint}. This notice disappears in {gone}.",
            capitalize(tier.label())
        )
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn human_duration(secs: u64) -> String {
    match secs {
        s if s >= 3600 && s % 3600 == 0 => format!("{} h", s / 3600),
        s if s >= 60 => format!("{} min", s / 60),
        s => format!("{s} s"),
    }
}

/* =========================================
   Rejestr opóźnionego usuwania ostrzeżeń
   ========================================= */

/// Każde ostrzeżenie to osobne, anulowalne zadanie; klucz = id akcji.
pub struct RecallRegistry {
    platform: Arc<dyn GroupActions>,
    tasks: Arc<DashMap<u64, JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl RecallRegistry {
    pub fn new(platform: Arc<dyn GroupActions>) -> Self {
        Self {
            platform,
            tasks: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Zaplanuj usunięcie wiadomości po `delay`. Zwraca id akcji.
    pub fn schedule(&self, message_id: MessageId, delay: Duration) -> u64 {
        let action_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let platform = self.platform.clone();
        let tasks = self.tasks.clone();

        // wpis trzymany w trakcie spawn – zadanie nie usunie się przed własną rejestracją
        self.tasks.entry(action_id).or_insert_with(|| {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                match platform.delete_msg(message_id).await {
                    Ok(()) => debug!(%message_id, "warning recalled"),
                    Err(e) => warn!(%message_id, error = %e, "failed to recall warning"),
                }
                tasks.remove(&action_id);
            })
        });
        action_id
    }

    pub fn cancel(&self, action_id: u64) -> bool {
        match self.tasks.remove(&action_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Shutdown: anuluj wszystko, co jeszcze czeka.
    pub fn drain(&self) {
        let ids: Vec<u64> = self.tasks.iter().map(|e| *e.key()).collect();
        let n = ids.len();
        for id in ids {
            self.cancel(id);
        }
        if n > 0 {
            info!(cancelled = n, "pending warning recalls cancelled");
        }
    }
}

/* =========================================
   Wykonanie kary
   ========================================= */

pub struct Enforcer {
    platform: Arc<dyn GroupActions>,
    table: SanctionTable,
    recalls: Arc<RecallRegistry>,
    recall_delay: Duration,
}

impl Enforcer {
    pub fn new(
        platform: Arc<dyn GroupActions>,
        table: SanctionTable,
        recalls: Arc<RecallRegistry>,
        recall_delay: Duration,
    ) -> Self {
        Self {
            platform,
            table,
            recalls,
            recall_delay,
        }
    }

    /// Standardowe ostrzeżenie dla tieru.
    pub async fn punish(&self, msg: &GroupMessage, tier: SanctionTier) {
        let warning = self.table.warning(tier, self.recall_delay);
        self.punish_with(msg, tier, &warning).await;
    }

    /// Wycofaj wiadomość, wycisz autora, wyślij ostrzeżenie i zaplanuj jego usunięcie.
    /// Każdy krok niezależnie: błąd jednego nie blokuje pozostałych.
    pub async fn punish_with(&self, msg: &GroupMessage, tier: SanctionTier, warning: &str) {
        let (group_id, user_id) = (msg.group_id, msg.user_id);

        if let Err(e) = self.platform.delete_msg(msg.message_id).await {
            warn!(group_id, user_id, message_id = msg.message_id, error = %e, "recall of offending message failed");
        }

        let duration = self.table.duration_secs(tier);
        match self.platform.set_group_ban(group_id, user_id, duration).await {
            Ok(()) => info!(group_id, user_id, ?tier, duration, "user muted"),
            Err(e) => warn!(group_id, user_id, ?tier, error = %e, "mute failed"),
        }

        match self.platform.send_group_msg(group_id, warning).await {
            Ok(Some(id)) => {
                self.recalls.schedule(id, self.recall_delay);
            }
            Ok(None) => debug!(group_id, "warning sent without message id, cannot schedule recall"),
            Err(e) => warn!(group_id, error = %e, "sending warning failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tiers() {
        let t = SanctionTable::default();
        assert_eq!(t.duration_secs(SanctionTier::Text), 600);
        assert_eq!(t.duration_secs(SanctionTier::Video), 900);
        assert_eq!(t.duration_secs(SanctionTier::Forward), 300);
        assert_eq!(t.duration_secs(SanctionTier::Poke), 10_800);
        assert_eq!(t.duration_secs(SanctionTier::Advertisement), 86_400);
        assert_eq!(t.duration_secs(SanctionTier::Mixed), 600);
    }

    #[test]
    fn overrides_win() {
        let t = SanctionTable::new(HashMap::from([(SanctionTier::Text, 60)]));
        assert_eq!(t.duration_secs(SanctionTier::Text), 60);
        assert_eq!(t.duration_secs(SanctionTier::Image), 600);
    }

    #[test]
    fn content_kind_maps_to_tier() {
        assert_eq!(SanctionTier::for_content(ContentKind::Audio), SanctionTier::Audio);
        assert_eq!(SanctionTier::for_content(ContentKind::Unsupported), SanctionTier::Unknown);
    }

    #[test]
    fn warning_mentions_durations() {
        let t = SanctionTable::default();
        let w = t.warning(SanctionTier::Text, Duration::from_secs(60));
        assert!(w.contains("10 min"), "{w}");
        assert!(w.contains("1 min"), "{w}");
        let w = t.warning(SanctionTier::Advertisement, Duration::from_secs(60));
        assert!(w.contains("24 h"), "{w}");
    }

    #[test]
    fn hint_goes_before_recall_notice() {
        let t = SanctionTable::default();
        let w = t.warning_with_hint(SanctionTier::Chat, Duration::from_secs(60), "Go to the chat group.");
        assert_eq!(
            w,
            "⚠️ Chat content detected, muted for 30 min. Go to the chat group. This notice disappears in 1 min."
        );
        assert_eq!(
            t.warning_with_hint(SanctionTier::Chat, Duration::from_secs(60), "  "),
            t.warning(SanctionTier::Chat, Duration::from_secs(60))
        );
    }
}
