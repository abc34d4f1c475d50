// src/engine.rs
//! Silnik moderacji: składa detektory, ciszę nocną i sprzątanie magazynu w jedną całość.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::classifier::TextClassifier;
use crate::config::{CurfewConfig, Settings};
use crate::curfew::CurfewManager;
use crate::detectors::{ChatDetector, Detector, DetectorKind, DuplicateDetector, Pipeline, PokeDetector};
use crate::dupstore::{DuplicateStore, DuplicateWindow};
use crate::fingerprint::Fingerprinter;
use crate::forward::ForwardResolver;
use crate::onebot::{GroupActions, GroupMessage};
use crate::sanction::{Enforcer, RecallRegistry, SanctionTable, SanctionTier};

pub struct Engine {
    monitored: BTreeSet<i64>,
    curfew_cfg: CurfewConfig,
    pipeline: Pipeline,
    curfews: CurfewManager,
    window: Arc<DuplicateWindow>,
    recalls: Arc<RecallRegistry>,
    compaction_every: Duration,
    compaction: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn build(
        settings: &Settings,
        platform: Arc<dyn GroupActions>,
        store: Arc<dyn DuplicateStore>,
        classifier: Option<Arc<dyn TextClassifier>>,
    ) -> Self {
        let m = &settings.moderation;
        let recall_delay = Duration::from_secs(m.warning_recall_delay_secs);
        let table = SanctionTable::new(settings.sanctions.durations.clone());
        let chat_warning = table.warning_with_hint(SanctionTier::Chat, recall_delay, &settings.chat.redirect_hint);

        let recalls = Arc::new(RecallRegistry::new(platform.clone()));
        let enforcer = Arc::new(Enforcer::new(platform.clone(), table, recalls.clone(), recall_delay));

        let window = Arc::new(DuplicateWindow::with_hours(
            store,
            settings.duplicate.window_hours,
            settings.duplicate.retention_hours,
        ));
        let resolver = Arc::new(ForwardResolver::new(platform.clone(), &settings.forward));

        let mut detectors: Vec<Arc<dyn Detector>> = Vec::new();
        for kind in &m.order {
            match kind {
                DetectorKind::Poke if m.enable_poke_detection => {
                    detectors.push(Arc::new(PokeDetector::new(m.poke_warning_text.clone())));
                }
                DetectorKind::Duplicate if m.enable_duplicate_detection => {
                    detectors.push(Arc::new(DuplicateDetector::new(
                        Fingerprinter::new(settings.duplicate.ignored_segments.iter().cloned()),
                        resolver.clone(),
                        window.clone(),
                    )));
                }
                DetectorKind::Chat if m.enable_chat_detection => {
                    detectors.push(Arc::new(ChatDetector::new(
                        &settings.chat,
                        classifier.clone(),
                        chat_warning.clone(),
                    )));
                }
                other => debug!(detector = other.as_str(), "detector disabled"),
            }
        }
        let pipeline = Pipeline::new(detectors, enforcer, platform.clone());
        info!(order = ?pipeline.order(), "detector pipeline ready");

        Self {
            monitored: m.monitored_group_ids.clone(),
            curfew_cfg: settings.curfew.clone(),
            pipeline,
            curfews: CurfewManager::new(platform),
            window,
            recalls,
            compaction_every: Duration::from_secs(settings.duplicate.compaction_interval_secs.max(1)),
            compaction: Mutex::new(None),
        }
    }

    /// Startuje zadania tła: cisza nocna per grupa + okresowe sprzątanie magazynu.
    pub async fn start(&self) {
        let started = self
            .curfews
            .start_all(&self.curfew_cfg, self.monitored.iter().copied())
            .await;
        info!(curfews = started, groups = self.monitored.len(), "engine started");

        let mut slot = self.compaction.lock().await;
        if slot.is_none() {
            *slot = Some(spawn_compaction(self.window.clone(), self.compaction_every));
        }
    }

    /// Wiadomość z grupy → ocena. `true` = przechwycona.
    pub async fn handle_message(&self, msg: GroupMessage) -> bool {
        if !self.is_monitored(msg.group_id) {
            return false;
        }
        if !msg.has_content() {
            debug!(group_id = msg.group_id, message_id = msg.message_id, "empty message skipped");
            return false;
        }
        self.pipeline.evaluate(&msg).await
    }

    pub fn is_monitored(&self, group_id: i64) -> bool {
        self.monitored.contains(&group_id)
    }

    pub fn curfews(&self) -> &CurfewManager {
        &self.curfews
    }

    pub fn recalls(&self) -> &Arc<RecallRegistry> {
        &self.recalls
    }

    pub fn window(&self) -> &Arc<DuplicateWindow> {
        &self.window
    }

    /// Kolejność: cisza nocna (z odciszeniem), sprzątanie, oczekujące usunięcia ostrzeżeń.
    pub async fn shutdown(&self) {
        self.curfews.stop_all().await;
        if let Some(handle) = self.compaction.lock().await.take() {
            handle.abort();
        }
        self.recalls.drain();
        info!("engine stopped");
    }
}

fn spawn_compaction(window: Arc<DuplicateWindow>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        // pierwsze sprzątanie po pełnym okresie
        let mut interval = tokio::time::interval_at(Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = window.compact().await {
                warn!(error = %e, "duplicate store compaction failed");
            }
        }
    })
}
