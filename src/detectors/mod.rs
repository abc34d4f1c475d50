// src/detectors/mod.rs
//! Łańcuch detektorów: uruchamiane po kolei, pierwszy, który przechwyci wiadomość, kończy ocenę.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::onebot::{GroupActions, GroupMessage};
use crate::sanction::{Enforcer, SanctionTier};

pub mod chat;
pub mod duplicate;
pub mod poke;

pub use chat::ChatDetector;
pub use duplicate::DuplicateDetector;
pub use poke::PokeDetector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Poke,
    Duplicate,
    Chat,
}

impl DetectorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectorKind::Poke => "poke",
            DetectorKind::Duplicate => "duplicate",
            DetectorKind::Chat => "chat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Intercept {
        tier: SanctionTier,
        /// `None` → standardowe ostrzeżenie tieru.
        warning: Option<String>,
    },
}

impl Verdict {
    pub fn intercept(tier: SanctionTier) -> Self {
        Verdict::Intercept { tier, warning: None }
    }

    pub fn is_intercept(&self) -> bool {
        matches!(self, Verdict::Intercept { .. })
    }
}

#[async_trait]
pub trait Detector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    async fn check(&self, msg: &GroupMessage) -> anyhow::Result<Verdict>;
}

pub struct Pipeline {
    detectors: Vec<Arc<dyn Detector>>,
    enforcer: Arc<Enforcer>,
    platform: Arc<dyn GroupActions>,
}

impl Pipeline {
    /// Kolejność = kolejność w `detectors`; powtórzenia tego samego rodzaju są pomijane.
    pub fn new(
        detectors: Vec<Arc<dyn Detector>>,
        enforcer: Arc<Enforcer>,
        platform: Arc<dyn GroupActions>,
    ) -> Self {
        let mut seen = HashSet::new();
        let detectors = detectors
            .into_iter()
            .filter(|d| seen.insert(d.kind()))
            .collect();
        Self {
            detectors,
            enforcer,
            platform,
        }
    }

    pub fn order(&self) -> Vec<DetectorKind> {
        self.detectors.iter().map(|d| d.kind()).collect()
    }

    /// `true` = wiadomość przechwycona (i ukarana).
    pub async fn evaluate(&self, msg: &GroupMessage) -> bool {
        if !self.platform.is_available() {
            debug!(group_id = msg.group_id, "platform unavailable, message not evaluated");
            return false;
        }

        for det in &self.detectors {
            let detector = det.kind().as_str();
            let outcome = AssertUnwindSafe(det.check(msg)).catch_unwind().await;
            match outcome {
                Ok(Ok(Verdict::Pass)) => {}
                Ok(Ok(Verdict::Intercept { tier, warning })) => {
                    info!(
                        group_id = msg.group_id,
                        user_id = msg.user_id,
                        detector,
                        ?tier,
                        "message intercepted"
                    );
                    match warning {
                        Some(text) => self.enforcer.punish_with(msg, tier, &text).await,
                        None => self.enforcer.punish(msg, tier).await,
                    }
                    return true;
                }
                Ok(Err(e)) => {
                    warn!(group_id = msg.group_id, detector, error = ?e, "detector failed, message let through");
                }
                Err(_) => {
                    error!(group_id = msg.group_id, detector, "detector panicked, message let through");
                }
            }
        }
        false
    }
}
