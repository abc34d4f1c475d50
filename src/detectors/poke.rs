use async_trait::async_trait;

use super::{Detector, DetectorKind, Verdict};
use crate::onebot::{GroupMessage, Segment};
use crate::sanction::SanctionTier;

/// Zaczepki ("poke") w grupie są zakazane.
pub struct PokeDetector {
    warning: String,
}

impl PokeDetector {
    pub fn new(warning: impl Into<String>) -> Self {
        Self {
            warning: warning.into(),
        }
    }

    fn contains_poke(segments: &[Segment]) -> bool {
        segments.iter().any(|s| match s {
            Segment::Poke { .. } => true,
            // warianty typu "shake"/"poke_v2" itp. z różnych adapterów
            Segment::Other { kind, .. } => kind.to_ascii_lowercase().contains("poke"),
            _ => false,
        })
    }
}

#[async_trait]
impl Detector for PokeDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Poke
    }

    async fn check(&self, msg: &GroupMessage) -> anyhow::Result<Verdict> {
        if !Self::contains_poke(&msg.segments) {
            return Ok(Verdict::Pass);
        }
        Ok(Verdict::Intercept {
            tier: SanctionTier::Poke,
            warning: Some(self.warning.clone()),
        })
    }
}
