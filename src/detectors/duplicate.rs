//! Ta sama treść od tego samego autora w tej samej grupie w ciągu 24h → wyciszenie.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Detector, DetectorKind, Verdict};
use crate::dupstore::DuplicateWindow;
use crate::fingerprint::{ContentFingerprint, Fingerprint, Fingerprinter, forward_fingerprint};
use crate::forward::ForwardResolver;
use crate::onebot::GroupMessage;
use crate::sanction::SanctionTier;

pub struct DuplicateDetector {
    fingerprinter: Fingerprinter,
    resolver: Arc<ForwardResolver>,
    window: Arc<DuplicateWindow>,
}

impl DuplicateDetector {
    pub fn new(fingerprinter: Fingerprinter, resolver: Arc<ForwardResolver>, window: Arc<DuplicateWindow>) -> Self {
        Self {
            fingerprinter,
            resolver,
            window,
        }
    }

    async fn lookup(&self, msg: &GroupMessage, fp: ContentFingerprint) -> Verdict {
        match self.window.check_and_record(msg.group_id, msg.user_id, &fp).await {
            Ok(Some(prev)) => {
                debug!(
                    group_id = msg.group_id,
                    user_id = msg.user_id,
                    preview = %prev.preview,
                    first_seen = %prev.created_at,
                    "duplicate content"
                );
                Verdict::intercept(SanctionTier::for_content(fp.kind))
            }
            Ok(None) => Verdict::Pass,
            Err(e) => {
                // magazyn niedostępny → nie karzemy
                warn!(group_id = msg.group_id, user_id = msg.user_id, error = %e, "duplicate store failed");
                Verdict::Pass
            }
        }
    }
}

#[async_trait]
impl Detector for DuplicateDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Duplicate
    }

    async fn check(&self, msg: &GroupMessage) -> anyhow::Result<Verdict> {
        let fp = match self.fingerprinter.fingerprint(&msg.segments) {
            None => return Ok(Verdict::intercept(SanctionTier::Unknown)),
            Some(Fingerprint::Ready(fp)) => fp,
            Some(Fingerprint::PendingForward { forward_id, preview }) => {
                let resolved = self.resolver.resolve(&forward_id).await;
                if resolved.is_advertisement {
                    return Ok(Verdict::intercept(SanctionTier::Advertisement));
                }
                forward_fingerprint(resolved.content.as_deref(), &preview)
            }
        };
        Ok(self.lookup(msg, fp).await)
    }
}
