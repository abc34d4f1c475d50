// src/forward.rs
//! Rozwijanie wiadomości przekazanych (forward) + wykrywanie reklam grup.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

use crate::config::ForwardConfig;
use crate::fingerprint::truncate_chars;
use crate::onebot::{ForwardNode, GroupActions, Segment};

const PLACEHOLDER_MAX: usize = 50;
const MAX_DEPTH: usize = 4;

// Karty JSON w raw_message przychodzą jako CQ code: [CQ:json,data={...}]
static RE_CQ_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[CQ:json,data=([^\]]*)\]").expect("cq json regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedForward {
    /// Spłaszczona treść; `None` = nie udało się zweryfikować.
    pub content: Option<String>,
    pub is_advertisement: bool,
}

impl ResolvedForward {
    fn unresolved() -> Self {
        Self::default()
    }
}

pub struct ForwardResolver {
    platform: Arc<dyn GroupActions>,
    ad_keywords: Vec<String>,
    card_indicators: Vec<String>,
    cache: Cache<String, ResolvedForward>,
}

impl ForwardResolver {
    pub fn new(platform: Arc<dyn GroupActions>, cfg: &ForwardConfig) -> Self {
        Self {
            platform,
            ad_keywords: normalize_all(&cfg.ad_keywords),
            card_indicators: normalize_all(&cfg.card_indicators),
            cache: Cache::builder()
                .max_capacity(1024)
                .time_to_live(Duration::from_secs(cfg.cache_ttl_secs.max(1)))
                .build(),
        }
    }

    /// Pobiera zagnieżdżone wiadomości i je ocenia. Błędy pobrania → `content: None`.
    pub async fn resolve(&self, forward_id: &str) -> ResolvedForward {
        if let Some(hit) = self.cache.get(forward_id).await {
            debug!(%forward_id, "forward resolved from cache");
            return hit;
        }

        let nodes = match self.platform.get_forward_msg(forward_id).await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(%forward_id, error = %e, "get_forward_msg failed");
                return ResolvedForward::unresolved();
            }
        };
        if nodes.is_empty() {
            return ResolvedForward::unresolved();
        }

        let out = self.inspect(&nodes);
        // cache'ujemy tylko udane rozwinięcia
        self.cache.insert(forward_id.to_string(), out.clone()).await;
        out
    }

    /// Czysta część: skan reklam, a jeśli czysto – spłaszczenie treści.
    pub fn inspect(&self, nodes: &[ForwardNode]) -> ResolvedForward {
        if self.contains_advertisement(nodes, 0) {
            return ResolvedForward {
                content: None,
                is_advertisement: true,
            };
        }
        let parts = flatten(nodes);
        ResolvedForward {
            content: (!parts.is_empty()).then(|| parts.join("|")),
            is_advertisement: false,
        }
    }

    fn contains_advertisement(&self, nodes: &[ForwardNode], depth: usize) -> bool {
        if depth > MAX_DEPTH {
            return false;
        }
        for node in nodes {
            if let Some(raw) = node.raw_message.as_deref().filter(|r| !r.is_empty()) {
                if self.matches_ad(raw) {
                    return true;
                }
                for cap in RE_CQ_JSON.captures_iter(raw) {
                    if self.matches_card(&unescape_cq(&cap[1])) {
                        return true;
                    }
                }
            }
            for seg in &node.message {
                let hit = match seg {
                    Segment::Text { text } => self.matches_ad(text),
                    Segment::Json { data } => self.matches_card(data) || self.matches_ad(data),
                    Segment::Forward {
                        content: Some(inner),
                        ..
                    } => self.contains_advertisement(inner, depth + 1),
                    _ => false,
                };
                if hit {
                    return true;
                }
            }
        }
        false
    }

    fn matches_ad(&self, text: &str) -> bool {
        let norm = normalize(text);
        self.ad_keywords.iter().any(|k| norm.contains(k.as_str()))
    }

    fn matches_card(&self, payload: &str) -> bool {
        let norm = normalize(payload);
        self.card_indicators.iter().any(|k| norm.contains(k.as_str()))
    }
}

fn flatten(nodes: &[ForwardNode]) -> Vec<String> {
    let mut parts = Vec::new();
    for node in nodes {
        if let Some(raw) = node.raw_message.as_deref().filter(|r| !r.is_empty()) {
            parts.push(raw.to_string());
            continue;
        }
        for seg in &node.message {
            match seg {
                Segment::Text { text } if !text.is_empty() => parts.push(text.clone()),
                Segment::Image(m) => parts.push(format!(
                    "[image:{}]",
                    truncate_chars(m.identifier().unwrap_or_default(), PLACEHOLDER_MAX)
                )),
                Segment::Json { data } => {
                    parts.push(format!("[json:{}]", truncate_chars(data, PLACEHOLDER_MAX)))
                }
                _ => {}
            }
        }
    }
    parts
}

/// NFKC + małe litery – "ＱＱ群" i "qq群" to to samo.
fn normalize(s: &str) -> String {
    s.nfkc().collect::<String>().to_lowercase()
}

fn normalize_all(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| normalize(s))
        .filter(|s| !s.is_empty())
        .collect()
}

fn unescape_cq(s: &str) -> String {
    s.replace("&#44;", ",")
        .replace("&#91;", "[")
        .replace("&#93;", "]")
        .replace("&amp;", "&")
}
