// src/detectors/chat.rs
//! Grupa jest na treści "do przekazania" (pasty, memy, cytaty). Zwykły czat → wyciszenie
//! i odesłanie do grupy czatowej.
//!
//! Najpierw tanie heurystyki; dopiero niejednoznaczny tekst idzie do klasyfikatora.
//! Brak/awaria klasyfikatora → przepuszczamy.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Detector, DetectorKind, Verdict};
use crate::config::ChatConfig;
use crate::classifier::TextClassifier;
use crate::fingerprint::truncate_chars;
use crate::onebot::{GroupMessage, Segment};
use crate::sanction::SanctionTier;

/// Poniżej tej długości (w znakach) tekst bez klasyfikacji uznajemy za czat.
const SHORT_TEXT_CHARS: usize = 10;
const REPEATED_CHAR_MIN: usize = 5;

const SYSTEM_PROMPT: &str = r#"你是一个专门判断消息类型的助手。你的任务是判断用户发送的消息是否为"转发文案"。

转发文案的特征：
1. 段子、笑话、梗图配文
2. 心灵鸡汤、励志语录
3. 广告文案、营销文字
4. 表情包配文、网络流行语
5. 长篇故事、小说片段
6. 复制粘贴的文字内容
7. 明显的转发分享内容
8. 诗词、歌词等文艺作品

纯聊天的特征：
1. 日常对话、问候
2. 询问具体问题
3. 回应他人消息
4. 表达个人感受或想法
5. 讨论当前话题
6. 个人化的交流内容

请只回答"转发文案"或"纯聊天"，不要有其他解释。"#;

const FORWARD_INDICATORS: &[&str] = &[
    "转发文案", "转发", "文案", "段子", "笑话", "流行语", "forward", "copy", "paste", "meme", "joke",
];

const CHAT_INDICATORS: &[&str] = &[
    "纯聊天", "聊天", "对话", "交流", "个人", "日常", "chat", "conversation", "personal", "daily",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Forward,
    Chat,
    Unclear,
}

/// Wskaźniki "forward" mają pierwszeństwo (np. "不是纯聊天，是转发文案").
pub fn parse_answer(raw: &str) -> Answer {
    let lower = raw.trim().to_lowercase();
    if FORWARD_INDICATORS.iter().any(|k| lower.contains(k)) {
        Answer::Forward
    } else if CHAT_INDICATORS.iter().any(|k| lower.contains(k)) {
        Answer::Chat
    } else {
        Answer::Unclear
    }
}

fn user_prompt(text: &str) -> String {
    format!(
        "请判断以下消息是\"转发文案\"还是\"纯聊天\"：\n\n消息内容：\"{text}\"\n\n这是转发文案还是纯聊天？请回答\"转发文案\"或\"纯聊天\"。"
    )
}

pub struct ChatDetector {
    min_length: usize,
    command_prefixes: Vec<String>,
    test_strings: Vec<String>,
    classifier: Option<Arc<dyn TextClassifier>>,
    warning: String,
}

impl ChatDetector {
    pub fn new(cfg: &ChatConfig, classifier: Option<Arc<dyn TextClassifier>>, warning: impl Into<String>) -> Self {
        Self {
            min_length: cfg.min_length,
            command_prefixes: cfg
                .command_prefixes
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect(),
            test_strings: cfg.test_strings.iter().map(|s| s.trim().to_lowercase()).collect(),
            classifier,
            warning: warning.into(),
        }
    }

    /// Komendy, same cyfry/symbole, powtórzony znak, teksty testowe.
    pub fn is_obviously_chat(&self, text: &str) -> bool {
        if self.command_prefixes.iter().any(|p| text.starts_with(p.as_str())) {
            return true;
        }
        if text.chars().all(char::is_numeric) || !text.chars().any(char::is_alphanumeric) {
            return true;
        }
        let mut chars = text.chars();
        if let Some(first) = chars.next() {
            if text.chars().count() > REPEATED_CHAR_MIN && chars.all(|c| c == first) {
                return true;
            }
        }
        let lower = text.to_lowercase();
        self.test_strings.iter().any(|t| *t == lower)
    }

    fn intercept(&self) -> Verdict {
        Verdict::Intercept {
            tier: SanctionTier::Chat,
            warning: Some(self.warning.clone()),
        }
    }

    async fn judge(&self, text: &str) -> Verdict {
        if text.is_empty() || text.chars().count() < self.min_length {
            return Verdict::Pass;
        }
        if self.is_obviously_chat(text) {
            return self.intercept();
        }

        let Some(classifier) = self.classifier.as_ref().filter(|c| c.is_available()) else {
            return Verdict::Pass;
        };
        if text.chars().count() < SHORT_TEXT_CHARS {
            return self.intercept();
        }

        match classifier.classify(SYSTEM_PROMPT, &user_prompt(text)).await {
            Ok(answer) => {
                let parsed = parse_answer(&answer);
                debug!(text = %truncate_chars(text, 50), %answer, ?parsed, "chat classification");
                match parsed {
                    Answer::Chat => self.intercept(),
                    Answer::Forward => Verdict::Pass,
                    Answer::Unclear => {
                        warn!(%answer, "unparseable classifier answer, message let through");
                        Verdict::Pass
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "classifier call failed, message let through");
                Verdict::Pass
            }
        }
    }
}

#[async_trait]
impl Detector for ChatDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Chat
    }

    async fn check(&self, msg: &GroupMessage) -> anyhow::Result<Verdict> {
        // tylko czysty tekst (wzmianki/odpowiedzi nie przeszkadzają)
        let text_only = msg
            .segments
            .iter()
            .filter(|s| s.carries_content())
            .all(|s| matches!(s, Segment::Text { .. }));
        if !text_only {
            return Ok(Verdict::Pass);
        }
        let text = msg.plain_text();
        Ok(self.judge(text.trim()).await)
    }
}
