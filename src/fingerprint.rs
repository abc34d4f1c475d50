// src/fingerprint.rs
//! Odcisk treści wiadomości: kanoniczna, niezależna od kolejności segmentów postać + SHA-256.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::onebot::{MediaRef, Segment};

const PREVIEW_MAX: usize = 80;
const PREVIEW_TEXT: usize = 30;
const PREVIEW_FORWARD_ID: usize = 20;

/// Token dla przekazanych wiadomości, których nie udało się pobrać.
const UNRESOLVED_FORWARD: &str = "forward:unresolved";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
    Video,
    Audio,
    File,
    Forward,
    Mixed,
    Unsupported,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
            ContentKind::Video => "video",
            ContentKind::Audio => "audio",
            ContentKind::File => "file",
            ContentKind::Forward => "forward",
            ContentKind::Mixed => "mixed",
            ContentKind::Unsupported => "unsupported",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "text" => ContentKind::Text,
            "image" => ContentKind::Image,
            "video" => ContentKind::Video,
            "audio" => ContentKind::Audio,
            "file" => ContentKind::File,
            "forward" => ContentKind::Forward,
            "mixed" => ContentKind::Mixed,
            "unsupported" => ContentKind::Unsupported,
            _ => return None,
        })
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 256-bitowy skrót kanonicznej treści.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FingerprintHash(pub [u8; 32]);

impl FingerprintHash {
    pub fn of(canonical: &str) -> Self {
        Self(Sha256::digest(canonical.as_bytes()).into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(raw: &str) -> Option<Self> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(raw, &mut out).ok()?;
        Some(Self(out))
    }
}

impl fmt::Display for FingerprintHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FingerprintHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FingerprintHash({}…)", &self.to_hex()[..12])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFingerprint {
    pub hash: FingerprintHash,
    pub kind: ContentKind,
    pub preview: String,
}

/// Wynik liczenia odcisku. Forward wymaga jeszcze pobrania treści (resolver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    Ready(ContentFingerprint),
    PendingForward { forward_id: String, preview: String },
}

#[derive(Debug, Clone, Default)]
pub struct Fingerprinter {
    ignored: HashSet<String>,
}

impl Fingerprinter {
    /// `ignored` – tagi segmentów pomijanych zamiast traktowania ich jako "nieobsługiwane".
    pub fn new<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: ignored
                .into_iter()
                .map(|s| s.into().to_ascii_lowercase())
                .collect(),
        }
    }

    /// `None` = nieobsługiwana treść (wołający nakłada sankcję "unknown", nigdy nie przepuszcza).
    pub fn fingerprint(&self, segments: &[Segment]) -> Option<Fingerprint> {
        let mut texts: Vec<&str> = Vec::new();
        let mut media_parts: Vec<String> = Vec::new();
        let mut media_kinds: Vec<ContentKind> = Vec::new();

        for seg in segments {
            if self.ignored.contains(seg.tag()) {
                continue;
            }
            match seg {
                Segment::Text { text } => {
                    let t = text.trim();
                    if !t.is_empty() {
                        texts.push(t);
                    }
                }
                Segment::Image(m) => push_media(ContentKind::Image, m, &mut media_parts, &mut media_kinds),
                Segment::Video(m) => push_media(ContentKind::Video, m, &mut media_parts, &mut media_kinds),
                Segment::Record(m) => push_media(ContentKind::Audio, m, &mut media_parts, &mut media_kinds),
                Segment::File(m) => push_media(ContentKind::File, m, &mut media_parts, &mut media_kinds),
                Segment::Forward { id, .. } => {
                    let id = id.trim();
                    if !id.is_empty() {
                        return Some(Fingerprint::PendingForward {
                            forward_id: id.to_string(),
                            preview: format!("forward:{}", truncate_chars(id, PREVIEW_FORWARD_ID)),
                        });
                    }
                    // forward bez id – widać go tylko w podglądzie
                    note_kind(ContentKind::Forward, &mut media_kinds);
                }
                _ => return None,
            }
        }

        let mut parts = Vec::with_capacity(media_parts.len() + 1);
        let joined_text = texts.join(" ");
        if !texts.is_empty() {
            parts.push(format!("text:{joined_text}"));
        }
        parts.extend(media_parts);
        if parts.is_empty() {
            return None;
        }
        parts.sort();
        let canonical = parts.join("|");

        let kind = match (texts.is_empty(), media_kinds.as_slice()) {
            (false, []) => ContentKind::Text,
            (true, [only]) => *only,
            _ => ContentKind::Mixed,
        };

        let mut preview_parts = Vec::new();
        if !texts.is_empty() {
            preview_parts.push(format!("text:{}", truncate_chars(&joined_text, PREVIEW_TEXT)));
        }
        if !media_kinds.is_empty() {
            preview_parts.push(
                media_kinds
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join("+"),
            );
        }

        Some(Fingerprint::Ready(ContentFingerprint {
            hash: FingerprintHash::of(&canonical),
            kind,
            preview: truncate_chars(&preview_parts.join("+"), PREVIEW_MAX),
        }))
    }
}

/// Odcisk przekazanej wiadomości po próbie pobrania: treść spłaszczona albo stały token.
pub fn forward_fingerprint(content: Option<&str>, preview: &str) -> ContentFingerprint {
    match content {
        Some(c) => ContentFingerprint {
            hash: FingerprintHash::of(&format!("forward-content:{c}")),
            kind: ContentKind::Forward,
            preview: truncate_chars(&format!("forward:{}", truncate_chars(c, PREVIEW_TEXT)), PREVIEW_MAX),
        },
        None => ContentFingerprint {
            hash: FingerprintHash::of(UNRESOLVED_FORWARD),
            kind: ContentKind::Forward,
            preview: truncate_chars(preview, PREVIEW_MAX),
        },
    }
}

fn push_media(kind: ContentKind, m: &MediaRef, parts: &mut Vec<String>, kinds: &mut Vec<ContentKind>) {
    note_kind(kind, kinds);
    if let Some(id) = m.identifier() {
        parts.push(format!("{}:{}", kind.as_str(), id));
    }
}

fn note_kind(kind: ContentKind, kinds: &mut Vec<ContentKind>) {
    if !kinds.contains(&kind) {
        kinds.push(kind);
    }
}

/// Przycięcie po znakach (nie bajtach).
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(fp: Option<Fingerprint>) -> ContentFingerprint {
        match fp {
            Some(Fingerprint::Ready(c)) => c,
            other => panic!("expected ready fingerprint, got {other:?}"),
        }
    }

    #[test]
    fn text_is_trimmed_and_joined() {
        let f = Fingerprinter::default();
        let a = ready(f.fingerprint(&[Segment::text("  hello "), Segment::text("world")]));
        let b = ready(f.fingerprint(&[Segment::text("hello world")]));
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.kind, ContentKind::Text);
        assert_eq!(a.preview, "text:hello world");
    }

    #[test]
    fn media_and_text_order_does_not_matter() {
        let f = Fingerprinter::default();
        let img = Segment::Image(MediaRef::with_file("abc.jpg"));
        let a = ready(f.fingerprint(&[Segment::text("look"), img.clone()]));
        let b = ready(f.fingerprint(&[img, Segment::text("look")]));
        assert_eq!(a, b);
        assert_eq!(a.kind, ContentKind::Mixed);
    }

    #[test]
    fn kind_for_homogeneous_media() {
        let f = Fingerprinter::default();
        let fp = ready(f.fingerprint(&[
            Segment::Image(MediaRef::with_file("a")),
            Segment::Image(MediaRef::with_file("b")),
        ]));
        assert_eq!(fp.kind, ContentKind::Image);
        let fp = ready(f.fingerprint(&[
            Segment::Image(MediaRef::with_file("a")),
            Segment::Record(MediaRef::with_file("b")),
        ]));
        assert_eq!(fp.kind, ContentKind::Mixed);
        let fp = ready(f.fingerprint(&[Segment::Record(MediaRef::with_file("v.amr"))]));
        assert_eq!(fp.kind, ContentKind::Audio);
    }

    #[test]
    fn media_without_identifier_only_shows_in_preview() {
        let f = Fingerprinter::default();
        let with_blank = ready(f.fingerprint(&[Segment::text("x"), Segment::Video(MediaRef::default())]));
        let plain = ready(f.fingerprint(&[Segment::text("x")]));
        assert_eq!(with_blank.hash, plain.hash);
        assert_eq!(with_blank.preview, "text:x+video");
        // sam segment bez identyfikatora nie daje nic do haszowania
        assert!(f.fingerprint(&[Segment::Image(MediaRef::default())]).is_none());
    }

    #[test]
    fn unsupported_segment_poisons_whole_message() {
        let f = Fingerprinter::default();
        assert!(f.fingerprint(&[Segment::text("hi"), Segment::Face { id: "1".into() }]).is_none());
        assert!(f.fingerprint(&[]).is_none());
        // chyba że typ jest na liście ignorowanych
        let lenient = Fingerprinter::new(["face"]);
        assert!(lenient.fingerprint(&[Segment::text("hi"), Segment::Face { id: "1".into() }]).is_some());
    }

    #[test]
    fn forward_short_circuits() {
        let f = Fingerprinter::default();
        let fp = f.fingerprint(&[
            Segment::text("see this"),
            Segment::Forward { id: "7391".into(), content: None },
        ]);
        assert_eq!(
            fp,
            Some(Fingerprint::PendingForward {
                forward_id: "7391".into(),
                preview: "forward:7391".into()
            })
        );
    }

    #[test]
    fn unresolved_forwards_share_one_token() {
        let a = forward_fingerprint(None, "forward:1");
        let b = forward_fingerprint(None, "forward:2");
        assert_eq!(a.hash, b.hash);
        let c = forward_fingerprint(Some("a|b"), "forward:3");
        assert_ne!(a.hash, c.hash);
        assert_eq!(c.kind, ContentKind::Forward);
    }

    #[test]
    fn hex_roundtrip_and_truncate() {
        let h = FingerprintHash::of("x");
        assert_eq!(FingerprintHash::from_hex(&h.to_hex()), Some(h));
        assert_eq!(FingerprintHash::from_hex("zz"), None);
        assert_eq!(truncate_chars("zażółć", 3), "zaż");
    }
}
