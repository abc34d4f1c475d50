//! Model zdarzeń OneBot v11 (format "array" wiadomości).
//!
//! Segment to jawny enum z dyskryminatorem – nieznane typy lądują w `Segment::Other`
//! zamiast "braku danych".

use serde::Deserialize;
use serde_json::Value;

pub type MessageId = i64;

/* =========================================
   Segmenty wiadomości
   ========================================= */

/// Identyfikatory mediów, które OneBot może podać w `data`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaRef {
    pub file: Option<String>,
    pub url: Option<String>,
    pub path: Option<String>,
    pub id: Option<String>,
}

impl MediaRef {
    fn from_data(data: &Value) -> Self {
        Self {
            file: str_field(data, "file"),
            url: str_field(data, "url"),
            path: str_field(data, "path"),
            id: str_field(data, "id"),
        }
    }

    /// Stabilny identyfikator: file → url → path → id (pierwszy niepusty).
    pub fn identifier(&self) -> Option<&str> {
        [&self.file, &self.url, &self.path, &self.id]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }

    pub fn with_file(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawSegment")]
pub enum Segment {
    Text { text: String },
    Image(MediaRef),
    Video(MediaRef),
    /// Wiadomość głosowa.
    Record(MediaRef),
    File(MediaRef),
    Forward {
        id: String,
        /// Niektóre implementacje (NapCat) osadzają od razu zagnieżdżone węzły.
        content: Option<Vec<ForwardNode>>,
    },
    Poke { kind: Option<String>, id: Option<String> },
    Face { id: String },
    At { qq: String },
    Reply { id: String },
    /// Karta strukturalna (udostępnienie grupy, mini-app itp.), surowy payload JSON jako tekst.
    Json { data: String },
    Other { kind: String, data: Value },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text { text: text.into() }
    }

    /// Tag typu tak, jak przyszedł z protokołu.
    pub fn tag(&self) -> &str {
        match self {
            Segment::Text { .. } => "text",
            Segment::Image(_) => "image",
            Segment::Video(_) => "video",
            Segment::Record(_) => "record",
            Segment::File(_) => "file",
            Segment::Forward { .. } => "forward",
            Segment::Poke { .. } => "poke",
            Segment::Face { .. } => "face",
            Segment::At { .. } => "at",
            Segment::Reply { .. } => "reply",
            Segment::Json { .. } => "json",
            Segment::Other { kind, .. } => kind,
        }
    }

    /// Czy segment niesie realną treść (a nie jest np. samą odpowiedzią/wzmianką).
    pub fn carries_content(&self) -> bool {
        match self {
            Segment::Text { text } => !text.trim().is_empty(),
            Segment::Image(_)
            | Segment::Video(_)
            | Segment::Record(_)
            | Segment::File(_)
            | Segment::Forward { .. }
            | Segment::Face { .. }
            | Segment::Poke { .. } => true,
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl From<RawSegment> for Segment {
    fn from(raw: RawSegment) -> Self {
        let data = raw.data;
        match raw.kind.to_ascii_lowercase().as_str() {
            "text" | "plain" => Segment::Text {
                text: str_field(&data, "text").unwrap_or_default(),
            },
            "image" => Segment::Image(MediaRef::from_data(&data)),
            "video" => Segment::Video(MediaRef::from_data(&data)),
            "record" => Segment::Record(MediaRef::from_data(&data)),
            "file" => Segment::File(MediaRef::from_data(&data)),
            "forward" => Segment::Forward {
                id: str_field(&data, "id").unwrap_or_default(),
                content: data
                    .get("content")
                    .and_then(|c| serde_json::from_value::<Vec<ForwardNode>>(c.clone()).ok()),
            },
            "poke" => Segment::Poke {
                kind: str_field(&data, "type"),
                id: str_field(&data, "id"),
            },
            "face" => Segment::Face {
                id: str_field(&data, "id").unwrap_or_default(),
            },
            "at" => Segment::At {
                qq: str_field(&data, "qq").unwrap_or_default(),
            },
            "reply" => Segment::Reply {
                id: str_field(&data, "id").unwrap_or_default(),
            },
            "json" => Segment::Json {
                data: match data.get("data") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                },
            },
            _ => Segment::Other {
                kind: raw.kind,
                data,
            },
        }
    }
}

/// OneBot potrafi podać to samo pole jako string albo liczbę.
fn str_field(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/* =========================================
   Węzły wiadomości przekazanej (forward)
   ========================================= */

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawForwardNode")]
pub struct ForwardNode {
    pub raw_message: Option<String>,
    pub message: Vec<Segment>,
}

impl ForwardNode {
    pub fn raw(raw_message: impl Into<String>) -> Self {
        Self {
            raw_message: Some(raw_message.into()),
            message: vec![],
        }
    }
}

// Implementacje różnią się nazwą pola z treścią węzła ("message" albo "content").
#[derive(Debug, Deserialize)]
struct RawForwardNode {
    #[serde(default)]
    raw_message: Option<String>,
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    content: Option<Value>,
}

impl From<RawForwardNode> for ForwardNode {
    fn from(raw: RawForwardNode) -> Self {
        let message = raw
            .message
            .or(raw.content)
            .and_then(|v| serde_json::from_value::<MessageBody>(v).ok())
            .map(MessageBody::into_segments)
            .unwrap_or_default();
        Self {
            raw_message: raw.raw_message,
            message,
        }
    }
}

fn de_segments<'de, D>(de: D) -> Result<Vec<Segment>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(MessageBody::deserialize(de)?.into_segments())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageBody {
    Array(Vec<Segment>),
    /// Format "string" (CQ code) – traktujemy jako czysty tekst.
    Text(String),
}

impl MessageBody {
    fn into_segments(self) -> Vec<Segment> {
        match self {
            MessageBody::Array(v) => v,
            MessageBody::Text(s) => vec![Segment::Text { text: s }],
        }
    }
}

/* =========================================
   Zdarzenia przychodzące
   ========================================= */

#[derive(Debug, Deserialize)]
#[serde(tag = "post_type", rename_all = "snake_case")]
pub enum InboundEvent {
    Message(MessageEvent),
    MetaEvent(MetaEvent),
    Notice(Value),
    Request(Value),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageEvent {
    pub message_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    pub message_id: MessageId,
    #[serde(default)]
    pub group_id: Option<i64>,
    pub user_id: i64,
    #[serde(default, deserialize_with = "de_segments")]
    pub message: Vec<Segment>,
    #[serde(default)]
    pub raw_message: String,
}

impl MessageEvent {
    /// Tylko wiadomości grupowe trafiają do moderacji.
    pub fn into_group_message(self) -> Option<GroupMessage> {
        if self.message_type != "group" {
            return None;
        }
        Some(GroupMessage {
            group_id: self.group_id?,
            user_id: self.user_id,
            message_id: self.message_id,
            segments: self.message,
            raw_message: self.raw_message,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaEvent {
    pub meta_event_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub status: Option<Value>,
}

/// Wiadomość grupowa w postaci, na której pracują detektory.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMessage {
    pub group_id: i64,
    pub user_id: i64,
    pub message_id: MessageId,
    pub segments: Vec<Segment>,
    pub raw_message: String,
}

impl GroupMessage {
    pub fn new(group_id: i64, user_id: i64, message_id: MessageId, segments: Vec<Segment>) -> Self {
        Self {
            group_id,
            user_id,
            message_id,
            segments,
            raw_message: String::new(),
        }
    }

    /// Sklejony tekst wszystkich segmentów tekstowych.
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Prawdziwa treść, a nie zdarzenie systemowe / pusty łańcuch.
    pub fn has_content(&self) -> bool {
        self.segments.iter().any(Segment::carries_content)
    }
}
