use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A user profile holding the API key submissions authenticate with.
#[derive(Debug, Clone)]
pub struct Profile {
    pub profile_id: i64,
    pub username: String,
    pub api_key: String,
}

/// One element of a structured chat payload.
///
/// The wire format distinguishes elements by key presence: `src` marks an
/// image reference, `language` marks a code reference, bare `content` is a
/// text run. The untagged variants are tried in that order, so dispatch
/// happens on the tag instead of ad hoc key checks downstream. Anything
/// else (dividers, unknown element kinds) lands in `Other` and is carried
/// through untouched rather than rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Element {
    Image {
        src: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    Code {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        language: String,
        content: String,
    },
    Text {
        content: String,
    },
    Other(serde_json::Value),
}

/// A chat payload: either the legacy unstructured export text or the
/// structured element tree. The structured form is canonical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Structured(Vec<Element>),
    Raw(String),
}

impl Payload {
    /// Text form the chat fingerprint is computed over: the raw text itself,
    /// or the serialized element tree.
    pub fn canonical_text(&self) -> String {
        match self {
            Payload::Raw(text) => text.clone(),
            Payload::Structured(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }

    /// Replace every occurrence of each old reference with its new one, in
    /// the raw text or anywhere inside the serialized element tree.
    ///
    /// Keys are distinct source URLs, so replacement order does not matter.
    pub fn replace_references(&self, replacements: &HashMap<String, String>) -> Payload {
        match self {
            Payload::Raw(text) => {
                let mut text = text.clone();
                for (old, new) in replacements {
                    text = text.replace(old, new);
                }
                Payload::Raw(text)
            }
            Payload::Structured(_) => {
                let mut serialized = serde_json::to_string(self).unwrap_or_default();
                for (old, new) in replacements {
                    serialized = serialized.replace(old, new);
                }
                serde_json::from_str(&serialized).unwrap_or_else(|_| self.clone())
            }
        }
    }
}

/// A conversation transcript, the root owner of fragments and images.
#[derive(Debug, Clone)]
pub struct Chat {
    pub chat_id: i64,
    /// Client-supplied identifier, unique per owning profile.
    pub external_id: String,
    pub name: String,
    pub profile_id: i64,
    pub payload: Payload,
    pub markdown: Option<String>,
    /// Fingerprint of the payload at last save, never stale.
    pub checksum: String,
    pub images_downloaded: bool,
}

/// One retained version of a named (or anonymous) code unit within a chat.
#[derive(Debug, Clone)]
pub struct CodeFragment {
    pub fragment_id: i64,
    pub chat_id: i64,
    pub filename: Option<String>,
    pub language: Option<String>,
    pub source_code: String,
    pub checksum: String,
    pub selected: bool,
    pub created_at: DateTime<Utc>,
}

impl CodeFragment {
    /// Total order deciding which version of a filename is current:
    /// an explicitly selected fragment beats any timestamp, otherwise the
    /// newest wins.
    pub fn version_rank(&self) -> (bool, DateTime<Utc>) {
        (self.selected, self.created_at)
    }
}

/// Pick the current version per filename group.
pub fn current_versions(fragments: &[CodeFragment]) -> HashMap<Option<String>, &CodeFragment> {
    let mut groups: HashMap<Option<String>, Vec<&CodeFragment>> = HashMap::new();
    for fragment in fragments {
        groups.entry(fragment.filename.clone()).or_default().push(fragment);
    }

    groups
        .into_iter()
        .filter_map(|(filename, group)| {
            group
                .into_iter()
                .max_by_key(|f| f.version_rank())
                .map(|current| (filename, current))
        })
        .collect()
}

/// One retrieved remote image belonging to a chat.
#[derive(Debug, Clone)]
pub struct ChatImage {
    pub image_id: i64,
    pub chat_id: i64,
    pub source_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Media-relative path of the stored binary.
    pub local_path: String,
    pub checksum: String,
    pub blacklisted: bool,
}
