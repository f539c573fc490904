pub mod fingerprint;
pub mod parser;
pub mod cleaner;
pub mod dedup;
pub mod images;

pub use cleaner::clean;
pub use dedup::{has_duplicate, is_duplicate_chat, is_duplicate_fragment};
pub use fingerprint::{fingerprint, fingerprint_bytes};
pub use images::{detect_image_extension, retrieve, RetrieveOutcome};
pub use parser::{parse, ParsedFragment};

use std::path::Path;

use reqwest::Client;
use serde::Deserialize;

use crate::db::Db;
use crate::error::{Result, ChatsnipError};
use crate::model::{Element, Payload};
use crate::store;

/// One submission from the capture client, as posted to the ingestion
/// endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(default)]
    pub api_key: Option<String>,
    pub chat_id: String,
    #[serde(default)]
    pub chat_name: Option<String>,
    pub content: Payload,
    #[serde(default)]
    pub markdown: Option<String>,
}

/// Result of processing one submission.
#[derive(Debug, PartialEq)]
pub enum IngestOutcome {
    /// Payload unchanged and every image already retrieved; nothing written.
    Duplicate,
    Saved {
        /// Which of chat/images/code persisted at least one change, in that order.
        categories: Vec<&'static str>,
        /// At least one image fetch came back non-success.
        images_warning: bool,
    },
}

impl IngestOutcome {
    /// Human-readable status line returned to the submitting client.
    pub fn status_message(&self) -> String {
        match self {
            IngestOutcome::Duplicate => "Duplicate content.".to_string(),
            IngestOutcome::Saved {
                categories,
                images_warning,
            } => {
                let mut message = format!("Process done. Saved {}.", categories.join(" & "));
                if *images_warning {
                    message.push_str(" Some images could not be downloaded.");
                }
                message
            }
        }
    }
}

/// Language identification is a stub returning a constant tag.
pub fn identify_language(_content: &str) -> &'static str {
    "python"
}

/// Default chat name when the client supplies none: the current date and
/// time in a human-readable form.
fn pretty_date() -> String {
    chrono::Local::now().format("%A, %B %d, %Y %I:%M %p").to_string()
}

/// A code unit headed for the dedup gate, either a structured code element
/// or a fragment recovered from raw text.
#[derive(Debug)]
struct CodeCandidate {
    filename: Option<String>,
    language: Option<String>,
    content: String,
}

/// Split structured elements into image references and code candidates;
/// text runs and unknown elements carry nothing to persist.
fn partition_elements(elements: &[Element]) -> (Vec<(String, Option<String>)>, Vec<CodeCandidate>) {
    let mut image_refs = Vec::new();
    let mut candidates = Vec::new();

    for element in elements {
        match element {
            Element::Image { src, content } => {
                image_refs.push((src.clone(), content.clone()));
            }
            Element::Code {
                filename,
                language,
                content,
            } => {
                candidates.push(CodeCandidate {
                    filename: filename.clone(),
                    language: Some(language.clone()),
                    content: content.clone(),
                });
            }
            Element::Text { .. } | Element::Other(_) => {}
        }
    }

    (image_refs, candidates)
}

/// Process one submission end to end.
///
/// Authenticates the API key, resolves or creates the chat, short-circuits
/// unchanged resubmissions, retrieves images (rewriting relocated references
/// into the stored payload and markdown before any code is written), then
/// pushes each cleaned fragment through the dedup gate.
///
/// Chat, image, and fragment writes are independent steps; a failure in a
/// later step does not undo an earlier one.
pub async fn ingest_submission(
    db: &Db,
    client: &Client,
    media_dir: &Path,
    submission: Submission,
) -> Result<IngestOutcome> {
    // 1. Authenticate, fail closed before any side effect
    let api_key = submission
        .api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or(ChatsnipError::ApiKeyMissing)?;
    let profile = store::profiles::find_by_api_key(db, api_key)
        .await?
        .ok_or(ChatsnipError::InvalidApiKey)?;

    let chat_name = submission.chat_name.clone().unwrap_or_else(pretty_date);
    let payload_text = submission.content.canonical_text();
    let markdown = submission.markdown.as_deref();

    // 2. Resolve or create the chat; short-circuit unchanged resubmissions
    let existing =
        store::chats::find_by_external_id(db, &submission.chat_id, profile.profile_id).await?;
    let chat = match existing {
        Some(existing) => {
            if dedup::is_duplicate_chat(&existing, &payload_text) && existing.images_downloaded {
                log::debug!("Duplicate chat content for {}", submission.chat_id);
                return Ok(IngestOutcome::Duplicate);
            }
            let chat = store::chats::get_or_create(
                db,
                &submission.chat_id,
                &chat_name,
                profile.profile_id,
                &submission.content,
                markdown,
            )
            .await?;
            // Even a partial match overwrites: the stored payload is always
            // the most recent submission
            store::chats::update_payload(db, chat.chat_id, &submission.content, markdown).await?;
            chat
        }
        None => {
            store::chats::get_or_create(
                db,
                &submission.chat_id,
                &chat_name,
                profile.profile_id,
                &submission.content,
                markdown,
            )
            .await?
        }
    };
    let mut categories = vec!["chat"];

    // 3. Partition structured elements, or recover fragments from raw text
    let (image_refs, code_candidates) = match &submission.content {
        Payload::Structured(elements) => partition_elements(elements),
        Payload::Raw(text) => {
            let candidates = parser::parse(text)
                .into_iter()
                .map(|fragment| CodeCandidate {
                    filename: fragment.filename,
                    language: None,
                    content: fragment.code,
                })
                .collect();
            (Vec::new(), candidates)
        }
    };

    // 4. Images first, so no persisted code ever references a stale URL
    let mut images_warning = false;
    if image_refs.is_empty() {
        store::chats::set_images_downloaded(db, chat.chat_id, true).await?;
    } else {
        let summary =
            images::retrieve_all(db, client, media_dir, chat.chat_id, &image_refs).await?;
        images_warning = summary.any_failed;

        if !summary.replacements.is_empty() {
            let rewritten_payload = submission.content.replace_references(&summary.replacements);
            let rewritten_markdown = submission.markdown.as_ref().map(|md| {
                let mut md = md.clone();
                for (old, new) in &summary.replacements {
                    md = md.replace(old, new);
                }
                md
            });
            store::chats::update_references(
                db,
                chat.chat_id,
                &rewritten_payload,
                rewritten_markdown.as_deref(),
            )
            .await?;
        }
        if summary.any_fetched {
            categories.push("images");
        }

        if !summary.any_failed {
            store::chats::set_images_downloaded(db, chat.chat_id, true).await?;
        }
    }

    // 5. Fragments through the dedup gate; earlier writes are visible to
    // later checks, which is what collapses the parser's heuristic overlap
    let mut code_saved = false;
    for candidate in code_candidates {
        let cleaned = cleaner::clean(&candidate.content);
        if cleaned.trim().is_empty() {
            continue;
        }
        if dedup::is_duplicate_fragment(db, chat.chat_id, candidate.filename.as_deref(), &cleaned)
            .await?
        {
            log::debug!(
                "Duplicate code fragment skipped (filename: {:?})",
                candidate.filename
            );
            continue;
        }
        let language = candidate
            .language
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| identify_language(&cleaned).to_string());
        store::fragments::insert(
            db,
            chat.chat_id,
            candidate.filename.as_deref(),
            Some(&language),
            &cleaned,
        )
        .await?;
        code_saved = true;
    }
    if code_saved {
        categories.push("code");
    }

    Ok(IngestOutcome::Saved {
        categories,
        images_warning,
    })
}
