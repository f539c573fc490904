//! Remote image retrieval: fetch, fingerprint, dedup, and store chat images.
//!
//! Retrieval is at-most-once per (chat, URL) and per (chat, fingerprint), and
//! a blacklisted URL is never fetched again for any chat. Failures are
//! reported to the caller as outcomes; nothing here retries.

use std::collections::HashMap;
use std::path::Path;

use reqwest::Client;
use url::Url;
use uuid::Uuid;

use crate::db::Db;
use crate::error::{Result, ChatsnipError};
use crate::ingest::fingerprint::fingerprint_bytes;
use crate::model::ChatImage;
use crate::store;

/// Result of one retrieval attempt.
#[derive(Debug)]
pub enum RetrieveOutcome {
    /// This chat already stores this URL, or this chat already stores the
    /// same bytes under another URL. Nothing fetched or written.
    AlreadyPresent,
    /// The URL is blacklisted; no network call was made.
    Blacklisted,
    /// New binary stored.
    Fetched(ChatImage),
    /// The remote answered with a non-success status. Not retried.
    FetchFailed(u16),
}

/// Sniff the image format from leading bytes. Any filename-supplied
/// extension is ignored; an unrecognized format simply gets no extension.
pub fn detect_image_extension(header: &[u8]) -> Option<&'static str> {
    if header.starts_with(b"\xff\xd8") {
        Some(".jpg")
    } else if header.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(".png")
    } else if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
        Some(".gif")
    } else if header.len() >= 12 && &header[..4] == b"RIFF" && &header[8..12] == b"WEBP" {
        Some(".webp")
    } else if header.len() >= 12 && &header[4..8] == b"ftyp" && &header[8..12] == b"avif" {
        // ISO-BMFF: box size, then "ftyp", then the major brand
        Some(".avif")
    } else {
        None
    }
}

/// Collision-free local file name: random token plus the sniffed extension.
pub fn unique_image_name(extension: Option<&str>) -> String {
    format!("{}{}", Uuid::new_v4().simple(), extension.unwrap_or(""))
}

/// Public reference under which a stored binary is served back.
pub fn media_url(local_path: &str) -> String {
    format!("/media/{}", local_path)
}

/// Retrieve a remote image for a chat.
///
/// Short-circuits on the chat+URL key, then the blacklist, then (after the
/// fetch) the chat+fingerprint key, so the same image reposted under a
/// different link is not stored twice. The binary lands under
/// `media_dir/chat_images/<chat_id>/` with a sniffed extension.
pub async fn retrieve(
    db: &Db,
    client: &Client,
    media_dir: &Path,
    chat_id: i64,
    source_url: &str,
    title: Option<&str>,
    description: Option<&str>,
) -> Result<RetrieveOutcome> {
    if store::images::exists_for_url(db, chat_id, source_url).await? {
        return Ok(RetrieveOutcome::AlreadyPresent);
    }

    if store::images::is_blacklisted(db, source_url).await? {
        log::debug!("Skipping blacklisted image URL: {}", source_url);
        return Ok(RetrieveOutcome::Blacklisted);
    }

    let parsed = Url::parse(source_url)
        .map_err(|e| ChatsnipError::InvalidInput(format!("Invalid image URL {}: {}", source_url, e)))?;

    let response = client.get(parsed).send().await?;
    let status = response.status();
    if !status.is_success() {
        log::warn!("Image fetch failed for {}: HTTP {}", source_url, status.as_u16());
        return Ok(RetrieveOutcome::FetchFailed(status.as_u16()));
    }

    let bytes = response.bytes().await?;
    let checksum = fingerprint_bytes(&bytes);
    if store::images::exists_with_checksum(db, chat_id, &checksum).await? {
        return Ok(RetrieveOutcome::AlreadyPresent);
    }

    let name = unique_image_name(detect_image_extension(&bytes));
    let relative_dir = format!("chat_images/{}", chat_id);
    let dir = media_dir.join(&relative_dir);
    std::fs::create_dir_all(&dir).map_err(ChatsnipError::Io)?;
    std::fs::write(dir.join(&name), &bytes).map_err(ChatsnipError::Io)?;

    let local_path = format!("{}/{}", relative_dir, name);
    let image =
        store::images::insert(db, chat_id, source_url, title, description, &local_path, &checksum)
            .await?;

    log::debug!("Stored image {} as {}", source_url, local_path);
    Ok(RetrieveOutcome::Fetched(image))
}

/// Summary of one submission's image batch.
#[derive(Debug, Default)]
pub struct RetrievalSummary {
    /// Old source reference to new local reference, for every image this
    /// chat now holds (freshly fetched or already stored under the URL).
    pub replacements: HashMap<String, String>,
    /// At least one new binary was stored.
    pub any_fetched: bool,
    /// At least one fetch came back non-success.
    pub any_failed: bool,
}

/// Retrieve every image element of a submission, in order.
///
/// A failed fetch never aborts the rest of the batch. Already-present URLs
/// still contribute a replacement mapping from their stored row, so a
/// resubmitted payload gets its references rewritten to the local copies
/// again after the overwrite.
pub async fn retrieve_all(
    db: &Db,
    client: &Client,
    media_dir: &Path,
    chat_id: i64,
    images: &[(String, Option<String>)],
) -> Result<RetrievalSummary> {
    let mut summary = RetrievalSummary::default();

    for (src, caption) in images {
        match retrieve(db, client, media_dir, chat_id, src, None, caption.as_deref()).await? {
            RetrieveOutcome::Fetched(image) => {
                summary
                    .replacements
                    .insert(src.clone(), media_url(&image.local_path));
                summary.any_fetched = true;
            }
            RetrieveOutcome::AlreadyPresent => {
                // Known under this URL: reuse the stored location. The same
                // bytes stored under a different URL leave no mapping.
                if let Some(image) = store::images::find_by_url(db, chat_id, src).await? {
                    summary
                        .replacements
                        .insert(src.clone(), media_url(&image.local_path));
                }
            }
            RetrieveOutcome::FetchFailed(status) => {
                log::warn!("Image {} not retrieved (HTTP {})", src, status);
                summary.any_failed = true;
            }
            RetrieveOutcome::Blacklisted => {}
        }
    }

    Ok(summary)
}
