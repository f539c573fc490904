//! Dedup gate: fingerprint-based duplicate decisions for chats and fragments.
//!
//! Checks read the persisted rows without locks; a write proceeds if its check
//! passed. Two concurrent identical submissions can therefore both pass and
//! both insert, leaving one harmless duplicate row. That window is accepted.

use rusqlite::params;

use crate::db::Db;
use crate::error::{Result, ChatsnipError};
use crate::ingest::fingerprint::fingerprint;
use crate::ingest::parser::ParsedFragment;
use crate::model::Chat;

/// True iff the new payload fingerprints identically to what the chat already
/// stores. Used to short-circuit reprocessing of an unchanged resubmission.
pub fn is_duplicate_chat(chat: &Chat, new_payload_text: &str) -> bool {
    chat.checksum == fingerprint(new_payload_text)
}

/// True iff the chat already holds a fragment with the same filename (both
/// absent counts as same) and the same content fingerprint.
///
/// Filename is part of the key: identical code under a different filename is
/// a new fragment, not a duplicate.
pub async fn is_duplicate_fragment(
    db: &Db,
    chat_id: i64,
    filename: Option<&str>,
    new_code: &str,
) -> Result<bool> {
    let new_checksum = fingerprint(new_code);
    let filename = filename.map(|f| f.to_string());

    db.with_connection(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT COUNT(*) FROM code_fragments
             WHERE chat_id = ?1 AND filename IS ?2 AND checksum = ?3",
        )?;
        let count: i64 = stmt.query_row(params![chat_id, filename, new_checksum], |row| {
            row.get(0)
        })?;
        Ok::<bool, ChatsnipError>(count > 0)
    })
    .await
}

/// In-memory analogue of the fragment check, for candidate lists that have no
/// persisted rows yet. Linear scan over entries sharing the candidate's
/// filename, comparing fingerprints only.
pub fn has_duplicate(existing: &[ParsedFragment], candidate: &ParsedFragment) -> bool {
    let candidate_checksum = fingerprint(&candidate.code);
    existing
        .iter()
        .filter(|fragment| fragment.filename == candidate.filename)
        .any(|fragment| fingerprint(&fragment.code) == candidate_checksum)
}
