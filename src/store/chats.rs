use rusqlite::{params, Connection, OptionalExtension};

use crate::db::Db;
use crate::error::{Result, ChatsnipError};
use crate::ingest::fingerprint::fingerprint;
use crate::model::{Chat, Payload};

fn chat_from_columns(
    chat_id: i64,
    external_id: String,
    name: String,
    profile_id: i64,
    payload_json: String,
    markdown: Option<String>,
    checksum: String,
    images_downloaded: i64,
) -> Chat {
    // Payloads are written by this store, so a parse failure means external
    // tampering; degrade to raw text instead of refusing the row.
    let payload = serde_json::from_str(&payload_json)
        .unwrap_or_else(|_| Payload::Raw(payload_json));
    Chat {
        chat_id,
        external_id,
        name,
        profile_id,
        payload,
        markdown,
        checksum,
        images_downloaded: images_downloaded != 0,
    }
}

fn query_by_natural_key(
    conn: &Connection,
    external_id: &str,
    profile_id: i64,
) -> std::result::Result<Option<Chat>, rusqlite::Error> {
    conn.query_row(
        "SELECT chat_id, external_id, name, profile_id, payload_json, markdown,
                checksum, images_downloaded
         FROM chats WHERE external_id = ?1 AND profile_id = ?2",
        params![external_id, profile_id],
        |row| {
            Ok(chat_from_columns(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        },
    )
    .optional()
}

/// Find a chat by its natural key (client-supplied identifier + owning profile).
pub async fn find_by_external_id(
    db: &Db,
    external_id: &str,
    profile_id: i64,
) -> Result<Option<Chat>> {
    let external_id = external_id.to_string();
    db.with_connection(move |conn| {
        query_by_natural_key(conn, &external_id, profile_id).map_err(ChatsnipError::Database)
    })
    .await
}

/// Fetch a chat by row id.
pub async fn get(db: &Db, chat_id: i64) -> Result<Chat> {
    db.with_connection(move |conn| {
        conn.query_row(
            "SELECT chat_id, external_id, name, profile_id, payload_json, markdown,
                    checksum, images_downloaded
             FROM chats WHERE chat_id = ?1",
            params![chat_id],
            |row| {
                Ok(chat_from_columns(
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| ChatsnipError::ChatNotFound(chat_id.to_string()))
    })
    .await
}

/// Get or create a chat by natural key.
///
/// An existing chat gets its display name refreshed; a new one is inserted
/// with the payload, its fingerprint, and `images_downloaded` unset. The
/// check and insert run on one connection, but nothing serializes concurrent
/// callers: a true race may create one duplicate row, which is accepted.
pub async fn get_or_create(
    db: &Db,
    external_id: &str,
    name: &str,
    profile_id: i64,
    payload: &Payload,
    markdown: Option<&str>,
) -> Result<Chat> {
    let external_id = external_id.to_string();
    let name = name.to_string();
    let payload = payload.clone();
    let markdown = markdown.map(|m| m.to_string());

    db.with_connection(move |conn| {
        if let Some(existing) = query_by_natural_key(conn, &external_id, profile_id)? {
            conn.execute(
                "UPDATE chats SET name = ?1 WHERE chat_id = ?2",
                params![name, existing.chat_id],
            )?;
            return Ok(Chat { name, ..existing });
        }

        let payload_json = serde_json::to_string(&payload).unwrap_or_default();
        let checksum = fingerprint(&payload.canonical_text());
        conn.execute(
            "INSERT INTO chats (external_id, name, profile_id, payload_json, markdown, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![external_id, name, profile_id, payload_json, markdown, checksum],
        )?;
        let chat_id = conn.last_insert_rowid();

        Ok::<Chat, ChatsnipError>(Chat {
            chat_id,
            external_id,
            name,
            profile_id,
            payload,
            markdown,
            checksum,
            images_downloaded: false,
        })
    })
    .await
}

/// Store a new payload (and markdown) for a chat, recomputing the fingerprint.
///
/// The fingerprint column always reflects the payload written here, keeping
/// the chat-level dedup check honest.
pub async fn update_payload(
    db: &Db,
    chat_id: i64,
    payload: &Payload,
    markdown: Option<&str>,
) -> Result<()> {
    let payload_json = serde_json::to_string(payload).unwrap_or_default();
    let checksum = fingerprint(&payload.canonical_text());
    let markdown = markdown.map(|m| m.to_string());

    db.with_connection(move |conn| {
        let updated = conn.execute(
            "UPDATE chats SET payload_json = ?1, markdown = ?2, checksum = ?3,
                              updated_at = CURRENT_TIMESTAMP
             WHERE chat_id = ?4",
            params![payload_json, markdown, checksum, chat_id],
        )?;
        if updated == 0 {
            return Err(ChatsnipError::ChatNotFound(chat_id.to_string()));
        }
        Ok::<(), ChatsnipError>(())
    })
    .await
}

/// Rewrite the stored payload and markdown after image references were
/// relocated, without touching the fingerprint.
///
/// Relocating a reference does not change what the client submitted, and the
/// client resends the original URLs; recomputing the fingerprint here would
/// make an unchanged resubmission look new forever.
pub async fn update_references(
    db: &Db,
    chat_id: i64,
    payload: &Payload,
    markdown: Option<&str>,
) -> Result<()> {
    let payload_json = serde_json::to_string(payload).unwrap_or_default();
    let markdown = markdown.map(|m| m.to_string());

    db.with_connection(move |conn| {
        let updated = conn.execute(
            "UPDATE chats SET payload_json = ?1, markdown = ?2,
                              updated_at = CURRENT_TIMESTAMP
             WHERE chat_id = ?3",
            params![payload_json, markdown, chat_id],
        )?;
        if updated == 0 {
            return Err(ChatsnipError::ChatNotFound(chat_id.to_string()));
        }
        Ok::<(), ChatsnipError>(())
    })
    .await
}

/// Flip the all-images-retrieved flag.
pub async fn set_images_downloaded(db: &Db, chat_id: i64, value: bool) -> Result<()> {
    db.with_connection(move |conn| {
        let updated = conn.execute(
            "UPDATE chats SET images_downloaded = ?1 WHERE chat_id = ?2",
            params![value as i64, chat_id],
        )?;
        if updated == 0 {
            return Err(ChatsnipError::ChatNotFound(chat_id.to_string()));
        }
        Ok::<(), ChatsnipError>(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Db, TempDir, i64) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        let migrations_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| crate::db::migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();
        let profile = crate::store::profiles::create(&db, "tester").await.unwrap();
        (db, temp_dir, profile.profile_id)
    }

    #[tokio::test]
    async fn test_get_or_create_creates_once() {
        let (db, _tmp, profile_id) = setup_test_db().await;
        let payload = Payload::Raw("hello".to_string());

        let first = get_or_create(&db, "ext-1", "First", profile_id, &payload, None)
            .await
            .unwrap();
        let second = get_or_create(&db, "ext-1", "Renamed", profile_id, &payload, None)
            .await
            .unwrap();

        assert_eq!(first.chat_id, second.chat_id);
        // Existing chats get their name refreshed, nothing else
        assert_eq!(second.name, "Renamed");

        let count: i64 = db
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM chats", [], |r| r.get(0))
                    .map_err(ChatsnipError::from)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_natural_key_is_per_profile() {
        let (db, _tmp, profile_id) = setup_test_db().await;
        let other = crate::store::profiles::create(&db, "other").await.unwrap();
        let payload = Payload::Raw("hello".to_string());

        let a = get_or_create(&db, "ext-1", "A", profile_id, &payload, None)
            .await
            .unwrap();
        let b = get_or_create(&db, "ext-1", "B", other.profile_id, &payload, None)
            .await
            .unwrap();

        // Same external identifier under two users is two chats
        assert_ne!(a.chat_id, b.chat_id);
    }

    #[tokio::test]
    async fn test_update_payload_refreshes_checksum() {
        let (db, _tmp, profile_id) = setup_test_db().await;
        let payload = Payload::Raw("v1".to_string());
        let chat = get_or_create(&db, "ext-1", "Chat", profile_id, &payload, None)
            .await
            .unwrap();
        assert_eq!(chat.checksum, fingerprint("v1"));

        let new_payload = Payload::Raw("v2".to_string());
        update_payload(&db, chat.chat_id, &new_payload, Some("# v2"))
            .await
            .unwrap();

        let reloaded = get(&db, chat.chat_id).await.unwrap();
        assert_eq!(reloaded.checksum, fingerprint("v2"));
        assert_eq!(reloaded.markdown.as_deref(), Some("# v2"));
        assert_eq!(reloaded.payload, new_payload);
    }

    #[tokio::test]
    async fn test_set_images_downloaded() {
        let (db, _tmp, profile_id) = setup_test_db().await;
        let chat = get_or_create(
            &db,
            "ext-1",
            "Chat",
            profile_id,
            &Payload::Raw(String::new()),
            None,
        )
        .await
        .unwrap();
        assert!(!chat.images_downloaded);

        set_images_downloaded(&db, chat.chat_id, true).await.unwrap();
        let reloaded = get(&db, chat.chat_id).await.unwrap();
        assert!(reloaded.images_downloaded);
    }

    #[tokio::test]
    async fn test_get_missing_chat() {
        let (db, _tmp, _profile_id) = setup_test_db().await;
        let result = get(&db, 999).await;
        assert!(matches!(result, Err(ChatsnipError::ChatNotFound(_))));
    }

    #[tokio::test]
    async fn test_structured_payload_round_trip() {
        let (db, _tmp, profile_id) = setup_test_db().await;
        let payload: Payload = serde_json::from_str(
            r#"[{"src": "https://x/a.png"}, {"language": "python", "content": "pass"}]"#,
        )
        .unwrap();

        let chat = get_or_create(&db, "ext-1", "Chat", profile_id, &payload, Some("md"))
            .await
            .unwrap();
        let reloaded = get(&db, chat.chat_id).await.unwrap();
        assert_eq!(reloaded.payload, payload);
        assert_eq!(reloaded.checksum, fingerprint(&payload.canonical_text()));
    }
}
