use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::db::Db;
use crate::error::{Result, ChatsnipError};
use crate::ingest::fingerprint::fingerprint;
use crate::model::CodeFragment;

/// Insert a new fragment version. Content is stored as given (already
/// cleaned by the ingestion pipeline) and fingerprinted here so the stored
/// checksum always matches the stored code.
pub async fn insert(
    db: &Db,
    chat_id: i64,
    filename: Option<&str>,
    language: Option<&str>,
    source_code: &str,
) -> Result<CodeFragment> {
    let filename = filename.map(|f| f.to_string());
    let language = language.map(|l| l.to_string());
    let source_code = source_code.to_string();
    let checksum = fingerprint(&source_code);
    let created_at = Utc::now();
    let created_at_str = created_at.to_rfc3339();

    db.with_connection(move |conn| {
        conn.execute(
            "INSERT INTO code_fragments
                 (chat_id, filename, language, source_code, checksum, selected, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            params![chat_id, filename, language, source_code, checksum, created_at_str],
        )?;
        let fragment_id = conn.last_insert_rowid();
        Ok::<CodeFragment, ChatsnipError>(CodeFragment {
            fragment_id,
            chat_id,
            filename,
            language,
            source_code,
            checksum,
            selected: false,
            created_at,
        })
    })
    .await
}

/// List a chat's fragments, oldest first.
pub async fn list_for_chat(db: &Db, chat_id: i64) -> Result<Vec<CodeFragment>> {
    db.with_connection(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT fragment_id, chat_id, filename, language, source_code, checksum,
                    selected, created_at
             FROM code_fragments WHERE chat_id = ?1 ORDER BY fragment_id",
        )?;
        let rows = stmt.query_map(params![chat_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut fragments = Vec::new();
        for row in rows {
            let (fragment_id, chat_id, filename, language, source_code, checksum, selected, created_at) =
                row?;
            fragments.push(CodeFragment {
                fragment_id,
                chat_id,
                filename,
                language,
                source_code,
                checksum,
                selected: selected != 0,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_default(),
            });
        }
        Ok::<Vec<CodeFragment>, ChatsnipError>(fragments)
    })
    .await
}

/// Delete one fragment by id (explicit user action; versions are otherwise
/// append-only).
pub async fn delete(db: &Db, fragment_id: i64) -> Result<()> {
    db.with_connection(move |conn| {
        let deleted = conn.execute(
            "DELETE FROM code_fragments WHERE fragment_id = ?1",
            params![fragment_id],
        )?;
        if deleted == 0 {
            return Err(ChatsnipError::FragmentNotFound(fragment_id));
        }
        Ok::<(), ChatsnipError>(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Payload;
    use std::path::PathBuf;
    use tempfile::TempDir;

    async fn setup_chat() -> (Db, TempDir, i64) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        let migrations_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| crate::db::migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();
        let profile = crate::store::profiles::create(&db, "tester").await.unwrap();
        let chat = crate::store::chats::get_or_create(
            &db,
            "ext-1",
            "Chat",
            profile.profile_id,
            &Payload::Raw(String::new()),
            None,
        )
        .await
        .unwrap();
        (db, temp_dir, chat.chat_id)
    }

    #[tokio::test]
    async fn test_insert_and_list() {
        let (db, _tmp, chat_id) = setup_chat().await;

        let fragment = insert(&db, chat_id, Some("a.py"), Some("python"), "x = 1")
            .await
            .unwrap();
        assert_eq!(fragment.checksum, fingerprint("x = 1"));
        assert!(!fragment.selected);

        let listed = list_for_chat(&db, chat_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].fragment_id, fragment.fragment_id);
        assert_eq!(listed[0].filename.as_deref(), Some("a.py"));
        assert_eq!(listed[0].source_code, "x = 1");
    }

    #[tokio::test]
    async fn test_versions_accumulate() {
        let (db, _tmp, chat_id) = setup_chat().await;

        insert(&db, chat_id, Some("a.py"), None, "v1").await.unwrap();
        insert(&db, chat_id, Some("a.py"), None, "v2").await.unwrap();

        // Successive edits under one filename are separate rows
        let listed = list_for_chat(&db, chat_id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_ne!(listed[0].checksum, listed[1].checksum);
    }

    #[tokio::test]
    async fn test_delete_fragment() {
        let (db, _tmp, chat_id) = setup_chat().await;
        let fragment = insert(&db, chat_id, None, None, "x").await.unwrap();

        delete(&db, fragment.fragment_id).await.unwrap();
        assert!(list_for_chat(&db, chat_id).await.unwrap().is_empty());

        let missing = delete(&db, fragment.fragment_id).await;
        assert!(matches!(missing, Err(ChatsnipError::FragmentNotFound(_))));
    }

    #[tokio::test]
    async fn test_cascade_delete_with_chat() {
        let (db, _tmp, chat_id) = setup_chat().await;
        insert(&db, chat_id, Some("a.py"), None, "x = 1").await.unwrap();

        db.with_connection(move |conn| {
            conn.execute("DELETE FROM chats WHERE chat_id = ?1", params![chat_id])?;
            Ok::<(), ChatsnipError>(())
        })
        .await
        .unwrap();

        let count: i64 = db
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM code_fragments", [], |r| r.get(0))
                    .map_err(ChatsnipError::from)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
