use rusqlite::params;

use crate::db::Db;
use crate::error::{Result, ChatsnipError};
use crate::model::ChatImage;

/// True iff this chat already retrieved this source URL.
pub async fn exists_for_url(db: &Db, chat_id: i64, source_url: &str) -> Result<bool> {
    let source_url = source_url.to_string();
    db.with_connection(move |conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_images WHERE chat_id = ?1 AND source_url = ?2",
            params![chat_id, source_url],
            |row| row.get(0),
        )?;
        Ok::<bool, ChatsnipError>(count > 0)
    })
    .await
}

/// Fetch the image a chat stores for a source URL, if any.
pub async fn find_by_url(db: &Db, chat_id: i64, source_url: &str) -> Result<Option<ChatImage>> {
    use rusqlite::OptionalExtension;

    let source_url = source_url.to_string();
    db.with_connection(move |conn| {
        let image = conn
            .query_row(
                "SELECT image_id, chat_id, source_url, title, description, local_path,
                        checksum, blacklisted
                 FROM chat_images WHERE chat_id = ?1 AND source_url = ?2",
                params![chat_id, source_url],
                |row| {
                    Ok(ChatImage {
                        image_id: row.get(0)?,
                        chat_id: row.get(1)?,
                        source_url: row.get(2)?,
                        title: row.get(3)?,
                        description: row.get(4)?,
                        local_path: row.get(5)?,
                        checksum: row.get(6)?,
                        blacklisted: row.get::<_, i64>(7)? != 0,
                    })
                },
            )
            .optional()?;
        Ok::<Option<ChatImage>, ChatsnipError>(image)
    })
    .await
}

/// True iff any record marks this URL blacklisted, regardless of owning chat.
pub async fn is_blacklisted(db: &Db, source_url: &str) -> Result<bool> {
    let source_url = source_url.to_string();
    db.with_connection(move |conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_images WHERE source_url = ?1 AND blacklisted = 1",
            params![source_url],
            |row| row.get(0),
        )?;
        Ok::<bool, ChatsnipError>(count > 0)
    })
    .await
}

/// True iff this chat already stores a binary with this fingerprint (the same
/// image reposted under a different URL).
pub async fn exists_with_checksum(db: &Db, chat_id: i64, checksum: &str) -> Result<bool> {
    let checksum = checksum.to_string();
    db.with_connection(move |conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_images WHERE chat_id = ?1 AND checksum = ?2",
            params![chat_id, checksum],
            |row| row.get(0),
        )?;
        Ok::<bool, ChatsnipError>(count > 0)
    })
    .await
}

/// Insert a newly retrieved image row.
pub async fn insert(
    db: &Db,
    chat_id: i64,
    source_url: &str,
    title: Option<&str>,
    description: Option<&str>,
    local_path: &str,
    checksum: &str,
) -> Result<ChatImage> {
    let source_url = source_url.to_string();
    let title = title.map(|t| t.to_string());
    let description = description.map(|d| d.to_string());
    let local_path = local_path.to_string();
    let checksum = checksum.to_string();

    db.with_connection(move |conn| {
        conn.execute(
            "INSERT INTO chat_images
                 (chat_id, source_url, title, description, local_path, checksum, blacklisted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![chat_id, source_url, title, description, local_path, checksum],
        )?;
        let image_id = conn.last_insert_rowid();
        Ok::<ChatImage, ChatsnipError>(ChatImage {
            image_id,
            chat_id,
            source_url,
            title,
            description,
            local_path,
            checksum,
            blacklisted: false,
        })
    })
    .await
}

/// Mark every record of a source URL blacklisted (operator action). Returns
/// the number of rows flagged; zero means no chat ever retrieved the URL.
pub async fn blacklist_url(db: &Db, source_url: &str) -> Result<usize> {
    let source_url = source_url.to_string();
    db.with_connection(move |conn| {
        let updated = conn.execute(
            "UPDATE chat_images SET blacklisted = 1 WHERE source_url = ?1",
            params![source_url],
        )?;
        Ok::<usize, ChatsnipError>(updated)
    })
    .await
}

/// List every blacklisted URL (distinct), for operator review.
pub async fn list_blacklisted(db: &Db) -> Result<Vec<String>> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT source_url FROM chat_images WHERE blacklisted = 1 ORDER BY source_url",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut urls = Vec::new();
        for row in rows {
            urls.push(row?);
        }
        Ok::<Vec<String>, ChatsnipError>(urls)
    })
    .await
}

/// List a chat's images, oldest first.
pub async fn list_for_chat(db: &Db, chat_id: i64) -> Result<Vec<ChatImage>> {
    db.with_connection(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT image_id, chat_id, source_url, title, description, local_path,
                    checksum, blacklisted
             FROM chat_images WHERE chat_id = ?1 ORDER BY image_id",
        )?;
        let rows = stmt.query_map(params![chat_id], |row| {
            Ok(ChatImage {
                image_id: row.get(0)?,
                chat_id: row.get(1)?,
                source_url: row.get(2)?,
                title: row.get(3)?,
                description: row.get(4)?,
                local_path: row.get(5)?,
                checksum: row.get(6)?,
                blacklisted: row.get::<_, i64>(7)? != 0,
            })
        })?;
        let mut images = Vec::new();
        for row in rows {
            images.push(row?);
        }
        Ok::<Vec<ChatImage>, ChatsnipError>(images)
    })
    .await
}
