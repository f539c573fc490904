use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::db::Db;
use crate::error::{Result, ChatsnipError};
use crate::model::Profile;

/// Create a profile with a fresh random API key.
pub async fn create(db: &Db, username: &str) -> Result<Profile> {
    let username = username.to_string();
    let api_key = Uuid::new_v4().to_string();

    db.with_connection(move |conn| {
        conn.execute(
            "INSERT INTO profiles (username, api_key) VALUES (?1, ?2)",
            params![username, api_key],
        )?;
        let profile_id = conn.last_insert_rowid();
        Ok::<Profile, ChatsnipError>(Profile {
            profile_id,
            username,
            api_key,
        })
    })
    .await
}

/// Look up the profile owning an API key. `None` means the key is unknown.
pub async fn find_by_api_key(db: &Db, api_key: &str) -> Result<Option<Profile>> {
    let api_key = api_key.to_string();

    db.with_connection(move |conn| {
        let profile = conn
            .query_row(
                "SELECT profile_id, username, api_key FROM profiles WHERE api_key = ?1",
                params![api_key],
                |row| {
                    Ok(Profile {
                        profile_id: row.get(0)?,
                        username: row.get(1)?,
                        api_key: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok::<Option<Profile>, ChatsnipError>(profile)
    })
    .await
}

/// Replace a profile's API key with a fresh random one.
pub async fn regenerate_key(db: &Db, username: &str) -> Result<Profile> {
    let username = username.to_string();
    let api_key = Uuid::new_v4().to_string();

    db.with_connection(move |conn| {
        let updated = conn.execute(
            "UPDATE profiles SET api_key = ?1 WHERE username = ?2",
            params![api_key, username],
        )?;
        if updated == 0 {
            return Err(ChatsnipError::InvalidInput(format!(
                "No profile with username: {}",
                username
            )));
        }
        let profile_id: i64 = conn.query_row(
            "SELECT profile_id FROM profiles WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )?;
        Ok::<Profile, ChatsnipError>(Profile {
            profile_id,
            username,
            api_key,
        })
    })
    .await
}

/// List every profile, oldest first.
pub async fn list(db: &Db) -> Result<Vec<Profile>> {
    db.with_connection(|conn| {
        let mut stmt =
            conn.prepare("SELECT profile_id, username, api_key FROM profiles ORDER BY profile_id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Profile {
                profile_id: row.get(0)?,
                username: row.get(1)?,
                api_key: row.get(2)?,
            })
        })?;
        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row?);
        }
        Ok::<Vec<Profile>, ChatsnipError>(profiles)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Db, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        let migrations_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| crate::db::migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();
        (db, temp_dir)
    }

    #[tokio::test]
    async fn test_create_and_find_by_api_key() {
        let (db, _tmp) = setup_test_db().await;

        let profile = create(&db, "alice").await.unwrap();
        assert_eq!(profile.username, "alice");
        assert!(!profile.api_key.is_empty());

        let found = find_by_api_key(&db, &profile.api_key).await.unwrap();
        assert_eq!(found.unwrap().profile_id, profile.profile_id);

        let missing = find_by_api_key(&db, "not-a-key").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_regenerate_key_invalidates_old_key() {
        let (db, _tmp) = setup_test_db().await;

        let profile = create(&db, "bob").await.unwrap();
        let old_key = profile.api_key.clone();

        let regenerated = regenerate_key(&db, "bob").await.unwrap();
        assert_ne!(regenerated.api_key, old_key);
        assert_eq!(regenerated.profile_id, profile.profile_id);

        assert!(find_by_api_key(&db, &old_key).await.unwrap().is_none());
        assert!(find_by_api_key(&db, &regenerated.api_key)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_regenerate_key_unknown_username() {
        let (db, _tmp) = setup_test_db().await;
        let result = regenerate_key(&db, "ghost").await;
        assert!(matches!(result, Err(ChatsnipError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_list_profiles() {
        let (db, _tmp) = setup_test_db().await;
        create(&db, "alice").await.unwrap();
        create(&db, "bob").await.unwrap();
        let profiles = list(&db).await.unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].username, "alice");
    }
}
