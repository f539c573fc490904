use chatsnip::{config::Config, db::Db, error::ChatsnipError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    let db = Db::new(&config.chatsnip.db_path);

    println!("\n=== Chatsnip Ingestion Statistics ===\n");

    let totals = db.with_connection(|conn| {
        let chats: i64 = conn.query_row("SELECT COUNT(*) FROM chats", [], |r| r.get(0))?;
        let fragments: i64 =
            conn.query_row("SELECT COUNT(*) FROM code_fragments", [], |r| r.get(0))?;
        let images: i64 = conn.query_row("SELECT COUNT(*) FROM chat_images", [], |r| r.get(0))?;
        let blacklisted: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT source_url) FROM chat_images WHERE blacklisted = 1",
            [],
            |r| r.get(0),
        )?;
        let profiles: i64 = conn.query_row("SELECT COUNT(*) FROM profiles", [], |r| r.get(0))?;
        Ok::<_, ChatsnipError>((chats, fragments, images, blacklisted, profiles))
    }).await?;

    println!("{:<28} {:>10}", "Profiles", totals.4);
    println!("{:<28} {:>10}", "Chats", totals.0);
    println!("{:<28} {:>10}", "Code fragments", totals.1);
    println!("{:<28} {:>10}", "Images", totals.2);
    println!("{:<28} {:>10}", "Blacklisted URLs", totals.3);

    // Versioning pressure: fragments per named file, largest groups first
    let version_groups = db.with_connection(|conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT filename, COUNT(*) as versions
            FROM code_fragments
            WHERE filename IS NOT NULL
            GROUP BY chat_id, filename
            HAVING COUNT(*) > 1
            ORDER BY versions DESC
            LIMIT 10
            "#,
        )?;

        let mut rows = stmt.query([])?;
        let mut groups = Vec::new();
        while let Some(row) = rows.next()? {
            groups.push((row.get::<_, String>(0)?, row.get::<_, i64>(1)?));
        }
        Ok::<Vec<(String, i64)>, ChatsnipError>(groups)
    }).await?;

    if !version_groups.is_empty() {
        println!("\nFiles with multiple retained versions:\n");
        println!("{:-<50}", "");
        println!("{:<36} {:>10}", "Filename", "Versions");
        println!("{:-<50}", "");
        for (filename, versions) in &version_groups {
            println!("{:<36} {:>10}", filename, versions);
        }
        println!("{:-<50}", "");
    }

    // Recent ingestion activity
    let recent = db.with_connection(|conn| {
        conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM chats
            WHERE updated_at > datetime('now', '-24 hours')
            "#,
            [],
            |row| row.get::<_, i64>(0),
        ).map_err(ChatsnipError::from)
    }).await?;

    println!("\nRecent Activity:");
    println!("  Chats updated in last 24 hours: {}", recent);

    let pending = db.with_connection(|conn| {
        conn.query_row(
            "SELECT COUNT(*) FROM chats WHERE images_downloaded = 0",
            [],
            |row| row.get::<_, i64>(0),
        ).map_err(ChatsnipError::from)
    }).await?;

    if pending > 0 {
        println!("  Chats with images still pending: {}", pending);
    }

    println!();

    Ok(())
}
