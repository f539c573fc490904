use chatsnip::Config;
use chatsnip::db::{Db, migrate};
use chatsnip::http::HttpServer;
use std::path::Path;
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger from environment variable or default to info level
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    // Parse command-line arguments
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    match command {
        "serve" => {
            // HTTP ingestion server mode
            run_http_server().await?;
        }
        "verify" | _ => {
            // Default: verify database schema
            run_schema_verification().await?;
        }
    }

    Ok(())
}

/// Run the HTTP ingestion server
async fn run_http_server() -> Result<()> {
    log::info!("Starting Chatsnip HTTP server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db = Db::new(config.db_path());

    // Run migrations
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| {
        migrate::run_migrations(conn, migrations_dir)
    }).await?;

    log::info!("Database initialized successfully");

    let http_server = HttpServer::new(db, &config)?;
    http_server.run(config.http_server.port).await?;

    Ok(())
}

/// Run database schema verification
async fn run_schema_verification() -> Result<()> {
    log::info!("Starting Chatsnip v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    log::info!("Configuration loaded successfully");
    log::info!("Database path: {}", config.db_path().display());
    log::info!("Media directory: {}", config.media_dir().display());

    // Initialize database
    let db = Db::new(config.db_path());

    // Run migrations
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| {
        migrate::run_migrations(conn, migrations_dir)
    }).await?;

    log::info!("Database initialized successfully");

    // Verify schema
    verify_database_schema(&db).await?;

    log::info!("Ready to accept submissions: run with 'serve'");

    Ok(())
}

/// Verify that all expected database objects exist
async fn verify_database_schema(db: &chatsnip::db::Db) -> Result<()> {
    use chatsnip::db::migrate;
    use chatsnip::error::ChatsnipError;

    db.with_connection(|conn| {
        // Check tables
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_tables = vec!["chat_images", "chats", "code_fragments", "profiles", "schema_migrations"];
        let mut all_tables_exist = true;

        for table in &expected_tables {
            if !tables.iter().any(|t| t == table) {
                log::error!("Missing table: {}", table);
                all_tables_exist = false;
            } else {
                log::debug!("Table exists: {}", table);
            }
        }

        if !all_tables_exist {
            return Err(ChatsnipError::Config("Not all required tables exist".to_string()));
        }

        // Check migrations
        let applied = migrate::get_applied_migrations(conn)?;
        if applied.len() < 2 {
            return Err(ChatsnipError::Config(format!("Expected at least 2 migrations, found {}", applied.len())));
        }
        log::debug!("{} migrations applied", applied.len());

        // Check dedup lookup indexes (from migration 002)
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name")?;
        let indexes: Vec<String> = stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_indexes = vec![
            "idx_chats_external_profile",
            "idx_fragments_chat_filename",
            "idx_images_chat_checksum",
            "idx_images_chat_url",
            "idx_images_url_blacklisted",
        ];

        for index_name in &expected_indexes {
            if indexes.iter().any(|i| i == index_name) {
                log::debug!("Lookup index exists: {}", index_name);
            } else {
                log::warn!("Lookup index not found: {} (migration 002 may not be applied)", index_name);
            }
        }

        // Check pragmas
        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(ChatsnipError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }
        log::debug!("Journal mode: WAL");

        let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if foreign_keys != 1 {
            return Err(ChatsnipError::Config("Foreign keys not enabled".to_string()));
        }
        log::debug!("Foreign keys enabled");

        // Integrity check
        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(ChatsnipError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("Database integrity: OK");

        Ok(())
    }).await?;

    log::info!("Database schema verification complete");
    Ok(())
}
