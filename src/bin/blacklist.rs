use clap::{Parser, Subcommand};
use chatsnip::Config;
use chatsnip::db::{Db, migrate};
use chatsnip::store::images;
use std::path::Path;
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "blacklist")]
#[command(about = "Suppress future retrieval of an image URL for every chat")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Flag every stored record of a source URL as blacklisted
    Add {
        url: String,
    },
    /// List blacklisted URLs
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", "info")
    ).init();

    let args = Args::parse();

    let config = Config::load()?;
    let db = Db::new(config.db_path());

    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| {
        migrate::run_migrations(conn, migrations_dir)
    }).await?;

    match args.command {
        Command::Add { url } => {
            let flagged = images::blacklist_url(&db, &url).await?;
            if flagged == 0 {
                println!(
                    "No stored image rows for {}; nothing flagged. The URL must have been retrieved at least once.",
                    url
                );
            } else {
                println!("Blacklisted {} ({} record(s) flagged).", url, flagged);
                println!("No chat will retrieve this URL again.");
            }
        }
        Command::List => {
            let urls = images::list_blacklisted(&db).await?;
            if urls.is_empty() {
                println!("No blacklisted URLs.");
                return Ok(());
            }
            for url in urls {
                println!("{}", url);
            }
        }
    }

    Ok(())
}
