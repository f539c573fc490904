use clap::{Parser, Subcommand};
use chatsnip::Config;
use chatsnip::db::{Db, migrate};
use chatsnip::store::profiles;
use std::path::Path;
use anyhow::Result;

#[derive(Parser, Debug)]
#[command(name = "apikey")]
#[command(about = "Manage Chatsnip profiles and their API keys")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a profile and print its API key
    Create {
        username: String,
    },
    /// Replace a profile's API key with a fresh one
    Regenerate {
        username: String,
    },
    /// List all profiles
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
        Command::Create { username } => {
            let profile = profiles::create(&db, &username).await?;
            println!("Profile created: {}", profile.username);
            println!("API key: {}", profile.api_key);
        }
        Command::Regenerate { username } => {
            let profile = profiles::regenerate_key(&db, &username).await?;
            println!("API key regenerated for {}", profile.username);
            println!("New API key: {}", profile.api_key);
            println!("The previous key no longer authenticates.");
        }
        Command::List => {
            let all = profiles::list(&db).await?;
            if all.is_empty() {
                println!("No profiles yet. Create one with: apikey create <username>");
                return Ok(());
            }
            println!("{:<8} {:<24} {}", "ID", "Username", "API key");
            println!("{:-<72}", "");
            for profile in all {
                println!(
                    "{:<8} {:<24} {}",
                    profile.profile_id, profile.username, profile.api_key
                );
            }
        }
    }

    Ok(())
}
