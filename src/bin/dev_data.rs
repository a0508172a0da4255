//! Import or delete development fixtures.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sea_orm_migration::MigratorTrait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tour_booking_backend::{db, fixtures, AppResult};

#[derive(Debug, Parser)]
#[command(name = "dev-data", version, about = "Load or clear development fixtures")]
struct Cli {
    /// Database connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import users.json, tours.json and reviews.json from a directory
    Import {
        #[arg(long, default_value = "dev-data")]
        dir: PathBuf,
    },
    /// Delete every review, tour and user
    Delete,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tour_booking_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        tracing::error!(error = %err, "dev-data failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let db = db::connect_url(&cli.database_url, 1).await?;
    migration::Migrator::up(&db, None).await?;

    match cli.command {
        Command::Import { dir } => {
            let set = fixtures::Fixtures::load(&dir).await?;
            let counts = fixtures::import(&db, set).await?;
            println!(
                "Imported {} users, {} tours, {} reviews",
                counts.users, counts.tours, counts.reviews
            );
        }
        Command::Delete => {
            let counts = fixtures::delete_all(&db).await?;
            println!(
                "Deleted {} users, {} tours, {} reviews",
                counts.users, counts.tours, counts.reviews
            );
        }
    }

    Ok(())
}
