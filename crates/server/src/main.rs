mod config;
mod http;

use std::sync::Arc;

use anyhow::Context;
use api::schema::{build_schema, AppSchema};
use api::seed::seed_demo;
use api::store::Store;
use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::http::AppState;

#[derive(Parser, Debug)]
#[command(name = "attendance-server", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run HTTP server
    Serve {
        #[arg(long, env = "BIND", default_value = "127.0.0.1:8080")]
        bind: String,
    },
    /// Run migrations
    Migrate {
        #[arg(long, value_enum, default_value_t = MigrateAction::Up)]
        action: MigrateAction,
    },
    /// Seed demo accounts and projects
    Seed,
    /// Print GraphQL SDL
    PrintSchema,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MigrateAction {
    Up,
    Down,
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;
    let auth = Arc::new(config.auth.clone());

    match cli.cmd {
        Cmd::PrintSchema => {
            let db = Arc::new(DatabaseConnection::Disconnected);
            let AppSchema(schema) = build_schema(db, auth);
            println!("{}", schema.sdl());
            Ok(())
        }
        Cmd::Migrate { action } => {
            let db = connect(&config).await?;
            match action {
                MigrateAction::Up => Migrator::up(db.as_ref(), None).await?,
                MigrateAction::Down => Migrator::down(db.as_ref(), None).await?,
                MigrateAction::Reset => Migrator::reset(db.as_ref()).await?,
            }
            info!(?action, "migrations applied");
            Ok(())
        }
        Cmd::Seed => {
            let db = connect(&config).await?;
            Migrator::up(db.as_ref(), None).await?;
            let seeded = seed_demo(&Store::new(db.clone()))
                .await
                .context("seed data failed")?;
            info!(
                users = seeded.users.len(),
                projects = seeded.projects.len(),
                entries = seeded.entries.len(),
                "demo data ready"
            );
            Ok(())
        }
        Cmd::Serve { bind } => {
            let db = connect(&config).await?;
            Migrator::up(db.as_ref(), None).await?;
            let AppSchema(schema) = build_schema(db.clone(), auth.clone());
            let state = AppState { schema, db, auth };
            http::serve(&bind, state, &config.cors_allowed_origins).await
        }
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<Arc<DatabaseConnection>> {
    let db = Database::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    Ok(Arc::new(db))
}
