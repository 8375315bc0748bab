use std::collections::HashSet;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::SqlitePool;

use task_tracker::db::{self, users, MIGRATOR};
use task_tracker::models::user::Role;
use task_tracker::utils::normalize_email;

#[derive(Parser, Debug)]
#[command(author, version, about = "task-tracker operator tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Print every account with its role and block state
    ListUsers,
    /// Block the account with the given email
    Block { email: String },
    /// Unblock the account with the given email
    Unblock { email: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // When running in Docker the binary CWD may differ, so fall back to the
    // crate-local `.env`.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();
    let pool = get_pool().await?;

    match cli.command {
        Commands::MigrateRun => {
            MIGRATOR.run(&pool).await.context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => print_status(&pool).await?,
        Commands::ListUsers => list_users(&pool).await?,
        Commands::Block { email } => set_blocked(&pool, &email, true).await?,
        Commands::Unblock { email } => set_blocked(&pool, &email, false).await?,
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    db::connect(&database_url, 2).await
}

async fn print_status(pool: &SqlitePool) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet
    let has_table: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;

    let applied_versions: HashSet<i64> = if has_table.is_some() {
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in MIGRATOR.iter().filter(|m| m.migration_type.is_up_migration()) {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

async fn list_users(pool: &SqlitePool) -> anyhow::Result<()> {
    let accounts = users::list(pool).await?;

    println!("{:<36} {:<20} {:<30} {:<6} {}", "Id", "Username", "Email", "Role", "Blocked");
    for user in accounts {
        println!(
            "{:<36} {:<20} {:<30} {:<6} {}",
            user.id, user.username, user.email, user.role, user.blocked
        );
    }

    Ok(())
}

async fn set_blocked(pool: &SqlitePool, email: &str, blocked: bool) -> anyhow::Result<()> {
    let email = normalize_email(email);
    let user = users::find_by_email(pool, &email)
        .await?
        .with_context(|| format!("no account with email {email}"))?;

    if blocked && user.role()? == Role::Admin {
        anyhow::bail!("refusing to block admin account {email}");
    }

    let updated = users::set_blocked(pool, user.id, blocked).await?;
    println!("{} is now {}", updated.email, if updated.blocked { "blocked" } else { "active" });

    Ok(())
}
