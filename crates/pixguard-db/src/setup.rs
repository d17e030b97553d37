//! Pool construction and schema migration

use std::time::Duration;

use anyhow::{Context, Result};
use pixguard_core::DatabaseConfig;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Schema shipped with the binary, from the workspace `migrations/` directory.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
        .max_lifetime(Duration::from_secs(config.max_lifetime_seconds))
}

/// Connect the pool, then bring the schema up to date unless disabled.
pub async fn setup_database(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = pool_options(config)
        .connect(&config.url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!(
        max_connections = config.max_connections,
        acquire_timeout_seconds = config.timeout_seconds,
        "Database pool ready"
    );

    if config.run_migrations {
        migrate(&pool, config).await?;
    } else {
        tracing::info!("Skipping migrations (DB_RUN_MIGRATIONS=false)");
    }

    Ok(pool)
}

async fn migrate(pool: &PgPool, config: &DatabaseConfig) -> Result<()> {
    match &config.migrations_dir {
        Some(dir) => {
            let migrator = Migrator::new(std::path::Path::new(dir))
                .await
                .with_context(|| format!("Failed to load migrations from {}", dir))?;
            migrator
                .run(pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!(source = %dir, "Database migrations applied");
        }
        None => {
            MIGRATOR
                .run(pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!(source = "embedded", "Database migrations applied");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_migrations_create_result_table() {
        let migrations: Vec<_> = MIGRATOR.iter().collect();
        assert!(!migrations.is_empty());
        assert!(migrations
            .iter()
            .any(|m| m.sql.contains("CREATE TABLE") && m.sql.contains("image_validation_result")));
    }

    #[test]
    fn pool_options_follow_config() {
        let config = DatabaseConfig {
            url: "postgres://localhost/pixguard".to_string(),
            max_connections: 7,
            timeout_seconds: 3,
            idle_timeout_seconds: 60,
            max_lifetime_seconds: 120,
            run_migrations: false,
            migrations_dir: None,
        };
        let options = pool_options(&config);
        assert_eq!(options.get_max_connections(), 7);
        assert_eq!(options.get_acquire_timeout(), Duration::from_secs(3));
        assert_eq!(options.get_idle_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(options.get_max_lifetime(), Some(Duration::from_secs(120)));
    }
}
