//! SQL tier connection and schema management.
//!
//! The same migrations run against MySQL, the hosted database and the
//! SQLite files used in tests.

use std::collections::HashSet;
use std::time::Duration;

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database as SeaDatabase, DatabaseBackend, DatabaseConnection,
    DbErr, EntityTrait, QueryOrder, Statement,
};
use sea_orm_migration::{seaql_migrations, MigratorTrait};

pub mod migrations;

pub use migrations::Migrator;

/// One migration and whether this database has applied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationState {
    pub name: String,
    pub applied: bool,
}

#[derive(Clone)]
pub struct Database {
    connection: DatabaseConnection,
}

impl Database {
    fn options(url: &str, timeout: Duration) -> ConnectOptions {
        let mut options = ConnectOptions::new(url.to_string());
        options
            .connect_timeout(timeout)
            .acquire_timeout(timeout)
            .sqlx_logging(false);
        options
    }

    /// Open a pool without touching the schema. Both the connect and the
    /// acquire step give up after `timeout`.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, DbErr> {
        let connection = SeaDatabase::connect(Self::options(url, timeout)).await?;
        Ok(Self { connection })
    }

    /// Build the pool without opening a connection. Only a malformed URL
    /// fails here; an unreachable server surfaces on first use.
    pub async fn connect_lazy(url: &str, timeout: Duration) -> Result<Self, DbErr> {
        let mut options = Self::options(url, timeout);
        options.connect_lazy(true);
        let connection = SeaDatabase::connect(options).await?;
        Ok(Self { connection })
    }

    /// Open a pool and bring the schema up to date.
    pub async fn connect_and_migrate(url: &str, timeout: Duration) -> Result<Self, DbErr> {
        let db = Self::connect(url, timeout).await?;
        db.migrate_up().await?;
        tracing::info!(backend = ?db.backend(), "Database connected and migrations applied");
        Ok(db)
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.connection.get_database_backend()
    }

    pub async fn migrate_up(&self) -> Result<(), DbErr> {
        Migrator::up(&self.connection, None).await
    }

    /// Roll back the most recent migration only.
    pub async fn migrate_down(&self) -> Result<(), DbErr> {
        Migrator::down(&self.connection, Some(1)).await
    }

    /// Drop every table and re-apply all migrations.
    pub async fn migrate_fresh(&self) -> Result<(), DbErr> {
        Migrator::fresh(&self.connection).await
    }

    /// Every known migration in definition order.
    pub async fn migration_states(&self) -> Result<Vec<MigrationState>, DbErr> {
        let applied: HashSet<String> = seaql_migrations::Entity::find()
            .order_by_asc(seaql_migrations::Column::Version)
            .all(&self.connection)
            .await?
            .into_iter()
            .map(|m| m.version)
            .collect();

        Ok(Migrator::migrations()
            .iter()
            .map(|m| MigrationState {
                name: m.name().to_string(),
                applied: applied.contains(m.name()),
            })
            .collect())
    }

    pub async fn ping(&self) -> Result<(), DbErr> {
        self.connection
            .execute(Statement::from_string(self.backend(), "SELECT 1"))
            .await?;
        Ok(())
    }
}
