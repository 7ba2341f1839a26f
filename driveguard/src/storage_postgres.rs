use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use std::sync::Arc;
use tracing::info;

use crate::{
    error::Result,
    profile::{ProfileStore, UserProfile},
    session::{Session, SessionStorage},
};

async fn connect_pool(database_url: &str) -> Result<Arc<PgPool>> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    Ok(Arc::new(pool))
}

/// PostgreSQL-backed session storage
pub struct PostgresSessionStorage {
    pool: Arc<PgPool>,
}

impl PostgresSessionStorage {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let storage = Self {
            pool: connect_pool(database_url).await?,
        };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                wallet_address TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&*self.pool)
        .await?;
        info!("sessions table ready");
        Ok(())
    }
}

#[async_trait]
impl SessionStorage for PostgresSessionStorage {
    async fn save(&self, session: Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, wallet_address, role, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET wallet_address = EXCLUDED.wallet_address,
                role = EXCLUDED.role
            "#,
        )
        .bind(&session.id)
        .bind(&session.wallet_address)
        .bind(session.role.as_str())
        .bind(session.created_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        let row = sqlx::query(
            "SELECT id, wallet_address, role, created_at FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        match row {
            Some(row) => {
                let role: String = row.try_get("role")?;
                let created_at: DateTime<Utc> = row.try_get("created_at")?;
                Ok(Some(Session {
                    id: row.try_get("id")?,
                    wallet_address: row.try_get("wallet_address")?,
                    role: role.parse()?,
                    created_at,
                }))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }
}

/// PostgreSQL-backed `Users` collection; each profile is one JSONB document
pub struct PostgresProfileStore {
    pool: Arc<PgPool>,
}

impl PostgresProfileStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let store = Self {
            pool: connect_pool(database_url).await?,
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                wallet_address TEXT PRIMARY KEY,
                document JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&*self.pool)
        .await?;
        info!("users table ready");
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    async fn put(&self, profile: UserProfile) -> Result<()> {
        let document = serde_json::to_value(&profile)?;
        sqlx::query(
            r#"
            INSERT INTO users (wallet_address, document, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (wallet_address) DO UPDATE
            SET document = EXCLUDED.document,
                updated_at = NOW()
            "#,
        )
        .bind(&profile.wallet_address)
        .bind(document)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, wallet_address: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT document FROM users WHERE wallet_address = $1")
            .bind(wallet_address)
            .fetch_optional(&*self.pool)
            .await?;

        match row {
            Some(row) => {
                let document: serde_json::Value = row.try_get("document")?;
                Ok(Some(serde_json::from_value(document)?))
            }
            None => Ok(None),
        }
    }
}
