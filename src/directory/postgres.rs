//! Postgres-backed user directory over a single `tokio-postgres` client.

use anyhow::Context;
use async_trait::async_trait;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Row};

use super::{DirectoryError, User, UserDirectory, UserId, UserRecord};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    encrypted_password TEXT NOT NULL
)";

pub struct PgUserDirectory {
    client: Client,
}

impl PgUserDirectory {
    /// Connect and drive the connection on a background task.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .context("Unable to connect to user database")?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(target: "sessiongate::directory", "postgres connection error: {e}");
            }
        });
        Ok(Self { client })
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        self.client.batch_execute(SCHEMA).await.context("While creating users table")?;
        Ok(())
    }
}

fn backend(e: tokio_postgres::Error) -> DirectoryError {
    DirectoryError::Backend(e.to_string())
}

fn row_to_user(row: &Row) -> Result<User, DirectoryError> {
    let id: i64 = row.try_get("id").map_err(backend)?;
    Ok(User {
        id: UserId::try_from(id).map_err(|_| DirectoryError::Backend(format!("negative user id {id}")))?,
        name: row.try_get("name").map_err(backend)?,
        email: row.try_get("email").map_err(backend)?,
        encrypted_password: row.try_get("encrypted_password").map_err(backend)?,
    })
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_id(&self, id: UserId) -> Result<User, DirectoryError> {
        // Ids beyond BIGINT cannot exist in the table.
        let Ok(id) = i64::try_from(id) else { return Err(DirectoryError::NotFound); };
        let row = self.client
            .query_opt("SELECT id, name, email, encrypted_password FROM users WHERE id = $1", &[&id])
            .await
            .map_err(backend)?;
        row.as_ref().map(row_to_user).unwrap_or(Err(DirectoryError::NotFound))
    }

    async fn find_by_email(&self, email: &str) -> Result<User, DirectoryError> {
        let row = self.client
            .query_opt("SELECT id, name, email, encrypted_password FROM users WHERE email = $1", &[&email])
            .await
            .map_err(backend)?;
        row.as_ref().map(row_to_user).unwrap_or(Err(DirectoryError::NotFound))
    }

    async fn create(&self, record: UserRecord) -> Result<User, DirectoryError> {
        let res = self.client
            .query_one(
                "INSERT INTO users (name, email, encrypted_password) VALUES ($1, $2, $3) RETURNING id, name, email, encrypted_password",
                &[&record.name, &record.email, &record.encrypted_password],
            )
            .await;
        match res {
            Ok(row) => row_to_user(&row),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => Err(DirectoryError::Conflict(record.email)),
            Err(e) => Err(backend(e)),
        }
    }
}
