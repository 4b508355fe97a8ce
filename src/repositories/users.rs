use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use super::{cartelas, RepositoryError, UserStore};
use crate::models::users::{Role, User};

/// Partial unique index allowing a single `owner` row.
const OWNER_CONSTRAINT: &str = "users_single_owner";

#[derive(Clone)]
pub struct UserRepository {
    conn: PgPool,
}

impl UserRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    async fn insert_user(
        &self,
        role: Role,
        phone: &str,
        password_hash: &str,
        name: &str,
    ) -> Result<User, RepositoryError> {
        let user_id = Uuid::new_v4().hyphenated().to_string();

        let row = sqlx::query(
            r#"
                INSERT INTO users (id, phone, password_hash, role, name)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
            "#,
        )
        .bind(&user_id)
        .bind(phone)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(name)
        .fetch_one(&self.conn)
        .await
        .map_err(unique_conflict)?;

        Ok(user_from_row(&row)?)
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn insert_owner(
        &self,
        phone: &str,
        password_hash: &str,
        name: &str,
    ) -> Result<User, RepositoryError> {
        self.insert_user(Role::Owner, phone, password_hash, name)
            .await
    }

    async fn insert_agent(
        &self,
        phone: &str,
        password_hash: &str,
        name: &str,
    ) -> Result<User, RepositoryError> {
        self.insert_user(Role::Agent, phone, password_hash, name)
            .await
    }

    async fn get_user_by_phone(&self, phone: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.conn)
            .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn get_owner(&self) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE role = 'owner' LIMIT 1")
            .fetch_optional(&self.conn)
            .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn list_agents(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM users WHERE role = 'agent' ORDER BY name, created_at")
            .fetch_all(&self.conn)
            .await?;

        Ok(rows
            .iter()
            .map(user_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn set_agent_active(
        &self,
        agent_id: &str,
        active: Option<bool>,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query(
            r#"
                UPDATE users SET active = COALESCE($2, NOT active)
                WHERE id = $1 AND role = 'agent'
                RETURNING *
            "#,
        )
        .bind(agent_id)
        .bind(active)
        .fetch_optional(&self.conn)
        .await?;

        match row {
            Some(row) => Ok(user_from_row(&row)?),
            None => Err(RepositoryError::NotFound(format!("Agent {}", agent_id))),
        }
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<u64, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let agent = sqlx::query("SELECT id FROM users WHERE id = $1 AND role = 'agent' FOR UPDATE")
            .bind(agent_id)
            .fetch_optional(&mut *tx)
            .await?;
        if agent.is_none() {
            return Err(RepositoryError::NotFound(format!("Agent {}", agent_id)));
        }

        let game_ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM games WHERE agent_id = $1")
            .bind(agent_id)
            .fetch_all(&mut *tx)
            .await?;
        for game_id in &game_ids {
            cartelas::release_in(&mut tx, *game_id).await?;
        }

        let removed = sqlx::query("DELETE FROM games WHERE agent_id = $1")
            .bind(agent_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(removed)
    }
}

fn unique_conflict(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            let message = match db.constraint() {
                Some(OWNER_CONSTRAINT) => "An owner is already registered.",
                _ => "Phone number is already registered.",
            };
            return RepositoryError::Conflict(message.to_string());
        }
    }

    RepositoryError::Database(e)
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    let role: String = row.try_get("role")?;

    Ok(User {
        id: row.try_get("id")?,
        phone: row.try_get("phone")?,
        password_hash: row.try_get("password_hash")?,
        role: role.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        name: row.try_get("name")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}
