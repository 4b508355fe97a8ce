use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use super::{CartelaStore, RepositoryError};
use crate::models::cartelas::Cartela;

#[derive(Clone)]
pub struct CartelaRepository {
    conn: PgPool,
}

impl CartelaRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CartelaStore for CartelaRepository {
    async fn insert_cartela(&self, id: i32, grid: &[i32]) -> Result<Cartela, RepositoryError> {
        let cartela = sqlx::query_as::<_, Cartela>(
            "INSERT INTO cartelas (id, grid) VALUES ($1, $2) RETURNING *",
        )
        .bind(id)
        .bind(grid)
        .fetch_one(&self.conn)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("Cartela {} already exists.", id))
            }
            _ => RepositoryError::Database(e),
        })?;

        Ok(cartela)
    }

    async fn list_available(&self) -> Result<Vec<Cartela>, RepositoryError> {
        let cartelas = sqlx::query_as::<_, Cartela>(
            "SELECT * FROM cartelas WHERE issued = false ORDER BY id",
        )
        .fetch_all(&self.conn)
        .await?;

        Ok(cartelas)
    }

    async fn get_cartelas(&self, ids: &[i32]) -> Result<Vec<Cartela>, RepositoryError> {
        let cartelas =
            sqlx::query_as::<_, Cartela>("SELECT * FROM cartelas WHERE id = ANY($1) ORDER BY id")
                .bind(ids)
                .fetch_all(&self.conn)
                .await?;

        Ok(cartelas)
    }

    async fn linked_cartelas(&self, game_id: i64) -> Result<Vec<Cartela>, RepositoryError> {
        let cartelas =
            sqlx::query_as::<_, Cartela>("SELECT * FROM cartelas WHERE game_id = $1 ORDER BY id")
                .bind(game_id)
                .fetch_all(&self.conn)
                .await?;

        Ok(cartelas)
    }

    async fn release(&self, game_id: i64) -> Result<u64, RepositoryError> {
        let mut conn = self.conn.acquire().await?;

        release_in(&mut conn, game_id).await
    }
}

/// Marks `ids` issued to `game_id` with a single conditional update.
///
/// Only unissued cards are touched, so two transactions racing for the same
/// card cannot both see it as free: the loser's update skips the row once the
/// winner commits, and the affected-row count comes up short.
pub(super) async fn reserve_in(
    conn: &mut PgConnection,
    ids: &[i32],
    game_id: i64,
) -> Result<(), RepositoryError> {
    if ids.is_empty() {
        return Ok(());
    }

    let reserved = sqlx::query(
        "UPDATE cartelas SET issued = true, game_id = $1 WHERE id = ANY($2) AND issued = false",
    )
    .bind(game_id)
    .bind(ids)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if reserved == ids.len() as u64 {
        return Ok(());
    }

    let found = sqlx::query_as::<_, Cartela>("SELECT * FROM cartelas WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;

    Err(reservation_error(ids, &found, game_id))
}

/// Explains a short reservation: unknown ids first, then cards held by another game.
pub(super) fn reservation_error(ids: &[i32], found: &[Cartela], game_id: i64) -> RepositoryError {
    let unknown: Vec<i32> = ids
        .iter()
        .filter(|id| !found.iter().any(|c| c.id == **id))
        .copied()
        .collect();
    if !unknown.is_empty() {
        return RepositoryError::Invalid(format!("Unknown cartelas: {:?}.", unknown));
    }

    let taken: Vec<i32> = found
        .iter()
        .filter(|c| c.issued && c.game_id != Some(game_id))
        .map(|c| c.id)
        .collect();
    RepositoryError::Conflict(format!(
        "Cartelas already issued to an active game: {:?}.",
        taken
    ))
}

pub(super) async fn release_in(
    conn: &mut PgConnection,
    game_id: i64,
) -> Result<u64, RepositoryError> {
    let released = sqlx::query("UPDATE cartelas SET issued = false, game_id = NULL WHERE game_id = $1")
        .bind(game_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    Ok(released)
}

/// Frees a settled game's cards for the next round while keeping their back-reference.
pub(super) async fn retire_in(
    conn: &mut PgConnection,
    game_id: i64,
) -> Result<u64, RepositoryError> {
    let retired = sqlx::query("UPDATE cartelas SET issued = false WHERE game_id = $1")
        .bind(game_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    Ok(retired)
}
