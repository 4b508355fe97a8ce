use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgConnection, PgPool, Row};

use super::{cartelas, GameStore, RepositoryError};
use crate::models::{
    games::{self, AgentGame, Game, GameConfig},
    money::Money,
};

const AGENT_GAMES: &str = r#"
    SELECT g.*, u.name AS agent_name, u.phone AS agent_phone
    FROM games g
    JOIN users u ON u.id = g.agent_id
"#;

const AGENT_GAMES_ORDER: &str = "ORDER BY u.name, g.agent_id, g.date DESC, g.id DESC";

#[derive(Clone)]
pub struct GameRepository {
    conn: PgPool,
}

impl GameRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    async fn agent_games(&self, filter: &str) -> Result<Vec<AgentGame>, RepositoryError> {
        let query = format!("{} {} {}", AGENT_GAMES, filter, AGENT_GAMES_ORDER);
        let rows = sqlx::query(&query).fetch_all(&self.conn).await?;

        Ok(rows
            .iter()
            .map(agent_game_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl GameStore for GameRepository {
    async fn insert_game(
        &self,
        agent_id: &str,
        owner_id: &str,
        config: &GameConfig,
    ) -> Result<Game, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let row = sqlx::query(
            r#"
                INSERT INTO games
                (agent_id, owner_id, players, pot, entry_fee, win_mode, cartela_ids, date)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING *
            "#,
        )
        .bind(agent_id)
        .bind(owner_id)
        .bind(config.players)
        .bind(config.pot)
        .bind(config.entry_fee)
        .bind(&config.win_mode)
        .bind(&config.cartela_ids)
        .bind(config.date)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| missing_account(e, agent_id))?;
        let game = game_from_row(&row)?;

        // Dropping `tx` on error rolls the insert back.
        cartelas::reserve_in(&mut tx, &config.cartela_ids, game.id).await?;

        tx.commit().await?;

        Ok(game)
    }

    async fn get_game(&self, id: i64) -> Result<Option<Game>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM games WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(row.as_ref().map(game_from_row).transpose()?)
    }

    async fn replace_called(&self, id: i64, numbers: &[i32]) -> Result<Game, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let game = lock_game(&mut tx, id).await?;
        let status = game.status.after_calls(!numbers.is_empty())?;

        let row = sqlx::query("UPDATE games SET called = $2, status = $3 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(numbers)
            .bind(status.as_str())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(game_from_row(&row)?)
    }

    async fn settle_game(&self, id: i64, winner_money: Money) -> Result<Game, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let game = lock_game(&mut tx, id).await?;
        let status = game.status.after_settlement()?;
        let profit = games::profit(game.pot, winner_money);

        let row = sqlx::query(
            r#"
                UPDATE games SET winner_money = $2, profit = $3, status = $4
                WHERE id = $1
                RETURNING *
            "#,
        )
        .bind(id)
        .bind(winner_money)
        .bind(profit)
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await?;

        cartelas::retire_in(&mut tx, id).await?;

        tx.commit().await?;

        Ok(game_from_row(&row)?)
    }

    async fn cancel_game(&self, id: i64) -> Result<Game, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let game = lock_game(&mut tx, id).await?;
        let status = game.status.after_cancellation()?;

        let row = sqlx::query("UPDATE games SET status = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(status.as_str())
            .fetch_one(&mut *tx)
            .await?;

        cartelas::release_in(&mut tx, id).await?;

        tx.commit().await?;

        Ok(game_from_row(&row)?)
    }

    async fn games_by_agent(&self, agent_id: &str) -> Result<Vec<Game>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM games WHERE agent_id = $1 ORDER BY date DESC, id DESC")
            .bind(agent_id)
            .fetch_all(&self.conn)
            .await?;

        Ok(rows
            .iter()
            .map(game_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn all_games(&self) -> Result<Vec<AgentGame>, RepositoryError> {
        self.agent_games("").await
    }

    async fn completed_games(&self) -> Result<Vec<AgentGame>, RepositoryError> {
        self.agent_games("WHERE g.status = 'completed'").await
    }
}

/// A session token can outlive its account; the insert then trips the `agent_id` key.
fn missing_account(e: sqlx::Error, agent_id: &str) -> RepositoryError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_foreign_key_violation() {
            return RepositoryError::NotFound(format!("Agent {}", agent_id));
        }
    }

    RepositoryError::Database(e)
}

async fn lock_game(conn: &mut PgConnection, id: i64) -> Result<Game, RepositoryError> {
    let row = sqlx::query("SELECT * FROM games WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(game_from_row(&row)?),
        None => Err(RepositoryError::NotFound(format!("Game {}", id))),
    }
}

fn game_from_row(row: &PgRow) -> Result<Game, sqlx::Error> {
    let status: String = row.try_get("status")?;

    Ok(Game {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        owner_id: row.try_get("owner_id")?,
        players: row.try_get("players")?,
        pot: row.try_get("pot")?,
        entry_fee: row.try_get("entry_fee")?,
        win_mode: row.try_get("win_mode")?,
        cartelas: row.try_get("cartela_ids")?,
        called: row.try_get("called")?,
        winner_money: row.try_get("winner_money")?,
        profit: row.try_get("profit")?,
        status: status.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        date: row.try_get("date")?,
    })
}

fn agent_game_from_row(row: &PgRow) -> Result<AgentGame, sqlx::Error> {
    Ok(AgentGame {
        game: game_from_row(row)?,
        agent_name: row.try_get("agent_name")?,
        agent_phone: row.try_get("agent_phone")?,
    })
}
