use async_trait::async_trait;

use crate::models::{
    cartelas::Cartela,
    games::{AgentGame, Game, GameConfig, TransitionError},
    money::Money,
    users::User,
};

pub mod cartelas;
pub mod games;
pub mod users;

#[cfg(test)]
pub mod memory;


#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0} not found.")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<TransitionError> for RepositoryError {
    fn from(e: TransitionError) -> Self {
        RepositoryError::Conflict(e.to_string())
    }
}

#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Fails with `Conflict` once any owner exists or the phone is taken.
    async fn insert_owner(
        &self,
        phone: &str,
        password_hash: &str,
        name: &str,
    ) -> Result<User, RepositoryError>;

    async fn insert_agent(
        &self,
        phone: &str,
        password_hash: &str,
        name: &str,
    ) -> Result<User, RepositoryError>;

    async fn get_user_by_phone(&self, phone: &str) -> Result<Option<User>, RepositoryError>;

    async fn get_owner(&self) -> Result<Option<User>, RepositoryError>;

    async fn list_agents(&self) -> Result<Vec<User>, RepositoryError>;

    /// Sets the agent's active flag, or flips it when `active` is `None`.
    async fn set_agent_active(
        &self,
        agent_id: &str,
        active: Option<bool>,
    ) -> Result<User, RepositoryError>;

    /// Removes the agent and its games, releasing their cartelas. Returns the number of games removed.
    async fn delete_agent(&self, agent_id: &str) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait CartelaStore: Send + Sync + 'static {
    async fn insert_cartela(&self, id: i32, grid: &[i32]) -> Result<Cartela, RepositoryError>;

    async fn list_available(&self) -> Result<Vec<Cartela>, RepositoryError>;

    async fn get_cartelas(&self, ids: &[i32]) -> Result<Vec<Cartela>, RepositoryError>;

    async fn linked_cartelas(&self, game_id: i64) -> Result<Vec<Cartela>, RepositoryError>;

    async fn release(&self, game_id: i64) -> Result<u64, RepositoryError>;
}

/// Game persistence. Every mutation applies the status rules from
/// `GameStatus` under the store's own lock or row lock.
#[async_trait]
pub trait GameStore: Send + Sync + 'static {
    /// Inserts the game and reserves its cartelas in one unit; neither survives a failed reservation.
    async fn insert_game(
        &self,
        agent_id: &str,
        owner_id: &str,
        config: &GameConfig,
    ) -> Result<Game, RepositoryError>;

    async fn get_game(&self, id: i64) -> Result<Option<Game>, RepositoryError>;

    async fn replace_called(&self, id: i64, numbers: &[i32]) -> Result<Game, RepositoryError>;

    async fn settle_game(&self, id: i64, winner_money: Money) -> Result<Game, RepositoryError>;

    async fn cancel_game(&self, id: i64) -> Result<Game, RepositoryError>;

    async fn games_by_agent(&self, agent_id: &str) -> Result<Vec<Game>, RepositoryError>;

    /// All games joined with agent details, ordered by agent name then date descending.
    async fn all_games(&self) -> Result<Vec<AgentGame>, RepositoryError>;

    async fn completed_games(&self) -> Result<Vec<AgentGame>, RepositoryError>;
}

/// Collapses repeated ids, keeping the order of first appearance.
pub fn distinct_ids(ids: &[i32]) -> Vec<i32> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
