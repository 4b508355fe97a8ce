//! In-process store with the same contract as the Postgres repositories.
//! Every mutation runs under one lock, mirroring the row locks taken there.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::{cartelas::reservation_error, CartelaStore, GameStore, RepositoryError, UserStore};
use crate::models::{
    cartelas::Cartela,
    games::{self, AgentGame, Game, GameConfig, GameStatus},
    money::Money,
    users::{Role, User},
};

#[derive(Default)]
struct State {
    users: Vec<User>,
    cartelas: BTreeMap<i32, Cartela>,
    games: BTreeMap<i64, Game>,
    next_game_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with cards `1..=count`.
    pub fn with_cartelas(count: i32) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for id in 1..=count {
                state.cartelas.insert(
                    id,
                    Cartela {
                        id,
                        grid: (0..25).collect(),
                        issued: false,
                        game_id: None,
                    },
                );
            }
        }
        store
    }

    /// Drops a card from the registry, as if it were retired out of band.
    pub fn remove_cartela(&self, id: i32) {
        self.lock().cartelas.remove(&id);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert_user(
        &self,
        role: Role,
        phone: &str,
        password_hash: &str,
        name: &str,
    ) -> Result<User, RepositoryError> {
        let mut state = self.lock();

        if role == Role::Owner && state.users.iter().any(|u| u.role == Role::Owner) {
            return Err(RepositoryError::Conflict(
                "An owner is already registered.".to_string(),
            ));
        }
        if state.users.iter().any(|u| u.phone == phone) {
            return Err(RepositoryError::Conflict(
                "Phone number is already registered.".to_string(),
            ));
        }

        let user = User {
            id: Uuid::new_v4().hyphenated().to_string(),
            phone: phone.to_string(),
            password_hash: password_hash.to_string(),
            role,
            name: name.to_string(),
            active: true,
            created_at: chrono::Utc::now().naive_utc(),
        };
        state.users.push(user.clone());

        Ok(user)
    }
}

impl State {
    fn game_mut(&mut self, id: i64) -> Result<&mut Game, RepositoryError> {
        self.games
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Game {}", id)))
    }

    fn release(&mut self, game_id: i64, clear_link: bool) -> u64 {
        let mut count = 0;
        for cartela in self.cartelas.values_mut() {
            if cartela.game_id == Some(game_id) {
                cartela.issued = false;
                if clear_link {
                    cartela.game_id = None;
                }
                count += 1;
            }
        }
        count
    }

    fn agent_games(&self, completed_only: bool) -> Vec<AgentGame> {
        let mut rows: Vec<AgentGame> = self
            .games
            .values()
            .filter(|g| !completed_only || g.status == GameStatus::Completed)
            .filter_map(|g| {
                let agent = self.users.iter().find(|u| u.id == g.agent_id)?;
                Some(AgentGame {
                    game: g.clone(),
                    agent_name: agent.name.clone(),
                    agent_phone: agent.phone.clone(),
                })
            })
            .collect();

        rows.sort_by(|a, b| {
            a.agent_name
                .cmp(&b.agent_name)
                .then_with(|| a.game.agent_id.cmp(&b.game.agent_id))
                .then_with(|| b.game.date.cmp(&a.game.date))
                .then_with(|| b.game.id.cmp(&a.game.id))
        });
        rows
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_owner(
        &self,
        phone: &str,
        password_hash: &str,
        name: &str,
    ) -> Result<User, RepositoryError> {
        self.insert_user(Role::Owner, phone, password_hash, name)
    }

    async fn insert_agent(
        &self,
        phone: &str,
        password_hash: &str,
        name: &str,
    ) -> Result<User, RepositoryError> {
        self.insert_user(Role::Agent, phone, password_hash, name)
    }

    async fn get_user_by_phone(&self, phone: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.lock().users.iter().find(|u| u.phone == phone).cloned())
    }

    async fn get_owner(&self) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.role == Role::Owner)
            .cloned())
    }

    async fn list_agents(&self) -> Result<Vec<User>, RepositoryError> {
        let mut agents: Vec<User> = self
            .lock()
            .users
            .iter()
            .filter(|u| u.role == Role::Agent)
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name).then(a.created_at.cmp(&b.created_at)));
        Ok(agents)
    }

    async fn set_agent_active(
        &self,
        agent_id: &str,
        active: Option<bool>,
    ) -> Result<User, RepositoryError> {
        let mut state = self.lock();
        let agent = state
            .users
            .iter_mut()
            .find(|u| u.id == agent_id && u.role == Role::Agent)
            .ok_or_else(|| RepositoryError::NotFound(format!("Agent {}", agent_id)))?;

        agent.active = active.unwrap_or(!agent.active);
        Ok(agent.clone())
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<u64, RepositoryError> {
        let mut state = self.lock();
        if !state
            .users
            .iter()
            .any(|u| u.id == agent_id && u.role == Role::Agent)
        {
            return Err(RepositoryError::NotFound(format!("Agent {}", agent_id)));
        }

        let game_ids: Vec<i64> = state
            .games
            .values()
            .filter(|g| g.agent_id == agent_id)
            .map(|g| g.id)
            .collect();
        for id in &game_ids {
            state.release(*id, true);
            state.games.remove(id);
        }
        state.users.retain(|u| u.id != agent_id);

        Ok(game_ids.len() as u64)
    }
}

#[async_trait]
impl CartelaStore for MemoryStore {
    async fn insert_cartela(&self, id: i32, grid: &[i32]) -> Result<Cartela, RepositoryError> {
        let mut state = self.lock();
        if state.cartelas.contains_key(&id) {
            return Err(RepositoryError::Conflict(format!(
                "Cartela {} already exists.",
                id
            )));
        }

        let cartela = Cartela {
            id,
            grid: grid.to_vec(),
            issued: false,
            game_id: None,
        };
        state.cartelas.insert(id, cartela.clone());
        Ok(cartela)
    }

    async fn list_available(&self) -> Result<Vec<Cartela>, RepositoryError> {
        Ok(self
            .lock()
            .cartelas
            .values()
            .filter(|c| !c.issued)
            .cloned()
            .collect())
    }

    async fn get_cartelas(&self, ids: &[i32]) -> Result<Vec<Cartela>, RepositoryError> {
        Ok(self
            .lock()
            .cartelas
            .values()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn linked_cartelas(&self, game_id: i64) -> Result<Vec<Cartela>, RepositoryError> {
        Ok(self
            .lock()
            .cartelas
            .values()
            .filter(|c| c.game_id == Some(game_id))
            .cloned()
            .collect())
    }

    async fn release(&self, game_id: i64) -> Result<u64, RepositoryError> {
        Ok(self.lock().release(game_id, true))
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn insert_game(
        &self,
        agent_id: &str,
        owner_id: &str,
        config: &GameConfig,
    ) -> Result<Game, RepositoryError> {
        let mut state = self.lock();
        if !state.users.iter().any(|u| u.id == agent_id) {
            return Err(RepositoryError::NotFound(format!("Agent {}", agent_id)));
        }
        let game_id = state.next_game_id + 1;

        let free = config.cartela_ids.iter().all(|id| {
            state
                .cartelas
                .get(id)
                .map(|c| !c.issued)
                .unwrap_or(false)
        });
        if !free {
            let found: Vec<Cartela> = config
                .cartela_ids
                .iter()
                .filter_map(|id| state.cartelas.get(id).cloned())
                .collect();
            return Err(reservation_error(&config.cartela_ids, &found, game_id));
        }

        for id in &config.cartela_ids {
            if let Some(cartela) = state.cartelas.get_mut(id) {
                cartela.issued = true;
                cartela.game_id = Some(game_id);
            }
        }

        let game = Game {
            id: game_id,
            agent_id: agent_id.to_string(),
            owner_id: owner_id.to_string(),
            players: config.players,
            pot: config.pot,
            entry_fee: config.entry_fee,
            win_mode: config.win_mode.clone(),
            cartelas: config.cartela_ids.clone(),
            called: Vec::new(),
            winner_money: Money::ZERO,
            profit: Money::ZERO,
            status: GameStatus::Created,
            date: config.date,
        };
        state.next_game_id = game_id;
        state.games.insert(game_id, game.clone());

        Ok(game)
    }

    async fn get_game(&self, id: i64) -> Result<Option<Game>, RepositoryError> {
        Ok(self.lock().games.get(&id).cloned())
    }

    async fn replace_called(&self, id: i64, numbers: &[i32]) -> Result<Game, RepositoryError> {
        let mut state = self.lock();
        let game = state.game_mut(id)?;

        game.status = game.status.after_calls(!numbers.is_empty())?;
        game.called = numbers.to_vec();
        Ok(game.clone())
    }

    async fn settle_game(&self, id: i64, winner_money: Money) -> Result<Game, RepositoryError> {
        let mut state = self.lock();
        let game = state.game_mut(id)?;

        game.status = game.status.after_settlement()?;
        game.winner_money = winner_money;
        game.profit = games::profit(game.pot, winner_money);
        let game = game.clone();

        state.release(id, false);
        Ok(game)
    }

    async fn cancel_game(&self, id: i64) -> Result<Game, RepositoryError> {
        let mut state = self.lock();
        let game = state.game_mut(id)?;

        game.status = game.status.after_cancellation()?;
        let game = game.clone();

        state.release(id, true);
        Ok(game)
    }

    async fn games_by_agent(&self, agent_id: &str) -> Result<Vec<Game>, RepositoryError> {
        let mut games: Vec<Game> = self
            .lock()
            .games
            .values()
            .filter(|g| g.agent_id == agent_id)
            .cloned()
            .collect();
        games.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(games)
    }

    async fn all_games(&self) -> Result<Vec<AgentGame>, RepositoryError> {
        Ok(self.lock().agent_games(false))
    }

    async fn completed_games(&self) -> Result<Vec<AgentGame>, RepositoryError> {
        Ok(self.lock().agent_games(true))
    }
}
