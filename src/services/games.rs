//! Game session engine: round creation with cartela reservation, number
//! calling, settlement and cancellation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError, Stores};
use crate::{
    models::{
        cartelas::{Cartela, NewCartela, GRID_CELLS},
        games::{AgentGame, Game, GameConfig, NewGame},
        money::{InvalidAmount, Money},
    },
    repositories::{distinct_ids, CartelaStore, GameStore, UserStore},
};

pub enum GameRequest {
    CreateGame {
        agent_id: String,
        game: NewGame,
        response: oneshot::Sender<Result<Game, ServiceError>>,
    },
    RecordCalledNumbers {
        game_id: i64,
        numbers: Option<Vec<i32>>,
        response: oneshot::Sender<Result<Game, ServiceError>>,
    },
    EndGame {
        game_id: i64,
        winner_money: Option<Value>,
        response: oneshot::Sender<Result<Game, ServiceError>>,
    },
    CancelGame {
        game_id: i64,
        response: oneshot::Sender<Result<Game, ServiceError>>,
    },
    GetGame {
        game_id: i64,
        response: oneshot::Sender<Result<Game, ServiceError>>,
    },
    GameCartelas {
        game_id: i64,
        response: oneshot::Sender<Result<Vec<Cartela>, ServiceError>>,
    },
    AgentHistory {
        agent_id: String,
        response: oneshot::Sender<Result<Vec<Game>, ServiceError>>,
    },
    AllGames {
        response: oneshot::Sender<Result<Vec<AgentGame>, ServiceError>>,
    },
    AvailableCartelas {
        response: oneshot::Sender<Result<Vec<Cartela>, ServiceError>>,
    },
    RegisterCartela {
        cartela: NewCartela,
        response: oneshot::Sender<Result<Cartela, ServiceError>>,
    },
}

/// Reads a required non-negative amount given as a JSON number or numeric string.
fn amount(value: Option<Value>, field: &str) -> Result<Money, ServiceError> {
    let parsed = match value {
        None | Some(Value::Null) => {
            return Err(ServiceError::BadRequest(format!("{} is required.", field)))
        }
        Some(Value::Number(n)) => n.to_string().parse::<Money>(),
        Some(Value::String(s)) => s.parse::<Money>(),
        Some(_) => Err(InvalidAmount::Malformed),
    };

    match parsed {
        Ok(money) if money.is_negative() => Err(ServiceError::BadRequest(format!(
            "{} must not be negative.",
            field
        ))),
        Ok(money) => Ok(money),
        Err(e) => Err(ServiceError::BadRequest(format!(
            "{} must be an amount: {}.",
            field, e
        ))),
    }
}

fn player_count(value: Option<Value>) -> Result<i32, ServiceError> {
    let players = match value {
        None | Some(Value::Null) => {
            return Err(ServiceError::BadRequest("players is required.".to_string()))
        }
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };

    match players.and_then(|p| i32::try_from(p).ok()) {
        Some(p) if p >= 1 => Ok(p),
        _ => Err(ServiceError::BadRequest(
            "players must be a whole number of at least 1.".to_string(),
        )),
    }
}

/// Accepts `DD/MM/YYYY`, `YYYY-MM-DD` or RFC 3339. Anything else means `now`.
pub fn game_date(raw: Option<&str>, now: NaiveDateTime) -> NaiveDateTime {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return now;
    };

    let midnight = |date: NaiveDate| date.and_hms_opt(0, 0, 0);

    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .ok()
        .and_then(midnight)
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().and_then(midnight))
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_utc())
        })
        .unwrap_or_else(|| {
            log::debug!("Unparseable game date {:?}, using current time.", raw);
            now
        })
}

pub fn game_config(game: NewGame, now: NaiveDateTime) -> Result<GameConfig, ServiceError> {
    let players = player_count(game.players)?;
    let pot = amount(game.pot, "pot")?;
    let entry_fee = amount(game.entry_fee, "entryFee")?;

    Ok(GameConfig {
        players,
        pot,
        entry_fee,
        win_mode: game
            .win_mode
            .map(|mode| mode.trim().to_string())
            .filter(|mode| !mode.is_empty()),
        cartela_ids: distinct_ids(&game.cartela_ids.unwrap_or_default()),
        date: game_date(game.date.as_deref(), now),
    })
}

/// Completes a game's cartela list from its snapshot, sorted by id.
///
/// Registry records are used where they exist; ids missing from the registry
/// get a placeholder so callers always see the full selection.
pub fn complete_roster(game_id: i64, expected: &[i32], found: Vec<Cartela>) -> Vec<Cartela> {
    let mut roster: Vec<Cartela> = found
        .into_iter()
        .filter(|c| expected.contains(&c.id))
        .collect();

    for id in expected {
        if !roster.iter().any(|c| c.id == *id) {
            roster.push(Cartela::placeholder(*id, game_id));
        }
    }

    roster.sort_by_key(|c| c.id);
    roster
}

#[derive(Clone)]
pub struct GameRequestHandler {
    users: Arc<dyn UserStore>,
    cartelas: Arc<dyn CartelaStore>,
    games: Arc<dyn GameStore>,
}

impl GameRequestHandler {
    pub fn new(stores: Stores) -> Self {
        GameRequestHandler {
            users: stores.users,
            cartelas: stores.cartelas,
            games: stores.games,
        }
    }

    async fn create_game(&self, agent_id: &str, game: NewGame) -> Result<Game, ServiceError> {
        let config = game_config(game, Utc::now().naive_utc())?;

        let owner = self.users.get_owner().await?.ok_or_else(|| {
            log::error!("Game requested by {} but no owner is configured.", agent_id);
            ServiceError::Internal("No owner configured.".to_string())
        })?;

        let game = self
            .games
            .insert_game(agent_id, &owner.id, &config)
            .await
            .map_err(|e| {
                log::warn!("Could not create game for agent {}: {}", agent_id, e);
                ServiceError::from(e)
            })?;

        log::info!(
            "Agent {} created game {} with {} cartelas.",
            agent_id,
            game.id,
            game.cartelas.len()
        );
        Ok(game)
    }

    async fn record_called_numbers(
        &self,
        game_id: i64,
        numbers: Option<Vec<i32>>,
    ) -> Result<Game, ServiceError> {
        let numbers = numbers
            .ok_or_else(|| ServiceError::BadRequest("numbers are required.".to_string()))?;

        Ok(self.games.replace_called(game_id, &numbers).await?)
    }

    async fn end_game(
        &self,
        game_id: i64,
        winner_money: Option<Value>,
    ) -> Result<Game, ServiceError> {
        let winner_money = amount(winner_money, "winnerMoney")?;
        let game = self.games.settle_game(game_id, winner_money).await?;

        log::info!(
            "Game {} settled: pot {}, payout {}, profit {}.",
            game.id,
            game.pot,
            game.winner_money,
            game.profit
        );
        Ok(game)
    }

    async fn cancel_game(&self, game_id: i64) -> Result<Game, ServiceError> {
        let game = self.games.cancel_game(game_id).await?;

        log::info!("Game {} cancelled, cartelas released.", game.id);
        Ok(game)
    }

    async fn get_game(&self, game_id: i64) -> Result<Game, ServiceError> {
        self.games
            .get_game(game_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Game {} not found.", game_id)))
    }

    async fn game_cartelas(&self, game_id: i64) -> Result<Vec<Cartela>, ServiceError> {
        let game = self.get_game(game_id).await?;
        let linked = self.cartelas.linked_cartelas(game_id).await?;

        let expected = distinct_ids(&game.cartelas);
        if expected.iter().all(|id| linked.iter().any(|c| c.id == *id)) {
            return Ok(complete_roster(game_id, &expected, linked));
        }

        let found = self.cartelas.get_cartelas(&expected).await?;
        Ok(complete_roster(game_id, &expected, found))
    }

    async fn agent_history(&self, agent_id: &str) -> Result<Vec<Game>, ServiceError> {
        Ok(self.games.games_by_agent(agent_id).await?)
    }

    async fn all_games(&self) -> Result<Vec<AgentGame>, ServiceError> {
        Ok(self.games.all_games().await?)
    }

    async fn available_cartelas(&self) -> Result<Vec<Cartela>, ServiceError> {
        Ok(self.cartelas.list_available().await?)
    }

    async fn register_cartela(&self, cartela: NewCartela) -> Result<Cartela, ServiceError> {
        let id = cartela
            .id
            .ok_or_else(|| ServiceError::BadRequest("id is required.".to_string()))?;
        let grid = cartela
            .grid
            .ok_or_else(|| ServiceError::BadRequest("grid is required.".to_string()))?;

        if grid.len() != GRID_CELLS {
            return Err(ServiceError::BadRequest(format!(
                "grid must hold {} numbers.",
                GRID_CELLS
            )));
        }

        Ok(self.cartelas.insert_cartela(id, &grid).await?)
    }
}

#[async_trait]
impl RequestHandler<GameRequest> for GameRequestHandler {
    async fn handle_request(&self, request: GameRequest) {
        match request {
            GameRequest::CreateGame {
                agent_id,
                game,
                response,
            } => {
                let result = self.create_game(&agent_id, game).await;
                let _ = response.send(result);
            }
            GameRequest::RecordCalledNumbers {
                game_id,
                numbers,
                response,
            } => {
                let result = self.record_called_numbers(game_id, numbers).await;
                let _ = response.send(result);
            }
            GameRequest::EndGame {
                game_id,
                winner_money,
                response,
            } => {
                let result = self.end_game(game_id, winner_money).await;
                let _ = response.send(result);
            }
            GameRequest::CancelGame { game_id, response } => {
                let _ = response.send(self.cancel_game(game_id).await);
            }
            GameRequest::GetGame { game_id, response } => {
                let _ = response.send(self.get_game(game_id).await);
            }
            GameRequest::GameCartelas { game_id, response } => {
                let _ = response.send(self.game_cartelas(game_id).await);
            }
            GameRequest::AgentHistory { agent_id, response } => {
                let _ = response.send(self.agent_history(&agent_id).await);
            }
            GameRequest::AllGames { response } => {
                let _ = response.send(self.all_games().await);
            }
            GameRequest::AvailableCartelas { response } => {
                let _ = response.send(self.available_cartelas().await);
            }
            GameRequest::RegisterCartela { cartela, response } => {
                let _ = response.send(self.register_cartela(cartela).await);
            }
        }
    }
}

pub struct GameService;

impl GameService {
    pub fn new() -> Self {
        GameService {}
    }
}

#[async_trait]
impl Service<GameRequest, GameRequestHandler> for GameService {}
