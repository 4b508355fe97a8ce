use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{money::Money, UnknownVariant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum GameStatus {
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("Cannot {action} a game that is {from}.")]
pub struct TransitionError {
    pub from: GameStatus,
    pub action: &'static str,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Created => "created",
            GameStatus::InProgress => "in-progress",
            GameStatus::Completed => "completed",
            GameStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, GameStatus::Completed | GameStatus::Cancelled)
    }

    /// Status after the call history is replaced. Calling starts the round.
    pub fn after_calls(self, has_calls: bool) -> Result<GameStatus, TransitionError> {
        if self.is_closed() {
            return Err(TransitionError {
                from: self,
                action: "record numbers for",
            });
        }

        match self {
            GameStatus::Created if has_calls => Ok(GameStatus::InProgress),
            _ => Ok(self),
        }
    }

    /// Settling again after completion is allowed; the last payout wins.
    pub fn after_settlement(self) -> Result<GameStatus, TransitionError> {
        match self {
            GameStatus::Cancelled => Err(TransitionError {
                from: self,
                action: "settle",
            }),
            _ => Ok(GameStatus::Completed),
        }
    }

    pub fn after_cancellation(self) -> Result<GameStatus, TransitionError> {
        match self {
            GameStatus::Completed => Err(TransitionError {
                from: self,
                action: "cancel",
            }),
            _ => Ok(GameStatus::Cancelled),
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(GameStatus::Created),
            "in-progress" => Ok(GameStatus::InProgress),
            "completed" => Ok(GameStatus::Completed),
            "cancelled" => Ok(GameStatus::Cancelled),
            other => Err(UnknownVariant {
                kind: "game status",
                value: other.to_string(),
            }),
        }
    }
}

/// House margin for a round. Negative when the payout exceeds the pot.
pub fn profit(pot: Money, winner_money: Money) -> Money {
    pot - winner_money
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: i64,
    pub agent_id: String,
    pub owner_id: String,
    pub players: i32,
    pub pot: Money,
    pub entry_fee: Money,
    pub win_mode: Option<String>,
    pub cartelas: Vec<i32>,
    pub called: Vec<i32>,
    pub winner_money: Money,
    pub profit: Money,
    pub status: GameStatus,
    pub date: chrono::NaiveDateTime,
}

/// A game joined with the display details of the agent running it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentGame {
    #[serde(flatten)]
    pub game: Game,
    pub agent_name: String,
    pub agent_phone: String,
}

/// Request body for a new round. Numeric fields stay loosely typed until validated.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGame {
    pub players: Option<Value>,
    pub pot: Option<Value>,
    pub entry_fee: Option<Value>,
    pub win_mode: Option<String>,
    #[serde(alias = "cartelas")]
    pub cartela_ids: Option<Vec<i32>>,
    pub date: Option<String>,
}

/// Validated configuration snapshot stored with a game.
#[derive(Clone, Debug, PartialEq)]
pub struct GameConfig {
    pub players: i32,
    pub pot: Money,
    pub entry_fee: Money,
    pub win_mode: Option<String>,
    pub cartela_ids: Vec<i32>,
    pub date: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CalledNumbers {
    #[serde(alias = "called")]
    pub numbers: Option<Vec<i32>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EndGame {
    #[serde(rename = "winnerMoney", alias = "winnermoney", alias = "winner_money")]
    pub winner_money: Option<Value>,
}
