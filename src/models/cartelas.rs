use serde::{Deserialize, Serialize};

/// Cells per card: 5x5, row-major, centre cell `0` is the free space.
pub const GRID_CELLS: usize = 25;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Cartela {
    pub id: i32,
    pub grid: Vec<i32>,
    pub issued: bool,
    pub game_id: Option<i64>,
}

impl Cartela {
    /// Stand-in for a card id recorded on a game but no longer present in the registry.
    pub fn placeholder(id: i32, game_id: i64) -> Self {
        Cartela {
            id,
            grid: Vec::new(),
            issued: false,
            game_id: Some(game_id),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewCartela {
    pub id: Option<i32>,
    pub grid: Option<Vec<i32>>,
}
