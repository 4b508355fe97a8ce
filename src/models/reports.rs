use serde::{Deserialize, Serialize};

use super::money::Money;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLine {
    pub game_id: i64,
    pub date: chrono::NaiveDateTime,
    pub players: i32,
    pub pot: Money,
    pub winner_money: Money,
    pub profit: Money,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSection {
    pub agent_id: String,
    pub agent_name: String,
    pub agent_phone: String,
    pub games: Vec<ReportLine>,
    pub subtotal: Money,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReport {
    pub generated_at: chrono::NaiveDateTime,
    pub sections: Vec<AgentSection>,
    pub grand_total: Money,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub format: Option<String>,
}
