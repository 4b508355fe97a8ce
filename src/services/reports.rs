use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::{
    models::{
        games::AgentGame,
        reports::{AgentSection, OwnerReport, ReportLine},
    },
    repositories::GameStore,
};

const LINES_PER_PAGE: usize = 48;
const RULE_WIDTH: usize = 72;

pub enum ReportRequest {
    OwnerReport {
        response: oneshot::Sender<Result<OwnerReport, ServiceError>>,
    },
}

/// Groups settled games by agent id and totals their profit.
pub fn build_owner_report(rows: Vec<AgentGame>, generated_at: NaiveDateTime) -> OwnerReport {
    let mut sections: Vec<AgentSection> = Vec::new();

    for row in rows {
        let line = ReportLine {
            game_id: row.game.id,
            date: row.game.date,
            players: row.game.players,
            pot: row.game.pot,
            winner_money: row.game.winner_money,
            profit: row.game.profit,
        };

        match sections
            .iter_mut()
            .find(|section| section.agent_id == row.game.agent_id)
        {
            Some(section) => {
                section.subtotal += line.profit;
                section.games.push(line);
            }
            None => sections.push(AgentSection {
                agent_id: row.game.agent_id,
                agent_name: row.agent_name,
                agent_phone: row.agent_phone,
                subtotal: line.profit,
                games: vec![line],
            }),
        }
    }

    let grand_total = sections.iter().map(|section| section.subtotal).sum();

    OwnerReport {
        generated_at,
        sections,
        grand_total,
    }
}

/// Renders the report as a plain-text document, pages separated by form feeds.
pub fn render_report(report: &OwnerReport) -> String {
    let mut body: Vec<String> = Vec::new();

    if report.sections.is_empty() {
        body.push("No completed games.".to_string());
        body.push(String::new());
    }

    for section in &report.sections {
        body.push(format!("Agent: {} ({})", section.agent_name, section.agent_phone));
        body.push(format!(
            "  {:<8} {:<12} {:>8} {:>12} {:>12} {:>12}",
            "Game", "Date", "Players", "Pot", "Payout", "Profit"
        ));
        for line in &section.games {
            body.push(format!(
                "  {:<8} {:<12} {:>8} {:>12} {:>12} {:>12}",
                line.game_id,
                line.date.format("%Y-%m-%d"),
                line.players,
                line.pot,
                line.winner_money,
                line.profit
            ));
        }
        body.push(format!("  {:<56} {:>12}", "Subtotal", section.subtotal));
        body.push(String::new());
    }

    body.push("=".repeat(RULE_WIDTH));
    body.push(format!("{:<58} {:>12}", "GRAND TOTAL", report.grand_total));

    let pages: Vec<&[String]> = body.chunks(LINES_PER_PAGE).collect();
    let mut document = String::new();

    for (index, page) in pages.iter().enumerate() {
        if index > 0 {
            document.push('\u{c}');
        }
        let _ = writeln!(
            document,
            "{:<58} {:>12}",
            "OWNER PROFIT REPORT",
            format!("Page {}/{}", index + 1, pages.len())
        );
        let _ = writeln!(
            document,
            "Generated {}",
            report.generated_at.format("%Y-%m-%d %H:%M")
        );
        let _ = writeln!(document, "{}", "=".repeat(RULE_WIDTH));
        let _ = writeln!(document);
        for line in page.iter() {
            let _ = writeln!(document, "{}", line);
        }
    }

    document
}

#[derive(Clone)]
pub struct ReportRequestHandler {
    games: Arc<dyn GameStore>,
}

impl ReportRequestHandler {
    pub fn new(games: Arc<dyn GameStore>) -> Self {
        Self { games }
    }

    async fn owner_report(&self) -> Result<OwnerReport, ServiceError> {
        let rows = self.games.completed_games().await?;
        let report = build_owner_report(rows, Utc::now().naive_utc());

        log::info!(
            "Built owner report: {} agents, grand total {}.",
            report.sections.len(),
            report.grand_total
        );
        Ok(report)
    }
}

#[async_trait]
impl RequestHandler<ReportRequest> for ReportRequestHandler {
    async fn handle_request(&self, request: ReportRequest) {
        match request {
            ReportRequest::OwnerReport { response } => {
                let _ = response.send(self.owner_report().await);
            }
        }
    }
}

pub struct ReportService;

impl ReportService {
    pub fn new() -> Self {
        ReportService {}
    }
}

#[async_trait]
impl Service<ReportRequest, ReportRequestHandler> for ReportService {}
