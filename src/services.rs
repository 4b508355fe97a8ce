use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::repositories::{
    cartelas::CartelaRepository, games::GameRepository, users::UserRepository, CartelaStore,
    GameStore, RepositoryError, UserStore,
};
use crate::settings::Settings;

pub mod auth;
pub mod games;
pub mod http;
pub mod reports;
pub mod users;

const CHANNEL_CAPACITY: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for ServiceError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(_) => ServiceError::NotFound(e.to_string()),
            RepositoryError::Conflict(message) => ServiceError::Conflict(message),
            RepositoryError::Invalid(message) => ServiceError::BadRequest(message),
            RepositoryError::Database(e) => {
                log::error!("Storage failure: {}", e);
                ServiceError::Internal(format!("Database error: {}", e))
            }
        }
    }
}

/// Trimmed, non-empty text field or a `BadRequest` naming it.
pub(crate) fn required_text(value: Option<String>, field: &str) -> Result<String, ServiceError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ServiceError::BadRequest(format!("{} is required.", field))),
    }
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub cartelas: Arc<dyn CartelaStore>,
    pub games: Arc<dyn GameStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Stores {
            users: Arc::new(UserRepository::new(pool.clone())),
            cartelas: Arc::new(CartelaRepository::new(pool.clone())),
            games: Arc::new(GameRepository::new(pool)),
        }
    }
}

#[derive(Clone)]
pub struct Channels {
    pub users: mpsc::Sender<users::UserRequest>,
    pub games: mpsc::Sender<games::GameRequest>,
    pub reports: mpsc::Sender<reports::ReportRequest>,
}

pub fn spawn_services(stores: Stores) -> Channels {
    let (user_tx, mut user_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (game_tx, mut game_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (report_tx, mut report_rx) = mpsc::channel(CHANNEL_CAPACITY);

    log::info!("Starting user service.");
    let user_store = stores.users.clone();
    tokio::spawn(async move {
        let mut user_service = users::UserService::new();
        user_service
            .run(users::UserRequestHandler::new(user_store), &mut user_rx)
            .await;
    });

    log::info!("Starting game service.");
    let game_stores = stores.clone();
    tokio::spawn(async move {
        let mut game_service = games::GameService::new();
        game_service
            .run(games::GameRequestHandler::new(game_stores), &mut game_rx)
            .await;
    });

    log::info!("Starting report service.");
    let report_store = stores.games.clone();
    tokio::spawn(async move {
        let mut report_service = reports::ReportService::new();
        report_service
            .run(reports::ReportRequestHandler::new(report_store), &mut report_rx)
            .await;
    });

    Channels {
        users: user_tx,
        games: game_tx,
        reports: report_tx,
    }
}

pub async fn start_services(pool: PgPool, settings: Settings) -> Result<(), anyhow::Error> {
    let channels = spawn_services(Stores::postgres(pool));
    let signer = auth::TokenSigner::new(&settings.auth.jwt_secret, settings.auth.token_ttl_hours);

    log::info!("Starting HTTP server.");
    http::start_http_server(&settings.server, channels, signer).await
}
