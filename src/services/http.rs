use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use tokio::sync::{mpsc, oneshot};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{auth::TokenSigner, Channels, ServiceError};
use crate::settings;

mod errors;
mod games;
mod gateway;
mod reports;
mod users;

use errors::ApiError;

#[derive(Clone)]
pub struct AppState {
    channels: Channels,
    signer: Arc<TokenSigner>,
}

/// Sends a request to a service and waits for its answer.
async fn ask<R, T>(
    channel: &mpsc::Sender<R>,
    request: impl FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> R,
) -> Result<T, ApiError> {
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(request(response_tx))
        .await
        .map_err(|e| ServiceError::Internal(format!("Failed to process request: {}", e)))?;

    let result = response_rx
        .await
        .map_err(|e| ServiceError::Internal(format!("Failed to receive response: {}", e)))?;

    Ok(result?)
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if allowed_origin == "*" {
        return layer.allow_origin(Any);
    }

    match allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            log::warn!("Ignoring invalid allowed origin {:?}: {}", allowed_origin, e);
            layer
        }
    }
}

pub fn router(channels: Channels, signer: TokenSigner, allowed_origin: &str) -> Router {
    let state = AppState {
        channels,
        signer: Arc::new(signer),
    };

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/owner", post(users::create_owner))
        .route("/login", post(users::login))
        .route("/agents", get(users::list_agents).post(users::create_agent))
        .route("/agents/{id}", delete(users::delete_agent))
        .route("/agents/{id}/toggle", post(users::toggle_agent))
        .route("/agents/{id}/active", put(users::set_agent_active))
        .route("/games", get(games::all_games).post(games::create_game))
        .route("/games/my-history", get(games::my_history))
        .route("/games/{id}", get(games::get_game))
        .route("/games/{id}/cartelas", get(games::game_cartelas))
        .route("/games/{id}/called", post(games::record_called_numbers))
        .route("/games/{id}/end", post(games::end_game))
        .route("/games/{id}/cancel", post(games::cancel_game))
        .route(
            "/cartelas",
            get(games::available_cartelas).post(games::register_cartela),
        )
        .route("/reports/owner", get(reports::owner_report))
        .with_state(state)
        .layer(cors_layer(allowed_origin))
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(
    settings: &settings::Server,
    channels: Channels,
    signer: TokenSigner,
) -> Result<(), anyhow::Error> {
    let app = router(channels, signer, &settings.allowed_origin);

    let listener = tokio::net::TcpListener::bind(&settings.listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::router;
    use crate::repositories::memory::MemoryStore;
    use crate::services::{auth::TokenSigner, spawn_services, Stores};

    fn app() -> Router {
        let store = Arc::new(MemoryStore::with_cartelas(20));
        let channels = spawn_services(Stores {
            users: store.clone(),
            cartelas: store.clone(),
            games: store,
        });

        router(channels, TokenSigner::new("test-secret", 168), "*")
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, String) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(body) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, text) = send(app, method, uri, token, body).await;
        let json = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap()
        };
        (status, json)
    }

    async fn login(app: &Router, phone: &str, password: &str) -> (StatusCode, Value) {
        call(
            app,
            "POST",
            "/login",
            None,
            Some(json!({ "phone": phone, "password": password })),
        )
        .await
    }

    /// Owner "0911" and agent "0922" registered, returning both tokens.
    async fn bootstrap(app: &Router) -> (String, String, String) {
        let (status, _) = call(
            app,
            "POST",
            "/owner",
            None,
            Some(json!({ "phone": "0911", "password": "pw", "name": "Hall" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, owner) = login(app, "0911", "pw").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(owner["role"], "owner");
        let owner_token = owner["token"].as_str().unwrap().to_string();

        let (status, agent) = call(
            app,
            "POST",
            "/agents",
            Some(&owner_token),
            Some(json!({ "phone": "0922", "password": "pw", "name": "Abebe" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let agent_id = agent["id"].as_str().unwrap().to_string();

        let (status, agent_login) = login(app, "0922", "pw").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(agent_login["role"], "agent");
        assert_eq!(agent_login["userId"], agent_id.as_str());

        (
            owner_token,
            agent_login["token"].as_str().unwrap().to_string(),
            agent_id,
        )
    }

    #[tokio::test]
    async fn full_round_reaches_the_owner_report() {
        let app = app();
        let (owner, agent, _) = bootstrap(&app).await;

        let (status, game) = call(
            &app,
            "POST",
            "/games",
            Some(&agent),
            Some(json!({ "players": 10, "pot": 100, "entryFee": 10, "cartelas": [1, 2] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(game["status"], "created");
        assert_eq!(game["profit"], 0.0);
        assert_eq!(game["called"], json!([]));
        let id = game["id"].as_i64().unwrap();

        let (status, called) = call(
            &app,
            "POST",
            &format!("/games/{}/called", id),
            Some(&agent),
            Some(json!({ "numbers": [12, 45, 3] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(called["status"], "in-progress");
        assert_eq!(called["called"], json!([12, 45, 3]));

        let (status, settled) = call(
            &app,
            "POST",
            &format!("/games/{}/end", id),
            Some(&agent),
            Some(json!({ "winnerMoney": 60 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(settled["profit"], 40.0);
        assert_eq!(settled["status"], "completed");

        let (status, report) = call(&app, "GET", "/reports/owner?format=json", Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["sections"].as_array().unwrap().len(), 1);
        assert_eq!(report["sections"][0]["subtotal"], 40.0);
        assert_eq!(report["sections"][0]["agentName"], "Abebe");
        assert_eq!(report["grandTotal"], 40.0);

        let (status, document) = send(&app, "GET", "/reports/owner", Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(document.contains("Agent: Abebe (0922)"));
        assert!(document.trim_end().ends_with("40.00"));
    }

    #[tokio::test]
    async fn deleting_an_agent_removes_their_games() {
        let app = app();
        let (owner, agent, agent_id) = bootstrap(&app).await;

        for cartela in 1..=3 {
            let (status, _) = call(
                &app,
                "POST",
                "/games",
                Some(&agent),
                Some(json!({ "players": 5, "pot": 50, "entryFee": 10, "cartelas": [cartela] })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, games) = call(&app, "GET", "/games", Some(&owner), None).await;
        assert_eq!(games.as_array().unwrap().len(), 3);
        assert_eq!(games[0]["agentName"], "Abebe");

        let (status, deleted) = call(
            &app,
            "DELETE",
            &format!("/agents/{}", agent_id),
            Some(&owner),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["gamesRemoved"], 3);

        let (_, games) = call(&app, "GET", "/games", Some(&owner), None).await;
        assert!(games.as_array().unwrap().is_empty());

        let (_, available) = call(&app, "GET", "/cartelas", Some(&owner), None).await;
        assert_eq!(available.as_array().unwrap().len(), 20);
    }

    #[tokio::test]
    async fn gateway_rejects_missing_bad_and_wrong_role_credentials() {
        let app = app();
        let (owner, agent, _) = bootstrap(&app).await;

        let (status, body) = call(&app, "GET", "/games", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, body) = call(&app, "GET", "/games", Some("not-a-token"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        let (status, _) = call(&app, "GET", "/games", Some(&agent), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(&app, "DELETE", "/agents/x", Some(&agent), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &app,
            "POST",
            "/games",
            Some(&owner),
            Some(json!({ "players": 1, "pot": 10, "entryFee": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn blocked_agent_cannot_log_in() {
        let app = app();
        let (owner, _, agent_id) = bootstrap(&app).await;

        let (status, toggled) = call(
            &app,
            "POST",
            &format!("/agents/{}/toggle", agent_id),
            Some(&owner),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(toggled["active"], false);

        let (status, body) = login(&app, "0922", "pw").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        let (status, body) = login(&app, "0922", "wrong").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        let (status, _) = call(
            &app,
            "PUT",
            &format!("/agents/{}/active", agent_id),
            Some(&owner),
            Some(json!({ "active": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = login(&app, "0922", "wrong").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn second_owner_and_bad_bodies_are_reported() {
        let app = app();
        bootstrap(&app).await;

        let (status, body) = call(
            &app,
            "POST",
            "/owner",
            None,
            Some(json!({ "phone": "0933", "password": "pw", "name": "Other" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");

        let (status, body) = send(&app, "POST", "/login", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("BAD_REQUEST"));

        let (status, _) = login(&app, "0999", "pw").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn game_validation_and_lookup_errors() {
        let app = app();
        let (_, agent, _) = bootstrap(&app).await;

        let (status, body) = call(
            &app,
            "POST",
            "/games",
            Some(&agent),
            Some(json!({ "players": 10, "entryFee": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");

        let (status, _) = call(
            &app,
            "POST",
            "/games",
            Some(&agent),
            Some(json!({ "players": 10, "pot": -5, "entryFee": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "GET", "/games/999", Some(&agent), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, "GET", "/games/abc", Some(&agent), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "POST",
            "/games/999/end",
            Some(&agent),
            Some(json!({ "winnerMoney": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn overlapping_cartelas_conflict_and_cancel_frees_them() {
        let app = app();
        let (_, agent, _) = bootstrap(&app).await;

        let (status, first) = call(
            &app,
            "POST",
            "/games",
            Some(&agent),
            Some(json!({ "players": 2, "pot": 20, "entryFee": 10, "cartelas": [5, 6] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(
            &app,
            "POST",
            "/games",
            Some(&agent),
            Some(json!({ "players": 2, "pot": 20, "entryFee": 10, "cartelas": [6, 7] })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");

        let id = first["id"].as_i64().unwrap();
        let (status, roster) = call(&app, "GET", &format!("/games/{}/cartelas", id), Some(&agent), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(roster[0]["id"], 5);
        assert_eq!(roster[1]["id"], 6);

        let (status, cancelled) = call(&app, "POST", &format!("/games/{}/cancel", id), Some(&agent), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cancelled["status"], "cancelled");

        let (status, _) = call(
            &app,
            "POST",
            "/games",
            Some(&agent),
            Some(json!({ "players": 2, "pot": 20, "entryFee": 10, "cartelas": [6, 7] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn agent_history_lists_only_own_games() {
        let app = app();
        let (owner, agent, _) = bootstrap(&app).await;
        call(
            &app,
            "POST",
            "/agents",
            Some(&owner),
            Some(json!({ "phone": "0944", "password": "pw", "name": "Chala" })),
        )
        .await;
        let (_, other) = login(&app, "0944", "pw").await;
        let other = other["token"].as_str().unwrap().to_string();

        call(
            &app,
            "POST",
            "/games",
            Some(&agent),
            Some(json!({ "players": 1, "pot": 10, "entryFee": 10, "date": "01/02/2025" })),
        )
        .await;
        call(
            &app,
            "POST",
            "/games",
            Some(&other),
            Some(json!({ "players": 1, "pot": 10, "entryFee": 10 })),
        )
        .await;

        let (status, mine) = call(&app, "GET", "/games/my-history", Some(&agent), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine.as_array().unwrap().len(), 1);
        assert!(mine[0]["date"].as_str().unwrap().starts_with("2025-02-01"));

        let (_, agents) = call(&app, "GET", "/agents", Some(&owner), None).await;
        let names: Vec<&str> = agents
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Abebe", "Chala"]);
    }

    #[tokio::test]
    async fn token_of_a_deleted_agent_cannot_open_games() {
        let app = app();
        let (owner, agent, agent_id) = bootstrap(&app).await;

        let (status, _) = call(&app, "DELETE", &format!("/agents/{}", agent_id), Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &app,
            "POST",
            "/games",
            Some(&agent),
            Some(json!({ "players": 2, "pot": 20, "entryFee": 10, "cartelas": [1] })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (_, available) = call(&app, "GET", "/cartelas", Some(&owner), None).await;
        assert_eq!(available.as_array().unwrap().len(), 20);
    }

    #[tokio::test]
    async fn fractional_amounts_round_trip_exactly() {
        let app = app();
        let (owner, agent, _) = bootstrap(&app).await;

        let (_, game) = call(
            &app,
            "POST",
            "/games",
            Some(&agent),
            Some(json!({ "players": 3, "pot": 0.3, "entryFee": "0.10" })),
        )
        .await;
        assert_eq!(game["pot"], json!(0.3));
        assert_eq!(game["entryFee"], json!(0.1));

        let (status, settled) = call(
            &app,
            "POST",
            &format!("/games/{}/end", game["id"]),
            Some(&agent),
            Some(json!({ "winnerMoney": 0.1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(settled["profit"], json!(0.2));

        let (_, report) = call(&app, "GET", "/reports/owner?format=json", Some(&owner), None).await;
        assert_eq!(report["grandTotal"], json!(0.2));
    }

    #[tokio::test]
    async fn health_needs_no_credentials() {
        let (status, body) = send(&app(), "GET", "/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }
}
