use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::{
    ask,
    errors::{game_id, ApiError, Payload},
    gateway::{AgentOnly, AnyRole, Caller, OwnerOnly},
    AppState,
};
use crate::models::{
    cartelas::{Cartela, NewCartela},
    games::{AgentGame, CalledNumbers, EndGame, Game, NewGame},
};
use crate::services::games::GameRequest;

pub async fn create_game(
    State(state): State<AppState>,
    caller: Caller<AgentOnly>,
    Payload(game): Payload<NewGame>,
) -> Result<(StatusCode, Json<Game>), ApiError> {
    let game = ask(&state.channels.games, |response| GameRequest::CreateGame {
        agent_id: caller.identity.id,
        game,
        response,
    })
    .await?;

    Ok((StatusCode::CREATED, Json(game)))
}

pub async fn my_history(
    State(state): State<AppState>,
    caller: Caller<AgentOnly>,
) -> Result<Json<Vec<Game>>, ApiError> {
    let games = ask(&state.channels.games, |response| GameRequest::AgentHistory {
        agent_id: caller.identity.id,
        response,
    })
    .await?;

    Ok(Json(games))
}

pub async fn all_games(
    State(state): State<AppState>,
    _caller: Caller<OwnerOnly>,
) -> Result<Json<Vec<AgentGame>>, ApiError> {
    let games = ask(&state.channels.games, |response| GameRequest::AllGames {
        response,
    })
    .await?;

    Ok(Json(games))
}

pub async fn get_game(
    State(state): State<AppState>,
    _caller: Caller<AnyRole>,
    Path(id): Path<String>,
) -> Result<Json<Game>, ApiError> {
    let game_id = game_id(&id)?;
    let game = ask(&state.channels.games, |response| GameRequest::GetGame {
        game_id,
        response,
    })
    .await?;

    Ok(Json(game))
}

pub async fn game_cartelas(
    State(state): State<AppState>,
    _caller: Caller<AnyRole>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Cartela>>, ApiError> {
    let game_id = game_id(&id)?;
    let cartelas = ask(&state.channels.games, |response| GameRequest::GameCartelas {
        game_id,
        response,
    })
    .await?;

    Ok(Json(cartelas))
}

pub async fn record_called_numbers(
    State(state): State<AppState>,
    _caller: Caller<AnyRole>,
    Path(id): Path<String>,
    Payload(called): Payload<CalledNumbers>,
) -> Result<Json<Game>, ApiError> {
    let game_id = game_id(&id)?;
    let game = ask(&state.channels.games, |response| {
        GameRequest::RecordCalledNumbers {
            game_id,
            numbers: called.numbers,
            response,
        }
    })
    .await?;

    Ok(Json(game))
}

pub async fn end_game(
    State(state): State<AppState>,
    _caller: Caller<AgentOnly>,
    Path(id): Path<String>,
    Payload(end): Payload<EndGame>,
) -> Result<Json<Game>, ApiError> {
    let game_id = game_id(&id)?;
    let game = ask(&state.channels.games, |response| GameRequest::EndGame {
        game_id,
        winner_money: end.winner_money,
        response,
    })
    .await?;

    Ok(Json(game))
}

pub async fn cancel_game(
    State(state): State<AppState>,
    _caller: Caller<AgentOnly>,
    Path(id): Path<String>,
) -> Result<Json<Game>, ApiError> {
    let game_id = game_id(&id)?;
    let game = ask(&state.channels.games, |response| GameRequest::CancelGame {
        game_id,
        response,
    })
    .await?;

    Ok(Json(game))
}

pub async fn available_cartelas(
    State(state): State<AppState>,
    _caller: Caller<AnyRole>,
) -> Result<Json<Vec<Cartela>>, ApiError> {
    let cartelas = ask(&state.channels.games, |response| {
        GameRequest::AvailableCartelas { response }
    })
    .await?;

    Ok(Json(cartelas))
}

pub async fn register_cartela(
    State(state): State<AppState>,
    _caller: Caller<OwnerOnly>,
    Payload(cartela): Payload<NewCartela>,
) -> Result<(StatusCode, Json<Cartela>), ApiError> {
    let cartela = ask(&state.channels.games, |response| GameRequest::RegisterCartela {
        cartela,
        response,
    })
    .await?;

    Ok((StatusCode::CREATED, Json(cartela)))
}
