use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use super::{
    ask,
    errors::{ApiError, Payload},
    gateway::{Caller, OwnerOnly},
    AppState,
};
use crate::models::users::{ActiveToggle, Credentials, LoginResponse, NewUser, UserProfile};
use crate::services::{users::UserRequest, ServiceError};

pub async fn create_owner(
    State(state): State<AppState>,
    Payload(user): Payload<NewUser>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let owner = ask(&state.channels.users, |response| UserRequest::CreateOwner {
        user,
        response,
    })
    .await?;

    Ok((StatusCode::CREATED, Json(owner)))
}

pub async fn login(
    State(state): State<AppState>,
    Payload(credentials): Payload<Credentials>,
) -> Result<Json<LoginResponse>, ApiError> {
    let identity = ask(&state.channels.users, |response| UserRequest::Authenticate {
        credentials,
        response,
    })
    .await?;
    let token = state.signer.issue(&identity)?;

    Ok(Json(LoginResponse {
        token,
        role: identity.role,
        user_id: identity.id,
        name: identity.name,
    }))
}

pub async fn create_agent(
    State(state): State<AppState>,
    _caller: Caller<OwnerOnly>,
    Payload(user): Payload<NewUser>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let agent = ask(&state.channels.users, |response| UserRequest::CreateAgent {
        user,
        response,
    })
    .await?;

    Ok((StatusCode::CREATED, Json(agent)))
}

pub async fn list_agents(
    State(state): State<AppState>,
    _caller: Caller<OwnerOnly>,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    let agents = ask(&state.channels.users, |response| UserRequest::ListAgents {
        response,
    })
    .await?;

    Ok(Json(agents))
}

pub async fn toggle_agent(
    State(state): State<AppState>,
    _caller: Caller<OwnerOnly>,
    Path(agent_id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    let agent = ask(&state.channels.users, |response| UserRequest::SetAgentActive {
        agent_id,
        active: None,
        response,
    })
    .await?;

    Ok(Json(agent))
}

pub async fn set_agent_active(
    State(state): State<AppState>,
    _caller: Caller<OwnerOnly>,
    Path(agent_id): Path<String>,
    Payload(toggle): Payload<ActiveToggle>,
) -> Result<Json<UserProfile>, ApiError> {
    let active = toggle
        .active
        .ok_or_else(|| ServiceError::BadRequest("active is required.".to_string()))?;

    let agent = ask(&state.channels.users, |response| UserRequest::SetAgentActive {
        agent_id,
        active: Some(active),
        response,
    })
    .await?;

    Ok(Json(agent))
}

pub async fn delete_agent(
    State(state): State<AppState>,
    caller: Caller<OwnerOnly>,
    Path(agent_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    log::info!("Owner {} deleting agent {}.", caller.identity.id, agent_id);

    let removed = ask(&state.channels.users, |response| UserRequest::DeleteAgent {
        agent_id: agent_id.clone(),
        response,
    })
    .await?;

    Ok(Json(json!({ "deleted": agent_id, "gamesRemoved": removed })))
}
