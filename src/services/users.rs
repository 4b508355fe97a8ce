use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{auth, required_text, RequestHandler, Service, ServiceError};
use crate::{
    models::users::{Credentials, Identity, NewUser, UserProfile},
    repositories::UserStore,
};

pub enum UserRequest {
    CreateOwner {
        user: NewUser,
        response: oneshot::Sender<Result<UserProfile, ServiceError>>,
    },
    CreateAgent {
        user: NewUser,
        response: oneshot::Sender<Result<UserProfile, ServiceError>>,
    },
    Authenticate {
        credentials: Credentials,
        response: oneshot::Sender<Result<Identity, ServiceError>>,
    },
    ListAgents {
        response: oneshot::Sender<Result<Vec<UserProfile>, ServiceError>>,
    },
    SetAgentActive {
        agent_id: String,
        active: Option<bool>,
        response: oneshot::Sender<Result<UserProfile, ServiceError>>,
    },
    DeleteAgent {
        agent_id: String,
        response: oneshot::Sender<Result<u64, ServiceError>>,
    },
}

struct Registration {
    phone: String,
    password: String,
    name: String,
}

fn registration(user: NewUser) -> Result<Registration, ServiceError> {
    Ok(Registration {
        phone: required_text(user.phone, "phone")?,
        // Passwords are taken verbatim; only emptiness is rejected.
        password: match user.password {
            Some(password) if !password.is_empty() => password,
            _ => return Err(ServiceError::BadRequest("password is required.".to_string())),
        },
        name: required_text(user.name, "name")?,
    })
}

#[derive(Clone)]
pub struct UserRequestHandler {
    repository: Arc<dyn UserStore>,
}

impl UserRequestHandler {
    pub fn new(repository: Arc<dyn UserStore>) -> Self {
        UserRequestHandler { repository }
    }

    async fn create_owner(&self, user: NewUser) -> Result<UserProfile, ServiceError> {
        let registration = registration(user)?;

        if self.repository.get_owner().await?.is_some() {
            return Err(ServiceError::Conflict(
                "An owner is already registered.".to_string(),
            ));
        }

        let hash = auth::hash_password(registration.password).await?;
        let owner = self
            .repository
            .insert_owner(&registration.phone, &hash, &registration.name)
            .await?;

        log::info!("Registered owner {}.", owner.id);
        Ok(owner.into())
    }

    async fn create_agent(&self, user: NewUser) -> Result<UserProfile, ServiceError> {
        let registration = registration(user)?;

        if self
            .repository
            .get_user_by_phone(&registration.phone)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(
                "Phone number is already registered.".to_string(),
            ));
        }

        let hash = auth::hash_password(registration.password).await?;
        let agent = self
            .repository
            .insert_agent(&registration.phone, &hash, &registration.name)
            .await?;

        log::info!("Registered agent {}.", agent.id);
        Ok(agent.into())
    }

    async fn authenticate(&self, credentials: Credentials) -> Result<Identity, ServiceError> {
        let phone = required_text(credentials.phone, "phone")?;
        let password = credentials
            .password
            .ok_or_else(|| ServiceError::BadRequest("password is required.".to_string()))?;

        let user = self
            .repository
            .get_user_by_phone(&phone)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Account not found.".to_string()))?;

        if !user.active {
            log::warn!("Login attempt on blocked account {}.", user.id);
            return Err(ServiceError::Forbidden("Account is blocked.".to_string()));
        }

        if !auth::verify_password(password, user.password_hash.clone()).await? {
            log::warn!("Wrong password for account {}.", user.id);
            return Err(ServiceError::Unauthorized("Invalid credentials.".to_string()));
        }

        Ok(Identity::from(&user))
    }

    async fn list_agents(&self) -> Result<Vec<UserProfile>, ServiceError> {
        let agents = self.repository.list_agents().await?;

        Ok(agents.into_iter().map(UserProfile::from).collect())
    }

    async fn set_agent_active(
        &self,
        agent_id: &str,
        active: Option<bool>,
    ) -> Result<UserProfile, ServiceError> {
        let agent = self.repository.set_agent_active(agent_id, active).await?;

        log::info!(
            "Agent {} is now {}.",
            agent.id,
            if agent.active { "active" } else { "blocked" }
        );
        Ok(agent.into())
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<u64, ServiceError> {
        let removed = self.repository.delete_agent(agent_id).await?;

        log::info!("Deleted agent {} and {} of their games.", agent_id, removed);
        Ok(removed)
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::CreateOwner { user, response } => {
                let _ = response.send(self.create_owner(user).await);
            }
            UserRequest::CreateAgent { user, response } => {
                let _ = response.send(self.create_agent(user).await);
            }
            UserRequest::Authenticate {
                credentials,
                response,
            } => {
                let _ = response.send(self.authenticate(credentials).await);
            }
            UserRequest::ListAgents { response } => {
                let _ = response.send(self.list_agents().await);
            }
            UserRequest::SetAgentActive {
                agent_id,
                active,
                response,
            } => {
                let result = self.set_agent_active(&agent_id, active).await;
                let _ = response.send(result);
            }
            UserRequest::DeleteAgent { agent_id, response } => {
                let _ = response.send(self.delete_agent(&agent_id).await);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}
