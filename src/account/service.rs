use std::sync::RwLock;
use tracing::{info, warn};

use crate::api::validation;
use crate::api::{ActivationCodeRequest, ApiClient, LoginRequest, RegisterRequest, UserProfile};
use crate::storage;
use crate::Result;

/// The signed-in user, backed by the token held in the local store.
pub struct Account {
    api: ApiClient,
    user: RwLock<Option<UserProfile>>,
}

impl Account {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            user: RwLock::new(None),
        }
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.user.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_user(&self, user: Option<UserProfile>) {
        *self.user.write().unwrap_or_else(|e| e.into_inner()) = user;
    }

    pub fn is_logged_in(&self) -> bool {
        self.api.store().get(storage::TOKEN).is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user()
            .and_then(|u| u.role)
            .map(|role| role == "admin")
            .unwrap_or(false)
    }

    /// Logs in, persists the token and loads the profile.
    ///
    /// Returns `None` when the backend accepted the credentials without
    /// issuing a token.
    pub async fn login(&self, request: &LoginRequest) -> Result<Option<UserProfile>> {
        validation::validate_login(request)?;
        let data = self.api.login(request).await?;

        let Some(token) = data.token.filter(|t| !t.is_empty()) else {
            warn!(username = %request.username, "login succeeded without a token");
            return Ok(None);
        };

        self.api
            .store()
            .clone()
            .set_many_async(vec![(storage::TOKEN.to_string(), token)])
            .await?;
        info!(username = %request.username, "logged in");
        self.refresh().await.map(Some)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<()> {
        validation::validate_register(request)?;
        self.api.register(request).await?;
        info!(username = %request.username, "registered");
        Ok(())
    }

    pub async fn request_activation_code(&self, username: &str) -> Result<()> {
        self.api
            .generate_code(&ActivationCodeRequest {
                username: username.to_string(),
            })
            .await
    }

    pub async fn refresh(&self) -> Result<UserProfile> {
        let profile = self.api.user_info().await?;
        self.set_user(Some(profile.clone()));
        Ok(profile)
    }

    /// Ends the session. Local state is cleared even when the backend call fails.
    pub async fn logout(&self) -> Result<()> {
        if let Err(e) = self.api.logout().await {
            warn!(error = %e, "logout request failed; clearing local session anyway");
        }
        self.api
            .store()
            .clone()
            .remove_async(storage::TOKEN.to_string())
            .await?;
        self.set_user(None);
        Ok(())
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }
}
