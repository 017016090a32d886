use reqwest::Method;

use super::models::{ActivationCodeRequest, LoginData, LoginRequest, RegisterRequest, UserProfile};
use super::ApiClient;
use crate::Result;

impl ApiClient {
    /// Returns the raw login payload; the token may be absent on odd backends.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginData> {
        self.post("/auth/login", request).await
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<()> {
        let builder = self.request(Method::POST, "/users/register")?.json(request);
        self.execute(builder).await
    }

    pub async fn generate_code(&self, request: &ActivationCodeRequest) -> Result<()> {
        let builder = self
            .request(Method::POST, "/users/activate-code")?
            .json(request);
        self.execute(builder).await
    }

    pub async fn logout(&self) -> Result<()> {
        let builder = self.request(Method::GET, "/users/logout")?;
        self.execute(builder).await
    }

    pub async fn user_info(&self) -> Result<UserProfile> {
        self.get("/users/me").await
    }
}
