use async_trait::async_trait;
use reqwest::Method;

use super::models::{RoomCredentials, RoomData};
use super::ApiClient;
use crate::Result;

/// Room bookkeeping the chat session needs from the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomService: Send + Sync {
    async fn create_room(&self) -> Result<RoomData>;
    async fn join_room(&self, room_id: &str) -> Result<RoomCredentials>;
}

#[async_trait]
impl RoomService for ApiClient {
    async fn create_room(&self) -> Result<RoomData> {
        let builder = self.request(Method::POST, "/rooms")?;
        self.send_envelope(builder).await?.into_data()
    }

    async fn join_room(&self, room_id: &str) -> Result<RoomCredentials> {
        let builder = self
            .request(Method::POST, "/rooms/join/")?
            .query(&[("roomId", room_id)]);
        self.send_envelope(builder).await?.into_data()
    }
}
