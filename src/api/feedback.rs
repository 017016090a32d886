use reqwest::Method;

use super::models::{Feedback, FeedbackCategory, FeedbackForm, FeedbackReceipt, Reply, ReplyForm};
use super::validation;
use super::ApiClient;
use crate::error::{ApiError, AppError};
use crate::Result;

/// Envelope code the backend uses for "no reply yet".
pub const NO_REPLY_CODE: i64 = 4004;

impl ApiClient {
    pub async fn feedback_categories(&self) -> Result<Vec<FeedbackCategory>> {
        self.get("/feedback/categories").await
    }

    /// Validates and submits a feedback form; returns the lookup uuid.
    pub async fn save_feedback(&self, form: &FeedbackForm) -> Result<String> {
        validation::validate_feedback(form)?;
        let receipt: FeedbackReceipt = self.post("/feedback", form).await?;
        Ok(receipt.uuid)
    }

    pub async fn feedback(&self, uuid: &str) -> Result<Feedback> {
        validation::validate_lookup(uuid)?;
        self.get_query("/feedback", &[("uuid", uuid)]).await
    }

    /// `Ok(None)` when the feedback exists but has not been answered yet.
    pub async fn feedback_reply(&self, feedback_uuid: &str) -> Result<Option<Reply>> {
        let builder = self
            .request(Method::GET, "/feedback/reply")?
            .query(&[("feedbackUuid", feedback_uuid)]);
        let envelope = self.send_envelope::<Reply>(builder).await?;
        if envelope.code == NO_REPLY_CODE {
            return Ok(None);
        }
        match envelope.into_data() {
            Ok(reply) => Ok(Some(reply)),
            Err(AppError::ApiError(ApiError::MissingData)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn add_reply(&self, form: &ReplyForm) -> Result<()> {
        validation::validate_reply(&form.content)?;
        let builder = self.request(Method::POST, "/feedback/reply")?.json(form);
        self.execute(builder).await
    }

    pub async fn unread_feedback(&self) -> Result<Vec<Feedback>> {
        self.get("/feedback/unread").await
    }
}
