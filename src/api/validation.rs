//! Form rules checked before anything is sent to the backend.
//!
//! Lengths count characters, not bytes.

use super::models::{FeedbackForm, LoginRequest, RegisterRequest};
use crate::error::AppError;
use crate::Result;

pub const TITLE_MAX: usize = 100;
pub const CONTENT_MIN: usize = 10;
pub const CONTENT_MAX: usize = 1000;
pub const NAME_MAX: usize = 50;
pub const REPLY_MAX: usize = 1000;

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        let msg = if min <= 1 && len == 0 {
            format!("{} is required", field)
        } else {
            format!("{} must be {}-{} characters", field, min, max)
        };
        return Err(AppError::ValidationError(msg));
    }
    Ok(())
}

fn required(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::ValidationError(format!("{} is required", field)));
    }
    Ok(())
}

pub fn validate_feedback(form: &FeedbackForm) -> Result<()> {
    if form.category_id.is_none() {
        return Err(AppError::ValidationError("category is required".into()));
    }
    check_len("title", &form.title, 1, TITLE_MAX)?;
    check_len("content", &form.content, CONTENT_MIN, CONTENT_MAX)?;
    check_len("name", &form.name, 1, NAME_MAX)?;
    Ok(())
}

pub fn validate_reply(content: &str) -> Result<()> {
    check_len("content", content, 1, REPLY_MAX)
}

pub fn validate_lookup(uuid: &str) -> Result<()> {
    required("uuid", uuid)
}

pub fn validate_login(request: &LoginRequest) -> Result<()> {
    required("username", &request.username)?;
    required("password", &request.password)
}

pub fn validate_register(request: &RegisterRequest) -> Result<()> {
    required("username", &request.username)?;
    required("password", &request.password)?;
    required("nickname", &request.nickname)?;
    required("activation code", &request.active_code)
}
