// src/validation.rs
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use validator::Validate;

use crate::AppError;

/// Json extractor that also runs the schema's `validator` rules.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: Validate + serde::de::DeserializeOwned + 'static,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}
