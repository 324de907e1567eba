// src/handlers.rs
use axum::{extract::State, http::StatusCode, Json};
use mongodb::bson::doc;
use serde_json::json;

use crate::auth::{create_jwt, hash_password, verify_password};
use crate::models::{AuthResponse, LoginSchema, RegisterSchema, User};
use crate::validation::ValidatedJson;
use crate::{AppError, AppState};

// POST /api/auth/register
pub async fn register_handler(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterSchema>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let users = state.users();

    if users
        .find_one(doc! { "username": &payload.username })
        .await?
        .is_some()
    {
        return Err(AppError::Conflict("username already taken".into()));
    }

    let password_hash = hash_password(&payload.password).map_err(|_| AppError::Internal)?;

    users
        .insert_one(User {
            id: None,
            username: payload.username,
            password_hash,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "msg": "user created" }))))
}

// POST /api/auth/login
pub async fn login_handler(
    State(state): State<AppState>,
    Json(payload): Json<LoginSchema>,
) -> Result<Json<AuthResponse>, AppError> {
    // One failure message for unknown users and wrong passwords alike.
    let user = state
        .users()
        .find_one(doc! { "username": &payload.username })
        .await?
        .ok_or_else(|| AppError::Auth("invalid username or password".into()))?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(AppError::Auth("invalid username or password".into()));
    }

    let user_id = user.id.ok_or(AppError::Internal)?.to_hex();
    let access_token = create_jwt(&user_id, &user.username).map_err(|_| AppError::Internal)?;

    Ok(Json(AuthResponse {
        access_token,
        username: user.username,
    }))
}

// GET /
pub async fn index_handler() -> Json<serde_json::Value> {
    Json(json!({ "message": "plantae API running" }))
}

// GET /ping
pub async fn ping_handler() -> Json<serde_json::Value> {
    Json(json!({ "message": "pong" }))
}
