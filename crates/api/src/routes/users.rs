//! Booking party endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use domain::NewUser;
use serde::{Deserialize, Serialize};
use store::{User, UserId};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::parse_id;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            name: user.name,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

/// POST /users: register a booking party.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = state
        .users
        .create_user(NewUser {
            name: req.name,
            email: req.email,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /users/{id}: load a booking party.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user_id: UserId = parse_id(&id, "user id")?;
    Ok(Json(state.users.get_user(user_id).await?.into()))
}
