use axum::{extract::State, Extension, Json};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde::Deserialize;

use crate::entities::user;
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

/// Get the logged-in user's profile
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<user::Model>> {
    let profile = user::Entity::find_by_id(claims.sub)
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User profile not found".to_string()))?;

    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
}

/// Update the logged-in user's profile. Email and role are immutable.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<user::Model>> {
    let profile = user::Entity::find_by_id(claims.sub)
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User profile not found".to_string()))?;

    let mut active: user::ActiveModel = profile.into();
    if let Some(name) = payload.name {
        if !name.trim().is_empty() {
            active.name = Set(name.trim().to_string());
        }
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(if phone.is_empty() { None } else { Some(phone) });
    }
    if let Some(bio) = payload.bio {
        active.bio = Set(Some(bio));
    }
    active.updated_at = Set(Utc::now().fixed_offset());

    let updated = active.update(&*state.db).await?;
    Ok(Json(updated))
}
