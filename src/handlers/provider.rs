use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::user::{self, UserRole};
use crate::entities::{review, service};
use crate::error::{AppError, AppResult};
use crate::handlers::services::ServiceResponse;
use crate::utils::jwt::Claims;
use crate::AppState;

/// Get the logged-in provider's profile
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<user::Model>> {
    let profile = user::Entity::find_by_id(claims.sub)
        .filter(user::Column::Role.eq(UserRole::Provider))
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Provider profile not found".to_string()))?;

    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub bio: Option<String>,
    pub specialties: Option<String>,
    pub years_experience: Option<i32>,
    pub bank_account: Option<String>,
    pub bank_routing_number: Option<String>,
    pub id_proof_url: Option<String>,
}

/// Update the logged-in provider's profile (partial)
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<user::Model>> {
    let profile = user::Entity::find_by_id(claims.sub)
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Provider profile not found".to_string()))?;

    let mut active: user::ActiveModel = profile.into();
    if let Some(bio) = payload.bio {
        active.bio = Set(Some(bio));
    }
    if let Some(specialties) = payload.specialties {
        active.specialties = Set(Some(specialties));
    }
    if let Some(years) = payload.years_experience {
        active.years_experience = Set(Some(years));
    }
    if let Some(account) = payload.bank_account {
        active.bank_account = Set(Some(account));
    }
    if let Some(routing) = payload.bank_routing_number {
        active.bank_routing_number = Set(Some(routing));
    }
    if let Some(id_proof) = payload.id_proof_url {
        active.id_proof_url = Set(Some(id_proof));
    }
    active.updated_at = Set(Utc::now().fixed_offset());

    let updated = active.update(&*state.db).await?;
    Ok(Json(updated))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub total_earnings: f64,
    pub average_rating: f64,
    pub regular_clients: usize,
}

/// Earnings, rating and repeat-client stats for the logged-in provider
pub async fn stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<ProviderStats>> {
    let services = service::Entity::find()
        .filter(service::Column::ProviderId.eq(claims.sub))
        .all(&*state.db)
        .await?;
    let service_ids: Vec<i32> = services.iter().map(|s| s.id).collect();

    let bookings = booking::Entity::find()
        .filter(booking::Column::ServiceId.is_in(service_ids.clone()))
        .all(&*state.db)
        .await?;

    let total_earnings: f64 = bookings
        .iter()
        .filter(|b| b.status == BookingStatus::Completed)
        .filter_map(|b| services.iter().find(|s| s.id == b.service_id))
        .map(|s| s.price)
        .sum();

    let ratings: Vec<i32> = review::Entity::find()
        .filter(review::Column::ServiceId.is_in(service_ids))
        .all(&*state.db)
        .await?
        .iter()
        .map(|r| r.rating)
        .collect();

    let average_rating = if ratings.is_empty() {
        0.0
    } else {
        ratings.iter().sum::<i32>() as f64 / ratings.len() as f64
    };

    // Clients with two or more bookings across the provider's services
    let mut per_client: HashMap<Uuid, usize> = HashMap::new();
    for b in &bookings {
        *per_client.entry(b.user_id).or_default() += 1;
    }
    let regular_clients = per_client.values().filter(|&&n| n >= 2).count();

    Ok(Json(ProviderStats {
        total_earnings,
        average_rating,
        regular_clients,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<Notification>,
}

/// Provider notifications, synthesized on read from pending bookings.
/// Nothing is persisted; a booking leaving `pending` clears its entry.
pub async fn notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<NotificationsResponse>> {
    let services = service::Entity::find()
        .filter(service::Column::ProviderId.eq(claims.sub))
        .all(&*state.db)
        .await?;
    let service_ids: Vec<i32> = services.iter().map(|s| s.id).collect();

    let pending = booking::Entity::find()
        .filter(booking::Column::ServiceId.is_in(service_ids))
        .filter(booking::Column::Status.eq(BookingStatus::Pending))
        .order_by_desc(booking::Column::CreatedAt)
        .all(&*state.db)
        .await?;

    let user_ids: Vec<Uuid> = pending.iter().map(|b| b.user_id).collect();
    let users = user::Entity::find()
        .filter(user::Column::Id.is_in(user_ids))
        .all(&*state.db)
        .await?;

    let notifications: Vec<Notification> = pending
        .iter()
        .take(10)
        .filter_map(|b| {
            let service = services.iter().find(|s| s.id == b.service_id)?;
            let requester_name = users
                .iter()
                .find(|u| u.id == b.user_id)
                .map(|u| u.name.clone())
                .unwrap_or_default();
            Some(Notification {
                id: b.id.to_string(),
                title: format!("Booking Request: {}", service.title),
                message: format!("{} wants to book your service", requester_name),
                kind: "booking".to_string(),
                read: false,
                created_at: b.created_at.with_timezone(&Utc),
            })
        })
        .collect();

    Ok(Json(NotificationsResponse { notifications }))
}

/// Acknowledge a notification. Notifications are a computed view, so
/// there is no state to flip; the call just succeeds.
pub async fn ack_notification(
    Extension(_claims): Extension<Claims>,
    Path(_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Dismiss a notification. Same no-op contract as acknowledge.
pub async fn dismiss_notification(
    Extension(_claims): Extension<Claims>,
    Path(_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProviderInfo {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub specialties: Option<String>,
    pub years_experience: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProviderResponse {
    pub provider: PublicProviderInfo,
    pub services: Vec<ServiceResponse>,
    pub overall_rating: f64,
    pub total_reviews: usize,
    pub recent_reviews: Vec<review::Model>,
}

/// Public provider profile: services, overall rating, recent reviews.
/// Email stays private.
pub async fn public_profile(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
) -> AppResult<Json<PublicProviderResponse>> {
    let provider = user::Entity::find_by_id(provider_id)
        .filter(user::Column::Role.eq(UserRole::Provider))
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Provider not found".to_string()))?;

    let services = service::Entity::find()
        .filter(service::Column::ProviderId.eq(provider.id))
        .order_by_desc(service::Column::CreatedAt)
        .all(&*state.db)
        .await?;
    let service_ids: Vec<i32> = services.iter().map(|s| s.id).collect();

    let reviews = review::Entity::find()
        .filter(review::Column::ServiceId.is_in(service_ids))
        .order_by_desc(review::Column::CreatedAt)
        .all(&*state.db)
        .await?;

    let overall_rating = if reviews.is_empty() {
        0.0
    } else {
        reviews.iter().map(|r| r.rating).sum::<i32>() as f64 / reviews.len() as f64
    };

    let service_views: Vec<ServiceResponse> = services
        .into_iter()
        .map(|s| ServiceResponse::new(s, &reviews))
        .collect();

    Ok(Json(PublicProviderResponse {
        provider: PublicProviderInfo {
            id: provider.id,
            name: provider.name,
            phone: provider.phone,
            bio: provider.bio,
            specialties: provider.specialties,
            years_experience: provider.years_experience,
        },
        services: service_views,
        total_reviews: reviews.len(),
        recent_reviews: reviews.into_iter().take(10).collect(),
        overall_rating,
    }))
}
