use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::service;
use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::reservation;
use crate::utils::jwt::Claims;
use crate::AppState;

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub service_id: i32,
    pub datetime: DateTime<Utc>,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

/// Create a booking for a 60-minute session slot
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateBookingRequest>,
) -> AppResult<(StatusCode, Json<booking::Model>)> {
    if payload.quantity < 1 {
        return Err(AppError::BadRequest(
            "Quantity must be at least 1".to_string(),
        ));
    }

    // The old client-side-only check, now enforced at the boundary
    if payload.datetime < Utc::now() {
        return Err(AppError::BadRequest(
            "Cannot book a session in the past".to_string(),
        ));
    }

    let booking = reservation::reserve(
        &*state.db,
        claims.sub,
        payload.service_id,
        payload.datetime,
        payload.quantity,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingListQuery {
    pub user_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: booking::Model,
    pub service_title: String,
    pub price: f64,
    pub user_name: String,
}

#[derive(Debug, Serialize)]
pub struct BookingListResponse {
    pub data: Vec<BookingView>,
}

/// List bookings. Customers see their own; providers see bookings for
/// their services. Cross-account filters are rejected.
pub async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<BookingListQuery>,
) -> AppResult<Json<BookingListResponse>> {
    let mut query = booking::Entity::find();

    if let Some(user_id) = params.user_id {
        if claims.role == UserRole::User && user_id != claims.sub {
            return Err(AppError::Forbidden(
                "Cannot view bookings of another user".to_string(),
            ));
        }
        query = query.filter(booking::Column::UserId.eq(user_id));
    }

    if let Some(provider_id) = params.provider_id {
        if claims.role == UserRole::Provider && provider_id != claims.sub {
            return Err(AppError::Forbidden(
                "Cannot view bookings of another provider".to_string(),
            ));
        }
        let service_ids: Vec<i32> = service::Entity::find()
            .filter(service::Column::ProviderId.eq(provider_id))
            .all(&*state.db)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        query = query.filter(booking::Column::ServiceId.is_in(service_ids));
    }

    // Default to the caller's own bookings
    if params.user_id.is_none() && params.provider_id.is_none() {
        query = query.filter(booking::Column::UserId.eq(claims.sub));
    }

    let bookings = query
        .order_by_desc(booking::Column::Datetime)
        .all(&*state.db)
        .await?;

    let service_ids: Vec<i32> = bookings.iter().map(|b| b.service_id).collect();
    let services = service::Entity::find()
        .filter(service::Column::Id.is_in(service_ids))
        .all(&*state.db)
        .await?;

    let user_ids: Vec<Uuid> = bookings.iter().map(|b| b.user_id).collect();
    let users = user::Entity::find()
        .filter(user::Column::Id.is_in(user_ids))
        .all(&*state.db)
        .await?;

    let data: Vec<BookingView> = bookings
        .into_iter()
        .filter_map(|b| {
            let service = services.iter().find(|s| s.id == b.service_id)?;
            let requester = users.iter().find(|u| u.id == b.user_id);
            Some(BookingView {
                service_title: service.title.clone(),
                price: service.price,
                user_name: requester.map(|u| u.name.clone()).unwrap_or_default(),
                booking: b,
            })
        })
        .collect();

    Ok(Json(BookingListResponse { data }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetailResponse {
    #[serde(flatten)]
    pub booking: booking::Model,
    pub service_title: String,
    pub price: f64,
    pub user_name: String,
    pub user_email: String,
    pub provider_name: String,
}

/// Get a single booking (requester or owning provider)
pub async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<i32>,
) -> AppResult<Json<BookingDetailResponse>> {
    let booking = booking::Entity::find_by_id(booking_id)
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    let service = service::Entity::find_by_id(booking.service_id)
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::Internal("Service missing for booking".to_string()))?;

    if claims.sub != booking.user_id && claims.sub != service.provider_id {
        return Err(AppError::Forbidden(
            "Not allowed to view this booking".to_string(),
        ));
    }

    let requester = user::Entity::find_by_id(booking.user_id)
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::Internal("User missing for booking".to_string()))?;

    let provider = user::Entity::find_by_id(service.provider_id)
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::Internal("Provider missing for service".to_string()))?;

    Ok(Json(BookingDetailResponse {
        booking,
        service_title: service.title,
        price: service.price,
        user_name: requester.name,
        user_email: requester.email,
        provider_name: provider.name,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingRequest {
    pub status: BookingStatus,
}

/// Update booking status. The owning provider may confirm, cancel or
/// complete; the booking's customer may only cancel.
pub async fn update_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<i32>,
    Json(payload): Json<UpdateBookingRequest>,
) -> AppResult<Json<booking::Model>> {
    let updated =
        reservation::set_status(&*state.db, booking_id, claims.sub, payload.status).await?;
    Ok(Json(updated))
}
