use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::user::{self, UserRole};
use crate::entities::{review, service};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub booking_id: i32,
    pub rating: i32,
    pub comment: String,
}

/// Create a review for a completed booking (one per booking)
pub async fn create_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<review::Model>)> {
    if !(1..=5).contains(&payload.rating) {
        return Err(AppError::BadRequest(
            "Rating must be between 1 and 5".to_string(),
        ));
    }
    if payload.comment.len() < 5 || payload.comment.len() > 500 {
        return Err(AppError::BadRequest(
            "Comment must be between 5 and 500 characters".to_string(),
        ));
    }

    let booking = booking::Entity::find_by_id(payload.booking_id)
        .filter(booking::Column::UserId.eq(claims.sub))
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    if booking.status != BookingStatus::Completed {
        return Err(AppError::BadRequest(
            "Can only review completed bookings".to_string(),
        ));
    }

    let existing = review::Entity::find()
        .filter(review::Column::BookingId.eq(booking.id))
        .one(&*state.db)
        .await?;

    if existing.is_some() {
        return Err(AppError::BadRequest(
            "Review already exists for this booking".to_string(),
        ));
    }

    let now = Utc::now().fixed_offset();
    let created = review::ActiveModel {
        user_id: Set(claims.sub),
        booking_id: Set(booking.id),
        service_id: Set(booking.service_id),
        rating: Set(payload.rating),
        comment: Set(payload.comment),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&*state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewListQuery {
    pub service_id: Option<i32>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    #[serde(flatten)]
    pub review: review::Model,
    pub user_name: String,
    pub service_title: String,
}

#[derive(Debug, Serialize)]
pub struct ReviewListResponse {
    pub data: Vec<ReviewView>,
    pub pagination: ReviewPagination,
}

#[derive(Debug, Serialize)]
pub struct ReviewPagination {
    pub limit: u64,
    pub offset: u64,
}

/// List reviews, optionally for a single service
pub async fn list_reviews(
    State(state): State<AppState>,
    Query(params): Query<ReviewListQuery>,
) -> AppResult<Json<ReviewListResponse>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 100);
    let offset = params.offset.unwrap_or(0);

    let mut query = review::Entity::find();
    if let Some(service_id) = params.service_id {
        query = query.filter(review::Column::ServiceId.eq(service_id));
    }

    let reviews = query
        .order_by_desc(review::Column::CreatedAt)
        .limit(limit)
        .offset(offset)
        .all(&*state.db)
        .await?;

    let user_ids: Vec<Uuid> = reviews.iter().map(|r| r.user_id).collect();
    let users = user::Entity::find()
        .filter(user::Column::Id.is_in(user_ids))
        .all(&*state.db)
        .await?;

    let service_ids: Vec<i32> = reviews.iter().map(|r| r.service_id).collect();
    let services = service::Entity::find()
        .filter(service::Column::Id.is_in(service_ids))
        .all(&*state.db)
        .await?;

    let data: Vec<ReviewView> = reviews
        .into_iter()
        .map(|r| ReviewView {
            user_name: users
                .iter()
                .find(|u| u.id == r.user_id)
                .map(|u| u.name.clone())
                .unwrap_or_default(),
            service_title: services
                .iter()
                .find(|s| s.id == r.service_id)
                .map(|s| s.title.clone())
                .unwrap_or_default(),
            review: r,
        })
        .collect();

    Ok(Json(ReviewListResponse {
        data,
        pagination: ReviewPagination { limit, offset },
    }))
}

/// Get a single review
pub async fn get_review(
    State(state): State<AppState>,
    Path(review_id): Path<i32>,
) -> AppResult<Json<ReviewView>> {
    let review = review::Entity::find_by_id(review_id)
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Review not found".to_string()))?;

    let author = user::Entity::find_by_id(review.user_id).one(&*state.db).await?;
    let service = service::Entity::find_by_id(review.service_id)
        .one(&*state.db)
        .await?;

    Ok(Json(ReviewView {
        user_name: author.map(|u| u.name).unwrap_or_default(),
        service_title: service.map(|s| s.title).unwrap_or_default(),
        review,
    }))
}

/// Delete a review (author or admin)
pub async fn delete_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(review_id): Path<i32>,
) -> AppResult<Json<serde_json::Value>> {
    let review = review::Entity::find_by_id(review_id)
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Review not found".to_string()))?;

    if review.user_id != claims.sub && claims.role != UserRole::Admin {
        return Err(AppError::Forbidden("Cannot delete review".to_string()));
    }

    review::Entity::delete_by_id(review_id)
        .exec(&*state.db)
        .await?;

    Ok(Json(serde_json::json!({ "message": "Review deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase};

    use crate::Config;

    fn test_state(db: sea_orm::DatabaseConnection) -> AppState {
        AppState {
            db: std::sync::Arc::new(db),
            config: Config {
                database_url: String::new(),
                jwt_secret: "test-secret".to_string(),
                jwt_expiration_hours: 1,
                server_host: "127.0.0.1".to_string(),
                server_port: 0,
            },
        }
    }

    fn claims_for(user_id: Uuid) -> Claims {
        Claims {
            sub: user_id,
            email: "customer@example.com".to_string(),
            role: UserRole::User,
            exp: i64::MAX,
            iat: 0,
        }
    }

    fn booking_model(user_id: Uuid, status: BookingStatus) -> booking::Model {
        let when = Utc.with_ymd_and_hms(2026, 11, 10, 14, 0, 0).unwrap().fixed_offset();
        booking::Model {
            id: 5,
            user_id,
            service_id: 1,
            datetime: when,
            quantity: 1,
            status,
            created_at: when,
            updated_at: when,
        }
    }

    fn request() -> CreateReviewRequest {
        CreateReviewRequest {
            booking_id: 5,
            rating: 5,
            comment: "Fast and tidy work".to_string(),
        }
    }

    #[tokio::test]
    async fn review_requires_completed_booking() {
        let customer = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![booking_model(customer, BookingStatus::Pending)]])
            .into_connection();

        let err = create_review(
            State(test_state(db)),
            Extension(claims_for(customer)),
            Json(request()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(msg) if msg.contains("completed")));
    }

    #[tokio::test]
    async fn review_for_another_users_booking_is_not_found() {
        // The booking lookup is scoped to the caller, so a booking owned by
        // someone else never comes back.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<booking::Model>::new()])
            .into_connection();

        let err = create_review(
            State(test_state(db)),
            Extension(claims_for(Uuid::new_v4())),
            Json(request()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn second_review_for_same_booking_is_rejected() {
        let customer = Uuid::new_v4();
        let when = Utc.with_ymd_and_hms(2026, 11, 10, 16, 0, 0).unwrap().fixed_offset();
        let existing = review::Model {
            id: 2,
            user_id: customer,
            booking_id: 5,
            service_id: 1,
            rating: 4,
            comment: "Already said it".to_string(),
            created_at: when,
            updated_at: when,
        };

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![booking_model(customer, BookingStatus::Completed)]])
            .append_query_results([vec![existing]])
            .into_connection();

        let err = create_review(
            State(test_state(db)),
            Extension(claims_for(customer)),
            Json(request()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(msg) if msg.contains("already exists")));
    }
}
