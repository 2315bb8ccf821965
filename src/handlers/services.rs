use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::service::{self, ServiceCategory};
use crate::entities::user::UserRole;
use crate::entities::{review, user};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

/// Optional service-list predicates, ANDed when present. Replaces the
/// string-assembled SQL of older revisions with bound parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceFilter {
    pub category: Option<ServiceCategory>,
    pub city: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ServiceFilter {
    fn apply(&self, mut query: Select<service::Entity>) -> Select<service::Entity> {
        if let Some(category) = self.category {
            query = query.filter(service::Column::Category.eq(category));
        }
        if let Some(city) = &self.city {
            query = query.filter(service::Column::City.eq(city));
        }
        if let Some(min) = self.min_price {
            query = query.filter(service::Column::Price.gte(min));
        }
        if let Some(max) = self.max_price {
            query = query.filter(service::Column::Price.lte(max));
        }
        query
    }

    fn limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    fn offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse {
    pub id: i32,
    pub provider_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: ServiceCategory,
    pub city: String,
    pub price: f64,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub images: serde_json::Value,
    pub avg_rating: f64,
    pub review_count: usize,
    pub created_at: DateTime<Utc>,
}

impl ServiceResponse {
    pub(crate) fn new(s: service::Model, reviews: &[review::Model]) -> Self {
        let ratings: Vec<i32> = reviews
            .iter()
            .filter(|r| r.service_id == s.id)
            .map(|r| r.rating)
            .collect();
        let avg_rating = if ratings.is_empty() {
            0.0
        } else {
            ratings.iter().sum::<i32>() as f64 / ratings.len() as f64
        };

        Self {
            id: s.id,
            provider_id: s.provider_id,
            title: s.title,
            description: s.description,
            category: s.category,
            city: s.city,
            price: s.price,
            location_lat: s.location_lat,
            location_lng: s.location_lng,
            images: s.images,
            avg_rating,
            review_count: ratings.len(),
            created_at: s.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub limit: u64,
    pub offset: u64,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ServiceListResponse {
    pub data: Vec<ServiceResponse>,
    pub pagination: Pagination,
}

/// List services with optional filters
pub async fn list_services(
    State(state): State<AppState>,
    Query(filter): Query<ServiceFilter>,
) -> AppResult<Json<ServiceListResponse>> {
    let limit = filter.limit();
    let offset = filter.offset();

    let mut query = filter
        .apply(service::Entity::find())
        .order_by_desc(service::Column::CreatedAt);
    // The rating threshold is computed from the reviews join, so it must cut
    // the result set before pagination; plain filters page in the database.
    if filter.min_rating.is_none() {
        query = query.limit(limit).offset(offset);
    }
    let services = query.all(&*state.db).await?;

    let ids: Vec<i32> = services.iter().map(|s| s.id).collect();
    let reviews = review::Entity::find()
        .filter(review::Column::ServiceId.is_in(ids))
        .all(&*state.db)
        .await?;

    let mut data: Vec<ServiceResponse> = services
        .into_iter()
        .map(|s| ServiceResponse::new(s, &reviews))
        .collect();

    let total;
    if let Some(min) = filter.min_rating {
        data.retain(|s| s.avg_rating >= min);
        total = data.len();
        data = data
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
    } else {
        total = data.len();
    }

    Ok(Json(ServiceListResponse {
        data,
        pagination: Pagination { limit, offset, total },
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewWithAuthor {
    #[serde(flatten)]
    pub review: review::Model,
    pub user_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDetailResponse {
    #[serde(flatten)]
    pub service: ServiceResponse,
    pub provider_name: String,
    pub reviews: Vec<ReviewWithAuthor>,
}

/// Get a single service with its reviews
pub async fn get_service(
    State(state): State<AppState>,
    Path(service_id): Path<i32>,
) -> AppResult<Json<ServiceDetailResponse>> {
    let service = service::Entity::find_by_id(service_id)
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Service not found".to_string()))?;

    let provider = user::Entity::find_by_id(service.provider_id)
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::Internal("Provider missing for service".to_string()))?;

    let reviews = review::Entity::find()
        .filter(review::Column::ServiceId.eq(service.id))
        .order_by_desc(review::Column::CreatedAt)
        .all(&*state.db)
        .await?;

    let author_ids: Vec<Uuid> = reviews.iter().map(|r| r.user_id).collect();
    let authors = user::Entity::find()
        .filter(user::Column::Id.is_in(author_ids))
        .all(&*state.db)
        .await?;

    let review_views: Vec<ReviewWithAuthor> = reviews
        .iter()
        .map(|r| ReviewWithAuthor {
            review: r.clone(),
            user_name: authors
                .iter()
                .find(|u| u.id == r.user_id)
                .map(|u| u.name.clone())
                .unwrap_or_default(),
        })
        .collect();

    Ok(Json(ServiceDetailResponse {
        service: ServiceResponse::new(service, &reviews),
        provider_name: provider.name,
        reviews: review_views,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceRequest {
    pub title: String,
    pub description: String,
    pub category: ServiceCategory,
    pub city: String,
    pub price: f64,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    #[serde(default)]
    pub images: Vec<String>,
}

fn validate_service_fields(
    title: &str,
    description: &str,
    city: &str,
    price: f64,
    location_lat: Option<f64>,
    location_lng: Option<f64>,
) -> AppResult<()> {
    if title.len() < 3 || title.len() > 100 {
        return Err(AppError::BadRequest(
            "Title must be between 3 and 100 characters".to_string(),
        ));
    }
    if description.len() < 10 || description.len() > 1000 {
        return Err(AppError::BadRequest(
            "Description must be between 10 and 1000 characters".to_string(),
        ));
    }
    if city.len() < 2 {
        return Err(AppError::BadRequest(
            "City must be at least 2 characters".to_string(),
        ));
    }
    if price <= 0.0 {
        return Err(AppError::BadRequest("Price must be positive".to_string()));
    }
    if let Some(lat) = location_lat {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(AppError::BadRequest("Invalid latitude".to_string()));
        }
    }
    if let Some(lng) = location_lng {
        if !(-180.0..=180.0).contains(&lng) {
            return Err(AppError::BadRequest("Invalid longitude".to_string()));
        }
    }
    Ok(())
}

/// Create a new service (provider only)
pub async fn create_service(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateServiceRequest>,
) -> AppResult<(StatusCode, Json<service::Model>)> {
    validate_service_fields(
        &payload.title,
        &payload.description,
        &payload.city,
        payload.price,
        payload.location_lat,
        payload.location_lng,
    )?;

    let now = Utc::now().fixed_offset();
    let new_service = service::ActiveModel {
        provider_id: Set(claims.sub),
        title: Set(payload.title),
        description: Set(payload.description),
        category: Set(payload.category),
        city: Set(payload.city),
        price: Set(payload.price),
        location_lat: Set(payload.location_lat),
        location_lng: Set(payload.location_lng),
        images: Set(serde_json::json!(payload.images)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let service = new_service.insert(&*state.db).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateServiceRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<ServiceCategory>,
    pub city: Option<String>,
    pub price: Option<f64>,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub images: Option<Vec<String>>,
}

/// Update a service (owning provider only)
pub async fn update_service(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(service_id): Path<i32>,
    Json(payload): Json<UpdateServiceRequest>,
) -> AppResult<Json<service::Model>> {
    let service = service::Entity::find_by_id(service_id)
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Service not found".to_string()))?;

    if service.provider_id != claims.sub {
        return Err(AppError::Forbidden(
            "Cannot update service of another provider".to_string(),
        ));
    }

    validate_service_fields(
        payload.title.as_deref().unwrap_or(&service.title),
        payload.description.as_deref().unwrap_or(&service.description),
        payload.city.as_deref().unwrap_or(&service.city),
        payload.price.unwrap_or(service.price),
        payload.location_lat.or(service.location_lat),
        payload.location_lng.or(service.location_lng),
    )?;

    let mut active: service::ActiveModel = service.into();
    if let Some(title) = payload.title {
        active.title = Set(title);
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(category) = payload.category {
        active.category = Set(category);
    }
    if let Some(city) = payload.city {
        active.city = Set(city);
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(lat) = payload.location_lat {
        active.location_lat = Set(Some(lat));
    }
    if let Some(lng) = payload.location_lng {
        active.location_lng = Set(Some(lng));
    }
    if let Some(images) = payload.images {
        active.images = Set(serde_json::json!(images));
    }
    active.updated_at = Set(Utc::now().fixed_offset());

    let updated = active.update(&*state.db).await?;
    Ok(Json(updated))
}

/// Delete a service (owning provider or admin)
pub async fn delete_service(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(service_id): Path<i32>,
) -> AppResult<Json<serde_json::Value>> {
    let service = service::Entity::find_by_id(service_id)
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Service not found".to_string()))?;

    if service.provider_id != claims.sub && claims.role != UserRole::Admin {
        return Err(AppError::Forbidden(
            "Cannot delete service of another provider".to_string(),
        ));
    }

    service::Entity::delete_by_id(service_id)
        .exec(&*state.db)
        .await?;

    Ok(Json(serde_json::json!({ "message": "Service deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, DbBackend, MockDatabase, QueryTrait};
    use serde_json::json;

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

    fn service_model(id: i32) -> service::Model {
        let now = Utc::now().fixed_offset();
        service::Model {
            id,
            provider_id: Uuid::new_v4(),
            title: format!("Service {}", id),
            description: "Long enough description".to_string(),
            category: ServiceCategory::Plumbing,
            city: "Lisbon".to_string(),
            price: 50.0,
            location_lat: None,
            location_lng: None,
            images: json!([]),
            created_at: now,
            updated_at: now,
        }
    }

    fn review_model(id: i32, service_id: i32, rating: i32) -> review::Model {
        let now = Utc::now().fixed_offset();
        review::Model {
            id,
            user_id: Uuid::new_v4(),
            booking_id: id,
            service_id,
            rating,
            comment: "Great work".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn filter_with_no_predicates_adds_no_conditions() {
        let filter = ServiceFilter::default();
        let sql = filter
            .apply(service::Entity::find())
            .build(DbBackend::Postgres)
            .to_string();
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn filter_predicates_are_anded_and_bound() {
        let filter = ServiceFilter {
            category: Some(ServiceCategory::Plumbing),
            city: Some("Lisbon".to_string()),
            min_price: Some(10.0),
            max_price: Some(50.0),
            ..Default::default()
        };
        let sql = filter
            .apply(service::Entity::find())
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.contains("'plumbing'"));
        assert!(sql.contains("'Lisbon'"));
        assert!(sql.contains(">="));
        assert!(sql.contains("<="));
        assert_eq!(sql.matches(" AND ").count(), 3);
    }

    #[test]
    fn page_size_is_clamped() {
        let filter = ServiceFilter {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(filter.limit(), MAX_PAGE_SIZE);

        let filter = ServiceFilter::default();
        assert_eq!(filter.limit(), DEFAULT_PAGE_SIZE);
    }

    #[tokio::test]
    async fn rating_filter_applies_before_pagination() {
        // Three services, ratings 5 / 2 / 4. With minRating=4 the qualifying
        // set is [1, 3]; page (limit=1, offset=1) must reach service 3 even
        // though it sits past the first raw row.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![service_model(1), service_model(2), service_model(3)]])
            .append_query_results([vec![
                review_model(10, 1, 5),
                review_model(11, 2, 2),
                review_model(12, 3, 4),
            ]])
            .into_connection();

        let filter = ServiceFilter {
            min_rating: Some(4.0),
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        };

        let Json(response) = list_services(State(test_state(db)), Query(filter))
            .await
            .unwrap();

        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data[0].id, 3);
        assert_eq!(response.pagination.total, 2);
    }

    #[test]
    fn service_field_validation() {
        assert!(validate_service_fields("ok title", "long enough desc", "Lx", 5.0, None, None).is_ok());
        assert!(validate_service_fields("ab", "long enough desc", "Lx", 5.0, None, None).is_err());
        assert!(validate_service_fields("ok title", "short", "Lx", 5.0, None, None).is_err());
        assert!(validate_service_fields("ok title", "long enough desc", "L", 5.0, None, None).is_err());
        assert!(validate_service_fields("ok title", "long enough desc", "Lx", 0.0, None, None).is_err());
        assert!(validate_service_fields("ok title", "long enough desc", "Lx", 5.0, Some(95.0), None).is_err());
    }
}
