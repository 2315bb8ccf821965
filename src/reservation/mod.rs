//! Booking reservation manager.
//!
//! Guards the one real invariant in the system: for a given service, no two
//! bookings with status `pending` or `confirmed` may occupy overlapping
//! 60-minute session windows. All coordination is delegated to the database
//! (row locks inside a single transaction), never to in-process primitives,
//! so the server can run as multiple stateless instances.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect,
    Select, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::service;
use crate::error::{AppError, AppResult};

/// Fixed session length for every service.
pub const SESSION_MINUTES: i64 = 60;

/// Exclusive bounds of the conflict scan for a requested start instant.
///
/// A booking occupies `[datetime, datetime + 60min)`, so an existing booking
/// collides iff its start lies strictly within one session length of the
/// requested start on either side. Both bounds are exclusive: back-to-back
/// sessions (one starting exactly when the other ends) do not conflict.
pub fn conflict_bounds(start: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let session = Duration::minutes(SESSION_MINUTES);
    (start - session, start + session)
}

/// Locked scan over active bookings whose start lies strictly inside the
/// conflict window. Strict inequalities keep the bounds themselves bookable.
fn conflict_scan(service_id: i32, start: DateTime<Utc>) -> Select<booking::Entity> {
    let (lower, upper) = conflict_bounds(start);
    booking::Entity::find()
        .filter(booking::Column::ServiceId.eq(service_id))
        .filter(booking::Column::Status.is_in(BookingStatus::active()))
        .filter(booking::Column::Datetime.gt(lower.fixed_offset()))
        .filter(booking::Column::Datetime.lt(upper.fixed_offset()))
        .lock_exclusive()
}

/// Atomically reserve the session window starting at `start` on a service.
///
/// Runs as one transaction: lock the service row to serialize concurrent
/// attempts on the same service, scan active bookings near the window with
/// row locks, and insert only if the window is free. Of two concurrent
/// overlapping requests exactly one commits; the other sees
/// `SlotUnavailable`. Requests against different services never contend.
pub async fn reserve(
    db: &DatabaseConnection,
    requester_id: Uuid,
    service_id: i32,
    start: DateTime<Utc>,
    quantity: i32,
) -> AppResult<booking::Model> {
    let txn = db.begin().await?;

    // Write-intent lock on the service row. A missing service aborts here
    // without having locked anything.
    let service = service::Entity::find_by_id(service_id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Service not found".to_string()))?;

    // Lock the bookings in the contested range so a concurrent transaction
    // cannot read a stale "free" view and insert before we commit.
    let conflicts = conflict_scan(service.id, start).all(&txn).await?;

    if !conflicts.is_empty() {
        txn.rollback().await?;
        tracing::debug!(
            service_id,
            start = %start,
            "Reservation rejected: window occupied"
        );
        return Err(AppError::SlotUnavailable);
    }

    let now = Utc::now().fixed_offset();
    let created = booking::ActiveModel {
        user_id: Set(requester_id),
        service_id: Set(service.id),
        datetime: Set(start.fixed_offset()),
        quantity: Set(quantity),
        status: Set(BookingStatus::Pending),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    tracing::info!(booking_id = created.id, service_id, "Booking created");
    Ok(created)
}

/// Whether `caller_id` may move a booking to `new_status`.
///
/// The owning provider may confirm, cancel or complete; the booking's own
/// customer may only cancel. No transition-order rule is applied beyond
/// this, so a provider may complete a booking that was never confirmed.
fn transition_allowed(
    caller_id: Uuid,
    booking_user_id: Uuid,
    provider_id: Uuid,
    new_status: BookingStatus,
) -> bool {
    if caller_id == provider_id {
        matches!(
            new_status,
            BookingStatus::Confirmed | BookingStatus::Cancelled | BookingStatus::Completed
        )
    } else if caller_id == booking_user_id {
        new_status == BookingStatus::Cancelled
    } else {
        false
    }
}

/// Apply a status transition to a booking on behalf of `caller_id`.
///
/// Single-row update, no locking harness: the overlap invariant only ever
/// tightens when a booking leaves the active set.
pub async fn set_status(
    db: &DatabaseConnection,
    booking_id: i32,
    caller_id: Uuid,
    new_status: BookingStatus,
) -> AppResult<booking::Model> {
    let booking = booking::Entity::find_by_id(booking_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    let service = service::Entity::find_by_id(booking.service_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Internal("Service missing for booking".to_string()))?;

    if !transition_allowed(caller_id, booking.user_id, service.provider_id, new_status) {
        return Err(AppError::Forbidden(
            "Not allowed to update this booking".to_string(),
        ));
    }

    let mut active: booking::ActiveModel = booking.into();
    active.status = Set(new_status);
    active.updated_at = Set(Utc::now().fixed_offset());

    let updated = active.update(db).await?;
    tracing::info!(booking_id, status = ?updated.status, "Booking status updated");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use serde_json::json;

    use crate::entities::service::ServiceCategory;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 11, 10, 14, 0, 0).unwrap()
    }

    fn service_model(provider_id: Uuid) -> service::Model {
        service::Model {
            id: 1,
            provider_id,
            title: "Pipe repair".to_string(),
            description: "Fix leaking pipes".to_string(),
            category: ServiceCategory::Plumbing,
            city: "Lisbon".to_string(),
            price: 80.0,
            location_lat: None,
            location_lng: None,
            images: json!([]),
            created_at: start().fixed_offset(),
            updated_at: start().fixed_offset(),
        }
    }

    fn booking_model(id: i32, user_id: Uuid, status: BookingStatus) -> booking::Model {
        booking::Model {
            id,
            user_id,
            service_id: 1,
            datetime: start().fixed_offset(),
            quantity: 1,
            status,
            created_at: start().fixed_offset(),
            updated_at: start().fixed_offset(),
        }
    }

    #[test]
    fn bounds_are_one_session_either_side() {
        let (lower, upper) = conflict_bounds(start());
        assert_eq!(upper - lower, Duration::minutes(2 * SESSION_MINUTES));
        assert_eq!(upper - start(), Duration::minutes(SESSION_MINUTES));
    }

    #[test]
    fn conflict_scan_excludes_the_window_edges() {
        use sea_orm::{DbBackend, QueryTrait};

        // A 14:00 request scans (13:00, 15:00) exclusively, so a booking at
        // exactly 13:00 or 15:00 is back-to-back, not a conflict.
        let sql = conflict_scan(1, start()).build(DbBackend::Postgres).to_string();

        assert!(sql.contains("13:00:00"));
        assert!(sql.contains("15:00:00"));
        assert!(sql.contains(" > "));
        assert!(sql.contains(" < "));
        assert!(!sql.contains(">="));
        assert!(!sql.contains("<="));
        assert!(sql.contains("FOR UPDATE"));
    }

    #[test]
    fn provider_may_confirm_cancel_complete() {
        let provider = Uuid::new_v4();
        let customer = Uuid::new_v4();

        for status in [
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Completed,
        ] {
            assert!(transition_allowed(provider, customer, provider, status));
        }
        assert!(!transition_allowed(
            provider,
            customer,
            provider,
            BookingStatus::Pending
        ));
    }

    #[test]
    fn customer_may_only_cancel() {
        let provider = Uuid::new_v4();
        let customer = Uuid::new_v4();

        assert!(transition_allowed(
            customer,
            customer,
            provider,
            BookingStatus::Cancelled
        ));
        assert!(!transition_allowed(
            customer,
            customer,
            provider,
            BookingStatus::Confirmed
        ));
        assert!(!transition_allowed(
            customer,
            customer,
            provider,
            BookingStatus::Completed
        ));
    }

    #[test]
    fn stranger_may_do_nothing() {
        let provider = Uuid::new_v4();
        let customer = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        assert!(!transition_allowed(
            stranger,
            customer,
            provider,
            BookingStatus::Cancelled
        ));
    }

    #[tokio::test]
    async fn reserve_creates_pending_booking_when_window_free() {
        let requester = Uuid::new_v4();
        let created = booking_model(7, requester, BookingStatus::Pending);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![service_model(Uuid::new_v4())]])
            .append_query_results([Vec::<booking::Model>::new()])
            .append_query_results([vec![created.clone()]])
            .append_exec_results([MockExecResult {
                last_insert_id: 7,
                rows_affected: 1,
            }])
            .into_connection();

        let booking = reserve(&db, requester, 1, start(), 1).await.unwrap();
        assert_eq!(booking.id, 7);
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.user_id, requester);
    }

    #[tokio::test]
    async fn reserve_rejects_occupied_window() {
        let other = Uuid::new_v4();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![service_model(Uuid::new_v4())]])
            .append_query_results([vec![booking_model(3, other, BookingStatus::Confirmed)]])
            .into_connection();

        let err = reserve(&db, Uuid::new_v4(), 1, start(), 1).await.unwrap_err();
        assert!(matches!(err, AppError::SlotUnavailable));
    }

    #[tokio::test]
    async fn reserve_missing_service_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<service::Model>::new()])
            .into_connection();

        let err = reserve(&db, Uuid::new_v4(), 42, start(), 1).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn set_status_provider_confirms() {
        let provider = Uuid::new_v4();
        let customer = Uuid::new_v4();
        let updated = booking_model(3, customer, BookingStatus::Confirmed);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![booking_model(3, customer, BookingStatus::Pending)]])
            .append_query_results([vec![service_model(provider)]])
            .append_query_results([vec![updated]])
            .append_exec_results([MockExecResult {
                last_insert_id: 3,
                rows_affected: 1,
            }])
            .into_connection();

        let booking = set_status(&db, 3, provider, BookingStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn set_status_customer_cannot_confirm_own_booking() {
        let provider = Uuid::new_v4();
        let customer = Uuid::new_v4();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![booking_model(3, customer, BookingStatus::Pending)]])
            .append_query_results([vec![service_model(provider)]])
            .into_connection();

        let err = set_status(&db, 3, customer, BookingStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn set_status_missing_booking_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<booking::Model>::new()])
            .into_connection();

        let err = set_status(&db, 99, Uuid::new_v4(), BookingStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
