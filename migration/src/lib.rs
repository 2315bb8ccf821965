pub use sea_orm_migration::prelude::*;

mod m20260114_000001_create_users;
mod m20260114_000002_create_services;
mod m20260114_000003_create_bookings;
mod m20260114_000004_create_reviews;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260114_000001_create_users::Migration),
            Box::new(m20260114_000002_create_services::Migration),
            Box::new(m20260114_000003_create_bookings::Migration),
            Box::new(m20260114_000004_create_reviews::Migration),
        ]
    }
}
