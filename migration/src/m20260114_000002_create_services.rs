use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20260114_000001_create_users::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(ServiceCategory::Enum)
                    .values([
                        ServiceCategory::Plumbing,
                        ServiceCategory::Electrical,
                        ServiceCategory::Cleaning,
                        ServiceCategory::Gardening,
                        ServiceCategory::Tutoring,
                        ServiceCategory::Other,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Service::Table)
                    .if_not_exists()
                    .col(integer(Service::Id).primary_key().auto_increment())
                    .col(uuid(Service::ProviderId).not_null())
                    .col(string_len(Service::Title, 100).not_null())
                    .col(text(Service::Description).not_null())
                    .col(
                        ColumnDef::new(Service::Category)
                            .custom(ServiceCategory::Enum)
                            .not_null(),
                    )
                    .col(string_len(Service::City, 100).not_null())
                    .col(double(Service::Price).not_null())
                    .col(double_null(Service::LocationLat))
                    .col(double_null(Service::LocationLng))
                    .col(json_binary(Service::Images).not_null())
                    .col(
                        timestamp_with_time_zone(Service::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Service::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_service_provider")
                            .from(Service::Table, Service::ProviderId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Service::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(ServiceCategory::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Service {
    Table,
    Id,
    ProviderId,
    Title,
    Description,
    Category,
    City,
    Price,
    LocationLat,
    LocationLng,
    Images,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum ServiceCategory {
    #[sea_orm(iden = "service_category")]
    Enum,
    #[sea_orm(iden = "plumbing")]
    Plumbing,
    #[sea_orm(iden = "electrical")]
    Electrical,
    #[sea_orm(iden = "cleaning")]
    Cleaning,
    #[sea_orm(iden = "gardening")]
    Gardening,
    #[sea_orm(iden = "tutoring")]
    Tutoring,
    #[sea_orm(iden = "other")]
    Other,
}
