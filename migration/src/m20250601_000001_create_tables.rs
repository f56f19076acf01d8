use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto(Users::Id))
                    .col(string(Users::Name))
                    .col(string_uniq(Users::Email))
                    .col(string(Users::PasswordHash))
                    .col(boolean(Users::IsAdmin).default(false))
                    .col(text(Users::Watched).default("[]"))
                    .col(text(Users::Watchlist).default("[]"))
                    .col(big_integer(Users::CreatedAt))
                    .col(big_integer(Users::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Titles::Table)
                    .if_not_exists()
                    .col(pk_auto(Titles::Id))
                    .col(string_uniq(Titles::ExternalId))
                    .col(string(Titles::Title))
                    .col(double(Titles::AverageRating).default(0.0))
                    .col(integer(Titles::ReviewCount).default(0))
                    .col(big_integer(Titles::CreatedAt))
                    .col(big_integer(Titles::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Reviews::Table)
                    .if_not_exists()
                    .col(pk_auto(Reviews::Id))
                    .col(integer(Reviews::TitleId))
                    .col(string(Reviews::ExternalId))
                    .col(integer(Reviews::UserId))
                    .col(string(Reviews::Username))
                    .col(double(Reviews::Rating))
                    .col(text(Reviews::Body).default(""))
                    .col(big_integer(Reviews::CreatedAt))
                    .col(big_integer(Reviews::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_reviews_title")
                            .from(Reviews::Table, Reviews::TitleId)
                            .to(Titles::Table, Titles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_reviews_user")
                            .from(Reviews::Table, Reviews::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Reviews::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Titles::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Users::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Name,
    Email,
    PasswordHash,
    IsAdmin,
    Watched,
    Watchlist,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Titles {
    Table,
    Id,
    ExternalId,
    Title,
    AverageRating,
    ReviewCount,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Reviews {
    Table,
    Id,
    TitleId,
    ExternalId,
    UserId,
    Username,
    Rating,
    Body,
    CreatedAt,
    UpdatedAt,
}
