use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One review per author per title.
        manager
            .create_index(
                Index::create()
                    .name("idx_reviews_title_user_unique")
                    .table(Reviews::Table)
                    .col(Reviews::TitleId)
                    .col(Reviews::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reviews_external_id_created_at")
                    .table(Reviews::Table)
                    .col(Reviews::ExternalId)
                    .col(Reviews::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reviews_user_id")
                    .table(Reviews::Table)
                    .col(Reviews::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "idx_reviews_user_id",
            "idx_reviews_external_id_created_at",
            "idx_reviews_title_user_unique",
        ] {
            manager.drop_index(Index::drop().name(name).table(Reviews::Table).to_owned()).await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Reviews {
    Table,
    TitleId,
    ExternalId,
    UserId,
    CreatedAt,
}
