use super::ConnectedAccounts;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ConnectedAccounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConnectedAccounts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ConnectedAccounts::UserId).string().not_null())
                    .col(
                        ColumnDef::new(ConnectedAccounts::Provider)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConnectedAccounts::ExternalId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ConnectedAccounts::Name).string().not_null())
                    .col(
                        ColumnDef::new(ConnectedAccounts::FriendSync)
                            .boolean()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConnectedAccounts::Verified)
                            .boolean()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ConnectedAccounts::TokenData).json().null())
                    .col(
                        ColumnDef::new(ConnectedAccounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConnectedAccounts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One link per (user, external account), no matter which provider
        // reported it. Concurrent duplicate inserts resolve here.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_connected_accounts_user_external")
                    .table(ConnectedAccounts::Table)
                    .col(ConnectedAccounts::UserId)
                    .col(ConnectedAccounts::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Per-user listing
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_connected_accounts_user_id")
                    .table(ConnectedAccounts::Table)
                    .col(ConnectedAccounts::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ConnectedAccounts::Table).to_owned())
            .await
    }
}
