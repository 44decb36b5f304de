use sea_orm_migration::prelude::*;

pub use sea_orm_migration::MigratorTrait;

mod m20260823_000001_create_connected_accounts_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(
            m20260823_000001_create_connected_accounts_table::Migration,
        )]
    }
}

/// Common table and column identifiers
#[derive(Iden)]
pub enum ConnectedAccounts {
    Table,
    Id,
    UserId,
    Provider,
    ExternalId,
    Name,
    FriendSync,
    Verified,
    TokenData,
    CreatedAt,
    UpdatedAt,
}
