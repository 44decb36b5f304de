use crate::database::entities::{ConnectedAccount, connected_accounts};
use crate::database::{DatabaseError, DatabaseResult};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr,
};
use sea_orm_migration::sea_query::OnConflict;

/// Connected accounts DAO for database operations
#[derive(Clone)]
pub struct ConnectedAccountsDao {
    db: DatabaseConnection,
}

impl ConnectedAccountsDao {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert a new link. Returns `None` when a link for the same
    /// (user, external account) already exists, which closes the race
    /// between two concurrent callbacks for the same identity.
    pub async fn create(
        &self,
        account: ConnectedAccount,
    ) -> DatabaseResult<Option<ConnectedAccount>> {
        let active_model = connected_accounts::ActiveModel {
            id: Set(account.id),
            user_id: Set(account.user_id.clone()),
            provider: Set(account.provider.clone()),
            external_id: Set(account.external_id.clone()),
            name: Set(account.name.clone()),
            friend_sync: Set(account.friend_sync),
            verified: Set(account.verified),
            token_data: Set(account.token_data.clone()),
            created_at: Set(account.created_at),
            updated_at: Set(account.updated_at),
        };

        let on_conflict = OnConflict::columns([
            connected_accounts::Column::UserId,
            connected_accounts::Column::ExternalId,
        ])
        .do_nothing()
        .to_owned();

        match connected_accounts::Entity::insert(active_model)
            .on_conflict(on_conflict)
            .exec(&self.db)
            .await
        {
            Ok(_) => Ok(Some(account)),
            Err(DbErr::RecordNotInserted) => Ok(None),
            Err(e) => Err(map_db_err(e)),
        }
    }

    /// Find a link by user and external account id
    pub async fn find_by_user_and_external_id(
        &self,
        user_id: &str,
        external_id: &str,
    ) -> DatabaseResult<Option<ConnectedAccount>> {
        let account = connected_accounts::Entity::find()
            .filter(connected_accounts::Column::UserId.eq(user_id))
            .filter(connected_accounts::Column::ExternalId.eq(external_id))
            .one(&self.db)
            .await
            .map_err(map_db_err)?;

        Ok(account)
    }

    /// List all links belonging to a user
    pub async fn list_for_user(&self, user_id: &str) -> DatabaseResult<Vec<ConnectedAccount>> {
        let accounts = connected_accounts::Entity::find()
            .filter(connected_accounts::Column::UserId.eq(user_id))
            .order_by_asc(connected_accounts::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(map_db_err)?;

        Ok(accounts)
    }
}

fn map_db_err(err: DbErr) -> DatabaseError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) => DatabaseError::Constraint(msg),
        _ => DatabaseError::Database(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::migration::{Migrator, MigratorTrait};

    async fn setup_dao() -> ConnectedAccountsDao {
        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        ConnectedAccountsDao::new(db)
    }

    fn battlenet_account(user_id: &str, external_id: &str) -> ConnectedAccount {
        ConnectedAccount::new(
            user_id.to_string(),
            "battlenet".to_string(),
            external_id.to_string(),
            "Foo#123".to_string(),
            false,
            None,
        )
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let dao = setup_dao().await;

        let created = dao
            .create(battlenet_account("user-1", "42"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.provider, "battlenet");

        let found = dao
            .find_by_user_and_external_id("user-1", "42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.name, "Foo#123");

        let missing = dao
            .find_by_user_and_external_id("user-1", "43")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_returns_none() {
        let dao = setup_dao().await;

        let first = dao.create(battlenet_account("user-1", "42")).await.unwrap();
        assert!(first.is_some());

        // Same user and external id, different row id and provider
        let mut duplicate = battlenet_account("user-1", "42");
        duplicate.provider = "xbox".to_string();
        let second = dao.create(duplicate).await.unwrap();
        assert!(second.is_none());

        let accounts = dao.list_for_user("user-1").await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].provider, "battlenet");
    }

    #[tokio::test]
    async fn test_same_external_id_different_users() {
        let dao = setup_dao().await;

        assert!(dao
            .create(battlenet_account("user-1", "42"))
            .await
            .unwrap()
            .is_some());
        assert!(dao
            .create(battlenet_account("user-2", "42"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_list_for_user_preserves_token_data() {
        let dao = setup_dao().await;

        let mut account = battlenet_account("user-1", "42");
        account.token_data = Some(serde_json::json!({
            "access_token": "T1",
            "token_type": "bearer",
        }));
        dao.create(account).await.unwrap();

        let accounts = dao.list_for_user("user-1").await.unwrap();
        assert_eq!(accounts.len(), 1);
        let token_data = accounts[0].token_data.as_ref().unwrap();
        assert_eq!(token_data["access_token"], "T1");
    }
}
