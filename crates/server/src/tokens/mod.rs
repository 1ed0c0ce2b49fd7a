//! Access token persistence with lifecycle hooks.
//!
//! Every token row goes through [`TokenStore`]: `create` lets each
//! [`TokenHook`] amend the pending row before it is inserted, `delete` tells
//! each hook about the removed row afterwards. Hooks enrich and clean up;
//! a failing hook is logged and never fails the surrounding request.

pub mod hooks;
pub mod user_agent;

use crate::entity::oauth_access_token;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter,
};
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;

pub use hooks::{ClientDetailsHook, RefreshTokenCleanupHook};

#[derive(Debug, Error)]
pub enum HookError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("could not encode client details: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What the hooks may know about the request that triggered them.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub user_agent: Option<String>,
    pub ip: Option<IpAddr>,
    /// Authenticated user, when the request carried valid credentials.
    pub user_id: Option<String>,
}

impl RequestContext {
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

#[async_trait]
pub trait TokenHook: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs before the token row is inserted.
    async fn creating(
        &self,
        _token: &mut oauth_access_token::ActiveModel,
        _ctx: &RequestContext,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs after the token row has been deleted.
    async fn deleted(
        &self,
        _db: &DatabaseConnection,
        _token: &oauth_access_token::Model,
        _ctx: &RequestContext,
    ) -> Result<(), HookError> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct TokenStore {
    db: Arc<DatabaseConnection>,
    hooks: Arc<Vec<Arc<dyn TokenHook>>>,
}

impl TokenStore {
    pub fn new(db: Arc<DatabaseConnection>, hooks: Vec<Arc<dyn TokenHook>>) -> Self {
        Self {
            db,
            hooks: Arc::new(hooks),
        }
    }

    /// Store with the client details and refresh token cleanup hooks.
    pub fn with_default_hooks(db: Arc<DatabaseConnection>) -> Self {
        Self::new(
            db,
            vec![
                Arc::new(ClientDetailsHook),
                Arc::new(RefreshTokenCleanupHook),
            ],
        )
    }

    pub async fn create(
        &self,
        mut token: oauth_access_token::ActiveModel,
        ctx: &RequestContext,
    ) -> Result<oauth_access_token::Model, DbErr> {
        for hook in self.hooks.iter() {
            if let Err(e) = hook.creating(&mut token, ctx).await {
                tracing::warn!(hook = hook.name(), error = %e, "token creating hook failed");
            }
        }
        token.insert(self.db.as_ref()).await
    }

    /// Find a token by id, owned by `user_id`.
    pub async fn find_for_user(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<oauth_access_token::Model>, DbErr> {
        oauth_access_token::Entity::find_by_id(id.to_string())
            .filter(oauth_access_token::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await
    }

    pub async fn find(&self, id: &str) -> Result<Option<oauth_access_token::Model>, DbErr> {
        oauth_access_token::Entity::find_by_id(id.to_string())
            .one(self.db.as_ref())
            .await
    }

    pub async fn revoke(
        &self,
        token: oauth_access_token::Model,
    ) -> Result<oauth_access_token::Model, DbErr> {
        let mut active = token.into_active_model();
        active.revoked = Set(true);
        active.updated_at = Set(OffsetDateTime::now_utc());
        active.update(self.db.as_ref()).await
    }

    pub async fn delete(
        &self,
        token: oauth_access_token::Model,
        ctx: &RequestContext,
    ) -> Result<(), DbErr> {
        oauth_access_token::Entity::delete_by_id(token.id.clone())
            .exec(self.db.as_ref())
            .await?;
        for hook in self.hooks.iter() {
            if let Err(e) = hook.deleted(self.db.as_ref(), &token, ctx).await {
                tracing::warn!(hook = hook.name(), token_id = %token.id, error = %e, "token deleted hook failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::ActiveValue::NotSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing;

    #[async_trait]
    impl TokenHook for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn creating(
            &self,
            _token: &mut oauth_access_token::ActiveModel,
            _ctx: &RequestContext,
        ) -> Result<(), HookError> {
            Err(HookError::Database(DbErr::Custom("boom".into())))
        }
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl TokenHook for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn deleted(
            &self,
            _db: &DatabaseConnection,
            _token: &oauth_access_token::Model,
            _ctx: &RequestContext,
        ) -> Result<(), HookError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn store(hooks: Vec<Arc<dyn TokenHook>>) -> TokenStore {
        use migration::{Migrator, MigratorTrait};
        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        TokenStore::new(Arc::new(db), hooks)
    }

    fn pending(id: &str, user: &str) -> oauth_access_token::ActiveModel {
        let now = OffsetDateTime::now_utc();
        oauth_access_token::ActiveModel {
            id: Set(id.to_string()),
            user_id: Set(Some(user.to_string())),
            client_id: Set("client".to_string()),
            scopes: Set(String::new()),
            revoked: Set(false),
            client_details: NotSet,
            created_at: Set(now),
            updated_at: Set(now),
            expires_at: Set(now + time::Duration::hours(1)),
        }
    }

    #[tokio::test]
    async fn failing_creating_hook_does_not_block_insert() {
        let store = store(vec![Arc::new(Failing)]).await;
        let token = store
            .create(pending("t1", "u1"), &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(token.id, "t1");
        assert!(token.client_details.is_none());
    }

    #[tokio::test]
    async fn delete_runs_hooks_after_removal() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = store(vec![Arc::new(Counting(calls.clone()))]).await;
        let token = store
            .create(pending("t2", "u1"), &RequestContext::default())
            .await
            .unwrap();
        store.delete(token, &RequestContext::default()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.find("t2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lookup_is_scoped_to_owner() {
        let store = store(vec![]).await;
        store
            .create(pending("t3", "owner"), &RequestContext::default())
            .await
            .unwrap();
        assert!(store.find_for_user("t3", "someone-else").await.unwrap().is_none());
        let found = store.find_for_user("t3", "owner").await.unwrap().unwrap();
        let revoked = store.revoke(found).await.unwrap();
        assert!(revoked.revoked);
    }
}
