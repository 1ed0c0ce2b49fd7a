use super::user_agent::parse_user_agent;
use super::{HookError, RequestContext, TokenHook};
use crate::entity::{oauth_access_token, oauth_refresh_token};
use async_trait::async_trait;
use sea_orm::{ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

/// Records the requesting device, OS and client on new tokens.
pub struct ClientDetailsHook;

#[async_trait]
impl TokenHook for ClientDetailsHook {
    fn name(&self) -> &'static str {
        "client_details"
    }

    async fn creating(
        &self,
        token: &mut oauth_access_token::ActiveModel,
        ctx: &RequestContext,
    ) -> Result<(), HookError> {
        let Some(details) = ctx.user_agent.as_deref().and_then(parse_user_agent) else {
            tracing::debug!("no client details for bot or missing user agent");
            return Ok(());
        };
        token.client_details = Set(Some(serde_json::to_string(&details)?));
        Ok(())
    }
}

/// Removes the refresh tokens of a deleted access token.
///
/// Only rows belonging to the authenticated user are touched.
pub struct RefreshTokenCleanupHook;

#[async_trait]
impl TokenHook for RefreshTokenCleanupHook {
    fn name(&self) -> &'static str {
        "refresh_token_cleanup"
    }

    async fn deleted(
        &self,
        db: &DatabaseConnection,
        token: &oauth_access_token::Model,
        ctx: &RequestContext,
    ) -> Result<(), HookError> {
        let Some(user_id) = ctx.user_id.as_deref() else {
            tracing::debug!(token_id = %token.id, "no authenticated user, keeping refresh tokens");
            return Ok(());
        };

        let result = oauth_refresh_token::Entity::delete_many()
            .filter(oauth_refresh_token::Column::AccessTokenId.eq(token.id.as_str()))
            .filter(oauth_refresh_token::Column::UserId.eq(user_id))
            .exec(db)
            .await?;
        tracing::debug!(token_id = %token.id, removed = result.rows_affected, "refresh tokens removed");
        Ok(())
    }
}
