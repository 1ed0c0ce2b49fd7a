//! Pending password reset requests, one per email address.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Reset links stop working after this long.
pub const RESET_TOKEN_TTL: Duration = Duration::minutes(60);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "password_resets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub email: String,
    /// SHA-256 hex digest of the token sent by mail
    pub token_hash: String,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_expired(&self) -> bool {
        self.created_at + RESET_TOKEN_TTL < OffsetDateTime::now_utc()
    }
}
