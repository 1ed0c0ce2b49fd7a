//! OAuth client entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_clients")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Client secret (None for public clients)
    pub secret: Option<String>,
    /// Human-readable client name
    pub name: String,
    /// Whether the client may use the password grant
    pub password_client: bool,
    pub revoked: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Check a presented secret against the stored one.
    pub fn secret_matches(&self, presented: Option<&str>) -> bool {
        match (&self.secret, presented) {
            (None, _) => true,
            (Some(secret), Some(presented)) => {
                secret.as_bytes().ct_eq(presented.as_bytes()).into()
            }
            (Some(_), None) => false,
        }
    }
}
