//! Tables backing the password and refresh token grants:
//! - oauth_clients: registered clients, flagged when allowed to use the password grant
//! - oauth_access_tokens: issued access tokens, keyed by JWT id
//! - oauth_refresh_tokens: opaque refresh tokens bound to an access token

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OAuthClients::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthClients::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuthClients::Secret).string().null())
                    .col(ColumnDef::new(OAuthClients::Name).string().not_null())
                    .col(
                        ColumnDef::new(OAuthClients::PasswordClient)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuthClients::Revoked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuthClients::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuthAccessTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthAccessTokens::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuthAccessTokens::UserId).string().null())
                    .col(ColumnDef::new(OAuthAccessTokens::ClientId).string().not_null())
                    .col(
                        ColumnDef::new(OAuthAccessTokens::Scopes)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OAuthAccessTokens::Revoked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(OAuthAccessTokens::ClientDetails).text().null())
                    .col(
                        ColumnDef::new(OAuthAccessTokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthAccessTokens::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthAccessTokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuthRefreshTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthRefreshTokens::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuthRefreshTokens::AccessTokenId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OAuthRefreshTokens::UserId).string().null())
                    .col(
                        ColumnDef::new(OAuthRefreshTokens::Revoked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuthRefreshTokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_access_tokens_user_id")
                    .table(OAuthAccessTokens::Table)
                    .col(OAuthAccessTokens::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_refresh_tokens_access_token_id")
                    .table(OAuthRefreshTokens::Table)
                    .col(OAuthRefreshTokens::AccessTokenId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth_refresh_tokens_access_token_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth_access_tokens_user_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(OAuthRefreshTokens::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuthAccessTokens::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuthClients::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum OAuthClients {
    #[sea_orm(iden = "oauth_clients")]
    Table,
    Id,
    Secret,
    Name,
    PasswordClient,
    Revoked,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuthAccessTokens {
    #[sea_orm(iden = "oauth_access_tokens")]
    Table,
    Id,
    UserId,
    ClientId,
    Scopes,
    Revoked,
    ClientDetails,
    CreatedAt,
    UpdatedAt,
    ExpiresAt,
}

#[derive(DeriveIden)]
enum OAuthRefreshTokens {
    #[sea_orm(iden = "oauth_refresh_tokens")]
    Table,
    Id,
    AccessTokenId,
    UserId,
    Revoked,
    ExpiresAt,
}
