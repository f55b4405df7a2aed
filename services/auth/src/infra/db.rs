use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, DeleteMany, EntityTrait,
    Insert, QueryFilter, UpdateMany,
};

use atelier_auth_schema::{accounts, otp_records, sessions};
use atelier_domain::id::AccountId;
use atelier_domain::identifier::IdentifierKind;

use crate::domain::repository::{AccountRepository, OtpRepository, SessionRepository};
use crate::domain::types::{Account, OtpRecord, Session};
use crate::error::AuthServiceError;

// ── OTP repository ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbOtpRepository {
    pub db: DatabaseConnection,
}

impl OtpRepository for DbOtpRepository {
    async fn upsert(&self, record: &OtpRecord) -> Result<(), AuthServiceError> {
        upsert_otp(record)
            .exec_without_returning(&self.db)
            .await
            .context("upsert otp record")?;
        Ok(())
    }

    async fn upsert_unless_recent(
        &self,
        record: &OtpRecord,
        issued_after: DateTime<Utc>,
    ) -> Result<bool, AuthServiceError> {
        let written = upsert_otp_unless_recent(record, issued_after)
            .exec_without_returning(&self.db)
            .await
            .context("upsert otp record outside cooldown")?;
        Ok(written > 0)
    }

    async fn find(&self, identifier: &str) -> Result<Option<OtpRecord>, AuthServiceError> {
        let model = otp_records::Entity::find_by_id(identifier.to_owned())
            .one(&self.db)
            .await
            .context("find otp record")?;
        Ok(model.map(otp_from_model))
    }

    async fn record_failed_attempt(
        &self,
        identifier: &str,
        code: &str,
    ) -> Result<Option<i32>, AuthServiceError> {
        let updated = increment_attempts(identifier, code)
            .exec_with_returning(&self.db)
            .await
            .context("record failed otp attempt")?;
        Ok(updated.first().map(|m| m.attempts))
    }

    async fn mark_verified(
        &self,
        identifier: &str,
        code: &str,
        now: DateTime<Utc>,
        grant_expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthServiceError> {
        let result = mark_otp_verified(identifier, code, now, grant_expires_at)
            .exec(&self.db)
            .await
            .context("mark otp verified")?;
        Ok(result.rows_affected > 0)
    }

    async fn take_verified(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>, AuthServiceError> {
        // Only the request whose delete returns the row owns the grant.
        let taken = take_verified_otp(identifier, now)
            .exec_with_returning(&self.db)
            .await
            .context("consume verified otp record")?;
        Ok(taken.into_iter().next().map(otp_from_model))
    }

    async fn delete(&self, identifier: &str, code: &str) -> Result<bool, AuthServiceError> {
        let result = otp_records::Entity::delete_many()
            .filter(otp_records::Column::Identifier.eq(identifier))
            .filter(otp_records::Column::Code.eq(code))
            .exec(&self.db)
            .await
            .context("delete otp record")?;
        Ok(result.rows_affected > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthServiceError> {
        let result = otp_records::Entity::delete_many()
            .filter(otp_records::Column::ExpiresAt.lt(now))
            .exec(&self.db)
            .await
            .context("purge expired otp records")?;
        Ok(result.rows_affected)
    }
}

fn upsert_otp(record: &OtpRecord) -> Insert<otp_records::ActiveModel> {
    insert_otp(record).on_conflict(replace_otp_on_conflict())
}

fn insert_otp(record: &OtpRecord) -> Insert<otp_records::ActiveModel> {
    otp_records::Entity::insert(otp_records::ActiveModel {
        identifier: Set(record.identifier.clone()),
        code: Set(record.code.clone()),
        attempts: Set(record.attempts),
        created_at: Set(record.created_at),
        expires_at: Set(record.expires_at),
        verified_at: Set(record.verified_at),
    })
}

/// The replace fires only when the stored record is past the cooldown or no longer a
/// pending code. Postgres reports zero affected rows when the existing record is kept.
fn upsert_otp_unless_recent(
    record: &OtpRecord,
    issued_after: DateTime<Utc>,
) -> Insert<otp_records::ActiveModel> {
    let mut on_conflict = replace_otp_on_conflict();
    on_conflict.action_and_where(
        otp_records::Column::CreatedAt
            .lte(issued_after)
            .or(otp_records::Column::VerifiedAt.is_not_null())
            .or(otp_records::Column::ExpiresAt.lt(record.created_at)),
    );
    insert_otp(record).on_conflict(on_conflict)
}

fn replace_otp_on_conflict() -> OnConflict {
    OnConflict::column(otp_records::Column::Identifier)
        .update_columns([
            otp_records::Column::Code,
            otp_records::Column::Attempts,
            otp_records::Column::CreatedAt,
            otp_records::Column::ExpiresAt,
            otp_records::Column::VerifiedAt,
        ])
        .to_owned()
}

fn increment_attempts(identifier: &str, code: &str) -> UpdateMany<otp_records::Entity> {
    otp_records::Entity::update_many()
        .col_expr(
            otp_records::Column::Attempts,
            Expr::col(otp_records::Column::Attempts).add(1),
        )
        .filter(otp_records::Column::Identifier.eq(identifier))
        .filter(otp_records::Column::Code.eq(code))
        .filter(otp_records::Column::VerifiedAt.is_null())
}

fn mark_otp_verified(
    identifier: &str,
    code: &str,
    now: DateTime<Utc>,
    grant_expires_at: DateTime<Utc>,
) -> UpdateMany<otp_records::Entity> {
    otp_records::Entity::update_many()
        .col_expr(otp_records::Column::VerifiedAt, Expr::value(Some(now)))
        .col_expr(otp_records::Column::ExpiresAt, Expr::value(grant_expires_at))
        .filter(otp_records::Column::Identifier.eq(identifier))
        .filter(otp_records::Column::Code.eq(code))
        .filter(otp_records::Column::VerifiedAt.is_null())
        .filter(otp_records::Column::ExpiresAt.gte(now))
}

fn take_verified_otp(identifier: &str, now: DateTime<Utc>) -> DeleteMany<otp_records::Entity> {
    otp_records::Entity::delete_many()
        .filter(otp_records::Column::Identifier.eq(identifier))
        .filter(otp_records::Column::VerifiedAt.is_not_null())
        .filter(otp_records::Column::ExpiresAt.gte(now))
}

fn otp_from_model(model: otp_records::Model) -> OtpRecord {
    OtpRecord {
        identifier: model.identifier,
        code: model.code,
        attempts: model.attempts,
        created_at: model.created_at,
        expires_at: model.expires_at,
        verified_at: model.verified_at,
    }
}

// ── Account repository ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbAccountRepository {
    pub db: DatabaseConnection,
}

impl AccountRepository for DbAccountRepository {
    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, AuthServiceError> {
        let model = accounts::Entity::find()
            .filter(accounts::Column::Identifier.eq(identifier))
            .one(&self.db)
            .await
            .context("find account by identifier")?;
        model.map(account_from_model).transpose()
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, AuthServiceError> {
        let model = accounts::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find account by id")?;
        model.map(account_from_model).transpose()
    }

    async fn insert_or_get(&self, account: &Account) -> Result<Account, AuthServiceError> {
        accounts::Entity::insert(accounts::ActiveModel {
            id: Set(account.id.0),
            identifier: Set(account.identifier.clone()),
            kind: Set(account.kind.as_str().to_owned()),
            name: Set(account.name.clone()),
            created_at: Set(account.created_at),
        })
        .on_conflict(
            OnConflict::column(accounts::Column::Identifier)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await
        .context("insert account")?;

        self.find_by_identifier(&account.identifier)
            .await?
            .context("account missing after insert")
            .map_err(AuthServiceError::from)
    }
}

fn account_from_model(model: accounts::Model) -> Result<Account, AuthServiceError> {
    let kind = IdentifierKind::from_str_opt(&model.kind)
        .with_context(|| format!("unknown identifier kind {:?}", model.kind))?;
    Ok(Account {
        id: AccountId(model.id),
        identifier: model.identifier,
        kind,
        name: model.name,
        created_at: model.created_at,
    })
}

// ── Session repository ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbSessionRepository {
    pub db: DatabaseConnection,
}

impl SessionRepository for DbSessionRepository {
    async fn create(&self, session: &Session) -> Result<(), AuthServiceError> {
        sessions::Entity::insert(sessions::ActiveModel {
            token_hash: Set(session.token_hash.clone()),
            account_id: Set(session.account_id.0),
            created_at: Set(session.created_at),
            expires_at: Set(session.expires_at),
            revoked_at: Set(session.revoked_at),
        })
        .exec_without_returning(&self.db)
        .await
        .context("create session")?;
        Ok(())
    }

    async fn find_live(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, AuthServiceError> {
        let model = sessions::Entity::find_by_id(token_hash.to_owned())
            .filter(sessions::Column::RevokedAt.is_null())
            .filter(sessions::Column::ExpiresAt.gt(now))
            .one(&self.db)
            .await
            .context("find live session")?;
        Ok(model.map(session_from_model))
    }

    async fn revoke(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, AuthServiceError> {
        let result = revoke_live_session(token_hash, now)
            .exec(&self.db)
            .await
            .context("revoke session")?;
        Ok(result.rows_affected > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthServiceError> {
        let result = purge_dead_sessions(now)
            .exec(&self.db)
            .await
            .context("purge expired sessions")?;
        Ok(result.rows_affected)
    }
}

fn revoke_live_session(token_hash: &str, now: DateTime<Utc>) -> UpdateMany<sessions::Entity> {
    sessions::Entity::update_many()
        .col_expr(sessions::Column::RevokedAt, Expr::value(Some(now)))
        .filter(sessions::Column::TokenHash.eq(token_hash))
        .filter(sessions::Column::RevokedAt.is_null())
}

fn purge_dead_sessions(now: DateTime<Utc>) -> DeleteMany<sessions::Entity> {
    sessions::Entity::delete_many().filter(
        Condition::any()
            .add(sessions::Column::ExpiresAt.lte(now))
            .add(sessions::Column::RevokedAt.is_not_null()),
    )
}

fn session_from_model(model: sessions::Model) -> Session {
    Session {
        token_hash: model.token_hash,
        account_id: AccountId(model.account_id),
        created_at: model.created_at,
        expires_at: model.expires_at,
        revoked_at: model.revoked_at,
    }
}
