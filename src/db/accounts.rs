//! Account repository (spec.md §4.6, §9).
//!
//! The teacher's repository of the same name salts passwords with Argon2id
//! and layers SCRAM-SHA-256 verifiers for SASL. This core instead preserves
//! the legacy unsalted digest scheme spec.md §9 requires for wire
//! compatibility with existing account databases: one digest algorithm tag
//! per row (`sha1` by default), compared constant-time via `subtle`. The
//! repository/pool shape — a borrowed `SqlitePool`, one method per
//! operation, `DbError` on failure — is kept as-is.

use sha1::{Digest, Sha1};
use sqlx::SqlitePool;
use subtle::ConstantTimeEq;

use super::DbError;

/// A row of the `accounts` table, spec.md §3's Account Row tuple.
#[derive(Debug, Clone)]
pub struct AccountRow {
    pub id: i64,
    pub name: String,
    pub password: String,
    pub encrypt: String,
    pub created: i64,
    pub cserver: String,
    pub csid: i64,
    pub updated: i64,
    pub userver: String,
    pub usid: i64,
}

/// [`AccountRow`] without the `password` column, attached to a logged-in
/// user (spec.md §4.6: "attach a sanitized row (without password)").
#[derive(Debug, Clone)]
pub struct SanitizedAccount {
    pub id: i64,
    pub name: String,
    pub created: i64,
    pub updated: i64,
}

impl From<&AccountRow> for SanitizedAccount {
    fn from(row: &AccountRow) -> Self {
        Self { id: row.id, name: row.name.clone(), created: row.created, updated: row.updated }
    }
}

/// Encodes `password` under `algorithm`. Unrecognized algorithm tags fall
/// back to `sha1` (the only scheme this core implements) with a logged
/// warning, rather than failing registration outright.
fn encode_password(algorithm: &str, password: &str) -> String {
    match algorithm {
        "sha1" => hex::encode(Sha1::digest(password.as_bytes())),
        other => {
            tracing::warn!(algorithm = other, "unknown password algorithm, falling back to sha1");
            hex::encode(Sha1::digest(password.as_bytes()))
        }
    }
}

/// Constant-time-equivalent comparison of two encoded digests, per spec.md
/// §4.6 ("compare constant-time-equivalent to the stored encoding").
fn digests_equal(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// A fixed, never-matching digest used to give [`AccountRepository::verify`]
/// the same timing profile whether or not the account exists, avoiding an
/// account-existence oracle on login attempts.
const DUMMY_HASH: &str = "0000000000000000000000000000000000000000";

/// Distinguishes "no such account" from "account exists, wrong password"
/// (spec.md §4.6: the two cases get different notices/errors), while still
/// letting [`AccountRepository::verify`] run the same comparison work in
/// both failure cases to avoid an account-existence timing oracle.
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    Valid(AccountRow),
    AccountMissing,
    PasswordMismatch,
}

pub struct AccountRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AccountRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// `register_account(name, password, server, algorithm)` (spec.md §4.6):
    /// fails on a case-insensitive name collision; assigns `id = max(id)+1`.
    pub async fn register(&self, name: &str, password: &str, server: &str, sid: i64, algorithm: &str) -> Result<AccountRow, DbError> {
        if self.find_by_name(name).await?.is_some() {
            return Err(DbError::AccountExists(name.to_string()));
        }

        let encoded = encode_password(algorithm, password);
        let now = chrono::Utc::now().timestamp();

        let next_id: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM accounts")
            .fetch_one(self.pool)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, password, encrypt, created, cserver, csid, updated, userver, usid)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(next_id)
        .bind(name)
        .bind(&encoded)
        .bind(algorithm)
        .bind(now)
        .bind(server)
        .bind(sid)
        .bind(now)
        .bind(server)
        .bind(sid)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_unique_violation() {
                    return DbError::AccountExists(name.to_string());
                }
            }
            DbError::from(e)
        })?;

        self.find_by_name(name).await?.ok_or_else(|| DbError::AccountNotFound(name.to_string()))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<AccountRow>, DbError> {
        let row = sqlx::query_as::<_, AccountRowSql>(
            "SELECT id, name, password, encrypt, created, cserver, csid, updated, userver, usid \
             FROM accounts WHERE name = ? COLLATE NOCASE",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// Verifies `password` against the stored row's algorithm, running the
    /// comparison even when the account is absent (against [`DUMMY_HASH`])
    /// so lookup failure and password mismatch take the same time, while
    /// still reporting which case occurred via [`VerifyOutcome`].
    pub async fn verify(&self, name: &str, password: &str) -> Result<VerifyOutcome, DbError> {
        let row = self.find_by_name(name).await?;
        match row {
            Some(account) => {
                let encoded = encode_password(&account.encrypt, password);
                if digests_equal(&encoded, &account.password) {
                    Ok(VerifyOutcome::Valid(account))
                } else {
                    Ok(VerifyOutcome::PasswordMismatch)
                }
            }
            None => {
                let encoded = encode_password("sha1", password);
                let _ = digests_equal(&encoded, DUMMY_HASH);
                Ok(VerifyOutcome::AccountMissing)
            }
        }
    }

    pub async fn touch_updated(&self, name: &str, server: &str, sid: i64) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE accounts SET updated = ?, userver = ?, usid = ? WHERE name = ? COLLATE NOCASE")
            .bind(now)
            .bind(server)
            .bind(sid)
            .bind(name)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct AccountRowSql {
    id: i64,
    name: String,
    password: String,
    encrypt: String,
    created: i64,
    cserver: String,
    csid: i64,
    updated: i64,
    userver: String,
    usid: i64,
}

impl From<AccountRowSql> for AccountRow {
    fn from(r: AccountRowSql) -> Self {
        Self {
            id: r.id,
            name: r.name,
            password: r.password,
            encrypt: r.encrypt,
            created: r.created,
            cserver: r.cserver,
            csid: r.csid,
            updated: r.updated,
            userver: r.userver,
            usid: r.usid,
        }
    }
}
