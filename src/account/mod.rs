//! Account registration/login/logout (spec.md §4.6) and the `$r` account
//! matcher wiring.
//!
//! Grounded on the teacher's `DashMap`-backed concurrent pools (e.g.
//! `sync::manager::SyncManager`'s `DashMap<ServerId, LinkState>`): accounts
//! attached to connected users live in an `AccountPool` keyed by UID rather
//! than as a field on the `User` trait object, since the trait is an
//! external collaborator boundary this crate does not own the shape of.

use dashmap::DashMap;
use tracing::instrument;

use crate::db::{AccountRepository, DbError, SanitizedAccount, VerifyOutcome};
use crate::error::AccountError;
use crate::event::EventBus;
use crate::pool::{Uid, User};

/// Fired once an account row is inserted (spec.md §4.6: "emit
/// `account_register` notice when a user context is given").
pub struct AccountRegistered {
    pub name: String,
    pub user: Option<Uid>,
}

/// Fired on a successful [`login_account`], distinct from the
/// `account_login` oper notice (spec.md §4.6: "fire `logged_in`").
pub struct LoggedIn {
    pub uid: Uid,
    pub name: String,
}

pub struct AccountLoggedOut {
    pub uid: Uid,
    pub name: String,
}

/// Accounts attached to currently-connected users, keyed by UID.
#[derive(Default)]
pub struct AccountPool {
    attached: DashMap<Uid, SanitizedAccount>,
}

impl AccountPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account_of(&self, uid: &str) -> Option<SanitizedAccount> {
        self.attached.get(uid).map(|e| e.clone())
    }

    pub fn is_logged_in(&self, uid: &str) -> bool {
        self.attached.contains_key(uid)
    }

    fn attach(&self, uid: &str, account: SanitizedAccount) {
        self.attached.insert(uid.to_string(), account);
    }

    fn detach(&self, uid: &str) -> Option<SanitizedAccount> {
        self.attached.remove(uid).map(|(_, v)| v)
    }

    /// `account_burst` (spec.md §9 open question): no wire format for
    /// bursting the account table to a newly-linked peer is given, so this
    /// stays an explicit no-op rather than an invented frame.
    pub fn send_burst(&self, _target_server: &str) {}
}

/// `register_account(name, password, server, user?)` (spec.md §4.6).
#[instrument(skip(repo, events, user), fields(account = name))]
pub async fn register_account(
    repo: &AccountRepository<'_>,
    name: &str,
    password: &str,
    server: &str,
    sid: i64,
    algorithm: &str,
    user: Option<&dyn User>,
    events: &EventBus,
) -> Result<(), AccountError> {
    match repo.register(name, password, server, sid, algorithm).await {
        Ok(_) => {
            let mut ev = AccountRegistered { name: name.to_string(), user: user.map(|u| u.uid().to_string()) };
            events.fire(&mut ev);
            if let Some(u) = user {
                u.server_notice("account_register", &format!("Account {name} registered"));
            }
            Ok(())
        }
        Err(DbError::AccountExists(name)) => Err(AccountError::NameTaken(name)),
        Err(e) => Err(AccountError::Database(e.to_string())),
    }
}

/// `login_account(name, user, password?, just_registered)` (spec.md §4.6).
#[instrument(skip(repo, pool, events, user, password), fields(account = name, uid = user.uid()))]
pub async fn login_account(
    repo: &AccountRepository<'_>,
    pool: &AccountPool,
    name: &str,
    user: &dyn User,
    password: Option<&str>,
    just_registered: bool,
    events: &EventBus,
) -> Result<(), AccountError> {
    if pool.is_logged_in(user.uid()) {
        return Err(AccountError::AlreadyLoggedIn);
    }

    let row = match password {
        Some(pw) => match repo.verify(name, pw).await.map_err(|e| AccountError::Database(e.to_string()))? {
            VerifyOutcome::Valid(row) => Some(row),
            VerifyOutcome::PasswordMismatch => {
                if user.is_local() {
                    user.server_notice("account_login", "Password incorrect");
                }
                return Err(AccountError::PasswordIncorrect);
            }
            VerifyOutcome::AccountMissing => None,
        },
        None => repo.find_by_name(name).await.map_err(|e| AccountError::Database(e.to_string()))?,
    };

    let Some(row) = row else {
        if user.is_local() {
            user.server_notice("account_login", "No such account");
        }
        return Err(AccountError::NotFound);
    };

    let sanitized = SanitizedAccount::from(&row);
    pool.attach(user.uid(), sanitized);
    user.set_mode("registered", true);

    if user.is_local() {
        user.numeric("RPL_LOGGEDIN", &[user.nick(), &row.name]);
    }

    let mut ev = LoggedIn { uid: user.uid().to_string(), name: row.name.clone() };
    events.fire(&mut ev);

    if !just_registered {
        user.server_notice("account_login", &format!("{} logged in as {}", user.nick(), row.name));
    }

    Ok(())
}

/// `logout_account(user, in_mode_unset)` (spec.md §4.6). The monotone
/// `registered` user-mode routes its own unset path here with
/// `in_mode_unset=true` to avoid re-entrant mode mutation.
#[instrument(skip(pool, events, user), fields(uid = user.uid()))]
pub fn logout_account(pool: &AccountPool, user: &dyn User, in_mode_unset: bool, events: &EventBus) {
    let Some(account) = pool.detach(user.uid()) else { return };

    if !in_mode_unset {
        user.set_mode("registered", false);
    }

    if user.is_local() {
        user.numeric("RPL_LOGGEDOUT", &[user.nick(), &account.name]);
    }

    let mut ev = AccountLoggedOut { uid: user.uid().to_string(), name: account.name.clone() };
    events.fire(&mut ev);
    user.server_notice("account_logout", &format!("{} logged out of {}", user.nick(), account.name));
}
