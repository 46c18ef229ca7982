//! Unified error hierarchy for the core.
//!
//! Grounded on `src/error.rs` in the teacher (`HandlerError`/`ChannelError`
//! split with `error_code()` for structured-log labeling), generalized to
//! the subsystems this crate owns.

use thiserror::Error;

/// Errors from the mode-application pipeline (spec.md §4.3, §7).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("unknown mode char {0:?}")]
    UnknownMode(char),

    #[error("mode {0:?} requires a parameter")]
    MissingParameter(char),

    #[error("you're not channel operator")]
    ChanOpPrivsNeeded,

    #[error("no such nick: {0}")]
    NoSuchNick(String),

    #[error("{0} is not on that channel")]
    UserNotInChannel(String),

    #[error("channel list is full")]
    ListFull,

    #[error("duplicate entry in list mode")]
    DuplicateListEntry,
}

impl ModeError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownMode(_) => "unknown_mode",
            Self::MissingParameter(_) => "missing_parameter",
            Self::ChanOpPrivsNeeded => "chanop_privs_needed",
            Self::NoSuchNick(_) => "no_such_nick",
            Self::UserNotInChannel(_) => "user_not_in_channel",
            Self::ListFull => "list_full",
            Self::DuplicateListEntry => "duplicate_list_entry",
        }
    }
}

/// Errors from channel operations (join/part/kick/etc, spec.md §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("not on channel")]
    NotOnChannel,

    #[error("no such channel")]
    NoSuchChannel,

    #[error("user {0} is already on that channel")]
    UserOnChannel(String),

    #[error("channel time cannot increase via reconciliation")]
    TimeNotLower,
}

impl ChannelError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotOnChannel => "not_on_channel",
            Self::NoSuchChannel => "no_such_channel",
            Self::UserOnChannel(_) => "user_on_channel",
            Self::TimeNotLower => "time_not_lower",
        }
    }
}

/// Errors from server-linkage attempts (spec.md §4.5, §7).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("already linked to {0}")]
    AlreadyLinked(String),

    #[error("already trying to connect")]
    AlreadyConnecting,

    #[error("no connect block configured for {0}")]
    NoConnectBlock(String),

    #[error("autoconnect not configured for {0}")]
    AutoconnectNotConfigured(String),

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("connection canceled")]
    Canceled,
}

impl LinkError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyLinked(_) => "already_linked",
            Self::AlreadyConnecting => "already_connecting",
            Self::NoConnectBlock(_) => "no_connect_block",
            Self::AutoconnectNotConfigured(_) => "autoconnect_not_configured",
            Self::ConnectFailed(_) => "connect_failed",
            Self::Canceled => "canceled",
        }
    }
}

/// Errors from the account pipeline (spec.md §4.6).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("account {0} already exists")]
    NameTaken(String),

    #[error("no such account")]
    NotFound,

    #[error("password incorrect")]
    PasswordIncorrect,

    #[error("not logged in")]
    NotLoggedIn,

    #[error("already logged in")]
    AlreadyLoggedIn,

    #[error("database error: {0}")]
    Database(String),
}

impl AccountError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NameTaken(_) => "name_taken",
            Self::NotFound => "not_found",
            Self::PasswordIncorrect => "password_incorrect",
            Self::NotLoggedIn => "not_logged_in",
            Self::AlreadyLoggedIn => "already_logged_in",
            Self::Database(_) => "database_error",
        }
    }
}

/// Errors from the SASL proxy state machine (spec.md §4.6, §6, §7).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaslError {
    #[error("server mask does not match local server")]
    MaskMismatch,

    #[error("agent/server mismatch")]
    AgentMismatch,

    #[error("unknown target connection")]
    UnknownTarget,

    #[error("unknown SASL mode {0:?}")]
    UnknownMode(char),
}

impl SaslError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MaskMismatch => "mask_mismatch",
            Self::AgentMismatch => "agent_mismatch",
            Self::UnknownTarget => "unknown_target",
            Self::UnknownMode(_) => "unknown_mode",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ModeError::ChanOpPrivsNeeded.error_code(), "chanop_privs_needed");
        assert_eq!(ChannelError::NotOnChannel.error_code(), "not_on_channel");
        assert_eq!(LinkError::AlreadyConnecting.error_code(), "already_connecting");
        assert_eq!(AccountError::NotFound.error_code(), "not_found");
        assert_eq!(SaslError::MaskMismatch.error_code(), "mask_mismatch");
    }
}
