//! External collaborator boundary: the `User`/`Server` contract the core
//! consumes (spec.md §3), modeled as traits rather than inheritance/duck
//! typing (spec.md §9 design notes: `source.isa('user' | 'server')` becomes
//! a sum type).
//!
//! These traits are intentionally synchronous: spec.md §5 requires every
//! mode handler, channel operation, and SASL transition to be a
//! straight-line atomic with no suspension between entry and exit, so
//! `send`/`numeric`/etc. must be non-blocking enqueue operations (typically
//! backed by a bounded `mpsc` sender on the concrete implementation), never
//! awaited mid-pipeline.

use std::sync::Arc;

use crate::mode::table::ModeTable;

/// Stable user id, opaque to the core (UID in TS6 terms).
pub type Uid = String;

/// `source.isa('user' | 'server')` as a sum type (spec.md §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    User(Uid),
    Server(String),
}

impl Source {
    pub fn is_server(&self) -> bool {
        matches!(self, Source::Server(_))
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Source::User(_))
    }

    pub fn as_user_uid(&self) -> Option<&str> {
        match self {
            Source::User(uid) => Some(uid),
            Source::Server(_) => None,
        }
    }
}

/// The contract the core needs from a connected/known user (spec.md §3).
pub trait User: Send + Sync {
    fn uid(&self) -> &str;
    fn nick(&self) -> &str;
    fn server_name(&self) -> &str;
    fn is_local(&self) -> bool;
    fn is_mode(&self, name: &str) -> bool;
    fn has_cap(&self, name: &str) -> bool;
    fn account_name(&self) -> Option<&str>;
    fn away_message(&self) -> Option<&str>;
    /// `nick!user@host`, for list-matcher evaluation.
    fn hostmask(&self) -> String;
    fn real_name(&self) -> &str;
    fn see_invisible(&self) -> bool;

    /// Render and enqueue a numeric reply by symbolic name (spec.md §1: the
    /// numeric-reply table is an external collaborator).
    fn numeric(&self, name: &str, args: &[&str]);
    /// Enqueue a raw line from the server.
    fn send(&self, line: &str);
    /// Enqueue a raw line attributed to `source`.
    fn sendfrom(&self, source: &Source, line: &str);
    /// Enqueue an operator/server notice.
    fn server_notice(&self, tag: &str, text: &str);
    /// Apply a user mode change (used by the account component to flip the
    /// monotone `registered` flag, spec.md §4.6).
    fn set_mode(&self, name: &str, on: bool);
}

/// The contract the core needs from a server object (spec.md §3).
pub trait Server: Send + Sync {
    fn name(&self) -> &str;
    fn sid(&self) -> &str;
    fn mode_table(&self) -> &ModeTable;
}

/// Resolves users by UID or by nickname; passed explicitly into mode
/// handlers and channel operations rather than threaded through a global,
/// mirroring spec.md §4.3's `pool.lookup_user`/`pool.lookup_user_nick`.
pub trait UserLookup: Send + Sync {
    fn lookup_user(&self, uid_or_nick: &str, by_uid: bool) -> Option<Arc<dyn User>>;

    fn lookup_user_uid(&self, uid: &str) -> Option<Arc<dyn User>> {
        self.lookup_user(uid, true)
    }

    fn lookup_user_nick(&self, nick: &str) -> Option<Arc<dyn User>> {
        self.lookup_user(nick, false)
    }
}
