//! The channel entity (spec.md §3, §4.2).

pub mod ops;

use std::collections::HashMap;

use crate::event::EventBus;
use crate::mode::table::ModeTable;
use crate::mode::taxonomy::{ModeType, NOT_A_MEMBER_LEVEL, PREFIX_LADDER};
use crate::pool::Uid;

/// One entry in a list-type mode (bans/excepts) or a status-mode's member
/// list (where `value` is the member's UID).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListElement {
    pub value: String,
    pub set_by: String,
    pub set_at: i64,
}

/// Channel topic with metadata (spec.md §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub text: String,
    pub set_by: String,
    pub set_at: i64,
}

/// One mode's recorded state, shaped per its [`ModeType`] (spec.md §3).
#[derive(Debug, Clone)]
pub enum ModeRecord {
    Simple { time: i64 },
    Parametric { time: i64, parameter: String },
    Listed { time: i64, list: Vec<ListElement> },
}

/// Fired from [`Channel::destroy_maybe`]; any listener returning `false`
/// vetoes destruction (spec.md §4.2).
pub struct CanDestroy {
    pub channel: String,
}

/// Per-list entry cap (spec.md §3 "Added" list); every production ircd
/// bounds ban/except lists to stop them growing without limit.
pub const MAX_LIST_ENTRIES: usize = 100;

/// The in-memory representation of a channel (spec.md §3).
#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    /// Creation/TS timestamp; a monotonic lower bound except through
    /// explicit TS reconciliation (spec.md §3 invariant).
    pub time: i64,
    /// Ordered set of member UIDs.
    users: Vec<Uid>,
    modes: HashMap<String, ModeRecord>,
    topic: Option<Topic>,
}

impl Channel {
    pub fn new(name: impl Into<String>, time: i64) -> Self {
        Self {
            name: name.into(),
            time,
            users: Vec::new(),
            modes: HashMap::new(),
            topic: None,
        }
    }

    // -- simple/parametric modes -------------------------------------------------

    pub fn is_mode(&self, name: &str) -> bool {
        self.modes.contains_key(name)
    }

    pub fn mode_parameter(&self, name: &str) -> Option<&str> {
        match self.modes.get(name) {
            Some(ModeRecord::Parametric { parameter, .. }) => Some(parameter),
            _ => None,
        }
    }

    pub fn set_mode(&mut self, name: &str, parameter: Option<&str>, now: i64) {
        let record = match parameter {
            Some(p) => ModeRecord::Parametric { time: now, parameter: p.to_string() },
            None => ModeRecord::Simple { time: now },
        };
        self.modes.insert(name.to_string(), record);
    }

    pub fn unset_mode(&mut self, name: &str) {
        self.modes.remove(name);
    }

    // -- list / status modes ------------------------------------------------

    pub fn list_has(&self, name: &str, value: &str) -> bool {
        self.list_elements(name).iter().any(|e| e.value.eq_ignore_ascii_case(value))
    }

    pub fn list_elements(&self, name: &str) -> &[ListElement] {
        match self.modes.get(name) {
            Some(ModeRecord::Listed { list, .. }) => list,
            _ => &[],
        }
    }

    pub fn list_len(&self, name: &str) -> usize {
        self.list_elements(name).len()
    }

    pub fn list_matches(&self, name: &str, hostmask: &str, account_name: Option<&str>) -> bool {
        self.list_elements(name)
            .iter()
            .any(|e| crate::matcher::list_entry_matches(&e.value, hostmask, account_name))
    }

    /// Returns `false` (and leaves the list untouched) on a duplicate value
    /// (spec.md §3 invariant: no duplicates within a single list) or once
    /// the list already holds [`MAX_LIST_ENTRIES`].
    pub fn add_to_list(&mut self, name: &str, value: &str, set_by: &str, now: i64) -> bool {
        let entry = self
            .modes
            .entry(name.to_string())
            .or_insert_with(|| ModeRecord::Listed { time: now, list: Vec::new() });
        let ModeRecord::Listed { list, .. } = entry else {
            return false; // mode name collides with a non-list record; caller error
        };
        if list.iter().any(|e| e.value.eq_ignore_ascii_case(value)) {
            return false;
        }
        if list.len() >= MAX_LIST_ENTRIES {
            return false;
        }
        list.push(ListElement { value: value.to_string(), set_by: set_by.to_string(), set_at: now });
        true
    }

    pub fn remove_from_list(&mut self, name: &str, value: &str) -> bool {
        if let Some(ModeRecord::Listed { list, .. }) = self.modes.get_mut(name) {
            let before = list.len();
            list.retain(|e| !e.value.eq_ignore_ascii_case(value));
            return list.len() != before;
        }
        false
    }

    // -- membership -----------------------------------------------------------

    pub fn has_user(&self, uid: &str) -> bool {
        self.users.iter().any(|u| u == uid)
    }

    pub fn users(&self) -> &[Uid] {
        &self.users
    }

    pub fn add(&mut self, uid: &str) {
        if !self.has_user(uid) {
            self.users.push(uid.to_string());
        }
    }

    /// Removes `uid` from membership and purges it from every status-mode
    /// list first (spec.md §4.2 invariant). Returns the status mode names
    /// the user was purged from, in ladder order.
    pub fn remove(&mut self, uid: &str) -> Vec<&'static str> {
        let mut purged = Vec::new();
        for level in PREFIX_LADDER {
            if self.remove_from_list(level.name, uid) {
                purged.push(level.name);
            }
        }
        self.users.retain(|u| u != uid);
        purged
    }

    pub fn set_time(&mut self, t: i64) {
        self.time = t;
    }

    // -- status queries ---------------------------------------------------------

    pub fn user_is(&self, uid: &str, status: &str) -> bool {
        self.list_has(status, uid)
    }

    pub fn user_has_basic_status(&self, uid: &str) -> bool {
        self.user_get_highest_level(uid) >= crate::mode::taxonomy::HALFOP_LEVEL
    }

    /// `-inf` iff `uid` is not a member (spec.md §8 invariant).
    pub fn user_get_highest_level(&self, uid: &str) -> i32 {
        if !self.has_user(uid) {
            return NOT_A_MEMBER_LEVEL;
        }
        PREFIX_LADDER
            .iter()
            .filter(|level| self.user_is(uid, level.name))
            .map(|level| level.level)
            .max()
            .unwrap_or(0)
    }

    pub fn user_get_levels(&self, uid: &str) -> Vec<&'static str> {
        PREFIX_LADDER.iter().filter(|level| self.user_is(uid, level.name)).map(|l| l.name).collect()
    }

    // -- topic --------------------------------------------------------------

    pub fn topic(&self) -> Option<&Topic> {
        self.topic.as_ref()
    }

    pub fn set_topic(&mut self, topic: Option<Topic>) {
        self.topic = topic;
    }

    /// Fires `can_destroy`; if unvetoed, the caller should detach the
    /// channel from the pool. Only meaningful when `users` is empty.
    pub fn destroy_maybe(&self, events: &EventBus) -> bool {
        if !self.users.is_empty() {
            return false;
        }
        let mut ev = CanDestroy { channel: self.name.clone() };
        events.fire(&mut ev)
    }

    // -- serialization (spec.md §4.4) ----------------------------------------

    /// `+` plus the concatenation of letters for modes of type 0/1/2 (and 5
    /// when `show_key`), followed by their parameters in order.
    pub fn mode_string(&self, table: &ModeTable, show_key: bool) -> String {
        let mut letters = String::from("+");
        let mut params = Vec::new();
        let mut names: Vec<&String> = self.modes.keys().collect();
        names.sort();
        for name in names {
            if !table.is_summary_mode(name, show_key) {
                continue;
            }
            if let Some(letter) = table.cmode_letter(name) {
                letters.push(letter);
            }
            if let Some(param) = self.mode_parameter(name) {
                params.push(param.to_string());
            }
        }
        if params.is_empty() {
            letters
        } else {
            format!("{} {}", letters, params.join(" "))
        }
    }

    /// Returns (user-view, server-view). Types 0/1/2 contribute one letter;
    /// 1/2/5 append the parameter to both; type 3 appends one letter per
    /// element with the value in both views; type 4 appends one letter per
    /// listed user with nickname in the user view and UID in the server
    /// view (spec.md §4.4).
    pub fn mode_string_all(
        &self,
        table: &ModeTable,
        no_status: bool,
        nick_of: impl Fn(&str) -> String,
    ) -> (String, String) {
        let mut user_letters = String::from("+");
        let mut server_letters = String::from("+");
        let mut user_params = Vec::new();
        let mut server_params = Vec::new();

        let mut names: Vec<&String> = self.modes.keys().collect();
        names.sort();
        for name in names {
            let Some(kind) = table.cmode_type(name) else { continue };
            let Some(letter) = table.cmode_letter(name) else { continue };
            match kind {
                ModeType::Normal => {
                    user_letters.push(letter);
                    server_letters.push(letter);
                }
                ModeType::Parameter | ModeType::ParameterSet | ModeType::Key => {
                    user_letters.push(letter);
                    server_letters.push(letter);
                    if let Some(param) = self.mode_parameter(name) {
                        user_params.push(param.to_string());
                        server_params.push(param.to_string());
                    }
                }
                ModeType::List => {
                    for elem in self.list_elements(name) {
                        user_letters.push(letter);
                        server_letters.push(letter);
                        user_params.push(elem.value.clone());
                        server_params.push(elem.value.clone());
                    }
                }
                ModeType::Status => {
                    if no_status {
                        continue;
                    }
                    for elem in self.list_elements(name) {
                        user_letters.push(letter);
                        server_letters.push(letter);
                        user_params.push(nick_of(&elem.value));
                        server_params.push(elem.value.clone());
                    }
                }
            }
        }

        let user = if user_params.is_empty() {
            user_letters
        } else {
            format!("{} {}", user_letters, user_params.join(" "))
        };
        let server = if server_params.is_empty() {
            server_letters
        } else {
            format!("{} {}", server_letters, server_params.join(" "))
        };
        (user, server)
    }

    /// Same shape as [`Channel::mode_string_all`] restricted to type 4.
    pub fn mode_string_status(&self, table: &ModeTable, nick_of: impl Fn(&str) -> String) -> (String, String) {
        let mut user_letters = String::from("+");
        let mut server_letters = String::from("+");
        let mut user_params = Vec::new();
        let mut server_params = Vec::new();
        for level in PREFIX_LADDER {
            let Some(letter) = table.cmode_letter(level.name) else { continue };
            for elem in self.list_elements(level.name) {
                user_letters.push(letter);
                server_letters.push(letter);
                user_params.push(nick_of(&elem.value));
                server_params.push(elem.value.clone());
            }
        }
        let user = if user_params.is_empty() {
            user_letters
        } else {
            format!("{} {}", user_letters, user_params.join(" "))
        };
        let server = if server_params.is_empty() {
            server_letters
        } else {
            format!("{} {}", server_letters, server_params.join(" "))
        };
        (user, server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ModeTable {
        ModeTable::default()
    }

    #[test]
    fn add_and_remove_membership() {
        let mut c = Channel::new("#a", 1000);
        c.add("uid1");
        c.add("uid1"); // idempotent
        assert_eq!(c.users(), &["uid1".to_string()]);
        assert!(c.has_user("uid1"));

        let purged = c.remove("uid1");
        assert!(purged.is_empty());
        assert!(!c.has_user("uid1"));
    }

    #[test]
    fn remove_purges_every_status_list() {
        let mut c = Channel::new("#a", 1000);
        c.add("uid1");
        c.add_to_list("op", "uid1", "uid1", 1000);
        c.add_to_list("voice", "uid1", "uid1", 1000);
        assert!(c.user_is("uid1", "op"));
        assert!(c.user_is("uid1", "voice"));

        let mut purged = c.remove("uid1");
        purged.sort_unstable();
        assert_eq!(purged, vec!["op", "voice"]);
        assert!(!c.list_has("op", "uid1"));
        assert!(!c.list_has("voice", "uid1"));
    }

    #[test]
    fn list_rejects_duplicates() {
        let mut c = Channel::new("#a", 1000);
        assert!(c.add_to_list("ban", "*!*@bad.host", "op", 1000));
        assert!(!c.add_to_list("ban", "*!*@bad.host", "op", 1001), "duplicate must be rejected");
        assert_eq!(c.list_elements("ban").len(), 1);
    }

    #[test]
    fn list_rejects_once_full() {
        let mut c = Channel::new("#a", 1000);
        for i in 0..MAX_LIST_ENTRIES {
            assert!(c.add_to_list("ban", &format!("*!*@host{i}"), "op", 1000));
        }
        assert_eq!(c.list_len("ban"), MAX_LIST_ENTRIES);
        assert!(!c.add_to_list("ban", "*!*@onemore", "op", 1000), "list is at capacity");
        assert_eq!(c.list_len("ban"), MAX_LIST_ENTRIES);
    }

    #[test]
    fn highest_level_is_neg_inf_when_not_a_member() {
        let c = Channel::new("#a", 1000);
        assert_eq!(c.user_get_highest_level("ghost"), NOT_A_MEMBER_LEVEL);
    }

    #[test]
    fn highest_level_tracks_status() {
        let mut c = Channel::new("#a", 1000);
        c.add("uid1");
        assert_eq!(c.user_get_highest_level("uid1"), 0);
        c.add_to_list("voice", "uid1", "op", 1000);
        assert_eq!(c.user_get_highest_level("uid1"), 0); // voice is level 0
        c.add_to_list("op", "uid1", "op", 1000);
        assert_eq!(c.user_get_highest_level("uid1"), 20);
        assert!(c.user_has_basic_status("uid1"));
    }

    #[test]
    fn mode_string_lists_simple_and_parametric_modes_only() {
        let mut c = Channel::new("#a", 1000);
        c.set_mode("moderated", None, 1000);
        c.set_mode("limit", Some("10"), 1000);
        c.set_mode("key", Some("hunter2"), 1000);
        c.add_to_list("ban", "*!*@x", "op", 1000);

        let table = table();
        let visible = c.mode_string(&table, false);
        assert_eq!(visible, "+lm 10");
        let with_key = c.mode_string(&table, true);
        assert_eq!(with_key, "+klm hunter2 10");
    }

    #[test]
    fn mode_string_all_splits_status_into_nick_and_uid() {
        let mut c = Channel::new("#a", 1000);
        c.add("uid1");
        c.add_to_list("op", "uid1", "op-setter", 1000);
        let table = table();
        let (user, server) = c.mode_string_all(&table, false, |uid| format!("nick-{uid}"));
        assert_eq!(user, "+o nick-uid1");
        assert_eq!(server, "+o uid1");
    }

    #[test]
    fn destroy_maybe_respects_veto() {
        let c = Channel::new("#a", 1000);
        let mut bus = EventBus::new();
        assert!(c.destroy_maybe(&bus), "empty channel with no listener destroys");

        bus.on::<CanDestroy>(|_| false);
        assert!(!c.destroy_maybe(&bus), "listener veto prevents destruction");
    }

    #[test]
    fn destroy_maybe_false_when_not_empty() {
        let mut c = Channel::new("#a", 1000);
        c.add("uid1");
        let bus = EventBus::new();
        assert!(!c.destroy_maybe(&bus));
    }
}
