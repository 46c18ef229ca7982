//! Channel operations: join, part, kick, NAMES, message fan-out, and TS
//! reconciliation (spec.md §4.4).

use tracing::instrument;

use crate::channel::{Channel, Topic};
use crate::event::EventBus;
use crate::mode::engine::ModeChange;
use crate::pool::{Server, Source, User, UserLookup};

const NAMES_LINE_BUDGET: usize = 500;

/// Fired before a local join is allowed to proceed; any listener returning
/// `false` vetoes (spec.md §4.4 `attempt_local_join`).
pub struct CanJoin<'a> {
    pub channel: &'a str,
    pub uid: &'a str,
}

/// Fired when [`CanJoin`] was vetoed.
pub struct JoinFailed<'a> {
    pub channel: &'a str,
    pub uid: &'a str,
}

/// Fired after a join completes (spec.md §4.4).
pub struct UserJoined<'a> {
    pub channel: &'a str,
    pub uid: &'a str,
    pub new_channel: bool,
}

/// Fired per-member during NAMES; `false` hides that member from the
/// querier (spec.md §4.4).
pub struct ShowInNames<'a> {
    pub channel: &'a str,
    pub member: &'a str,
}

/// Fired before fanning out a PRIVMSG/NOTICE; `false` drops the message
/// (spec.md §4.4).
pub struct CanMessage<'a> {
    pub channel: &'a str,
    pub source: &'a Source,
    pub command: &'a str,
}

/// `do_join(user, allow_already)` (spec.md §4.4).
#[instrument(skip(channel, user, lookup), fields(channel = %channel.name, uid = user.uid()))]
pub fn do_join(channel: &mut Channel, user: &dyn User, allow_already: bool, lookup: &dyn UserLookup, events: &EventBus) {
    if channel.has_user(user.uid()) && !allow_already {
        return;
    }
    channel.add(user.uid());

    for member_uid in channel.users() {
        let Some(member) = lookup.lookup_user_uid(member_uid) else { continue };
        if !member.is_local() {
            continue;
        }
        let source = Source::User(user.uid().to_string());
        if member.has_cap("extended-join") {
            member.sendfrom(&source, &format!("JOIN {} {} :{}", channel.name, user.account_name().unwrap_or("*"), user.real_name()));
        } else {
            member.sendfrom(&source, &format!("JOIN {}", channel.name));
        }

        if member_uid != user.uid() {
            if let Some(away) = user.away_message() {
                if member.has_cap("away-notify") {
                    member.sendfrom(&source, &format!("AWAY :{away}"));
                }
            }
        }
    }

    if user.is_local() {
        if let Some(topic) = channel.topic() {
            user.numeric("RPL_TOPIC", &[&channel.name, &topic.text]);
        }
        names(channel, user, false, lookup, events);
    }

    let mut ev = UserJoined { channel: &channel.name, uid: user.uid(), new_channel: false };
    events.fire(&mut ev);
}

/// `attempt_local_join` (spec.md §4.4): local users only.
#[instrument(skip(channel, server, user, lookup, events), fields(channel = %channel.name, uid = user.uid()))]
pub fn attempt_local_join(
    channel: &mut Channel,
    server: &dyn Server,
    user: &dyn User,
    new: bool,
    automodes: Option<&str>,
    lookup: &dyn UserLookup,
    events: &EventBus,
) -> bool {
    let mut can_join = CanJoin { channel: &channel.name, uid: user.uid() };
    if !events.fire(&mut can_join) {
        let mut failed = JoinFailed { channel: &channel.name, uid: user.uid() };
        events.fire(&mut failed);
        return false;
    }

    if new {
        channel.add(user.uid());
        if let Some(modes) = automodes {
            let resolved = modes.replace("+user", user.uid());
            let source = Source::Server(server.name().to_string());
            crate::mode::engine::handle_mode_string(channel, server, &source, &resolved, &[], true, false, events, lookup);
        }
        // channel_burst to peers is the caller's responsibility (s2s fan-out
        // lives outside this crate's scope).
    }

    do_join(channel, user, new, lookup, events);
    true
}

/// `do_part(user, reason, quiet)` (spec.md §4.4).
#[instrument(skip(channel, user, lookup), fields(channel = %channel.name, uid = user.uid()))]
pub fn do_part(channel: &mut Channel, user: &dyn User, reason: Option<&str>, quiet: bool, lookup: &dyn UserLookup) {
    let source = Source::User(user.uid().to_string());
    let line = match reason {
        Some(r) => format!("PART {} :{}", channel.name, r),
        None => format!("PART {}", channel.name),
    };
    for member_uid in channel.users() {
        if let Some(member) = lookup.lookup_user_uid(member_uid) {
            if member.is_local() {
                member.sendfrom(&source, &line);
            }
        }
    }
    channel.remove(user.uid());
    if !quiet {
        user.server_notice("part", &format!("{} parted {}", user.nick(), channel.name));
    }
}

/// `user_get_kicked(user, source, reason)` (spec.md §4.4).
#[instrument(skip(channel, user, source, lookup), fields(channel = %channel.name, uid = user.uid()))]
pub fn user_get_kicked(channel: &mut Channel, user: &dyn User, source: &Source, reason: Option<&str>, lookup: &dyn UserLookup) {
    let source_name = match source {
        Source::Server(name) => name.clone(),
        Source::User(uid) => lookup.lookup_user_uid(uid).map(|u| u.nick().to_string()).unwrap_or_else(|| uid.clone()),
    };
    let reason = reason.unwrap_or(&source_name);
    let line = format!("KICK {} {} :{}", channel.name, user.nick(), reason);

    for member_uid in channel.users() {
        if let Some(member) = lookup.lookup_user_uid(member_uid) {
            if member.is_local() {
                member.sendfrom(source, &line);
            }
        }
    }

    if source.is_user() {
        user.server_notice("kick", &format!("{} was kicked from {} by {}", user.nick(), channel.name, source_name));
    }

    channel.remove(user.uid());
}

/// `names(user, no_endof)` (spec.md §4.4).
#[instrument(skip(channel, querier, lookup, events), fields(channel = %channel.name))]
pub fn names(channel: &Channel, querier: &dyn User, no_endof: bool, lookup: &dyn UserLookup, events: &EventBus) {
    let prefixed_nick = |uid: &str| -> String {
        // Highest-status symbol, if any, prepended to the nick.
        let levels = channel.user_get_levels(uid);
        let symbol = crate::mode::taxonomy::PREFIX_LADDER
            .iter()
            .find(|l| levels.contains(&l.name))
            .map(|l| l.symbol);
        let nick = lookup.lookup_user_uid(uid).map(|u| u.nick().to_string()).unwrap_or_else(|| uid.to_string());
        match symbol {
            Some(s) => format!("{s}{nick}"),
            None => nick,
        }
    };

    let querier_on_channel = channel.has_user(querier.uid());
    let mut tokens = Vec::new();

    for member_uid in channel.users() {
        let mut observed = ShowInNames { channel: &channel.name, member: member_uid };
        if !events.fire(&mut observed) {
            continue;
        }
        if let Some(member) = lookup.lookup_user_uid(member_uid) {
            let invisible = member.is_mode("invisible");
            if invisible && !querier_on_channel && !querier.see_invisible() {
                continue;
            }
        }
        tokens.push(prefixed_nick(member_uid));
    }

    let mut line = String::new();
    let mut lines = Vec::new();
    for token in tokens {
        if !line.is_empty() && line.len() + 1 + token.len() > NAMES_LINE_BUDGET {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&token);
    }
    if !line.is_empty() {
        lines.push(line);
    }

    for bucket in lines {
        querier.numeric("RPL_NAMREPLY", &["=", &channel.name, &bucket]);
    }
    if !no_endof {
        querier.numeric("RPL_ENDOFNAMES", &[&channel.name]);
    }
}

/// `handle_privmsgnotice` (spec.md §4.4).
#[instrument(skip(channel, source_user, lookup, events), fields(channel = %channel.name, command))]
pub fn handle_privmsgnotice(
    channel: &Channel,
    source: &Source,
    source_user: Option<&dyn User>,
    command: &str,
    text: &str,
    lookup: &dyn UserLookup,
    events: &EventBus,
) {
    let mut can_message = CanMessage { channel: &channel.name, source, command };
    if !events.fire(&mut can_message) {
        return;
    }

    let source_uid = source.as_user_uid();
    let line = format!("{} {} :{}", command, channel.name, text);

    for member_uid in channel.users() {
        if Some(member_uid.as_str()) == source_uid {
            continue;
        }
        let Some(member) = lookup.lookup_user_uid(member_uid) else { continue };
        if !member.is_local() {
            continue;
        }
        if member.is_mode("deaf") {
            continue;
        }
        member.sendfrom(source, &line);
    }

    let _ = source_user; // reserved for a future `PRIVMSG`/`NOTICE` event payload
}

/// `take_lower_time(t, ignore_modes)` (spec.md §4.4). Returns the channel's
/// resulting timestamp.
#[instrument(skip(channel, server, lookup, events), fields(channel = %channel.name))]
pub fn take_lower_time(
    channel: &mut Channel,
    server: &dyn Server,
    new_time: i64,
    ignore_modes: bool,
    lookup: &dyn UserLookup,
    events: &EventBus,
) -> i64 {
    if new_time >= channel.time {
        return channel.time;
    }

    channel.set_time(new_time);

    if channel.topic().is_some() {
        channel.set_topic(None::<Topic>);
        for member_uid in channel.users() {
            if let Some(member) = lookup.lookup_user_uid(member_uid) {
                if member.is_local() {
                    member.send(&format!("TOPIC {} :", channel.name));
                }
            }
        }
    }

    if !ignore_modes {
        let table = server.mode_table();
        let current = channel.mode_string(table, true);
        let mut parts = current.split_whitespace();
        let letters = parts.next().unwrap_or("+");
        let params: Vec<String> = parts.map(|s| s.to_string()).collect();
        let inverted_letters = invert_sign(letters);
        let inverted_line = if params.is_empty() { inverted_letters.clone() } else { format!("{} {}", inverted_letters, params.join(" ")) };

        for member_uid in channel.users() {
            if let Some(member) = lookup.lookup_user_uid(member_uid) {
                if member.is_local() {
                    member.send(&format!("MODE {} {}", channel.name, inverted_line));
                }
            }
        }

        let source = Source::Server(server.name().to_string());
        let changes = crate::mode::serialize::cmodes_from_string(table, &inverted_letters, &params);
        let _: Vec<ModeChange> = crate::mode::engine::handle_modes(channel, server, &source, &changes, true, false, events, lookup);
    }

    for member_uid in channel.users() {
        if let Some(member) = lookup.lookup_user_uid(member_uid) {
            if member.is_local() {
                member.server_notice("channel_time", &format!("New channel time for {}: {}", channel.name, new_time));
            }
        }
    }

    new_time
}

fn invert_sign(mode_string: &str) -> String {
    mode_string.replacen('+', "-", 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::table::ModeTable;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct TestServer {
        table: ModeTable,
        name: String,
    }
    impl Server for TestServer {
        fn name(&self) -> &str {
            &self.name
        }
        fn sid(&self) -> &str {
            "1ST"
        }
        fn mode_table(&self) -> &ModeTable {
            &self.table
        }
    }

    struct TestUser {
        uid: String,
        nick: String,
        local: bool,
        sent: Mutex<Vec<String>>,
        numerics: Mutex<Vec<(String, Vec<String>)>>,
    }
    impl User for TestUser {
        fn uid(&self) -> &str {
            &self.uid
        }
        fn nick(&self) -> &str {
            &self.nick
        }
        fn server_name(&self) -> &str {
            "test.server"
        }
        fn is_local(&self) -> bool {
            self.local
        }
        fn is_mode(&self, _name: &str) -> bool {
            false
        }
        fn has_cap(&self, _name: &str) -> bool {
            false
        }
        fn account_name(&self) -> Option<&str> {
            None
        }
        fn away_message(&self) -> Option<&str> {
            None
        }
        fn hostmask(&self) -> String {
            format!("{}!u@h", self.nick)
        }
        fn real_name(&self) -> &str {
            "Real Name"
        }
        fn see_invisible(&self) -> bool {
            false
        }
        fn numeric(&self, name: &str, args: &[&str]) {
            self.numerics.lock().unwrap().push((name.to_string(), args.iter().map(|s| s.to_string()).collect()));
        }
        fn send(&self, line: &str) {
            self.sent.lock().unwrap().push(line.to_string());
        }
        fn sendfrom(&self, _source: &Source, line: &str) {
            self.sent.lock().unwrap().push(line.to_string());
        }
        fn server_notice(&self, _tag: &str, _text: &str) {}
        fn set_mode(&self, _name: &str, _on: bool) {}
    }

    struct TestLookup {
        users: HashMap<String, Arc<TestUser>>,
    }
    impl UserLookup for TestLookup {
        fn lookup_user(&self, uid_or_nick: &str, by_uid: bool) -> Option<Arc<dyn User>> {
            if by_uid {
                self.users.get(uid_or_nick).map(|u| u.clone() as Arc<dyn User>)
            } else {
                self.users.values().find(|u| u.nick == uid_or_nick).map(|u| u.clone() as Arc<dyn User>)
            }
        }
    }

    fn user(uid: &str, nick: &str) -> Arc<TestUser> {
        Arc::new(TestUser { uid: uid.to_string(), nick: nick.to_string(), local: true, sent: Mutex::new(Vec::new()), numerics: Mutex::new(Vec::new()) })
    }

    #[test]
    fn join_adds_member_and_sends_join_line() {
        let mut channel = Channel::new("#a", 1000);
        let alice = user("1UID", "alice");
        let mut users = HashMap::new();
        users.insert(alice.uid.clone(), alice.clone());
        let lookup = TestLookup { users };
        let events = EventBus::new();

        do_join(&mut channel, alice.as_ref(), false, &lookup, &events);

        assert!(channel.has_user("1UID"));
        assert!(alice.sent.lock().unwrap().iter().any(|l| l.starts_with("JOIN #a")));
    }

    #[test]
    fn join_without_allow_already_is_idempotent() {
        let mut channel = Channel::new("#a", 1000);
        let alice = user("1UID", "alice");
        let mut users = HashMap::new();
        users.insert(alice.uid.clone(), alice.clone());
        let lookup = TestLookup { users };
        let events = EventBus::new();

        do_join(&mut channel, alice.as_ref(), false, &lookup, &events);
        let before = channel.users().len();
        do_join(&mut channel, alice.as_ref(), false, &lookup, &events);
        assert_eq!(channel.users().len(), before);
    }

    #[test]
    fn attempt_local_join_vetoed_by_can_join_fires_join_failed() {
        let mut channel = Channel::new("#a", 1000);
        let server = TestServer { table: ModeTable::default(), name: "test.server".to_string() };
        let alice = user("1UID", "alice");
        let mut users = HashMap::new();
        users.insert(alice.uid.clone(), alice.clone());
        let lookup = TestLookup { users };

        let mut events = EventBus::new();
        events.on::<CanJoin>(|_| false);
        let failed = Arc::new(Mutex::new(false));
        let failed_clone = failed.clone();
        events.on::<JoinFailed>(move |_| {
            *failed_clone.lock().unwrap() = true;
            true
        });

        let joined = attempt_local_join(&mut channel, &server, alice.as_ref(), true, None, &lookup, &events);
        assert!(!joined);
        assert!(*failed.lock().unwrap());
        assert!(!channel.has_user("1UID"));
    }

    #[test]
    fn attempt_local_join_applies_automodes_on_new_channel() {
        let mut channel = Channel::new("#a", 1000);
        let server = TestServer { table: ModeTable::default(), name: "test.server".to_string() };
        let alice = user("1UID", "alice");
        let mut users = HashMap::new();
        users.insert(alice.uid.clone(), alice.clone());
        let lookup = TestLookup { users };
        let events = EventBus::new();

        let joined = attempt_local_join(&mut channel, &server, alice.as_ref(), true, Some("+nt"), &lookup, &events);
        assert!(joined);
        assert!(channel.is_mode("noexternal"));
        assert!(channel.is_mode("topiclock"));
    }

    #[test]
    fn part_removes_member() {
        let mut channel = Channel::new("#a", 1000);
        let alice = user("1UID", "alice");
        channel.add(&alice.uid);
        let mut users = HashMap::new();
        users.insert(alice.uid.clone(), alice.clone());
        let lookup = TestLookup { users };

        do_part(&mut channel, alice.as_ref(), Some("bye"), false, &lookup);
        assert!(!channel.has_user("1UID"));
    }

    #[test]
    fn kick_removes_member_and_notifies() {
        let mut channel = Channel::new("#a", 1000);
        let alice = user("1UID", "alice");
        let bob = user("2UID", "bob");
        channel.add(&alice.uid);
        channel.add(&bob.uid);
        let mut users = HashMap::new();
        users.insert(alice.uid.clone(), alice.clone());
        users.insert(bob.uid.clone(), bob.clone());
        let lookup = TestLookup { users };

        user_get_kicked(&mut channel, alice.as_ref(), &Source::User(bob.uid.clone()), Some("spamming"), &lookup);
        assert!(!channel.has_user("1UID"));
        assert!(bob.sent.lock().unwrap().iter().any(|l| l.contains("KICK #a alice :spamming")));
    }

    #[test]
    fn names_emits_bucketed_namreply_and_endofnames() {
        let mut channel = Channel::new("#a", 1000);
        let alice = user("1UID", "alice");
        channel.add(&alice.uid);
        channel.add_to_list("op", &alice.uid, "server", 1000);
        let mut users = HashMap::new();
        users.insert(alice.uid.clone(), alice.clone());
        let lookup = TestLookup { users };
        let events = EventBus::new();

        names(&channel, alice.as_ref(), false, &lookup, &events);
        let numerics = alice.numerics.lock().unwrap();
        assert!(numerics.iter().any(|(n, args)| n == "RPL_NAMREPLY" && args[2].contains("@alice")));
        assert!(numerics.iter().any(|(n, _)| n == "RPL_ENDOFNAMES"));
    }

    #[test]
    fn take_lower_time_rejects_greater_or_equal_time() {
        let mut channel = Channel::new("#a", 1000);
        let server = TestServer { table: ModeTable::default(), name: "test.server".to_string() };
        let lookup = TestLookup { users: HashMap::new() };
        let events = EventBus::new();

        let result = take_lower_time(&mut channel, &server, 1000, false, &lookup, &events);
        assert_eq!(result, 1000);
        assert_eq!(channel.time, 1000);
    }

    #[test]
    fn take_lower_time_adopts_earlier_time_and_clears_topic() {
        let mut channel = Channel::new("#a", 1000);
        channel.set_topic(Some(Topic { text: "hi".to_string(), set_by: "alice".to_string(), set_at: 900 }));
        let server = TestServer { table: ModeTable::default(), name: "test.server".to_string() };
        let lookup = TestLookup { users: HashMap::new() };
        let events = EventBus::new();

        let result = take_lower_time(&mut channel, &server, 500, true, &lookup, &events);
        assert_eq!(result, 500);
        assert_eq!(channel.time, 500);
        assert!(channel.topic().is_none());
    }
}
