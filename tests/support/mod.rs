//! Shared test doubles for the integration suite, grounded on the unit-test
//! mocks in `src/channel/ops.rs` and `src/mode/engine.rs` but shared across
//! files the way the teacher's `tests/common` harness is.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ircd_core::mode::table::ModeTable;
use ircd_core::pool::{Server, Source, User, UserLookup};

pub struct TestServer {
    pub table: ModeTable,
    pub name: String,
}

impl TestServer {
    pub fn new(name: &str) -> Self {
        Self { table: ModeTable::default(), name: name.to_string() }
    }
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

#[derive(Default)]
pub struct TestUser {
    pub uid: String,
    pub nick: String,
    pub local: bool,
    pub invisible: Mutex<bool>,
    pub deaf: Mutex<bool>,
    pub sent: Mutex<Vec<String>>,
    pub numerics: Mutex<Vec<(String, Vec<String>)>>,
    pub mode_calls: Mutex<Vec<(String, bool)>>,
}

impl TestUser {
    pub fn new(uid: &str, nick: &str) -> Arc<Self> {
        Arc::new(Self { uid: uid.to_string(), nick: nick.to_string(), local: true, ..Default::default() })
    }

    pub fn sent_lines(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
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
    fn is_mode(&self, name: &str) -> bool {
        match name {
            "invisible" => *self.invisible.lock().unwrap(),
            "deaf" => *self.deaf.lock().unwrap(),
            _ => false,
        }
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
        format!("{}!u@host", self.nick)
    }
    fn real_name(&self) -> &str {
        "Test Real Name"
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
    fn set_mode(&self, name: &str, on: bool) {
        self.mode_calls.lock().unwrap().push((name.to_string(), on));
    }
}

#[derive(Default)]
pub struct TestLookup {
    pub users: HashMap<String, Arc<TestUser>>,
}

impl TestLookup {
    pub fn insert(&mut self, user: Arc<TestUser>) {
        self.users.insert(user.uid.clone(), user);
    }
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
