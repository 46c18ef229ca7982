//! Configuration surface consumed by the core (spec.md §9): account
//! encryption algorithm, per-channel automodes, and per-peer `connect.<name>`
//! blocks. Shaped after the teacher's `config::links::LinkBlock` — serde
//! derives over a plain TOML table, defaults via `#[serde(default)]`.

use std::collections::HashMap;

use serde::Deserialize;

fn default_true() -> bool {
    true
}

fn default_encryption() -> String {
    "sha1".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

/// `account.encryption` (spec.md §9): the default password-hash algorithm
/// tag for newly registered accounts.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    #[serde(default = "default_encryption")]
    pub encryption: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self { encryption: default_encryption() }
    }
}

/// `channels.automodes` (spec.md §9): applied via `handle_mode_string` to
/// every newly created channel. `+user` is a literal substituted with the
/// joining user's UID at apply time (spec.md §9 worked example #1).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub automodes: Option<String>,
}

/// One `connect.<name>` block (spec.md §4.5/§9), grounded on the teacher's
/// `LinkBlock`. Differs from the teacher's shape in the autoconnect timing
/// fields: the teacher tracks a plain `autoconnect: bool`, this core tracks
/// the interval/threshold values `connect_server` actually inspects
/// (`auto_timeout`, `auto_timer`), per spec.md §4.5's "positive
/// `auto_timeout`/`auto_timer`" gate on `auto_only` connects.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectBlock {
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default = "default_true")]
    pub verify_cert: bool,
    pub password: String,
    /// Protocol tag used to select the link's wire dialect; defaults to
    /// `jelp` when absent (spec.md §4.5).
    #[serde(default)]
    pub ircd: Option<String>,
    /// Single-shot retry budget in seconds; mutually complementary with
    /// `auto_timer`, either of which being positive satisfies the
    /// `auto_only` gate.
    #[serde(default)]
    pub auto_timeout: Option<u64>,
    /// Periodic retry interval in seconds; when set, `connect_server` arms
    /// a repeating timer instead of a single attempt.
    #[serde(default)]
    pub auto_timer: Option<u64>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl ConnectBlock {
    /// spec.md §4.5: `auto_only` connects require a positive
    /// `auto_timeout` or `auto_timer`.
    pub fn has_positive_autoconnect(&self) -> bool {
        self.auto_timeout.is_some_and(|t| t > 0) || self.auto_timer.is_some_and(|t| t > 0)
    }
}

/// Top-level configuration surface this crate reads; a bootstrap's own
/// config struct embeds or maps onto this shape.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CoreConfig {
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub connect: HashMap<String, ConnectBlock>,
}

impl Default for ConnectBlock {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: 6667,
            ssl: false,
            verify_cert: true,
            password: String::new(),
            ircd: None,
            auto_timeout: None,
            auto_timer: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let toml = r#"
            [account]
            encryption = "sha1"

            [channels]
            automodes = "+nt"

            [connect.hub]
            address = "hub.example.net"
            port = 6900
            password = "linkpass"
            auto_timer = 30
        "#;
        let cfg: CoreConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.account.encryption, "sha1");
        assert_eq!(cfg.channels.automodes.as_deref(), Some("+nt"));
        let hub = cfg.connect.get("hub").unwrap();
        assert_eq!(hub.port, 6900);
        assert!(hub.has_positive_autoconnect());
    }

    #[test]
    fn defaults_apply_when_sections_absent() {
        let cfg: CoreConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.account.encryption, "sha1");
        assert!(cfg.channels.automodes.is_none());
        assert!(cfg.connect.is_empty());
    }

    #[test]
    fn block_without_timers_is_not_autoconnectable() {
        let block = ConnectBlock { address: "x".into(), port: 1, password: "p".into(), ..Default::default() };
        assert!(!block.has_positive_autoconnect());
    }
}
