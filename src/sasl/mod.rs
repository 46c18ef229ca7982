//! SASL proxy state machine (spec.md §4.6): client-facing `AUTHENTICATE`
//! framing plus the `ENCAP … SASL` / `ENCAP … SVSLOGIN` server-side
//! handlers.
//!
//! The teacher authenticates SASL locally against its own database
//! (`handlers::cap::sasl`); this spec instead tunnels SASL to a remote
//! services agent over `ENCAP` frames, so the state machine here is new.
//! It is grounded on the teacher's `handlers::s2s::encap::EncapHandler`
//! mask-dispatch pattern (`matches_wildcard(target_mask, local_name)`,
//! forward-and-stop on mismatch) and on `pool`'s external-collaborator
//! trait boundary for the parts (client framing, account attach) this
//! crate does not own.

use dashmap::DashMap;
use tracing::{instrument, warn};

use crate::error::SaslError;
use crate::event::EventBus;
use crate::matcher::glob_match;
use crate::pool::Uid;

/// Per-connection SASL bookkeeping (spec.md §4.6).
#[derive(Debug, Clone, Default)]
pub struct SaslSession {
    pub agent_id: Option<String>,
    pub messages_sent: u32,
    pub failures: u32,
    pub complete: bool,
}

/// Process-wide table of in-flight SASL sessions, keyed by the
/// (possibly not-yet-registered) connection's UID.
#[derive(Default)]
pub struct SaslRegistry {
    sessions: DashMap<Uid, SaslSession>,
}

impl SaslRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, uid: &str) -> SaslSession {
        self.sessions.get(uid).map(|s| s.clone()).unwrap_or_default()
    }

    fn with_session_mut(&self, uid: &str, f: impl FnOnce(&mut SaslSession)) {
        let mut entry = self.sessions.entry(uid.to_string()).or_default();
        f(&mut entry);
    }

    fn clear(&self, uid: &str) {
        self.sessions.remove(uid);
    }
}

/// The external surface this module needs from a (possibly unregistered)
/// client connection: wire framing, numerics, and the account/profile
/// mutation hooks (spec.md §4.6: `update_user_info`, `update_account`).
pub trait SaslConnection: Send + Sync {
    fn uid(&self) -> &str;
    fn owning_server(&self) -> &str;
    fn send_authenticate(&self, data: &str);
    fn numeric(&self, name: &str, args: &[&str]);
    fn is_registered_user(&self) -> bool;
    /// `*` means "leave this field unchanged" per spec.md §4.6.
    fn update_user_info(&self, nick: &str, ident: &str, cloak: &str);
    /// `None` means log out (spec.md §4.6: "`0` means log out").
    fn update_account(&self, account_name: Option<&str>);
}

/// Outbound frame: `AUTHENTICATE <mech>` initiation host info
/// (spec.md §4.6 `out_sasl_h`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutSaslH {
    pub temp_uid: String,
    pub agent_uid: String,
    pub temp_host: String,
    pub temp_ip: String,
}

/// `out_sasl_s`: initiate with the client's chosen mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutSaslS {
    pub temp_uid: String,
    pub mechanism: String,
}

/// `out_sasl_c`: forwarded client blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutSaslC {
    pub temp_uid: String,
    pub data: String,
}

/// `out_sasl_d`: abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutSaslD {
    pub temp_uid: String,
}

/// `AUTHENTICATE <mech>` initiation (spec.md §4.6).
pub fn initiate(temp_uid: &str, agent_uid: &str, temp_host: &str, temp_ip: &str, mechanism: &str) -> (OutSaslH, OutSaslS) {
    (
        OutSaslH { temp_uid: temp_uid.to_string(), agent_uid: agent_uid.to_string(), temp_host: temp_host.to_string(), temp_ip: temp_ip.to_string() },
        OutSaslS { temp_uid: temp_uid.to_string(), mechanism: mechanism.to_string() },
    )
}

/// A subsequent client `AUTHENTICATE` line, forwarded verbatim.
pub fn forward_client_data(temp_uid: &str, base64_blob: &str) -> OutSaslC {
    OutSaslC { temp_uid: temp_uid.to_string(), data: base64_blob.to_string() }
}

/// `AUTHENTICATE *`.
pub fn abort(temp_uid: &str) -> OutSaslD {
    OutSaslD { temp_uid: temp_uid.to_string() }
}

/// Incoming `ENCAP <mask> SASL <agent> <target> <mode> <data>`
/// (spec.md §4.6).
#[instrument(skip(registry, conn, events), fields(target = conn.uid()))]
pub fn handle_encap_sasl(
    local_server_name: &str,
    registry: &SaslRegistry,
    target_mask: &str,
    agent_server: &str,
    agent_uid: &str,
    encap_source_server: &str,
    mode: char,
    data: &str,
    conn: &dyn SaslConnection,
    events: &EventBus,
) -> Result<(), SaslError> {
    if !glob_match(target_mask, local_server_name) {
        return Err(SaslError::MaskMismatch); // caller forwards and stops
    }

    if agent_server != encap_source_server {
        return Err(SaslError::AgentMismatch);
    }

    let session = registry.session(conn.uid());
    if let Some(pinned) = &session.agent_id {
        if pinned != agent_uid {
            return Err(SaslError::AgentMismatch);
        }
    } else {
        registry.with_session_mut(conn.uid(), |s| s.agent_id = Some(agent_uid.to_string()));
    }

    match mode {
        'C' => {
            conn.send_authenticate(data);
            registry.with_session_mut(conn.uid(), |s| s.messages_sent += 1);
        }
        'D' if data == "F" => {
            conn.numeric("ERR_SASLFAIL", &[]);
            let had_client_data = session.messages_sent > 0;
            if had_client_data {
                registry.with_session_mut(conn.uid(), |s| s.failures += 1);
            }
            registry.with_session_mut(conn.uid(), |s| {
                s.agent_id = None;
                s.messages_sent = 0;
            });
        }
        'D' if data == "S" => {
            conn.numeric("RPL_SASLSUCCESS", &[]);
            registry.with_session_mut(conn.uid(), |s| {
                s.failures = 0;
                s.complete = true;
                s.agent_id = None;
                s.messages_sent = 0;
            });
        }
        'D' => {
            warn!(%data, "unrecognized SASL completion data");
        }
        'M' => {
            conn.numeric("RPL_SASLMECHS", &[data]);
        }
        other => {
            warn!(mode = %other, "unrecognized SASL ENCAP mode");
        }
    }

    let _ = events; // reserved for bootstraps that want to observe SASL transitions
    Ok(())
}

/// Incoming `ENCAP <mask> SVSLOGIN <target> <nick> <ident> <cloak>
/// <act_name>` (spec.md §4.6).
#[instrument(skip(conn), fields(target = conn.uid()))]
pub fn handle_encap_svslogin(
    local_server_name: &str,
    target_mask: &str,
    nick: &str,
    ident: &str,
    cloak: &str,
    act_name: &str,
    conn: &dyn SaslConnection,
) -> Result<(), SaslError> {
    if !glob_match(target_mask, local_server_name) {
        return Err(SaslError::MaskMismatch);
    }

    if conn.is_registered_user() {
        // spec.md §4.6: "For now, reject if the target is already a
        // registered user (to be implemented)."
        return Err(SaslError::UnknownTarget);
    }

    // `update_user_info` itself resolves "*" to "leave unchanged" (trait
    // contract above) since only the implementor holds the connection's
    // current field values.
    conn.update_user_info(nick, ident, cloak);

    if act_name == "0" {
        conn.update_account(None);
    } else {
        conn.update_account(Some(act_name));
    }

    Ok(())
}

pub fn clear_session(registry: &SaslRegistry, uid: &str) {
    registry.clear(uid);
}
