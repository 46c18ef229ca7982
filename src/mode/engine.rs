//! The mode engine: `handle_modes` / `handle_mode_string` / `do_modes`
//! (spec.md §4.3).

use std::sync::Arc;

use tracing::debug;

use crate::channel::Channel;
use crate::event::EventBus;
use crate::mode::serialize::cmodes_from_string;
use crate::mode::table::ModeTable;
use crate::mode::taxonomy::{level_for_name, ModeType, ParamRequirement};
use crate::pool::{Server, Source, User, UserLookup};

/// One `(name, param)` pair as parsed off the wire, sign already applied
/// against the running default of "set".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeDelta {
    pub name: String,
    pub state: bool,
    pub param: Option<String>,
}

/// One accepted change, as appended to the output change list
/// (spec.md §4.3 step 8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    pub name: String,
    pub state: bool,
    pub param: Option<String>,
}

/// The mutable record handed to a mode's `channel_mode` event handler
/// (spec.md §4.3 step 4).
pub struct ChannelModeEvent<'a> {
    pub channel: &'a mut Channel,
    pub server: &'a dyn Server,
    pub source: &'a Source,
    pub state: bool,
    pub param: Option<String>,
    /// Handlers append to this when they want to echo a different param
    /// than the one they received (e.g. a canonicalized hostmask).
    pub params: Vec<String>,
    pub force: bool,
    /// True when this change arrived over the server protocol (affects
    /// whether the status handler resolves the target by UID or nick).
    pub proto: bool,
    pub has_basic_status: bool,
    pub user_lookup: &'a dyn UserLookup,
}

/// Per-handler verdict: `Ok(true)` applies the mode, `Ok(false)` cancels it
/// silently (privilege-notice discipline still runs), `Err` aborts with a
/// message already sent to the source.
pub type HandlerResult = bool;

/// Fired alongside step 4's type-specific handling so bootstraps can
/// observe or veto any mode change uniformly, without needing direct
/// access to the mutable [`Channel`] the typed handlers below require.
/// discipline, so bootstraps can observe or veto any mode change uniformly.
pub struct ChannelModeObserved<'a> {
    pub channel: &'a str,
    pub name: &'a str,
    pub state: bool,
    pub param: Option<&'a str>,
}

fn extract_sign(raw: &str) -> (&str, Option<bool>) {
    match raw.chars().next() {
        Some('+') => (&raw[1..], Some(true)),
        Some('-') | Some('\u{2212}') => (&raw[1..], Some(false)),
        _ => (raw, None),
    }
}

/// `handle_modes(channel, server, source, modes, force, over_protocol)`
/// (spec.md §4.3). `modes` is already parsed into `(name, param)` pairs;
/// `handle_mode_string` parses from the wire string first.
pub fn handle_modes(
    channel: &mut Channel,
    server: &dyn Server,
    source: &Source,
    modes: &[(String, Option<String>)],
    force: bool,
    over_protocol: bool,
    events: &EventBus,
    lookup: &dyn UserLookup,
) -> Vec<ModeChange> {
    let table = server.mode_table();
    let mut changes = Vec::new();
    let mut state = true;

    for (raw_name, param) in modes {
        let (name, sign) = extract_sign(raw_name);
        if let Some(s) = sign {
            state = s;
        }

        let Some(kind) = table.cmode_type(name) else {
            debug!(mode = name, "unknown mode, skipping");
            continue;
        };

        let takes = kind.takes_parameter(state);
        if takes == ParamRequirement::Mandatory && param.is_none() {
            debug!(mode = name, "mandatory parameter missing, skipping");
            continue;
        }

        let has_basic_status = force
            || source.is_server()
            || source
                .as_user_uid()
                .map(|uid| channel.user_has_basic_status(uid))
                .unwrap_or(false);

        let mut ev = ChannelModeEvent {
            channel: &mut *channel,
            server,
            source,
            state,
            param: param.clone(),
            params: Vec::new(),
            force,
            proto: over_protocol,
            has_basic_status,
            user_lookup: lookup,
        };

        let accepted = dispatch_one(&mut ev, kind, name, table, lookup, events);

        send_no_privs_notice(&ev, source, accepted, has_basic_status);

        if !accepted {
            continue;
        }

        apply_to_channel(channel, table, kind, name, state, param.as_deref());
        changes.push(ModeChange { name: name.to_string(), state, param: param.clone() });
    }

    changes
}

fn dispatch_one(
    ev: &mut ChannelModeEvent<'_>,
    kind: ModeType,
    name: &str,
    table: &ModeTable,
    lookup: &dyn UserLookup,
    events: &EventBus,
) -> HandlerResult {
    let channel_name = ev.channel.name.clone();
    let mut observed = ChannelModeObserved { channel: &channel_name, name, state: ev.state, param: ev.param.as_deref() };
    let observer_ok = events.fire(&mut observed);
    if !observer_ok {
        return false;
    }

    match kind {
        ModeType::Normal | ModeType::Parameter | ModeType::ParameterSet => true,
        ModeType::Key => true,
        ModeType::Status => status_handler(ev, name, table, lookup),
        ModeType::List => ban_like_handler(ev, name),
    }
}

/// spec.md §4.3 "Status-mode handler (shared)".
fn status_handler(ev: &mut ChannelModeEvent<'_>, name: &str, table: &ModeTable, lookup: &dyn UserLookup) -> HandlerResult {
    let Some(param) = ev.param.clone() else { return false };
    let Some(target) = lookup.lookup_user(&param, ev.proto) else {
        notify_local_source(ev, "ERR_NOSUCHNICK", &[&param]);
        return false;
    };

    if !ev.channel.has_user(target.uid()) {
        notify_local_source(ev, "ERR_USERNOTINCHANNEL", &[target.nick(), &ev.channel.name]);
        return false;
    }

    let Some(target_level) = level_for_name(name) else { return false };

    if let Source::User(source_uid) = ev.source {
        if !ev.force {
            let source_level = ev.channel.user_get_highest_level(source_uid);
            let target_current_level = ev.channel.user_get_highest_level(target.uid());
            let privileged = ev.has_basic_status
                && (ev.state || source_level >= target_current_level)
                && source_level >= target_level;
            if !privileged {
                return false;
            }
        }
    }

    let setter = source_name(ev.source, lookup);
    if ev.state {
        ev.channel.add_to_list(name, target.uid(), &setter, now_placeholder())
    } else {
        ev.channel.remove_from_list(name, target.uid())
    }
}

/// spec.md §4.3 "Ban-like handler (shared by ban, except)".
fn ban_like_handler(ev: &mut ChannelModeEvent<'_>, name: &str) -> HandlerResult {
    if ev.param.is_none() {
        if let Source::User(uid) = ev.source {
            if let Some(user) = ev.user_lookup.lookup_user_uid(uid) {
                let list_upper = name.to_uppercase();
                for elem in ev.channel.list_elements(name) {
                    user.numeric(
                        &format!("RPL_{list_upper}LIST"),
                        &[&ev.channel.name, &elem.value, &elem.set_by, &elem.set_at.to_string()],
                    );
                }
                user.numeric(&format!("RPL_ENDOF{list_upper}LIST"), &[&ev.channel.name]);
            }
        }
        return false; // view path never mutates state
    }

    if !ev.has_basic_status && !ev.force {
        return false; // caller sets send_no_privs via the return value below
    }

    let param = ev.param.clone().unwrap();
    let setter = source_name(ev.source, ev.user_lookup);
    if ev.state {
        if ev.channel.list_len(name) >= crate::channel::MAX_LIST_ENTRIES {
            notify_local_source(ev, "ERR_BANLISTFULL", &[&ev.channel.name, &param]);
            return false;
        }
        ev.channel.add_to_list(name, &param, &setter, now_placeholder())
    } else {
        ev.channel.remove_from_list(name, &param)
    }
}

fn source_name(source: &Source, lookup: &dyn UserLookup) -> String {
    match source {
        Source::Server(name) => name.clone(),
        Source::User(uid) => lookup.lookup_user_uid(uid).map(|u| u.nick().to_string()).unwrap_or_else(|| uid.clone()),
    }
}

/// Placeholder for "now" until a clock abstraction is threaded through; the
/// channel's own TS reconciliation path (`take_lower_time`) is the only
/// place that compares this value meaningfully at present.
fn now_placeholder() -> i64 {
    0
}

fn notify_local_source(ev: &ChannelModeEvent<'_>, numeric: &str, args: &[&str]) {
    if let Source::User(uid) = ev.source {
        if let Some(user) = ev.user_lookup.lookup_user_uid(uid) {
            if user.is_local() {
                user.numeric(numeric, args);
            }
        }
    }
}

/// spec.md §4.3 step 5: privilege-notice discipline.
fn send_no_privs_notice(ev: &ChannelModeEvent<'_>, source: &Source, accepted: bool, has_basic_status: bool) {
    let Source::User(uid) = source else { return };
    let Some(user) = ev.user_lookup.lookup_user_uid(uid) else { return };
    if !user.is_local() {
        return;
    }
    let hide_no_privs = false; // no per-user suppression flag wired yet; see DESIGN.md
    let send_no_privs = false;
    if send_no_privs || (!accepted && !has_basic_status && !hide_no_privs) {
        user.numeric("ERR_CHANOPRIVSNEEDED", &[&ev.channel.name]);
    }
}

fn apply_to_channel(channel: &mut Channel, _table: &ModeTable, kind: ModeType, name: &str, state: bool, param: Option<&str>) {
    match kind {
        ModeType::Normal => {
            if state {
                channel.set_mode(name, None, now_placeholder());
            } else {
                channel.unset_mode(name);
            }
        }
        ModeType::Parameter | ModeType::ParameterSet | ModeType::Key => {
            if state {
                channel.set_mode(name, param, now_placeholder());
            } else {
                channel.unset_mode(name);
            }
        }
        ModeType::List | ModeType::Status => {
            // handler already mutated the list via add_to_list/remove_from_list
        }
    }
}

/// `handle_mode_string`: parses the wire string via [`cmodes_from_string`]
/// then delegates to [`handle_modes`].
pub fn handle_mode_string(
    channel: &mut Channel,
    server: &dyn Server,
    source: &Source,
    mode_string: &str,
    params: &[String],
    force: bool,
    over_protocol: bool,
    events: &EventBus,
    lookup: &dyn UserLookup,
) -> Vec<ModeChange> {
    let table = server.mode_table();
    let modes = cmodes_from_string(table, mode_string, params);
    handle_modes(channel, server, source, &modes, force, over_protocol, events, lookup)
}

/// `do_modes`/`do_mode_string`: wraps [`handle_modes`] and additionally
/// renders serialized strings, notifies local members, and (unless
/// `local_only`) hands the server-facing string to the caller for s2s
/// broadcast (spec.md §4.3).
pub struct AppliedModes {
    pub changes: Vec<ModeChange>,
    pub user_facing: String,
    pub server_facing: String,
}

pub fn do_modes(
    channel: &mut Channel,
    server: &dyn Server,
    source: &Source,
    modes: &[(String, Option<String>)],
    force: bool,
    over_protocol: bool,
    local_only: bool,
    events: &EventBus,
    lookup: &dyn UserLookup,
) -> AppliedModes {
    let changes = handle_modes(channel, server, source, modes, force, over_protocol, events, lookup);
    let (user_facing, server_facing) = crate::mode::serialize::strings_from_cmodes(&changes, server.mode_table(), lookup);

    if !changes.is_empty() {
        broadcast_mode_line(channel, source, &user_facing, lookup);
    }

    let _ = local_only; // s2s broadcast of server_facing is the caller's responsibility
    AppliedModes { changes, user_facing, server_facing }
}

fn broadcast_mode_line(channel: &Channel, source: &Source, line: &str, lookup: &dyn UserLookup) {
    let from = source_name(source, lookup);
    for uid in channel.users() {
        if let Some(user) = lookup.lookup_user_uid(uid) {
            if user.is_local() {
                user.sendfrom(source, &format!("MODE {} {}", channel.name, line));
            }
        }
    }
    let _ = from;
}
