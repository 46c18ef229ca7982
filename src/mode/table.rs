//! The default channel mode table: name ↔ letter ↔ [`ModeType`] (spec.md
//! §3 `Server` contract: `cmode_type`, `cmode_letter`,
//! `cmode_takes_parameter`).
//!
//! spec.md lists these as methods on the external `Server` object, but the
//! canonical table itself is part of the core (spec.md §4.1, component 1).
//! We reconcile the two by having `ModeTable` own the table and `Server`
//! (spec.md §3) expose `fn mode_table(&self) -> &ModeTable` — a bootstrap
//! wanting a different dialect supplies a different table, but the default
//! one ships with the core.

use std::collections::HashMap;

use super::taxonomy::{ModeType, ParamRequirement};

/// One entry in the table: the canonical name, wire letter, and type.
#[derive(Debug, Clone, Copy)]
struct ModeDef {
    name: &'static str,
    letter: char,
    kind: ModeType,
}

const DEFAULT_MODES: &[ModeDef] = &[
    ModeDef { name: "moderated", letter: 'm', kind: ModeType::Normal },
    ModeDef { name: "secret", letter: 's', kind: ModeType::Normal },
    ModeDef { name: "inviteonly", letter: 'i', kind: ModeType::Normal },
    ModeDef { name: "noexternal", letter: 'n', kind: ModeType::Normal },
    ModeDef { name: "topiclock", letter: 't', kind: ModeType::Normal },
    ModeDef { name: "limit", letter: 'l', kind: ModeType::ParameterSet },
    ModeDef { name: "key", letter: 'k', kind: ModeType::Key },
    ModeDef { name: "ban", letter: 'b', kind: ModeType::List },
    ModeDef { name: "except", letter: 'e', kind: ModeType::List },
    ModeDef { name: "owner", letter: 'q', kind: ModeType::Status },
    ModeDef { name: "admin", letter: 'a', kind: ModeType::Status },
    ModeDef { name: "op", letter: 'o', kind: ModeType::Status },
    ModeDef { name: "halfop", letter: 'h', kind: ModeType::Status },
    ModeDef { name: "voice", letter: 'v', kind: ModeType::Status },
];

/// The live name↔letter↔type mapping, queried by the mode engine.
#[derive(Debug, Clone)]
pub struct ModeTable {
    by_name: HashMap<&'static str, ModeDef>,
    by_letter: HashMap<char, ModeDef>,
}

impl Default for ModeTable {
    fn default() -> Self {
        let mut by_name = HashMap::new();
        let mut by_letter = HashMap::new();
        for def in DEFAULT_MODES {
            by_name.insert(def.name, *def);
            by_letter.insert(def.letter, *def);
        }
        Self { by_name, by_letter }
    }
}

impl ModeTable {
    pub fn cmode_type(&self, name: &str) -> Option<ModeType> {
        self.by_name.get(name).map(|d| d.kind)
    }

    pub fn cmode_letter(&self, name: &str) -> Option<char> {
        self.by_name.get(name).map(|d| d.letter)
    }

    pub fn name_for_letter(&self, letter: char) -> Option<&'static str> {
        self.by_letter.get(&letter).map(|d| d.name)
    }

    pub fn cmode_takes_parameter(&self, name: &str, setting: bool) -> Option<ParamRequirement> {
        self.cmode_type(name).map(|t| t.takes_parameter(setting))
    }

    /// Mode names whose letters appear in `mode_string` (the simple
    /// user-facing summary string): types 0/1/2, and 5 when `show_key`.
    pub fn is_summary_mode(&self, name: &str, show_key: bool) -> bool {
        match self.cmode_type(name) {
            Some(ModeType::Normal | ModeType::Parameter | ModeType::ParameterSet) => true,
            Some(ModeType::Key) => show_key,
            _ => false,
        }
    }

    pub fn status_letters_descending(&self) -> impl Iterator<Item = char> + '_ {
        super::taxonomy::PREFIX_LADDER.iter().map(|p| p.letter)
    }
}
