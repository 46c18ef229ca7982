//! Static classification of channel modes (spec.md §4.1).

/// The six mode types. Numbered to match spec.md's own numbering so logs
/// and error messages that mention "type 3" stay meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModeType {
    /// 0: never parameterized, e.g. `+m`.
    Normal = 0,
    /// 1: parameter required both when setting and unsetting.
    Parameter = 1,
    /// 2: parameter required when setting, absent when unsetting, e.g. `+l`.
    ParameterSet = 2,
    /// 3: carries a list of values with metadata, unset by value, e.g. `+b`.
    List = 3,
    /// 4: like List but values are users and govern privilege.
    Status = 4,
    /// 5: parameter mandatory when setting; optional (consumed if present)
    /// when unsetting. Visible only to members.
    Key = 5,
}

/// Whether a mode's parameter is mandatory, optional, or absent for the
/// given set/unset state — the `cmode_takes_parameter(name, state)` contract
/// from spec.md §3/§4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRequirement {
    None,
    Optional,
    Mandatory,
}

impl ModeType {
    /// spec.md §4.3 step 3: `takes = cmode_takes_parameter(name, state)`.
    pub fn takes_parameter(self, setting: bool) -> ParamRequirement {
        match self {
            ModeType::Normal => ParamRequirement::None,
            ModeType::Parameter => ParamRequirement::Mandatory,
            ModeType::ParameterSet => {
                if setting {
                    ParamRequirement::Mandatory
                } else {
                    ParamRequirement::None
                }
            }
            ModeType::List | ModeType::Status => ParamRequirement::Mandatory,
            ModeType::Key => {
                if setting {
                    ParamRequirement::Mandatory
                } else {
                    ParamRequirement::Optional
                }
            }
        }
    }
}

/// One rung on the status-prefix ladder: level, mode letter, prefix symbol,
/// mode name — mirrors the teacher's `MemberModes` prefix ordering
/// (`~ & @ % +` / owner, admin, op, halfop, voice).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixLevel {
    pub level: i32,
    pub letter: char,
    pub symbol: char,
    pub name: &'static str,
}

/// The prefix ladder in descending order of authority. `level` values are
/// arbitrary but monotonic; "basic status" (spec.md §4.1) means
/// `level >= HALFOP_LEVEL`.
pub const PREFIX_LADDER: &[PrefixLevel] = &[
    PrefixLevel { level: 40, letter: 'q', symbol: '~', name: "owner" },
    PrefixLevel { level: 30, letter: 'a', symbol: '&', name: "admin" },
    PrefixLevel { level: 20, letter: 'o', symbol: '@', name: "op" },
    PrefixLevel { level: 10, letter: 'h', symbol: '%', name: "halfop" },
    PrefixLevel { level: 0, letter: 'v', symbol: '+', name: "voice" },
];

/// The minimum level considered "basic status": halfop or above.
pub const HALFOP_LEVEL: i32 = 10;

pub fn level_for_name(name: &str) -> Option<i32> {
    PREFIX_LADDER.iter().find(|p| p.name == name).map(|p| p.level)
}

pub fn level_for_letter(letter: char) -> Option<i32> {
    PREFIX_LADDER.iter().find(|p| p.letter == letter).map(|p| p.level)
}

pub fn name_for_letter(letter: char) -> Option<&'static str> {
    PREFIX_LADDER.iter().find(|p| p.letter == letter).map(|p| p.name)
}

/// Negative infinity sentinel for "not a member" (spec.md §8 invariant:
/// `user_get_highest_level(c, u) = -inf` iff `u ∉ c.users`).
pub const NOT_A_MEMBER_LEVEL: i32 = i32::MIN;
