//! Pluggable mask matching.
//!
//! A "matcher" is a predicate over a user and a list of mask tokens, used to
//! evaluate bans/excepts and similar lists (spec.md GLOSSARY). This module
//! provides the default matcher: IRC glob masks (`*`, `?`) over
//! `nick!user@host`, plus the `$r`/`$r:NAME` account-extended-ban token
//! (spec.md §4.6).

/// Case-insensitive IRC glob match: `*` matches any run of characters,
/// `?` matches exactly one.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    let txt: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
    glob_match_chars(&pat, &txt)
}

fn glob_match_chars(pat: &[char], txt: &[char]) -> bool {
    // Standard greedy-backtracking glob match (iterative to avoid recursion
    // blowing the stack on adversarial masks).
    let (mut pi, mut ti) = (0usize, 0usize);
    let (mut star_pi, mut star_ti) = (None::<usize>, 0usize);

    while ti < txt.len() {
        if pi < pat.len() && (pat[pi] == '?' || pat[pi] == txt[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < pat.len() && pat[pi] == '*' {
            star_pi = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(spi) = star_pi {
            pi = spi + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }
    while pi < pat.len() && pat[pi] == '*' {
        pi += 1;
    }
    pi == pat.len()
}

/// Evaluate the `$r` extended-ban account matcher against a mask token and
/// an optional account name.
///
/// - `$r` matches any registered user (any `account_name` present).
/// - `$r:NAME` matches only when `account_name` equals `NAME` case-insensitively.
/// Returns `None` if `token` is not an `$r` token at all (so the caller can
/// fall through to hostmask matching).
pub fn account_token_matches(token: &str, account_name: Option<&str>) -> Option<bool> {
    let rest = token.strip_prefix("$r")?;
    Some(match rest.strip_prefix(':') {
        Some(name) => account_name.is_some_and(|a| a.eq_ignore_ascii_case(name)),
        None if rest.is_empty() => account_name.is_some(),
        None => return None, // e.g. "$reg" is not an $r token
    })
}

/// Match a hostmask-or-extban token against a `nick!user@host` subject and
/// that user's account, trying the `$r` extended ban first.
pub fn list_entry_matches(token: &str, hostmask: &str, account_name: Option<&str>) -> bool {
    if let Some(result) = account_token_matches(token, account_name) {
        return result;
    }
    glob_match(token, hostmask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_star_and_question() {
        assert!(glob_match("*!*@bad.host", "evil!user@bad.host"));
        assert!(glob_match("nick?!*@*", "nick1!u@h"));
        assert!(!glob_match("nick?!*@*", "nick12!u@h"));
        assert!(glob_match("*", "anything"));
        assert!(!glob_match("abc", "abcd"));
        assert!(glob_match("ABC", "abc"), "matching is case-insensitive");
    }

    #[test]
    fn glob_match_handles_multiple_stars() {
        assert!(glob_match("*!*@*.example.com", "a!b@irc.example.com"));
        assert!(!glob_match("*!*@*.example.com", "a!b@irc.example.org"));
    }

    #[test]
    fn account_token_variants() {
        assert_eq!(account_token_matches("$r", Some("alice")), Some(true));
        assert_eq!(account_token_matches("$r", None), Some(false));
        assert_eq!(
            account_token_matches("$r:Alice", Some("alice")),
            Some(true)
        );
        assert_eq!(account_token_matches("$r:bob", Some("alice")), Some(false));
        assert_eq!(account_token_matches("*!*@host", Some("alice")), None);
    }

    #[test]
    fn list_entry_matches_falls_back_to_hostmask() {
        assert!(list_entry_matches(
            "*!*@bad.host",
            "x!y@bad.host",
            None
        ));
        assert!(list_entry_matches("$r", "x!y@bad.host", Some("acct")));
        assert!(!list_entry_matches("$r", "x!y@bad.host", None));
    }
}
