use std::sync::LazyLock;

use regex::Regex;

use crate::context::Mode;

static IMPERSONATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s-u\s+(@?[A-Za-z0-9_]+)").expect("impersonation pattern is valid"));

/// Sets a flag for every `-modifier` present and removes ` -modifier` once per key.
pub fn strip_modifiers(text: &str) -> (Mode, String) {
    let mut mode = Mode::default();
    let mut text = text.to_string();

    for key in Mode::KEYS {
        if text.contains(&format!("-{}", key)) {
            mode.set(key);
            text = text.replacen(&format!(" -{}", key), "", 1);
        }
    }

    (mode, text)
}

/// Splits `"/cmd args -u @someone"` into the text before the marker and the target.
pub fn split_impersonation(text: &str) -> Option<(String, String)> {
    let captures = IMPERSONATION_REGEX.captures(text)?;
    let marker = captures.get(0)?;
    let target = captures.get(1)?.as_str().to_string();

    Some((text[..marker.start()].to_string(), target))
}

/// Command word of `text`: leading `/` and `@botname` removed, lowercased.
/// `None` when the command is addressed to a different bot.
pub fn extract_alias(text: &str, bot_name: &str) -> Option<String> {
    let word = text.split_whitespace().next()?.strip_prefix('/')?;

    let alias = match word.split_once('@') {
        Some((alias, target)) if target.eq_ignore_ascii_case(bot_name) => alias,
        Some(_) => return None,
        None => word,
    };

    Some(alias.to_lowercase())
}
