pub mod crypto;
pub mod database;
pub mod digest;
pub mod toggles;

use std::env;
use std::fmt::Display;
use std::str::FromStr;

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_bool_env(var_name: &str, default: bool) -> bool {
    match env::var(var_name) {
        Ok(raw) => parse_bool(&raw).unwrap_or_else(|| {
            tracing::warn!("Invalid {} '{}', using default {}", var_name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

/// Parsed env value, falling back to `default` (with a warning) when the
/// value does not parse.
pub(crate) fn parse_env<T>(var_name: &str, default: T) -> T
where
    T: FromStr + Display,
{
    match env::var(var_name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid {} '{}', using default {}", var_name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

pub(crate) fn string_env(var_name: &str, default: &str) -> String {
    env::var(var_name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool(" yes "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_env_falls_back_on_missing_or_bad_values() {
        assert_eq!(parse_env("COURSENOTIFY_TEST_UNSET_NUMBER", 7u32), 7);
        std::env::set_var("COURSENOTIFY_TEST_BAD_NUMBER", "many");
        assert_eq!(parse_env("COURSENOTIFY_TEST_BAD_NUMBER", 3u32), 3);
        std::env::set_var("COURSENOTIFY_TEST_GOOD_NUMBER", " 12 ");
        assert_eq!(parse_env("COURSENOTIFY_TEST_GOOD_NUMBER", 3u32), 12);
    }
}
