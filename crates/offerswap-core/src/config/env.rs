#[must_use]
pub(super) fn read_non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[must_use]
pub(super) fn read_env_usize(name: &str, default_value: usize, min_value: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value >= min_value)
        .unwrap_or(default_value)
}

#[must_use]
pub(super) fn read_env_u32(name: &str, default_value: u32, min_value: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .filter(|value| *value >= min_value)
        .unwrap_or(default_value)
}

/// Upper bound for any duration read from the environment: ten years.
pub(super) const MAX_ENV_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[must_use]
pub(super) fn read_env_secs(name: &str, default_value: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|raw| parse_secs(&raw))
        .unwrap_or(default_value)
}

fn parse_secs(raw: &str) -> Option<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|value| (1..=MAX_ENV_SECS).contains(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_outside_the_accepted_range_fall_back() {
        assert_eq!(parse_secs(" 1800 "), Some(1800));
        assert_eq!(parse_secs(&MAX_ENV_SECS.to_string()), Some(MAX_ENV_SECS));
        assert_eq!(parse_secs("0"), None);
        assert_eq!(parse_secs("-5"), None);
        assert_eq!(parse_secs("9223372036854775807"), None);
        assert_eq!(parse_secs("soon"), None);
    }
}
