pub mod http;
#[cfg(test)]
pub mod test;

use chrono::Duration;

/// `"1h 5m"` style rendering, minutes precision.
pub fn format_duration(duration: Duration) -> String {
    let total_minutes = duration.num_minutes().max(0);
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes / 60) % 24;
    let minutes = total_minutes % 60;

    match (days, hours) {
        (0, 0) => format!("{}m", minutes),
        (0, _) => format!("{}h {}m", hours, minutes),
        _ => format!("{}d {}h {}m", days, hours, minutes),
    }
}

/// Parses `"45m"`, `"2h"`, `"1d"` or `"1h30m"`.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let mut total = Duration::zero();
    let mut number = String::new();
    let mut parsed_any = false;

    for c in input.trim().chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }

        let value: i64 = number.parse().ok()?;
        number.clear();
        total += match c.to_ascii_lowercase() {
            'm' => Duration::minutes(value),
            'h' => Duration::hours(value),
            'd' => Duration::days(value),
            _ => return None,
        };
        parsed_any = true;
    }

    (parsed_any && number.is_empty()).then_some(total)
}
