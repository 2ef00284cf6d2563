//! Relative duration expressions such as `3s`, `4m`, `1h43m` or `1.5h`.

use chrono::Duration;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(NANOS_PER_SECOND),
        "m" => Some(60 * NANOS_PER_SECOND),
        "h" => Some(3_600 * NANOS_PER_SECOND),
        _ => None,
    }
}

fn split_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

/// Parse a signed, composable duration expression.
///
/// Every component needs a unit; the lone string `0` is the only exception.
/// Returns `None` for anything that is not a duration so callers can fall
/// back to absolute timestamps.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let (negative, mut rest) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input.strip_prefix('+').unwrap_or(input)),
    };

    if rest == "0" {
        return Some(Duration::zero());
    }
    if rest.is_empty() {
        return None;
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let (whole, after) = split_digits(rest);
        let (fraction, after) = match after.strip_prefix('.') {
            Some(after) => split_digits(after),
            None => ("", after),
        };
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }

        let unit_end = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_end);
        let scale = unit_nanos(unit)?;

        if !whole.is_empty() {
            let value: u128 = whole.parse().ok()?;
            total = total.checked_add(value.checked_mul(scale)?)?;
        }
        if !fraction.is_empty() {
            let digits = &fraction[..fraction.len().min(18)];
            let value: u128 = digits.parse().ok()?;
            total = total.checked_add(value * scale / 10u128.pow(digits.len() as u32))?;
        }

        rest = after;
    }

    let duration = Duration::nanoseconds(i64::try_from(total).ok()?);
    Some(if negative { -duration } else { duration })
}
