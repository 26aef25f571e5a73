//! Server-reported usage headers.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::HeaderMap;

use super::quota::QuotaKind;

static USAGE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^x-mbx-(used-weight|order-count)-(\d+)([smhd])$")
        .expect("Invalid usage header regex pattern")
});

/// Usage for one quota kind over one interval, as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageReport {
    pub kind: QuotaKind,
    pub interval: Duration,
    pub count: u64,
}

fn unit_to_duration(count: u64, unit: &str) -> Option<Duration> {
    let seconds = match unit.to_ascii_uppercase().as_str() {
        "S" => 1,
        "M" => 60,
        "H" => 60 * 60,
        "D" => 24 * 60 * 60,
        _ => return None,
    };
    Some(Duration::from_secs(count.checked_mul(seconds)?))
}

/// Parse every `x-mbx-<used-weight|order-count>-<N><S|M|H|D>` header.
///
/// Headers that do not match, or whose value is not an integer, are skipped.
pub fn parse_usage_headers(headers: &HeaderMap) -> Vec<UsageReport> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let captures = USAGE_HEADER.captures(name.as_str())?;
            let kind = if captures[1].eq_ignore_ascii_case("used-weight") {
                QuotaKind::RequestWeight
            } else {
                QuotaKind::Orders
            };
            let interval = unit_to_duration(captures[2].parse().ok()?, &captures[3])?;
            let count = value.to_str().ok()?.trim().parse().ok()?;
            Some(UsageReport {
                kind,
                interval,
                count,
            })
        })
        .collect()
}
