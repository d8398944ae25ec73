use std::time::Duration;

use crate::error::GovernanceError;

/// Parses the fixed duration-literal grammar used by `reset_duration` and
/// the rate-limit window fields: a decimal magnitude followed by one of
/// `s`, `m`, `h`, `d`, `w` (seconds, minutes, hours, days, weeks). No crate
/// in the retrieval pack covers this narrow, fixed grammar, so it is
/// hand-rolled rather than pulled in as a dependency.
pub fn parse_duration_literal(literal: &str) -> Result<Duration, GovernanceError> {
    let literal = literal.trim();
    let invalid = || GovernanceError::InvalidDuration(literal.to_string());

    let unit = literal.chars().last().ok_or_else(invalid)?;
    let magnitude: u64 = literal[..literal.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| invalid())?;

    let seconds_per_unit = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        'w' => 7 * 24 * 60 * 60,
        _ => return Err(invalid()),
    };

    Ok(Duration::from_secs(magnitude.saturating_mul(seconds_per_unit)))
}
