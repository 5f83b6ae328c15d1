//! Argument parsing shared across CLI commands.

use std::ops::RangeInclusive;

use codgate::format::PREWARM_FORMATS;

use crate::error::CliError;

/// Parse an admin level selection: `2`, `0..=4` or `0..4`.
pub fn parse_admin_levels(raw: &str) -> Result<RangeInclusive<u32>, CliError> {
    let bad = || {
        CliError::Args(format!(
            "admin level '{}' must be a number or a range like 0..=4",
            raw
        ))
    };
    let raw = raw.trim();

    if let Some((start, end)) = raw.split_once("..=") {
        let start: u32 = start.trim().parse().map_err(|_| bad())?;
        let end: u32 = end.trim().parse().map_err(|_| bad())?;
        return if start <= end { Ok(start..=end) } else { Err(bad()) };
    }

    if let Some((start, end)) = raw.split_once("..") {
        let start: u32 = start.trim().parse().map_err(|_| bad())?;
        let end: u32 = end.trim().parse().map_err(|_| bad())?;
        return if start < end {
            Ok(start..=end - 1)
        } else {
            Err(bad())
        };
    }

    let level: u32 = raw.parse().map_err(|_| bad())?;
    Ok(level..=level)
}

/// Formats to prewarm, falling back to the full default set.
pub fn prewarm_formats(requested: &[String]) -> Vec<String> {
    let formats: Vec<String> = requested
        .iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    if formats.is_empty() {
        PREWARM_FORMATS.iter().map(|f| f.to_string()).collect()
    } else {
        formats
    }
}
