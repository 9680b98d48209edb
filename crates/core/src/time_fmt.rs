// SPDX-License-Identifier: MIT

//! UTC ISO-8601 timestamp formatting, used for every `started_at`/`ended_at`
//! field.

use chrono::{DateTime, Utc};

pub fn format_epoch_ms(epoch_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms as i64)
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_as_utc_z_suffixed() {
        let s = format_epoch_ms(1_700_000_000_000);
        assert!(s.ends_with('Z'), "expected Z suffix, got {s}");
    }
}
