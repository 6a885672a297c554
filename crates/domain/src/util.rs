use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

pub fn uuid_v7_without_dashes() -> String {
    Uuid::now_v7().simple().to_string()
}

/// Short random hex tag used to disambiguate ids minted in the same second.
pub fn short_suffix() -> String {
    let mut value = Uuid::new_v4().simple().to_string();
    value.truncate(8);
    value
}

pub fn format_ms_rfc3339(epoch_ms: i64) -> String {
    let fallback = OffsetDateTime::from_unix_timestamp(0).unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let value =
        OffsetDateTime::from_unix_timestamp_nanos(epoch_ms as i128 * 1_000_000).unwrap_or(fallback);
    value
        .format(&Rfc3339)
        .unwrap_or("1970-01-01T00:00:00Z".to_string())
}

pub fn parse_rfc3339_ms(value: &str) -> Option<i64> {
    let parsed = OffsetDateTime::parse(value.trim(), &Rfc3339).ok()?;
    i64::try_from(parsed.unix_timestamp_nanos() / 1_000_000).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_round_trips_milliseconds() {
        let formatted = format_ms_rfc3339(1_700_000_000_123);
        assert_eq!(parse_rfc3339_ms(&formatted), Some(1_700_000_000_123));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_rfc3339_ms("tomorrow"), None);
    }

    #[test]
    fn short_suffix_is_eight_hex_chars() {
        let suffix = short_suffix();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
