use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// How the expiration sweep writes its results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationSweepMode {
    /// One batched, non-transactional write. A cancellation racing the sweep
    /// can be overwritten with EXPIRED.
    #[default]
    Batch,
    /// Each candidate goes through the single-document transaction and is
    /// re-checked for AVAILABLE first.
    Transactional,
}

impl ExpirationSweepMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "batch" => Some(Self::Batch),
            "transactional" => Some(Self::Transactional),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Transactional => "transactional",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn backoff_ms(base_ms: u64, attempt: u32, max_ms: u64) -> u64 {
    if attempt == 0 {
        return 0;
    }
    let pow = 2u64.saturating_pow(attempt.saturating_sub(1));
    let delay = base_ms.saturating_mul(pow);
    delay.min(max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_ms_returns_zero_for_zero_attempt() {
        assert_eq!(backoff_ms(1_000, 0, 60_000), 0);
    }

    #[test]
    fn backoff_ms_grows_geometrically_up_to_the_cap() {
        assert_eq!(backoff_ms(1_000, 1, 60_000), 1_000);
        assert_eq!(backoff_ms(1_000, 3, 60_000), 4_000);
        assert_eq!(backoff_ms(1_000, 10, 3_000), 3_000);
    }

    #[test]
    fn sweep_mode_parses_case_insensitively() {
        assert_eq!(
            ExpirationSweepMode::parse(" Transactional "),
            Some(ExpirationSweepMode::Transactional)
        );
        assert_eq!(ExpirationSweepMode::parse("batch"), Some(ExpirationSweepMode::Batch));
        assert_eq!(ExpirationSweepMode::parse("eventual"), None);
        assert_eq!(ExpirationSweepMode::default().as_str(), "batch");
    }
}
