mod observability;

use std::sync::Arc;
use std::time::{Duration, Instant};

use sportsbuddies_domain::DomainResult;
use sportsbuddies_domain::error::DomainError;
use sportsbuddies_domain::activity_repository::ActivityRepository;
use sportsbuddies_domain::jobs::{ExpirationSweepMode, SweepReport, backoff_ms, now_ms};
use sportsbuddies_domain::ports::store::DocumentStore;
use sportsbuddies_domain::store::InMemoryDocumentStore;
use sportsbuddies_infra::db::DbConfig;
use sportsbuddies_infra::store::SurrealDocumentStore;
use sportsbuddies_infra::{config::AppConfig, logging::init_tracing};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config, "sportsbuddies-worker")?;
    observability::init_metrics(config.worker_metrics_port)?;

    let store: Arc<dyn DocumentStore> = if config.uses_surreal() {
        Arc::new(SurrealDocumentStore::connect(&DbConfig::from_app_config(&config)).await?)
    } else {
        tracing::warn!("worker running against an in-memory store; sweeps see no shared data");
        Arc::new(InMemoryDocumentStore::new())
    };
    let sweeper = Sweeper {
        repository: ActivityRepository::new(store),
        mode: config.sweep_mode()?,
    };

    info!(
        interval_ms = config.worker_sweep_interval_ms,
        mode = sweeper.mode.as_str(),
        "worker starting"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut failures: u32 = 0;
    loop {
        let delay_ms = match sweeper.run_once().await {
            Ok(_) => {
                failures = 0;
                config.worker_sweep_interval_ms
            }
            Err(err) => {
                failures = failures.saturating_add(1);
                let delay = retry_delay_ms(
                    &err,
                    failures,
                    config.worker_backoff_base_ms,
                    config.worker_backoff_max_ms,
                );
                if err.is_retryable() {
                    tracing::warn!(
                        error = %err,
                        failures,
                        retry_in_ms = delay,
                        "expiration sweep failed"
                    );
                } else {
                    tracing::error!(
                        error = %err,
                        failures,
                        retry_in_ms = delay,
                        "expiration sweep failed with a non-retryable error"
                    );
                }
                delay
            }
        };
        observability::set_consecutive_failures(failures);

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
        }
    }

    info!("worker shutdown");
    Ok(())
}

/// Store failures back off exponentially. Anything else will fail the same
/// way on the next attempt, so it waits the full maximum.
fn retry_delay_ms(err: &DomainError, failures: u32, base_ms: u64, max_ms: u64) -> u64 {
    if err.is_retryable() {
        backoff_ms(base_ms, failures, max_ms)
    } else {
        max_ms
    }
}

struct Sweeper {
    repository: ActivityRepository,
    mode: ExpirationSweepMode,
}

impl Sweeper {
    async fn run_once(&self) -> DomainResult<SweepReport> {
        let started = Instant::now();
        let result = self.repository.expire_activities(now_ms(), self.mode).await;
        match &result {
            Ok(report) => observability::register_sweep("success", Some(report), started.elapsed()),
            Err(_) => observability::register_sweep("error", None, started.elapsed()),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sportsbuddies_domain::activity::{
        Activity, ActivityStatus, ActivityType, GeoPoint, SkillLevel,
    };

    fn activity(id: &str, date_time_ms: i64) -> Activity {
        Activity {
            id: id.into(),
            activity_name: format!("game {id}"),
            sport: "badminton".into(),
            description: "social play".into(),
            place_name: "Toa Payoh Sports Hall".into(),
            banner_image_url: String::new(),
            activity_type: ActivityType::Event,
            skill_level: SkillLevel::Beginner,
            price: 5,
            location: GeoPoint::new(1.33, 103.85),
            date_time_ms,
            max_participants: 6,
            creator_id: "creator".into(),
            participants: Vec::new(),
            join_requests: Vec::new(),
            status: ActivityStatus::Available,
        }
    }

    #[tokio::test]
    async fn run_once_expires_past_activities_and_is_idempotent() {
        let repository = ActivityRepository::new(Arc::new(InMemoryDocumentStore::new()));
        let now = now_ms();
        repository.create(&activity("past", now - 60_000)).await.unwrap();
        repository
            .create(&activity("upcoming", now + 3_600_000))
            .await
            .unwrap();
        let sweeper = Sweeper {
            repository: repository.clone(),
            mode: ExpirationSweepMode::Transactional,
        };

        let first = sweeper.run_once().await.unwrap();
        assert_eq!(first, SweepReport { scanned: 2, expired: 1 });
        let second = sweeper.run_once().await.unwrap();
        assert_eq!(second, SweepReport { scanned: 1, expired: 0 });

        let past = repository.get("past").await.unwrap().unwrap();
        assert_eq!(past.status, ActivityStatus::Expired);
    }

    #[test]
    fn only_store_failures_back_off_gradually() {
        let store = DomainError::Store("connection reset".into());
        assert_eq!(retry_delay_ms(&store, 1, 500, 60_000), 500);
        assert_eq!(retry_delay_ms(&store, 3, 500, 60_000), 2_000);

        let invalid = DomainError::Validation("dateTime must be epoch milliseconds".into());
        assert_eq!(retry_delay_ms(&invalid, 1, 500, 60_000), 60_000);
    }
}
