use std::sync::Arc;

use sportsbuddies_domain::activity_repository::ActivityRepository;
use sportsbuddies_domain::activity_service::{ActivityService, ActivityServiceConfig};
use sportsbuddies_domain::alerts::{AlertInbox, StoreAlertDispatcher};
use sportsbuddies_domain::messages::MessageService;
use sportsbuddies_domain::ports::db::DbAdapter;
use sportsbuddies_domain::ports::store::DocumentStore;
use sportsbuddies_domain::store::{InMemoryDocumentStore, InMemoryHealth};
use sportsbuddies_domain::users::StoreUserDirectory;
use sportsbuddies_infra::config::AppConfig;
use sportsbuddies_infra::db::{DbConfig, SurrealHealth};
use sportsbuddies_infra::store::SurrealDocumentStore;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub activities: ActivityService,
    pub messages: MessageService,
    pub alerts: AlertInbox,
    pub store: Arc<dyn DocumentStore>,
    pub db: Arc<dyn DbAdapter>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        if config.uses_surreal() {
            let db_config = DbConfig::from_app_config(&config);
            let store = SurrealDocumentStore::connect(&db_config).await?;
            tracing::info!(endpoint = %db_config.endpoint, "using surreal document store");
            Self::with_store(
                config,
                Arc::new(store),
                Arc::new(SurrealHealth::new(db_config)),
            )
        } else {
            tracing::info!("using in-memory document store");
            Self::in_memory(config)
        }
    }

    pub fn in_memory(config: AppConfig) -> anyhow::Result<Self> {
        Self::with_store(
            config,
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(InMemoryHealth),
        )
    }

    pub fn with_store(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        db: Arc<dyn DbAdapter>,
    ) -> anyhow::Result<Self> {
        let service_config = ActivityServiceConfig {
            search_default_limit: config.search_default_limit,
            sweep_mode: config.sweep_mode()?,
        };
        let users = Arc::new(StoreUserDirectory::new(store.clone()));
        let alerts = Arc::new(StoreAlertDispatcher::new(store.clone(), users.clone()));
        let activities = ActivityService::new(
            ActivityRepository::new(store.clone()),
            alerts.clone(),
            service_config,
        );
        let messages = MessageService::new(store.clone(), users, alerts);
        Ok(Self {
            config,
            activities,
            messages,
            alerts: AlertInbox::new(store.clone()),
            store,
            db,
        })
    }
}
