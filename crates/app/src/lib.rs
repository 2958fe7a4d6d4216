//! Process wiring: settings in, a ready identity service out.

use std::sync::Arc;

use anyhow::{Context, ensure};

use passport_auth::{IdentityEvent, Profile, TokenIssuer};
use passport_events::{
    BusPublisher, EventBus, EventDispatcher, EventEnvelope, EventHandler, HandlerError,
    InMemoryEventBus, Subscription,
};
use passport_infra::{
    ConfigError, CreateIdentity, Credentials, IdentityService, InMemoryIdentityStore,
    RefreshTokens, ServiceError, Settings,
};

/// Logs every committed identity event.
#[derive(Debug, Default)]
pub struct LoggingEventHandler;

impl EventHandler<IdentityEvent> for LoggingEventHandler {
    fn name(&self) -> &str {
        "log"
    }

    fn handle(&self, envelope: &EventEnvelope<IdentityEvent>) -> Result<(), HandlerError> {
        tracing::info!(
            event_type = envelope.event_type(),
            event_id = %envelope.event_id(),
            identity_id = %envelope.aggregate_id(),
            version = envelope.sequence_number(),
            "identity event"
        );
        Ok(())
    }
}

pub struct Passport {
    pub service: IdentityService<InMemoryIdentityStore>,
    /// Committed events, as seen by any downstream consumer.
    pub events: Subscription<EventEnvelope<IdentityEvent>>,
}

/// Build the service graph from validated settings.
pub fn bootstrap(settings: &Settings) -> Result<Passport, ConfigError> {
    settings.validate()?;

    let bus: Arc<InMemoryEventBus<EventEnvelope<IdentityEvent>>> =
        Arc::new(InMemoryEventBus::new());
    let events = bus.subscribe();

    let dispatcher = EventDispatcher::<IdentityEvent>::builder()
        .subscribe_all(Arc::new(LoggingEventHandler))
        .subscribe_all(Arc::new(BusPublisher::new(bus)))
        .build();

    let store = InMemoryIdentityStore::new(Arc::new(dispatcher));
    let issuer = TokenIssuer::new(&settings.issuer_config());
    let service = IdentityService::new(store, settings.hasher()?, issuer, settings.commit_timeout());

    Ok(Passport { service, events })
}

/// Outcome of [`run_scenario`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub steps: usize,
    pub events: usize,
}

/// Walk one identity through its whole lifecycle, checking each answer.
pub async fn run_scenario(passport: &Passport) -> anyhow::Result<ScenarioReport> {
    let service = &passport.service;

    let created = service
        .create(CreateIdentity {
            username: "alice".to_string(),
            password: "pw1".to_string(),
            profile: Profile {
                display_name: Some("Alice".to_string()),
                ..Profile::default()
            },
        })
        .await
        .context("create alice")?;

    let duplicate = service
        .create(CreateIdentity {
            username: "alice".to_string(),
            password: "pw2".to_string(),
            profile: Profile::default(),
        })
        .await;
    ensure!(
        duplicate == Err(ServiceError::DuplicateUsername),
        "second alice was not rejected: {duplicate:?}"
    );

    let t1 = service
        .authenticate(Credentials {
            username: "alice".to_string(),
            password: "pw1".to_string(),
        })
        .await
        .context("authenticate alice")?;

    let presented = RefreshTokens {
        access_token: t1.access_token.clone(),
        refresh_token: t1.refresh_token.clone(),
    };
    let t2 = service
        .refresh_token(presented.clone())
        .await
        .context("refresh alice")?;
    ensure!(t1 != t2, "refresh returned the same pair");

    let replay = service.refresh_token(presented).await;
    ensure!(
        replay == Err(ServiceError::Unauthorized),
        "superseded refresh token was accepted: {replay:?}"
    );

    let info = service.get_info(&t2.access_token).await.context("get info")?;
    ensure!(info.id == created.id, "token resolved to another identity");

    let events = passport.events.drain().len();
    tracing::info!(identity_id = %created.id, events, "scenario completed");

    Ok(ScenarioReport { steps: 6, events })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(secret: &str) -> Settings {
        settings_with(Some(secret))
    }

    fn settings_with(secret: Option<&str>) -> Settings {
        let mut env = config::Map::new();
        if let Some(secret) = secret {
            env.insert("PASSPORT__TOKENS__SECRET".to_string(), secret.to_string());
        }
        // Keep Argon2 cheap in tests.
        env.insert("PASSPORT__HASHING__MEMORY_KIB".to_string(), "1024".to_string());
        env.insert("PASSPORT__HASHING__ITERATIONS".to_string(), "1".to_string());
        Settings::load_from(config::Environment::with_prefix("PASSPORT").source(Some(env)))
            .unwrap()
    }

    #[test]
    fn bootstrap_refuses_weak_secret() {
        assert!(matches!(
            bootstrap(&settings("short")),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn bootstrap_refuses_unset_secret() {
        let settings = settings_with(None);
        assert!(settings.tokens.secret.is_empty());
        assert!(matches!(bootstrap(&settings), Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn scenario_runs_end_to_end() {
        let passport = bootstrap(&settings("a-secret-that-is-long-enough-for-hs256")).unwrap();
        let report = run_scenario(&passport).await.unwrap();
        // Only the create is announced.
        assert_eq!(report.events, 1);
    }

    #[test]
    fn logging_handler_never_fails() {
        let envelope = EventEnvelope::new(
            passport_core::EventId::new(),
            passport_core::IdentityId::new(),
            "identity",
            1,
            IdentityEvent::Created(passport_auth::IdentityCreated {
                identity_id: passport_core::IdentityId::new(),
                username: "alice".to_string(),
                occurred_at: chrono::Utc::now(),
            }),
        );
        assert!(LoggingEventHandler.handle(&envelope).is_ok());
    }
}
