// src/lib.rs

pub mod classifier;
pub mod config;
pub mod curfew;
pub mod db;
pub mod detectors;
pub mod dupstore;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod forward;
pub mod logging;
pub mod onebot;
pub mod sanction;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use classifier::{OpenAiCompatClassifier, TextClassifier};
use config::{Settings, StoreBackend};
use db::Db;
use dupstore::{DuplicateStore, MemoryDuplicateStore, PgDuplicateStore};
use engine::Engine;
use onebot::{GroupActions, PlatformStatus, http::OneBotHttpClient, webhook};

/// Globalny kontekst aplikacji: konfiguracja, uchwyt do DB (jeśli jest) i gotowy silnik.
pub struct AppContext {
    pub settings: Settings,
    pub db: Option<Db>,
    pub status: Arc<PlatformStatus>,
    pub engine: Arc<Engine>,
}

impl AppContext {
    /// Bootstrap całej aplikacji:
    /// - logi
    /// - magazyn duplikatów (Postgres + migracje albo pamięć)
    /// - klient OneBot, klasyfikator, silnik
    pub async fn bootstrap(settings: Settings) -> Result<Arc<Self>> {
        // 1) logi
        logging::init(&settings);

        // 2) magazyn
        let (db, store): (Option<Db>, Arc<dyn DuplicateStore>) = match settings.database.backend {
            StoreBackend::Postgres => {
                let db = db::connect(&settings.database.url, settings.database.max_connections).await?;
                db::migrate(&db).await?;
                (Some(db.clone()), Arc::new(PgDuplicateStore::new(db)))
            }
            StoreBackend::Memory => {
                info!("using in-memory duplicate store, records are lost on restart");
                (None, Arc::new(MemoryDuplicateStore::default()))
            }
        };

        // 3) platforma
        let status = Arc::new(PlatformStatus::default());
        let platform: Arc<dyn GroupActions> = Arc::new(OneBotHttpClient::new(&settings.onebot, status.clone())?);

        // 4) klasyfikator (opcjonalny)
        let classifier = OpenAiCompatClassifier::from_config(&settings.classifier)?
            .map(|c| Arc::new(c) as Arc<dyn TextClassifier>);
        if classifier.is_none() {
            info!("text classifier disabled, chat detection uses local rules only");
        }

        // 5) silnik
        let engine = Arc::new(Engine::build(&settings, platform, store, classifier));

        Ok(Arc::new(Self {
            settings,
            db,
            status,
            engine,
        }))
    }

    /// Środowisko: "production" | "development" (z `TGG_ENV` w chwili ładowania).
    #[inline]
    pub fn env(&self) -> &str {
        &self.settings.env
    }
}

/// Start: zadania tła silnika + webhook; po Ctrl-C porządne zamknięcie.
pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    let addr: SocketAddr = ctx
        .settings
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid server.bind `{}`", ctx.settings.server.bind))?;

    info!(env = ctx.env(), %addr, "starting tigris groupguard");
    ctx.engine.start().await;

    let state = webhook::WebhookState {
        engine: ctx.engine.clone(),
        status: ctx.status.clone(),
    };
    let served = webhook::serve(addr, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
    })
    .await;

    ctx.engine.shutdown().await;
    if let Some(db) = &ctx.db {
        db.close().await;
    }
    served
}
