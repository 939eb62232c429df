use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use inkdesk::alert_log::AlertLayer;
use inkdesk::api::{AppState, build_router};
use inkdesk::bot::{BotEngine, LogMessenger, Messenger, WhatsAppClient};
use inkdesk::config::Config;
use inkdesk::notify::{HttpEmailNotifier, LogNotifier, Notifier};
use inkdesk::scheduler::Scheduler;
use inkdesk::sessions::{SessionPolicy, spawn_sweeper};
use inkdesk::store::Database;
use inkdesk::{llm, logging};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "inkdesk.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {config_path}: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config, &config_path).await {
        eprintln!("inkdesk stopped: {e}");
        std::process::exit(1);
    }
}

async fn run(config: Config, config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let messenger: Arc<dyn Messenger> = match &config.whatsapp {
        Some(whatsapp) if !config.dry_run => Arc::new(WhatsAppClient::new(whatsapp.clone())),
        _ => Arc::new(LogMessenger),
    };

    // Alerts only make sense when messages actually go out
    let alerts = config
        .whatsapp
        .as_ref()
        .and_then(|w| w.alert_phone.clone())
        .filter(|_| messenger.is_live())
        .map(|phone| AlertLayer::new(messenger.clone(), phone).0);
    let _guard = logging::init(&config, alerts)?;

    info!("🚀 Starting inkdesk...");
    info!("Loaded config from {config_path}");
    if config.dry_run {
        info!("DRY RUN mode enabled");
    }
    if !messenger.is_live() {
        warn!("WhatsApp not configured or dry run: outgoing messages are only logged");
    }

    let db = Arc::new(Database::open(&config.database_path())?);

    let notifier: Arc<dyn Notifier> = match &config.email {
        Some(email) if !config.dry_run => Arc::new(HttpEmailNotifier::new(email.clone())),
        _ => Arc::new(LogNotifier),
    };

    let assistant = Arc::new(llm::Client::new(&config.llm)?);
    let bot = Arc::new(BotEngine::new(config.studio.clone(), config.pricing.clone(), assistant)?);

    let scheduler = Arc::new(Scheduler::new(db.clone(), messenger.clone(), &config));
    if config.scheduler.enabled {
        scheduler.clone().spawn();
    } else {
        info!("Scheduler disabled");
    }

    let sessions = SessionPolicy::from_config(&config.sessions);
    spawn_sweeper(
        db.clone(),
        sessions.clone(),
        Duration::from_secs(config.sessions.sweep_interval_secs),
    );

    let bind_addr = config.bind_addr;
    let state = AppState {
        db,
        bot,
        messenger,
        notifier,
        scheduler,
        sessions,
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Shutting down");
        })
        .await?;
    Ok(())
}
