use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use redress_database::{connect_mongo, MemoryStore, MongoClient};
use redress_messaging::{DispatchNotifier, EmailDispatcher, MailTransport, NoopTransport, SmtpClient, SmtpConfig, TemplateEngine};
use redress_utils::{init_logging, AppConfig, StorageBackend};
use redress_workflow_engine::{
    api::{create_router, AppState},
    Services, Stores, TemplateLibrary,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration ({}), using defaults", e);
        AppConfig::default()
    });

    init_logging(&config.logging)?;
    info!("Starting Redress workflow engine");

    let (stores, mongo) = open_stores(&config).await?;

    let transport: Arc<dyn MailTransport> = if config.email.enabled {
        info!(host = %config.email.smtp_host, port = config.email.smtp_port, "SMTP delivery enabled");
        Arc::new(SmtpClient::new(SmtpConfig::from(&config.email))?)
    } else {
        info!("Email delivery disabled, notifications go to the in-app inbox only");
        Arc::new(NoopTransport)
    };
    let dispatcher = EmailDispatcher::new(Arc::new(TemplateEngine::new()), transport);
    let notifier = Arc::new(DispatchNotifier::new(
        stores.notifications.clone(),
        stores.directory.clone(),
        Some(dispatcher),
    ));

    let templates = Arc::new(TemplateLibrary::builtin()?);
    info!(count = templates.list_all().len(), "Workflow templates loaded");

    let services = Services::new(stores, notifier, templates);

    if config.scheduler.enabled {
        services
            .scheduler
            .clone()
            .spawn(Duration::from_secs(config.scheduler.interval_seconds.max(1)));
    } else {
        warn!("Timed-transition scheduler disabled");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = create_router(AppState::new(services, config, mongo));

    let listener = TcpListener::bind(&addr).await?;
    info!("Workflow engine listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn open_stores(config: &AppConfig) -> Result<(Stores, Option<MongoClient>)> {
    match config.database.backend {
        StorageBackend::Memory => {
            warn!("Using the in-memory store, data is lost on restart");
            Ok((Stores::shared(Arc::new(MemoryStore::new())), None))
        }
        StorageBackend::Mongodb => {
            let (client, store) = connect_mongo(&config.database).await?;
            info!(database = %config.database.database_name, "MongoDB connection established");
            Ok((Stores::shared(Arc::new(store)), Some(client)))
        }
    }
}
