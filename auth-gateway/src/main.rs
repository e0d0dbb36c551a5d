use anyhow::Context;
use auth_gateway::{router, GatewayState};
use auth_identity::{CredentialStore, IdentityConfig, IdentityService, Notifier, PgCredentialStore};
use clap::{Parser, ValueEnum};
use email_service::{EmailService, LogOnlyNotifier, SmtpConfig};
use logger_redacted::{init_tracing, LoggerConfig};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmailTransport {
    /// Deliver through the configured SMTP server
    Smtp,
    /// Log notifications without sending them
    Log,
}

/// Clinic identity gateway
#[derive(Parser, Debug)]
#[command(name = "auth-gateway")]
#[command(about = "Sign-in, password recovery and route authorization for the clinic API")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Maximum pooled database connections
    #[arg(long, default_value = "10")]
    max_connections: u32,

    /// Run embedded migrations before serving
    #[arg(long)]
    migrate: bool,

    /// Notification transport
    #[arg(long, env = "EMAIL_TRANSPORT", value_enum, default_value = "smtp")]
    email: EmailTransport,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is normal outside development.
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    init_tracing(&LoggerConfig::default().verbose(args.verbose).json(args.json_logs))?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting auth gateway");

    let config = IdentityConfig::from_env().context("loading AUTH_* configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&args.database_url)
        .await
        .context("connecting to Postgres")?;

    let store = PgCredentialStore::new(pool);
    if args.migrate {
        store.migrate().await.context("running migrations")?;
        info!("Migrations applied");
    }
    let store: Arc<dyn CredentialStore> = Arc::new(store);

    let notifier: Arc<dyn Notifier> = match args.email {
        EmailTransport::Smtp => {
            let smtp = SmtpConfig::from_env().context("loading SMTP_* configuration")?;
            let service = EmailService::new(smtp)?;
            if let Err(e) = service.verify_connection().await {
                warn!(error = %e, "SMTP server unreachable at startup, recovery emails may fail");
            }
            Arc::new(service)
        }
        EmailTransport::Log => {
            warn!("Notifications are logged, not delivered");
            Arc::new(LogOnlyNotifier)
        }
    };

    let identity = IdentityService::new(store, notifier, config)?;
    let app = router(GatewayState::new(Arc::new(identity)))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.host, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(%addr, "Auth gateway listening");
    axum::serve(listener, app).await.context("HTTP server error")?;
    Ok(())
}
