use coursenotify::config::{self, crypto::EmailTokenConfig, digest::DigestConfig, toggles::FeatureToggles};
use coursenotify::migration::Migrator;
use coursenotify::services::digest::{DigestService, DigestWindow};
use coursenotify::{utils, EmailCadence};
use sea_orm_migration::MigratorTrait;
use std::env;
use std::io::Write;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    // Validate configuration before doing anything else
    let (cadence, token_config) = validate_config()?;
    utils::email_crypto::init_email_cipher(&token_config)?;

    let toggles = FeatureToggles::from_env();
    tracing::info!(
        "Starting {} digest job v{} (entrance exams: {}, course authoring authz: {})",
        cadence,
        env!("CARGO_PKG_VERSION"),
        toggles.entrance_exams_enabled(),
        toggles.authz_course_authoring.global
    );

    let db = config::database::get_database().await?;
    tracing::info!("Database connected successfully");

    Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    let service = DigestService::new(db, DigestConfig::from_env());
    let window = DigestWindow::for_cadence(cadence, chrono::Utc::now().naive_utc())?;

    tokio::select! {
        result = run(&service, &window, cadence) => result?,
        _ = shutdown_signal() => {
            tracing::warn!("Digest job interrupted before completion");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "coursenotify=debug,coursenotify_digest=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries payloads, logs go to stderr
    if env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Validate all required configuration at startup (fail-fast).
fn validate_config() -> anyhow::Result<(EmailCadence, EmailTokenConfig)> {
    let raw_cadence = env::args()
        .nth(1)
        .or_else(|| env::var("DIGEST_CADENCE").ok())
        .unwrap_or_else(|| EmailCadence::Daily.to_string());
    let cadence: EmailCadence = raw_cadence.parse()?;
    if !cadence.is_digest() {
        return Err(anyhow::anyhow!(
            "Digest cadence must be Daily or Weekly, got '{}'",
            cadence
        ));
    }

    let token_config = EmailTokenConfig::from_env()?;

    if env::var("DATABASE_URL").is_err() {
        return Err(anyhow::anyhow!(
            "DATABASE_URL environment variable must be set"
        ));
    }

    Ok((cadence, token_config))
}

async fn run(service: &DigestService, window: &DigestWindow, cadence: EmailCadence) -> anyhow::Result<()> {
    let users = service.users_with_notifications(window).await?;
    tracing::info!("{} users have notifications in the {} window", users.len(), cadence);

    let (mut built, mut failed) = (0usize, 0usize);

    for user in &users {
        match service.build_digest(user, window, cadence).await {
            Ok(Some(payload)) => {
                let mut stdout = std::io::stdout().lock();
                serde_json::to_writer(&mut stdout, &payload)?;
                writeln!(stdout)?;
                stdout.flush()?;
                built += 1;
            }
            Ok(None) => {}
            Err(e) => {
                // One bad user must not stop the batch
                e.log();
                failed += 1;
            }
        }
    }

    tracing::info!(
        "{} digest finished: {} built, {} failed, {} users scanned",
        cadence,
        built,
        failed,
        users.len()
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
