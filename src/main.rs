use std::time::Duration;

use armcontroller::config::ArmConfig;
use armcontroller::notify::Notifier;
use armcontroller::presentation::Presenter;
use armcontroller::session::ArmSession;
use color_eyre::{eyre::eyre, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const PRESENTATION_CADENCE: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = ArmConfig::default_path().map_err(|e| eyre!("{}", e))?;
    let config = ArmConfig::load_or_create(&config_path)
        .await
        .map_err(|e| eyre!("Failed to load config: {}", e))?;
    info!("Using config {}", config_path.display());

    let (notification_tx, notification_rx) = mpsc::channel(config.control.notification_capacity);
    let notifier = Notifier::new(notification_tx);

    let presenter_cancel = CancellationToken::new();
    let presenter = tokio::spawn(
        Presenter::new(notification_rx).run(PRESENTATION_CADENCE, presenter_cancel.clone()),
    );

    let session = ArmSession::connect(&config, notifier)
        .await
        .map_err(|e| eyre!("Failed to connect to the arm: {}", e))?;

    let session_cancel = session.cancel_token();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Ctrl-C received, disconnecting");
        }
        _ = session_cancel.cancelled() => {
            warn!("Session ended by link loss");
        }
    }

    let report = session.disconnect().await;
    info!("Session closed: {:?}", report);

    presenter_cancel.cancel();
    presenter
        .await
        .map_err(|e| eyre!("Presentation task failed: {}", e))?;

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
