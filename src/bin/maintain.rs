//! TEAP maintain runner.
//!
//! Runs one convergence pass and exits; a cron entry (or anything
//! cron-shaped) provides the periodicity. Credentials come from the
//! environment, the sync inventory from the JSON file given as the only
//! argument (default `teap.json`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use teap::actions::ActionDb;
use teap::chat::{LoggedChat, RocketChatClient};
use teap::directory::EdapClient;
use teap::folders::NextcloudClient;
use teap::model::Backends;
use teap::reconcile::maintain;
use teap::settings::{Settings, SyncConfig};

fn main() -> ExitCode {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("teap.json"));

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&config_path)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("maintain failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: &std::path::Path) -> teap::Result<()> {
    let settings = Settings::from_env()?;
    let config = SyncConfig::load(config_path)?;

    let action_log = Arc::new(ActionDb::open()?);
    let rocket = Arc::new(RocketChatClient::new(&settings.rocket));

    let backends = Backends {
        directory: Arc::new(EdapClient::new(&settings.edap)),
        chat: Arc::new(LoggedChat::new(rocket, action_log)),
        folders: Arc::new(NextcloudClient::new(&settings.nextcloud)),
    };

    let report = maintain(&backends, &config).await?;
    log::info!(
        "done: {} rooms, {} invited, {} kicked, {} skipped",
        report.rooms,
        report.invited,
        report.kicked,
        report.skipped
    );
    Ok(())
}
