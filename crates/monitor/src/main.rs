use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use sendwatch_auth::{Capabilities, CurrentUser, Permission, Role};
use sendwatch_core::{CampaignId, UserId};
use sendwatch_monitor::{CampaignRow, HttpEngine, MonitorConfig, SendMonitor};

const USER_ID_ENV: &str = "SENDWATCH_USER_ID";
const USER_ROLE_ENV: &str = "SENDWATCH_USER_ROLE";
const PERMISSIONS_ENV: &str = "SENDWATCH_PERMISSIONS";

#[derive(Parser, Debug)]
#[command(name = "sendwatch", about = "Monitor and control campaign sends")]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Follow sending campaigns until interrupted.
    Watch,
    /// Start delivering a draft campaign.
    Send { campaign_id: CampaignId },
    /// Pause a campaign that is sending.
    Pause { campaign_id: CampaignId },
    /// Return a scheduled campaign to draft.
    Unschedule { campaign_id: CampaignId },
    Delete { campaign_id: CampaignId },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sendwatch_observability::init();

    let args = Args::parse();
    let config = MonitorConfig::from_env().context("load monitor configuration")?;
    let capabilities = capabilities_from_env()?;
    let engine = Arc::new(HttpEngine::from_config(&config).context("build engine client")?);

    let monitor = SendMonitor::start(config, engine, capabilities);

    let result = match args.cmd {
        Cmd::Watch => watch(&monitor).await,
        cmd => command(&monitor, cmd).await,
    };

    monitor.shutdown().await;
    result
}

fn capabilities_from_env() -> anyhow::Result<Capabilities> {
    let raw_id = std::env::var(USER_ID_ENV).with_context(|| format!("{USER_ID_ENV} is not set"))?;
    let id: UserId = raw_id
        .parse()
        .with_context(|| format!("{USER_ID_ENV} is not a valid user id"))?;
    let role = std::env::var(USER_ROLE_ENV)
        .ok()
        .filter(|r| !r.trim().is_empty())
        .map(|r| Role::new(r.trim().to_string()))
        .unwrap_or(Role::USER);
    let permissions = std::env::var(PERMISSIONS_ENV)
        .map(|raw| Permission::parse_list(&raw))
        .unwrap_or_default();

    Ok(Capabilities::from_grants(CurrentUser::new(id, role), &permissions))
}

async fn watch(monitor: &SendMonitor) -> anyhow::Result<()> {
    monitor.refresh().await.context("load campaigns")?;
    let report = monitor.poll_now().await;
    info!(
        sending = report.updated.len(),
        failed = report.failed.len(),
        "initial job status loaded"
    );

    let mut events = monitor.subscribe();
    let mut ticker = tokio::time::interval(monitor.config().poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("listen for ctrl-c")?;
                info!("interrupted");
                return Ok(());
            }
            _ = ticker.tick() => {
                for row in monitor.sending_rows(Utc::now()) {
                    log_row(&row);
                }
            }
            event = events.recv() => match event {
                Ok(event) => info!(event = %serde_json::to_string(&event)?, "monitor event"),
                Err(RecvError::Lagged(skipped)) => info!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

fn log_row(row: &CampaignRow) {
    let campaign = &row.campaign.campaign;
    let job = row.job_status.as_ref();
    let estimate = row.rate_estimate.as_ref();

    info!(
        campaign_id = %campaign.id,
        name = %campaign.name,
        processed = job.and_then(|j| j.processed_count),
        total = job.and_then(|j| j.total_recipients),
        rate = estimate.and_then(|e| e.rate),
        eta = estimate.and_then(|e| e.eta.as_deref()),
        "sending"
    );
}

async fn command(monitor: &SendMonitor, cmd: Cmd) -> anyhow::Result<()> {
    monitor.refresh().await.context("load campaigns")?;

    let coordinator = monitor.coordinator();
    let outcome = match cmd {
        Cmd::Send { campaign_id } => coordinator.send(campaign_id).await,
        Cmd::Pause { campaign_id } => coordinator.pause(campaign_id).await,
        Cmd::Unschedule { campaign_id } => coordinator.unschedule(campaign_id).await,
        Cmd::Delete { campaign_id } => coordinator.delete(campaign_id).await,
        Cmd::Watch => bail!("watch is not a campaign command"),
    };

    match outcome {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Err(err) if err.is_client_side() => bail!("command rejected: {}", err.user_message()),
        Err(err) => bail!("engine refused command: {}", err.user_message()),
    }
}
