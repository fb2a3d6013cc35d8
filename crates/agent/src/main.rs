mod cli;
mod constants;
mod shutdown;

use std::sync::Arc;

use adno_agent_client::{ConfigVersionStore, ControlPlaneClient};
use adno_agent_runtime::{Dispatcher, SchedulerSet, Supervisor};
use adno_agent_transport::HttpClientChain;
use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{AgentEnv, LogFormat};
use crate::constants::{EXIT_FATAL_STARTUP, EXIT_GRACEFUL};
use crate::shutdown::{ShutdownController, ShutdownEvent, spawn_signal_handler};

fn init_logging(env: &AgentEnv) {
    let filter =
        EnvFilter::try_new(env.log_level.as_str()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match env.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}

#[tokio::main]
async fn main() {
    let env = match AgentEnv::try_parse() {
        Ok(env) => env,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(EXIT_FATAL_STARTUP);
        }
    };

    init_logging(&env);

    if let Err(err) = run(env).await {
        tracing::error!(error = format!("{err:#}"), "fatal startup failure");
        std::process::exit(EXIT_FATAL_STARTUP);
    }

    std::process::exit(EXIT_GRACEFUL);
}

async fn run(env: AgentEnv) -> anyhow::Result<()> {
    let chain = HttpClientChain::new(env.api_url.clone(), &env.api_key)
        .context("failed to build the control-plane transport")?;
    let client = Arc::new(ControlPlaneClient::new(
        Arc::new(chain),
        Arc::new(ConfigVersionStore::new()),
    ));
    let registry = Arc::new(adno_agent_runtime::noop_registry());
    let dispatcher = Arc::new(Dispatcher::new(client.clone(), registry));
    let schedulers = Arc::new(SchedulerSet::new(client.clone()));
    let supervisor = Supervisor::new(client, dispatcher, schedulers);

    supervisor
        .start(env.passthrough_fields())
        .await
        .context("agent startup failed")?;

    tracing::info!(
        url = %env.api_url,
        initial_poll_interval_ms = env.poll_interval_ms,
        initial_heartbeat_interval_ms = env.heartbeat_interval_ms,
        max_concurrent_tasks = env.max_concurrent_tasks,
        "adno-agent started"
    );

    let shutdown = Arc::new(ShutdownController::new());
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel::<ShutdownEvent>();
    spawn_signal_handler(shutdown.clone(), shutdown_tx);

    loop {
        match shutdown_rx.recv().await {
            Some(ShutdownEvent::Graceful) => {
                tracing::info!("shutdown requested, draining in-flight tasks");
                supervisor.shutdown().await;
                break;
            }
            Some(ShutdownEvent::Immediate) => {
                tracing::warn!("shutdown requested again, exiting immediately");
                std::process::exit(130);
            }
            None => break,
        }
    }

    Ok(())
}
