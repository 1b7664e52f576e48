//! Keystone - lifecycle supervisor demo
//!
//! Runs a set of demo kernels under a [`Supervisor`] until SIGINT, SIGTERM
//! or a reported failure, then shuts them down in reverse order.

mod cli;
mod kernels;

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use keystone_core::{Kernel, ShutdownReason, Supervisor, SupervisorError};

use crate::cli::{Cli, Commands, RunArgs};
use crate::kernels::{ClockKernel, HeartbeatKernel, TripwireKernel};

/// Initialize tracing with console output and, optionally, daily-rotated files.
fn init_tracing(log_dir: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("keystone")
                .filename_suffix("log")
                .max_log_files(30)
                .build(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);

            // Keeps the background writer flushing for the life of the process.
            static GUARD: OnceLock<WorkerGuard> = OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(writer).with_ansi(false))
        }
        None => None,
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_dir.as_deref())?;

    match cli.command {
        None => run(RunArgs::default()).await,
        Some(Commands::Run(args)) => run(args).await,
    }
}

fn build_supervisor(args: &RunArgs) -> Supervisor {
    let builder = Supervisor::builder();
    match &args.env_file {
        Some(path) => builder.env_file(path, args.require_env_file),
        None if args.require_env_file => builder.env_file(".env", true),
        None => builder,
    }
    .build()
}

async fn start_all(supervisor: &Supervisor) -> Result<(), SupervisorError> {
    supervisor.init_all().await?;
    supervisor.run_all().await
}

/// Register, init and start the demo kernels, then block until shutdown.
async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Keystone v{}", env!("CARGO_PKG_VERSION"));

    let supervisor = build_supervisor(&args);
    let config = supervisor.base_config()?;
    info!(
        supervisor = %supervisor.id(),
        app = %config.app_name,
        env = %config.app_env,
        version = %config.app_version,
        "Configuration loaded"
    );

    let mut kernels: Vec<Arc<dyn Kernel>> = vec![
        Arc::new(HeartbeatKernel::new(Duration::from_secs(args.heartbeat))),
        Arc::new(ClockKernel::new(Duration::from_secs(args.clock))),
    ];
    if let Some(secs) = args.fail_after {
        kernels.push(Arc::new(TripwireKernel::new(Duration::from_secs(secs))));
    }

    supervisor.register_kernels(kernels)?;
    if let Err(e) = start_all(&supervisor).await {
        // Stop whatever did start before reporting.
        error!(error = %e, "Startup failed, shutting down");
        supervisor.cancel();
        supervisor.wait_for_shutdown().await;
        return Err(e.into());
    }
    info!(kernels = ?supervisor.kernel_names(), "All kernels running");

    match supervisor.wait_for_shutdown().await {
        ShutdownReason::Failure(err) => {
            error!(error = %err, "Stopped after a fatal error");
            Err(format!("fatal error: {err}").into())
        }
        reason => {
            info!(%reason, "Keystone stopped");
            Ok(())
        }
    }
}
