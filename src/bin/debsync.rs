use std::{io, process::ExitCode};

use clap::Parser;
use debsynclib::{
    config::ConfigStore,
    discover::{FileDiscoverer, FindDiscoverer, WalkDiscoverer},
    error::ConfigError,
    logging::Logging,
    options::{Args, Discovery, RunOptions},
    sync::{SyncOrchestrator, SyncOutcome},
    transfer::ScpTransferer,
};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{event, Level};

/// Template config written, or config unusable.
const EXIT_CONFIG: u8 = 78;
/// Transfer failed and `--strict` was given.
const EXIT_TRANSFER: u8 = 3;

struct Shutdown {
    interrupt: Signal,
    terminate: Signal,
}

impl Shutdown {
    fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

async fn sync_with<D: FileDiscoverer>(
    store: ConfigStore,
    discoverer: D,
    options: &RunOptions,
    shutdown: &mut Shutdown,
) -> ExitCode {
    let scp_args = match options.scp_args() {
        Ok(args) => args,
        Err(error) => {
            event!(Level::ERROR, %error, scp_args = %options.scp_args, "invalid scp args");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let transferer = ScpTransferer::new(options.scp_program.as_str())
        .extra_args(scp_args)
        .timeout(options.timeout());
    let mut orchestrator =
        SyncOrchestrator::new(store, discoverer, transferer).dry_run(options.dry_run);

    let outcome = tokio::select! {
        outcome = orchestrator.run() => outcome,
        signal = shutdown.recv() => {
            event!(Level::WARN, signal, "interrupted, shutting down");
            return ExitCode::SUCCESS;
        }
    };

    match outcome {
        Ok(SyncOutcome::Failed { .. }) if options.strict => ExitCode::from(EXIT_TRANSFER),
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            event!(Level::ERROR, %error, "sync aborted");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let logging = match Logging::init() {
        Ok(logging) => logging,
        Err(error) => {
            eprintln!("failed to set up logging: {error}");
            return ExitCode::FAILURE;
        }
    };

    let options = match RunOptions::load(&args) {
        Ok(options) => options,
        Err(error) => {
            event!(Level::ERROR, %error, "invalid options");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let Some(home) = options.home_dir() else {
        event!(Level::ERROR, "no home directory: pass --home");
        return ExitCode::from(EXIT_CONFIG);
    };

    let store = match ConfigStore::setup(&home, &options.config_dir, &options.config_file) {
        Ok(store) => store,
        Err(ConfigError::Bootstrapped(_)) => {
            event!(Level::WARN, "config needs to be set up, exiting");
            return ExitCode::from(EXIT_CONFIG);
        }
        Err(_) => return ExitCode::from(EXIT_CONFIG),
    };

    if let Err(error) = logging.apply(store.config().settings.log_level) {
        event!(Level::WARN, %error, "failed to change log level");
    }

    let mut shutdown = match Shutdown::install() {
        Ok(shutdown) => shutdown,
        Err(error) => {
            event!(Level::ERROR, %error, "failed to install signal handlers");
            return ExitCode::FAILURE;
        }
    };

    match options.discovery {
        Discovery::Find => {
            let discoverer =
                FindDiscoverer::new(options.find_program.as_str()).timeout(options.timeout());
            sync_with(store, discoverer, &options, &mut shutdown).await
        }
        Discovery::Native => {
            sync_with(store, WalkDiscoverer::default(), &options, &mut shutdown).await
        }
    }
}
