//! callgen: load and robustness call generator

mod args;

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use callgen_core::logging::log_welcome;
use callgen_core::{
    setup_logging, CallDetailRecorder, CallEventHandler, CallEvents, CallGenerator, FuzzingEndpoint,
    LoopbackConfig, LoopbackStack, RunRegistry, SignalingStack,
};
use clap::Parser;
use tracing::{debug, info};

use crate::args::{banner, Args};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let logging = args.logging();
    let _log_guard = setup_logging(&logging).context("failed to initialize logging")?;
    log_welcome(&logging, env!("CARGO_PKG_VERSION"));

    let config = args.to_config().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    let registry = Arc::new(RunRegistry::new());
    let recorder = Arc::new(match &config.cdr {
        Some(path) => CallDetailRecorder::open(path, &registry),
        None => CallDetailRecorder::disabled(),
    });

    let mut events = CallEvents::new(registry.clone(), recorder);
    let endpoint = if config.fuzzing {
        let endpoint = Arc::new(FuzzingEndpoint::from_config(&config).context("failed to set up RTP fuzzing")?);
        info!(
            "RTP fuzzing enabled: header={}% media={}% rtcp={}% ports {}-{}",
            config.fuzz.header_percent,
            config.fuzz.media_percent,
            config.fuzz.rtcp_percent,
            config.rtp.base,
            config.rtp.max
        );
        events = events.with_fuzzing(endpoint.clone());
        Some(endpoint)
    } else {
        None
    };
    let events: Arc<dyn CallEventHandler> = Arc::new(events);

    let loopback = LoopbackConfig {
        answer_delay: args.answer_delay(),
        local_ip: config.local_ip,
        ..Default::default()
    };
    let mut stack = LoopbackStack::new(loopback, events);
    if let Some(endpoint) = endpoint {
        stack = stack.with_fuzzing(endpoint);
    }
    let stack: Arc<dyn SignalingStack> = Arc::new(stack);

    let generator = CallGenerator::from_config(&config, stack, registry.clone())?;
    registry.report_raw(banner(generator.worker_count(), config.repeat));

    let cancel = generator.cancel_token();
    registry.report_raw("Press ENTER at any time to quit.\n");

    // A plain thread: a blocked stdin read must not hold up runtime shutdown.
    let enter = cancel.clone();
    std::thread::spawn(move || {
        let mut line = String::new();
        if let Ok(n) = std::io::stdin().lock().read_line(&mut line) {
            if n > 0 {
                debug!("ENTER pressed, cancelling calls");
                enter.cancel();
            }
        }
    });

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling calls");
            interrupt.cancel();
        }
    });

    let summary = generator.run().await;
    info!(
        "Run finished: {} attempted, {} established{}",
        summary.attempts,
        summary.established,
        if summary.cancelled { " (cancelled)" } else { "" }
    );

    Ok(())
}
