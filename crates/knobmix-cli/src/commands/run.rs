//! Run command: bridges the knob panel to the audio system in the foreground.
//!
//! This module wires the runtime together:
//! - Guard file (one process per host, recording the claimed port)
//! - Signal handler (SIGTERM/SIGINT)
//! - Link task (serial search, handshake, heartbeat, relay)
//! - Mixing loop on a blocking thread (frame decoding, volume dispatch)

use std::time::Duration;

use knobmix_audio::BackendKind;
use knobmix_core::RelayBuffer;
use knobmix_daemon::{Link, Mixer, PidFile, SerialPorts, SignalHandler, default_pid_path};
use tracing::{info, warn};

use crate::config::KnobmixConfig;
use crate::error::CliResult;

/// How long each task gets to stop after shutdown.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs until SIGTERM/SIGINT.
///
/// `port` overrides the configured port; `dry_run` swaps in the in-memory
/// audio backend.
pub async fn run(config: &KnobmixConfig, port: Option<String>, dry_run: bool) -> CliResult<()> {
    let mut link_config = config.link_config();
    if let Some(port) = port {
        link_config = link_config.with_port(port);
    }
    let _pid_file = PidFile::create(default_pid_path(), link_config.port.as_deref())?;

    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener();
    let mixer_config = config.mixer_config();

    let backend_kind = if dry_run {
        BackendKind::Memory
    } else {
        config.mixer.backend
    };
    if dry_run {
        info!("Dry run: volume changes stay in memory");
    }

    let relay = RelayBuffer::shared(mixer_config.relay_capacity);
    let mixer = Mixer::new(&mixer_config, relay.clone(), backend_kind.create())?;
    let link = Link::new(
        SerialPorts,
        link_config,
        relay,
        signal_handler.shutdown_handle(),
    );

    info!(
        backend = %backend_kind,
        knobs = mixer_config.knobs,
        endpoints = ?mixer_config.endpoints,
        "Starting knobmix"
    );

    let link_task = tokio::spawn(link.run());
    let mixer_task = {
        let shutdown = signal_handler.shutdown_handle();
        tokio::task::spawn_blocking(move || mixer.run(&shutdown))
    };

    signal_handler.shutdown().wait().await;
    info!("Shutting down...");

    match tokio::time::timeout(JOIN_TIMEOUT, link_task).await {
        Ok(Ok(stats)) => info!(
            links = stats.links_established,
            disconnects = stats.disconnects,
            lines = stats.lines_relayed,
            heartbeats = stats.heartbeats,
            "Link finished"
        ),
        Ok(Err(e)) => warn!(error = %e, "Link task failed"),
        Err(_) => warn!("Link task did not stop in time"),
    }

    match tokio::time::timeout(JOIN_TIMEOUT, mixer_task).await {
        Ok(Ok(stats)) => info!(
            frames = stats.frames_applied,
            rejected = stats.frames_rejected,
            failures = stats.endpoint_failures,
            "Mixer finished"
        ),
        Ok(Err(e)) => warn!(error = %e, "Mixer task failed"),
        Err(_) => warn!("Mixer did not stop in time"),
    }

    info!("knobmix stopped");
    Ok(())
}
