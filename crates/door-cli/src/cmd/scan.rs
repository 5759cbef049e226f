use crate::emitter::TerminalEmitter;
use anyhow::Context;
use door_core::{config::Config, credential::CredentialStore};
use door_scanner::{
    probe, spawn_probe, CheckinPipeline, CommandDecoder, ConnectivityFlag, DecoderDevice,
    DeviceSelector, ScanSession, SessionStats, StdinDecoder,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Source selection
// ---------------------------------------------------------------------------

/// Where decoded payloads come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Stdin,
    Camera(DeviceSelector),
}

impl Source {
    pub fn new(device: Option<String>, after: Option<String>, stdin: bool) -> Self {
        if stdin {
            return Source::Stdin;
        }
        match (device, after) {
            (Some(id), _) => Source::Camera(DeviceSelector::Id(id)),
            (None, Some(current)) => Source::Camera(DeviceSelector::After(current)),
            (None, None) => Source::Camera(DeviceSelector::Preferred),
        }
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

pub fn run(root: &Path, source: Source, json: bool) -> anyhow::Result<()> {
    let config = Config::load_valid(root).context("failed to load config")?;
    let key = CredentialStore::new(root).require()?;
    let emitter = Arc::new(TerminalEmitter::new(json));

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let probe_client = reqwest::Client::builder()
            .timeout(config.server.request_timeout())
            .build()?;
        let connectivity = ConnectivityFlag::new(probe(&probe_client, &config.server.base_url).await);
        let prober = spawn_probe(
            connectivity.clone(),
            probe_client,
            config.server.base_url.clone(),
            Duration::from_secs(config.connectivity.probe_interval_secs.max(1)),
        );

        let pipeline = CheckinPipeline::from_config(
            &config.server,
            key,
            Arc::new(connectivity),
            emitter.clone(),
        )?;
        tracing::info!(endpoint = %pipeline.endpoint(), "check-in endpoint");

        let mut session = ScanSession::new(Arc::new(pipeline), emitter.clone()).with_timing(
            config.scanner.feedback_duration(),
            config.scanner.same_code_cooldown(),
        );

        let capacity = config.scanner.channel_capacity;
        let stream = match &source {
            Source::Stdin => StdinDecoder::new(capacity).start(&DeviceSelector::Preferred),
            Source::Camera(selector) => {
                CommandDecoder::new(&config.scanner.decoder, capacity).start(selector)
            }
        };
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                prober.abort();
                return Err(anyhow::Error::new(e).context("failed to start decoder"));
            }
        };

        if !json {
            println!("Scanning. Press Ctrl-C to stop.");
        }
        let stats = session.run(stream, shutdown_signal()).await;
        session.finish().await;
        prober.abort();
        anyhow::Ok(stats)
    });
    // Do not wait on a stdin read still blocked in the pool.
    rt.shutdown_background();

    report(&result?, json)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not install ctrl-c handler");
        std::future::pending::<()>().await;
    }
}

fn report(stats: &SessionStats, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::json!({ "event": "stopped", "stats": stats }));
        return Ok(());
    }
    println!(
        "\nStopped. {} decoded, {} submitted ({} ok, {} warning, {} error), {} suppressed.",
        stats.decoded,
        stats.admitted,
        stats.ok,
        stats.warning,
        stats.error,
        stats.suppressed_locked + stats.suppressed_cooldown,
    );
    Ok(())
}
