use crate::emitter::TerminalEmitter;
use anyhow::Context;
use door_core::{config::Config, credential::CredentialStore, types::VerificationOutcome};
use door_scanner::{probe, CheckinPipeline, ConnectivityFlag};
use std::path::Path;
use std::sync::Arc;

/// Verify one token. Exits non-zero unless the ticket is accepted.
pub fn run(root: &Path, token: &str, json: bool) -> anyhow::Result<()> {
    let config = Config::load_valid(root).context("failed to load config")?;
    let key = CredentialStore::new(root).require()?;

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        let probe_client = reqwest::Client::builder()
            .timeout(config.server.request_timeout())
            .build()?;
        let online = probe(&probe_client, &config.server.base_url).await;
        let connectivity = ConnectivityFlag::new(online);

        let pipeline = CheckinPipeline::from_config(
            &config.server,
            key,
            Arc::new(connectivity),
            Arc::new(TerminalEmitter::new(json)),
        )?;
        anyhow::Ok(pipeline.check(token).await)
    })?;

    if json {
        println!("{}", serde_json::json!({ "event": "outcome", "result": outcome }));
    }

    match outcome {
        VerificationOutcome::Accepted { .. } => Ok(()),
        other => anyhow::bail!("ticket not accepted: {}", other.default_message()),
    }
}
