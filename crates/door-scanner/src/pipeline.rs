use std::future::Future;
use std::sync::Arc;

use door_core::config::ServerConfig;
use door_core::types::{FeedbackDirective, VerificationOutcome};
use door_core::verdict::{classify, ResponsePayload};
use serde::Serialize;

use crate::connectivity::Connectivity;
use crate::feedback::FeedbackEmitter;
use crate::Result;

/// Header carrying the attendant's scanner credential.
pub const SCANNER_KEY_HEADER: &str = "X-Scanner-Key";

// ─── Verifier ─────────────────────────────────────────────────────────────

/// Anything that can turn decoded text into exactly one outcome.
///
/// Implementations must always terminate and must deliver exactly one final
/// feedback directive per call.
pub trait Verifier: Send + Sync + 'static {
    fn verify(&self, text: String) -> impl Future<Output = VerificationOutcome> + Send;
}

// ─── CheckinPipeline ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct CheckinRequest<'a> {
    token: &'a str,
}

/// Submits decoded tokens to the check-in endpoint and reports the verdict.
#[derive(Clone)]
pub struct CheckinPipeline {
    client: reqwest::Client,
    endpoint: String,
    credential: String,
    connectivity: Arc<dyn Connectivity>,
    emitter: Arc<dyn FeedbackEmitter>,
}

impl CheckinPipeline {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        credential: impl Into<String>,
        connectivity: Arc<dyn Connectivity>,
        emitter: Arc<dyn FeedbackEmitter>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            credential: credential.into(),
            connectivity,
            emitter,
        }
    }

    /// Build a pipeline whose HTTP client enforces the configured timeout.
    pub fn from_config(
        server: &ServerConfig,
        credential: impl Into<String>,
        connectivity: Arc<dyn Connectivity>,
        emitter: Arc<dyn FeedbackEmitter>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(server.request_timeout())
            .build()?;
        Ok(Self::new(
            client,
            server.checkin_url(),
            credential,
            connectivity,
            emitter,
        ))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Verify `token` and deliver feedback. Never fails: every error is an
    /// outcome.
    pub async fn check(&self, token: &str) -> VerificationOutcome {
        if !self.connectivity.is_online() {
            tracing::info!("device offline; skipping verification request");
            let outcome = VerificationOutcome::Offline;
            self.emitter
                .show(&FeedbackDirective::for_outcome(&outcome, None));
            return outcome;
        }

        self.emitter.show(&FeedbackDirective::checking());

        let (outcome, message) = self.submit(token).await;
        tracing::info!(
            tone = %outcome.tone(),
            outcome = ?outcome,
            "verification finished"
        );
        self.emitter
            .show(&FeedbackDirective::for_outcome(&outcome, message.as_deref()));
        outcome
    }

    async fn submit(&self, token: &str) -> (VerificationOutcome, Option<String>) {
        let sent = self
            .client
            .post(&self.endpoint)
            .header(SCANNER_KEY_HEADER, &self.credential)
            .json(&CheckinRequest { token })
            .send()
            .await;

        let response = match sent {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, timeout = e.is_timeout(), "verification request failed");
                return (VerificationOutcome::TransportError, None);
            }
        };

        let status = response.status().as_u16();
        // A body that cannot be read is treated like one that cannot be parsed.
        let body = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!(error = %e, status, "verification body unreadable");
                Default::default()
            }
        };
        let payload = ResponsePayload::parse(&body);
        (classify(status, &payload), payload.message)
    }
}

impl Verifier for CheckinPipeline {
    fn verify(&self, text: String) -> impl Future<Output = VerificationOutcome> + Send {
        async move { self.check(&text).await }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
