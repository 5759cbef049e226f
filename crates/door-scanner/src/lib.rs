//! `door-scanner`: the scanning runtime of the door check-in tool.
//!
//! Decoded QR payloads flow through a debounce gate into the check-in
//! pipeline, whose verdict is rendered by a feedback emitter.
//!
//! # Architecture
//!
//! ```text
//! DecoderDevice   ← external decoder process or stdin
//!     │
//!     ▼
//! DecodeStream    ← futures::Stream<Item = String>, bounded, drops when full
//!     │
//!     ▼
//! ScanSession     ← DebounceGate + one verification in flight + unlock timer
//!     │
//!     ▼
//! CheckinPipeline ← connectivity check, POST to the check-in endpoint
//!     │
//!     ▼
//! FeedbackEmitter ← banner, beeps, vibration
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use door_scanner::{CheckinPipeline, ConnectivityFlag, DecodeStream, ScanSession, TracingEmitter};
//!
//! let emitter = Arc::new(TracingEmitter);
//! let pipeline = CheckinPipeline::from_config(
//!     &config.server,
//!     key,
//!     Arc::new(ConnectivityFlag::new(true)),
//!     emitter.clone(),
//! )?;
//! let mut session = ScanSession::new(Arc::new(pipeline), emitter);
//! let stats = session
//!     .run(DecodeStream::from_reader(tokio::io::stdin(), 16), ctrl_c)
//!     .await;
//! ```

pub mod connectivity;
pub mod decoder;
pub mod error;
pub mod feedback;
pub mod pipeline;
pub mod session;
pub mod stream;

pub(crate) mod process;


pub use connectivity::{probe, spawn_probe, Connectivity, ConnectivityFlag};
pub use decoder::{CommandDecoder, DecoderDevice, DeviceHandle, DeviceSelector, StdinDecoder};
pub use error::ScannerError;
pub use feedback::{FeedbackEmitter, TracingEmitter};
pub use pipeline::{CheckinPipeline, Verifier, SCANNER_KEY_HEADER};
pub use session::{ScanSession, SessionStats};
pub use stream::DecodeStream;

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ScannerError>;
