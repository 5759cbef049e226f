use std::path::{Path, PathBuf};

use door_core::config::DecoderConfig;
use door_core::DoorError;
use serde::Serialize;

use crate::process::DecoderProcess;
use crate::stream::DecodeStream;
use crate::Result;

// ─── Device model ─────────────────────────────────────────────────────────

/// One camera the decoder can read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceHandle {
    pub id: String,
    pub label: String,
}

/// Which device to start.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceSelector {
    /// The first enumerated device.
    #[default]
    Preferred,
    /// A device by id (for `CommandDecoder`, the device node path).
    Id(String),
    /// The device after `current` in enumeration order, wrapping around.
    After(String),
}

impl DeviceSelector {
    /// Resolve against an enumerated device list.
    pub fn pick<'a>(&self, devices: &'a [DeviceHandle]) -> Option<&'a DeviceHandle> {
        match self {
            DeviceSelector::Preferred => devices.first(),
            DeviceSelector::Id(id) => devices.iter().find(|d| &d.id == id),
            DeviceSelector::After(current) => {
                let idx = devices.iter().position(|d| &d.id == current)?;
                devices.get((idx + 1) % devices.len())
            }
        }
    }
}

// ─── DecoderDevice ────────────────────────────────────────────────────────

/// Source of decoded text events.
///
/// `start` returns a stream that is stopped with [`DecodeStream::stop`] or by
/// dropping it; both release the camera.
pub trait DecoderDevice: Send {
    fn enumerate(&self) -> Result<Vec<DeviceHandle>>;
    fn start(&mut self, selector: &DeviceSelector) -> Result<DecodeStream>;
}

// ─── CommandDecoder ───────────────────────────────────────────────────────

/// Runs an external line-oriented decoder against a video device node.
#[derive(Debug, Clone)]
pub struct CommandDecoder {
    program: String,
    args: Vec<String>,
    device_dir: PathBuf,
    capacity: usize,
}

impl CommandDecoder {
    pub fn new(config: &DecoderConfig, capacity: usize) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            device_dir: PathBuf::from(&config.device_dir),
            capacity,
        }
    }
}

impl DecoderDevice for CommandDecoder {
    fn enumerate(&self) -> Result<Vec<DeviceHandle>> {
        enumerate_video_nodes(&self.device_dir)
    }

    fn start(&mut self, selector: &DeviceSelector) -> Result<DecodeStream> {
        let devices = self.enumerate()?;
        if devices.is_empty() {
            return Err(DoorError::NoDecoderDevice.into());
        }
        let device = selector
            .pick(&devices)
            .ok_or_else(|| DoorError::Decoder(format!("unknown device: {selector:?}")))?;

        tracing::info!(device = %device.id, program = %self.program, "starting decoder");
        let process = DecoderProcess::spawn(&self.program, &self.args, &device.id)?;
        Ok(DecodeStream::from_process(process, self.capacity))
    }
}

/// List `video*` nodes under `dir`, sorted by name.
fn enumerate_video_nodes(dir: &Path) -> Result<Vec<DeviceHandle>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut devices: Vec<DeviceHandle> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            name.starts_with("video").then(|| DeviceHandle {
                id: entry.path().display().to_string(),
                label: name,
            })
        })
        .collect();
    devices.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(devices)
}

// ─── StdinDecoder ─────────────────────────────────────────────────────────

/// Treats every stdin line as one decode (keyboard-wedge scanners, pipes).
#[derive(Debug, Clone, Copy)]
pub struct StdinDecoder {
    capacity: usize,
}

impl StdinDecoder {
    pub const DEVICE_ID: &'static str = "stdin";

    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl DecoderDevice for StdinDecoder {
    fn enumerate(&self) -> Result<Vec<DeviceHandle>> {
        Ok(vec![DeviceHandle {
            id: Self::DEVICE_ID.into(),
            label: "standard input".into(),
        }])
    }

    fn start(&mut self, _selector: &DeviceSelector) -> Result<DecodeStream> {
        tracing::info!("reading decodes from stdin");
        Ok(DecodeStream::from_reader(tokio::io::stdin(), self.capacity))
    }
}
