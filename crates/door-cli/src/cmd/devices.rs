use crate::output::{print_json, print_table};
use anyhow::Context;
use door_core::config::Config;
use door_scanner::{CommandDecoder, DecoderDevice};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let decoder = CommandDecoder::new(&config.scanner.decoder, config.scanner.channel_capacity);
    let devices = decoder.enumerate()?;

    if json {
        return print_json(&devices);
    }
    if devices.is_empty() {
        println!("No camera found in {}.", config.scanner.decoder.device_dir);
        return Ok(());
    }
    let rows: Vec<Vec<String>> = devices
        .into_iter()
        .map(|d| vec![d.id, d.label])
        .collect();
    print_table(&["ID", "LABEL"], &rows);
    Ok(())
}
