use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use door_core::credential::CredentialStore;
use std::path::Path;

#[derive(Subcommand)]
pub enum KeySubcommand {
    /// Store the scanner key
    Set {
        /// Key issued for this entrance
        key: String,
    },

    /// Show the stored scanner key
    Show,

    /// Remove the stored scanner key
    Clear,
}

pub fn run(root: &Path, subcmd: KeySubcommand, json: bool) -> anyhow::Result<()> {
    let store = CredentialStore::new(root);
    match subcmd {
        KeySubcommand::Set { key } => {
            store.set(&key).context("failed to store scanner key")?;
            if json {
                print_json(&serde_json::json!({ "set": true }))?;
            } else {
                println!("Scanner key saved.");
            }
        }
        KeySubcommand::Show => {
            let key = store.get();
            if json {
                print_json(&serde_json::json!({ "key": key }))?;
            } else {
                println!("{}", key.as_deref().unwrap_or("(not set)"));
            }
        }
        KeySubcommand::Clear => {
            store.clear().context("failed to remove scanner key")?;
            if json {
                print_json(&serde_json::json!({ "cleared": true }))?;
            } else {
                println!("Scanner key cleared.");
            }
        }
    }
    Ok(())
}
