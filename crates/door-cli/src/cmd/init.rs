use anyhow::Context;
use door_core::{
    config::{Config, WarnLevel},
    credential::CredentialStore,
    io, paths,
};
use std::path::Path;

pub fn run(root: &Path, base_url: Option<&str>, json: bool) -> anyhow::Result<()> {
    io::ensure_dir(&paths::door_dir(root))
        .with_context(|| format!("failed to create {}", paths::door_dir(root).display()))?;

    let config_path = paths::config_path(root);
    let created = !config_path.exists();
    let mut config = if created {
        Config::default()
    } else {
        Config::load(root).context("failed to load existing config.yaml")?
    };

    let updated = match base_url {
        Some(url) if url != config.server.base_url => {
            config.server.base_url = url.to_string();
            true
        }
        _ => false,
    };
    if created || updated {
        config.save(root).context("failed to write config.yaml")?;
    }

    if json {
        return crate::output::print_json(&serde_json::json!({
            "root": root.display().to_string(),
            "created": created,
            "base_url": config.server.base_url,
        }));
    }

    println!("Initializing door scanner in: {}", root.display());
    if created {
        println!("  created: .door/config.yaml");
    } else if updated {
        println!("  updated: .door/config.yaml");
    } else {
        println!("  exists:  .door/config.yaml");
    }
    println!("  origin:  {}", config.server.base_url);

    for w in config.validate() {
        let prefix = match w.level {
            WarnLevel::Warning => "warning",
            WarnLevel::Error => "error",
        };
        println!("  [{prefix}] {}", w.message);
    }

    if CredentialStore::new(root).get().is_none() {
        println!("\nNext: door key set <KEY>");
    }
    Ok(())
}
