use anyhow::Context;
use door_core::config::Config;
use std::path::Path;

pub fn run(root: &Path, port: Option<u16>) -> anyhow::Result<()> {
    let config = Config::load_valid(root).context("failed to load config")?;
    let port = port.unwrap_or(config.proxy.port);

    let rt = tokio::runtime::Runtime::new()?;
    let root_buf = root.to_path_buf();
    rt.block_on(async move { door_server::serve(&root_buf, &config, port).await })
}
