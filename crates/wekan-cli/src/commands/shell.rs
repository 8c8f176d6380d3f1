use anyhow::{Context, Result};

use wekan_core::ShellSession;
use wekan_infrastructure::WekanPaths;

use super::utils::effective_config;
use crate::GlobalArgs;

pub fn run(global: &GlobalArgs) -> Result<()> {
    let config = effective_config(global)?;
    let mut client = wekan_interaction::connect(&config)?;
    client
        .login()
        .with_context(|| format!("login to {} failed", config.base_url))?;
    tracing::info!(base_url = %config.base_url, "shell session started");

    let history = WekanPaths::history_file().ok();
    wekan_readline::run(
        ShellSession::new(client),
        history.as_deref(),
        config.history_size,
    )
}
