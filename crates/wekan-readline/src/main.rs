use anyhow::{Context, Result};

use wekan_core::ShellSession;
use wekan_infrastructure::{ConfigService, WekanPaths};

/// Standalone shell; reads the same configuration as `wekan shell`.
fn main() -> Result<()> {
    wekan_readline::init_tracing();

    let config = ConfigService::default()
        .load()
        .context("failed to load configuration")?;
    let mut client = wekan_interaction::connect(&config)?;
    client.login().context("login failed")?;

    let history = WekanPaths::history_file().ok();
    wekan_readline::run(ShellSession::new(client), history.as_deref(), config.history_size)
}
