use anyhow::{Context, Result};

use wekan_core::WekanConfig;
use wekan_infrastructure::ConfigService;
use wekan_infrastructure::config_service::apply_env;

use super::utils::{apply_flags, effective_config};
use crate::GlobalArgs;

pub fn show(global: &GlobalArgs) -> Result<()> {
    let service = ConfigService::new(global.config.clone());
    match service.locate()? {
        Some(path) => println!("# loaded from {}", path.display()),
        None => println!("# no config file found, using defaults"),
    }
    let config = effective_config(global)?;
    print!("{}", render(&config)?);
    Ok(())
}

pub fn init(global: &GlobalArgs, force: bool) -> Result<()> {
    let seeded = apply_env(WekanConfig::default(), |key| std::env::var(key).ok())?;
    let config = apply_flags(seeded, global).normalized()?;

    let path = ConfigService::new(global.config.clone())
        .init(&config, force)
        .context("failed to write config file")?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn render(config: &WekanConfig) -> Result<String> {
    toml::to_string_pretty(&config.masked()).context("failed to render configuration")
}
