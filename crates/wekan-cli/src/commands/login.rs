use anyhow::{Context, Result};
use colored::Colorize;

use super::utils::effective_config;
use crate::GlobalArgs;

pub fn run(global: &GlobalArgs) -> Result<()> {
    let config = effective_config(global)?;
    let mut client = wekan_interaction::connect(&config)?;
    client
        .login()
        .with_context(|| format!("login to {} failed", config.base_url))?;

    let token = client
        .auth()
        .token()
        .context("server accepted the credentials but issued no token")?;
    println!(
        "{} {} ({}) on {}",
        "Logged in as".green(),
        client.auth().username().bold(),
        token.user_id,
        config.base_url
    );
    println!("Token valid until {}", token.expires_at.to_rfc3339());
    Ok(())
}
