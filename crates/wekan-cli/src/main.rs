use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "wekan")]
#[command(version, about = "Browse and edit Wekan boards like a filesystem", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Connection overrides, applied on top of the config file and environment.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file to use instead of ./.wekan.toml or the user config
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Server root, e.g. https://wekan.example.com
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[arg(long, short = 'u', global = true)]
    pub username: Option<String>,

    #[arg(long, global = true)]
    pub password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive navigation shell
    Shell,
    /// Check the credentials and print the authenticated user
    Login,
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration, password masked
    Show,
    /// Write a config file with the given connection settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    wekan_readline::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Shell => commands::shell::run(&cli.global)?,
        Commands::Login => commands::login::run(&cli.global)?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&cli.global)?,
            ConfigAction::Init { force } => commands::config::init(&cli.global, force)?,
        },
    }

    Ok(())
}
