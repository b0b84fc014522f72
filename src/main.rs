//! xtreamview - Xtream Codes IPTV client
//!
//! # Usage
//!
//! ```bash
//! xtreamview login panel.example.com:8080 alice secret
//! xtreamview categories -t live
//! xtreamview channels 12 --search news
//! xtreamview play 1043 -C 12
//! xtreamview status --json
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xtreamview::cli::{Cli, Command, ExitCode, Output};
use xtreamview::commands::{self, Context};
use xtreamview::config::Config;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    init_tracing(&cli, &config);

    let exit_code = run_cli(cli, config).await;
    std::process::exit(exit_code.into());
}

/// Log to stderr so stdout stays clean for command output
fn init_tracing(cli: &Cli, config: &Config) {
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("xtreamview=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.log_filter().into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli, config: Config) -> ExitCode {
    let output = Output::new(&cli);
    let ctx = Context::new(config);

    match cli.command {
        Command::Login(cmd) => commands::login_cmd(cmd, &ctx, &output).await,
        Command::Logout => commands::logout_cmd(&ctx, &output),
        Command::Status => commands::status_cmd(&output),

        Command::Categories(cmd) => commands::categories_cmd(cmd, &ctx, &output).await,
        Command::Channels(cmd) => commands::channels_cmd(cmd, &ctx, &output).await,
        Command::Epg(cmd) => commands::epg_cmd(cmd, &ctx, &output).await,

        Command::Url(cmd) => commands::url_cmd(cmd, &ctx, &output).await,
        Command::Play(cmd) => commands::play_cmd(cmd, &ctx, &output).await,
    }
}
