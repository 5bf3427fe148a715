// docket CLI entry point.

use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod autosave;
mod commands;
mod config;
mod exit_code;
mod http;
mod output;
mod runner;
mod session;

use config::ClientConfig;
use exit_code::ExitCode;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "docket", about = "Quotations, invoices and production tickets")]
struct Cli {
    /// Server URL. Overrides `server_url` in ~/.docket/client.toml.
    #[arg(long, global = true)]
    server: Option<String>,

    /// Force JSON output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> process::ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let format = OutputFormat::detect(cli.json);
    let mut config = ClientConfig::load();
    if let Some(server) = cli.server {
        config.server_url = server;
    }

    let ctx = commands::Context { config, format };
    match commands::run(cli.command, &ctx) {
        Ok(()) => ExitCode::Success.into(),
        Err(error) => {
            output::print_anyhow_error(format, &error);
            ExitCode::from_error(&error).into()
        }
    }
}

/// Logs go to stderr so stdout stays parseable. `DOCKET_LOG` takes an
/// `EnvFilter` directive, default `warn`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("DOCKET_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
