// `docket setup`: show or edit the client config file.

use std::path::Path;

use anyhow::Context as _;
use clap::Args;

use super::Context;
use crate::config::{client_config_path, ClientConfig};
use crate::output;

#[derive(Debug, Args)]
pub struct SetupArgs {
    /// Server to talk to, e.g. `http://localhost:8080`.
    #[arg(long)]
    pub server_url: Option<String>,

    /// Quiet period after the last edit before `watch` auto-saves.
    #[arg(long)]
    pub autosave_debounce_ms: Option<u64>,

    /// Minimum spacing between auto-saves.
    #[arg(long)]
    pub autosave_min_interval_secs: Option<u64>,
}

pub fn run(args: SetupArgs, ctx: &Context) -> anyhow::Result<()> {
    let path = client_config_path().context("cannot locate the home directory")?;
    let config = apply(&path, &args)?;
    output::print_output(ctx.format, &config, |c| {
        format!(
            "{}\n  server_url: {}\n  autosave: {} ms debounce, {} s apart\n  timeout: {} s",
            path.display(),
            c.server_url,
            c.autosave_debounce_ms,
            c.autosave_min_interval_secs,
            c.request_timeout_secs
        )
    })?;
    Ok(())
}

/// Apply the given overrides to the file at `path`. Without overrides the
/// file is only read (missing means defaults).
pub fn apply(path: &Path, args: &SetupArgs) -> anyhow::Result<ClientConfig> {
    let mut config = if path.exists() {
        ClientConfig::load_from(path)
            .with_context(|| format!("failed to read {}", path.display()))?
    } else {
        ClientConfig::default()
    };

    let mut changed = false;
    if let Some(server_url) = &args.server_url {
        url::Url::parse(server_url).with_context(|| format!("invalid server url `{server_url}`"))?;
        config.server_url = server_url.clone();
        changed = true;
    }
    if let Some(debounce) = args.autosave_debounce_ms {
        config.autosave_debounce_ms = debounce;
        changed = true;
    }
    if let Some(interval) = args.autosave_min_interval_secs {
        config.autosave_min_interval_secs = interval;
        changed = true;
    }

    if changed {
        config.save_to(path).with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(config)
}
