//! constraintsd - constraint compiler service
//!
//! Reads one request per line on stdin and answers on stdout:
//!
//! - `ping` → `pong`
//! - a JSON compilation request → `success`, `error`, or `panic`, each
//!   followed by one payload line
//!
//! Logs go to stderr. The process exits 0 when stdin closes and 1 when the
//! request loop fails.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use constraints_core::{run_guarded, RequestHandler, SandboxConfig, ServiceState, METRICS};
use tokio::io::BufReader;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "constraintsd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sandboxed constraint compiler over a stdin/stdout line protocol", long_about = None)]
struct Cli {
    /// Directory holding `libs/` and `compiler.toml`
    #[arg(long, env = "CONSTRAINTS_DSL_COMPILER_ROOT")]
    root: PathBuf,

    /// Wall-clock limit for compiling and running one snippet
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    constraints_core::init_tracing(cli.json, level);

    let sandbox = SandboxConfig::with_timeout_ms(cli.timeout_ms).context("Invalid --timeout-ms")?;
    let state = ServiceState::load(&cli.root, sandbox)
        .with_context(|| format!("Failed to load compiler root {}", cli.root.display()))?;
    let handler = RequestHandler::new(Arc::new(state));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    tracing::info!(root = %cli.root.display(), "constraintsd ready");
    let outcome = runtime.block_on(run_guarded(
        &handler,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    ));
    METRICS.flush();
    // A blocked stdin read would otherwise hold up shutdown.
    runtime.shutdown_background();

    match outcome.exit_code() {
        0 => Ok(()),
        code => std::process::exit(code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn timeout_defaults_to_ten_seconds() {
        let cli = Cli::try_parse_from(["constraintsd", "--root", "/srv/dsl"]).unwrap();
        assert_eq!(cli.timeout_ms, 10_000);
        assert_eq!(cli.root, PathBuf::from("/srv/dsl"));
        assert!(!cli.json);
    }

    #[test]
    fn root_help_names_required_config() {
        let command = Cli::command();
        let root = command
            .get_arguments()
            .find(|arg| arg.get_id() == "root")
            .unwrap();
        let help = root.get_help().unwrap().to_string();
        assert!(help.contains("compiler.toml"), "{help}");
        assert!(!help.contains("optional"), "{help}");
    }
}
