mod cli;

use anyhow::Context;
use review_mcp::config::Config;
use review_mcp::server;

#[tokio::main(flavor = "current_thread")] // one request at a time over stdio
async fn main() -> anyhow::Result<()> {
    let matches = cli::build_cli().get_matches();
    let log_level = matches.get_one::<String>("log-level").cloned();

    if matches.get_flag("version") {
        println!("review-mcp {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let cfg = Config::from_env().context("invalid configuration")?;
    let cli_level = log_level.or_else(|| matches.get_flag("debug").then(|| "debug".to_string()));
    cli::init_logging(&cfg.effective_log_level(cli_level.as_deref()));

    server::run_stdio_server(&cfg).await
}
