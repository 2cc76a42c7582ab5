use clap::{Arg, ArgAction, Command};
use std::io::Write;

pub fn build_cli() -> Command {
    Command::new("review-mcp")
        .about("GitLab and Gerrit code review MCP server (stdio JSON-RPC)")
        .disable_version_flag(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .num_args(1)
                .help("Log filter (e.g., info, debug); overrides LOG_LEVEL and DEBUG"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Shorthand for --log-level debug")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .help("Print version and exit")
                .action(ArgAction::SetTrue),
        )
}

/// Logs go to stderr; stdout carries JSON-RPC only.
pub fn init_logging(level: &str) {
    env_logger::Builder::new()
        .parse_filters(level)
        .target(env_logger::Target::Stderr)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
