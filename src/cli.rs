//! CLI argument handling.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "mailclaw")]
#[command(about = "Console client for an Outlook MCP server backed by the Anthropic API")]
#[command(version)]
pub struct Cli {
    /// Path to the Outlook MCP server script (or an executable server)
    pub server: PathBuf,

    /// Model to use for chat completions (overrides MAILCLAW_MODEL)
    #[arg(long)]
    pub model: Option<String>,

    /// Skip the authentication check on startup
    #[arg(long)]
    pub skip_auth: bool,

    /// Never open a browser; print the login URL instead
    #[arg(long)]
    pub no_browser: bool,

    /// Single message mode - send one message and exit
    #[arg(short, long)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let cli = Cli::parse_from(["mailclaw", "server/outlook-mcp.py"]);
        assert_eq!(cli.server, PathBuf::from("server/outlook-mcp.py"));
        assert!(!cli.skip_auth);
        assert!(!cli.no_browser);
        assert!(cli.message.is_none());
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from([
            "mailclaw",
            "--skip-auth",
            "--no-browser",
            "-m",
            "list my unread mail",
            "server.js",
        ]);
        assert!(cli.skip_auth);
        assert!(cli.no_browser);
        assert_eq!(cli.message.as_deref(), Some("list my unread mail"));
    }
}
