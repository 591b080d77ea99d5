//! Interactive console loop.
//!
//! Free-text lines become chat turns; a few local commands are handled
//! without touching the API. `quit` ends the session.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::agent::{chat, AnthropicClient, AuthManager, Conversation, ToolRegistry};
use crate::mcp::StdioMcpClient;
use crate::storage::TokenStore;

/// A parsed console input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Terminate the session.
    Quit,
    /// Print the command summary.
    Help,
    /// List the discovered MCP tools.
    Tools,
    /// Reset the conversation transcript.
    Clear,
    /// Delete the token file and re-run the login flow.
    Logout,
    /// Anything else: a query for the model.
    Query(String),
    /// Blank line.
    Empty,
}

/// Parse one input line. Commands are single words, case-insensitive.
pub fn parse(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Command::Empty;
    }
    match trimmed.to_lowercase().as_str() {
        "quit" | "exit" => Command::Quit,
        "help" => Command::Help,
        "tools" => Command::Tools,
        "clear" => Command::Clear,
        "logout" => Command::Logout,
        _ => Command::Query(trimmed.to_string()),
    }
}

pub struct Console {
    pub mcp: Arc<StdioMcpClient>,
    pub registry: Arc<ToolRegistry>,
    pub llm: AnthropicClient,
    pub conversation: Conversation,
    pub auth: AuthManager,
    pub tokens: TokenStore,
}

impl Console {
    /// Run the interactive loop until `quit` or EOF.
    pub async fn run(&mut self) {
        println!(
            "Connected with {} tool(s). Type 'help' for commands, 'quit' to exit.",
            self.registry.count()
        );

        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        loop {
            print!("you> ");
            let _ = std::io::stdout().flush();

            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break, // EOF
                Err(e) => {
                    tracing::error!("Failed to read input: {}", e);
                    break;
                }
            };

            match parse(&line) {
                Command::Empty => continue,
                Command::Quit => break,
                Command::Help => self.print_help(),
                Command::Tools => self.print_tools(),
                Command::Clear => {
                    self.conversation.clear();
                    println!("Conversation cleared.");
                }
                Command::Logout => self.logout().await,
                Command::Query(query) => self.query(&query).await,
            }
        }

        println!("Bye.");
    }

    async fn query(&mut self, input: &str) {
        match chat::run_turn(&self.llm, &self.registry, &mut self.conversation, input).await {
            Ok(outcome) => {
                if outcome.tool_calls > 0 {
                    tracing::debug!("Turn used {} tool call(s)", outcome.tool_calls);
                }
                if outcome.text.is_empty() {
                    println!("(no text response)");
                } else {
                    println!("{}", outcome.text);
                }
            }
            Err(e) => println!("Error: {}", e),
        }
    }

    async fn logout(&mut self) {
        match self.tokens.clear() {
            Ok(true) => println!("Removed token file {}", self.tokens.path().display()),
            Ok(false) => println!("No token file at {}", self.tokens.path().display()),
            Err(e) => {
                println!("Could not remove token file: {}", e);
                return;
            }
        }

        if let Err(e) = self.auth.ensure_authenticated(&self.mcp).await {
            println!("Re-authentication failed: {}", e);
        }
    }

    fn print_help(&self) {
        println!(
            r#"Commands:
  help    - show this message
  tools   - list the tools exposed by the MCP server
  clear   - start a fresh conversation
  logout  - remove the persisted token and sign in again
  quit    - exit (also: exit)

Anything else is sent to the assistant."#
        );
    }

    fn print_tools(&self) {
        let tools = self.registry.list();
        if tools.is_empty() {
            println!("No tools discovered.");
            return;
        }
        for tool in tools {
            if tool.description.is_empty() {
                println!("  {}", tool.name);
            } else {
                println!("  {} - {}", tool.name, tool.description);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sentinels() {
        assert_eq!(parse("quit"), Command::Quit);
        assert_eq!(parse("  QUIT  "), Command::Quit);
        assert_eq!(parse("exit"), Command::Quit);
        assert_eq!(parse(""), Command::Empty);
        assert_eq!(parse("   "), Command::Empty);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("help"), Command::Help);
        assert_eq!(parse("Tools"), Command::Tools);
        assert_eq!(parse("clear"), Command::Clear);
        assert_eq!(parse("logout"), Command::Logout);
    }

    #[test]
    fn test_parse_query() {
        assert_eq!(
            parse("show my unread mail"),
            Command::Query("show my unread mail".to_string())
        );
        // A sentence starting with a command word is still a query
        assert_eq!(
            parse("help me draft a reply"),
            Command::Query("help me draft a reply".to_string())
        );
    }
}
