//! MailClaw Library
//!
//! Core library for the MailClaw console client: launches an external
//! Outlook MCP server, walks the user through the browser login, and relays
//! console queries to the Anthropic Messages API with the server's tools.

pub mod agent;
pub mod app;
pub mod cli;
pub mod console;
pub mod mcp;
pub mod storage;
pub mod types;
