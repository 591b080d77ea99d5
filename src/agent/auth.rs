//! Outlook authentication orchestration.
//!
//! The MCP server owns the OAuth flow and the persisted tokens; this module
//! drives it from the client side: ask the server whether the user is
//! authenticated, launch the local auth-helper process that serves the
//! redirect, open the login URL in a browser, and poll until the sign-in
//! completes or the timeout elapses.

use std::path::PathBuf;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tokio::process::{Child, Command};

use crate::mcp::{extract_text, StdioMcpClient};
use crate::types::AuthConfig;

/// Helper script expected alongside the MCP server.
const AUTH_HELPER_SCRIPT: &str = "outlook-auth-server.js";

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s]+").expect("valid regex"));

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication timed out after {0}s; complete the sign-in in your browser and try again")]
    Timeout(u64),
}

pub struct AuthManager {
    /// Directory holding the MCP server script and the auth helper.
    server_dir: PathBuf,
    config: AuthConfig,
    helper: Option<Child>,
    /// Credentials mapped into the helper's environment.
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl AuthManager {
    pub fn new(
        server_dir: PathBuf,
        config: AuthConfig,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            server_dir,
            config,
            helper: None,
            client_id,
            client_secret,
        }
    }

    /// Ensure the user is authenticated, driving the login flow if needed.
    pub async fn ensure_authenticated(
        &mut self,
        mcp: &StdioMcpClient,
    ) -> Result<(), AuthError> {
        // 1) Check current status first
        match mcp.call_tool("check-auth-status", serde_json::json!({})).await {
            Ok(result) => {
                let status = extract_text(&result);
                if is_authenticated_text(&status) {
                    println!("Authentication status: {}", status);
                    return Ok(());
                }
                println!(
                    "Authentication status: {}",
                    if status.is_empty() {
                        "Unknown/Not authenticated"
                    } else {
                        status.as_str()
                    }
                );
            }
            Err(e) => tracing::warn!("check-auth-status failed: {}", e),
        }

        // 2) Not authenticated: start the local helper if configured
        if self.config.start_auth_server {
            self.start_helper_if_available().await;
        }

        // 3) Trigger authentication to get the login URL
        match mcp
            .call_tool("authenticate", serde_json::json!({ "force": true }))
            .await
        {
            Ok(result) => {
                let text = extract_text(&result);
                tracing::debug!("authenticate tool response: {}", text);

                match extract_auth_url(&text) {
                    Some(url) => {
                        println!("Opening authentication URL: {}", url);
                        if self.config.browser_open {
                            if let Err(e) = open::that(url) {
                                tracing::debug!("Could not open browser: {}", e);
                                println!("Could not open a browser automatically; please open the URL above yourself.");
                            }
                        }
                    }
                    None => println!(
                        "No authentication URL in the tool response; check the server logs."
                    ),
                }
            }
            Err(e) => tracing::warn!("authenticate tool call failed: {}", e),
        }

        // 4) Poll until authenticated or timeout
        let start = Instant::now();
        while start.elapsed() < self.config.timeout {
            tokio::time::sleep(self.config.poll_interval).await;

            match mcp.call_tool("check-auth-status", serde_json::json!({})).await {
                Ok(result) => {
                    let status = extract_text(&result);
                    if is_authenticated_text(&status) {
                        println!("Authentication completed: {}", status);
                        return Ok(());
                    }
                    println!(
                        "Waiting for authentication... {}",
                        if status.is_empty() {
                            "Not authenticated yet"
                        } else {
                            status.as_str()
                        }
                    );
                }
                Err(e) => tracing::warn!("Auth polling error: {}", e),
            }
        }

        Err(AuthError::Timeout(self.config.timeout.as_secs()))
    }

    /// Spawn the auth helper next to the server script, at most once.
    /// Absence of the script or a spawn failure is not fatal.
    async fn start_helper_if_available(&mut self) {
        if self.helper.is_some() {
            return;
        }

        let helper_path = self.server_dir.join(AUTH_HELPER_SCRIPT);
        if !helper_path.exists() {
            tracing::debug!("No auth helper at {}", helper_path.display());
            return;
        }

        println!("Starting local auth server: {}", helper_path.display());

        let mut cmd = Command::new("node");
        cmd.arg(&helper_path)
            .current_dir(&self.server_dir)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        // The helper expects MS_* names; map the Outlook registration in
        // unless the caller already set them.
        if std::env::var("MS_CLIENT_ID").is_err() {
            cmd.env("MS_CLIENT_ID", self.client_id.as_deref().unwrap_or(""));
        }
        if std::env::var("MS_CLIENT_SECRET").is_err() {
            cmd.env("MS_CLIENT_SECRET", self.client_secret.as_deref().unwrap_or(""));
        }

        match cmd.spawn() {
            Ok(child) => {
                self.helper = Some(child);
                // Give it a moment to bind its port before the browser opens
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            }
            Err(e) => tracing::warn!("Failed to start auth server: {}", e),
        }
    }

    /// Terminate the helper process if running. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut child) = self.helper.take() {
            if let Err(e) = child.start_kill() {
                tracing::debug!("Auth helper already gone: {}", e);
            }
        }
    }
}

impl Drop for AuthManager {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Whether a status text reports an authenticated session. The server says
/// "Authenticated as ..." on success and variants of "Not authenticated"
/// otherwise, so the negative form is rejected explicitly.
pub fn is_authenticated_text(text: &str) -> bool {
    text.contains("Authenticated") && !text.to_lowercase().contains("not authenticated")
}

/// First http(s) URL in the tool response text, if any.
pub fn extract_auth_url(text: &str) -> Option<&str> {
    URL_RE.find(text).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_authenticated_text() {
        assert!(is_authenticated_text("Authenticated as user@example.com"));
        assert!(is_authenticated_text("Status: Authenticated"));
        assert!(!is_authenticated_text("Not authenticated"));
        assert!(!is_authenticated_text("Not Authenticated (no token)"));
        assert!(!is_authenticated_text(""));
        assert!(!is_authenticated_text("please sign in"));
    }

    #[test]
    fn test_extract_auth_url() {
        let text = "Please visit https://login.microsoftonline.com/common/oauth2/v2.0/authorize?client_id=abc to sign in.";
        assert_eq!(
            extract_auth_url(text),
            Some("https://login.microsoftonline.com/common/oauth2/v2.0/authorize?client_id=abc")
        );

        assert_eq!(
            extract_auth_url("go to http://localhost:3333/auth now"),
            Some("http://localhost:3333/auth")
        );

        assert_eq!(extract_auth_url("no url here"), None);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut manager = AuthManager::new(
            PathBuf::from("."),
            AuthConfig::default(),
            None,
            None,
        );
        manager.stop();
        manager.stop();
    }
}
