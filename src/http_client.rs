use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// HTTP client for the anonymous replay phase.
///
/// Certificate validation is off because scan targets routinely sit behind
/// self-signed certificates, and redirects are never followed: a 3xx on
/// replay is a classification signal, not something to chase.
pub fn create_replay_client(timeout_secs: u64, user_agent: &str) -> Client {
    ClientBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(5))
        .gzip(true)
        .brotli(true)
        .use_rustls_tls()
        .danger_accept_invalid_certs(true)
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(user_agent.to_string())
        .build()
        .expect("Failed to build replay client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = create_replay_client(10, "test-agent");
        let _ = client;
    }
}
