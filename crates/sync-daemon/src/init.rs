//! Interactive first-run setup.

use crate::config::{Config, ConfigStore};
use crate::http::request_token;
use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Input, Password};
use tracing::info;

/// Answers collected by the prompts.
#[derive(Debug, Clone)]
struct Answers {
    sync_root: String,
    server_url: String,
    email: String,
    password: String,
}

fn prompt(existing: &Config) -> Result<Answers> {
    let theme = ColorfulTheme::default();

    let mut root_prompt =
        Input::<String>::with_theme(&theme).with_prompt("Sync root path (e.g. ~/my-docs)");
    if !existing.sync_root.is_empty() {
        root_prompt = root_prompt.default(existing.sync_root.clone());
    }
    let sync_root = root_prompt.interact_text()?;

    let mut server_prompt =
        Input::<String>::with_theme(&theme).with_prompt("Server URL (e.g. https://app.example.com)");
    if !existing.server_url.is_empty() {
        server_prompt = server_prompt.default(existing.server_url.clone());
    }
    let server_url = server_prompt.interact_text()?;

    let email: String = Input::with_theme(&theme)
        .with_prompt("Email")
        .interact_text()?;
    let password = Password::with_theme(&theme)
        .with_prompt("Password")
        .interact()?;

    Ok(Answers {
        sync_root: sync_root.trim().to_string(),
        server_url: server_url.trim().to_string(),
        email: email.trim().to_string(),
        password,
    })
}

/// Prompt for settings, exchange the credentials for a token and save.
pub async fn run_init(store: &mut ConfigStore) -> Result<()> {
    let existing = store.config().clone();
    let answers = tokio::task::spawn_blocking(move || prompt(&existing))
        .await
        .context("Prompt task failed")??;

    if answers.sync_root.is_empty() || answers.server_url.is_empty() {
        bail!("Sync root and server URL are required");
    }
    if answers.email.is_empty() {
        bail!("Email is required");
    }
    if answers.password.is_empty() {
        bail!("Password is required");
    }

    let path = store.path().display().to_string();
    let root_changed = store.config().sync_root != answers.sync_root;

    println!("Authenticating...");
    let token = request_token(&answers.server_url, &answers.email, &answers.password)
        .await
        .context("Authentication failed")?;

    store
        .update(|config| {
            config.sync_root = answers.sync_root;
            config.server_url = answers.server_url;
            config.auth_token = token;
            if root_changed {
                // A new root starts from a full fetch
                config.last_sync_at = None;
            }
        })
        .with_context(|| format!("Failed to save {}", path))?;

    std::fs::create_dir_all(store.config().sync_root_path())
        .context("Failed to create sync root")?;

    info!("Config saved to {}", path);
    println!("Config saved successfully.");
    Ok(())
}
