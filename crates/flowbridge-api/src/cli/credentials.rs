//! `flowbridge credentials`: inspect the credential store.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct CredentialSummary {
    email: String,
    has_token: bool,
    updated_at: chrono::DateTime<chrono::Utc>,
}

/// List stored accounts. Passwords and tokens are never printed.
pub async fn list_credentials(state: &AppState, json: bool) -> Result<()> {
    let store = state.sessions.store();
    let mut entries = Vec::new();
    for email in store.emails().await {
        if let Some(record) = store.get(&email).await {
            entries.push(CredentialSummary {
                email,
                has_token: record.has_token(),
                updated_at: record.updated_at,
            });
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!();
        println!(
            "  {} No accounts provisioned yet. They appear on first visit through {}",
            style("i").blue().bold(),
            style("flowbridge serve").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Account").fg(Color::White),
        Cell::new("Token").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for entry in &entries {
        let token = if entry.has_token {
            Cell::new("cached").fg(Color::Green)
        } else {
            Cell::new("none").fg(Color::DarkGrey)
        };
        let account = if entry.email == state.config.service_account_email {
            Cell::new(format!("{} (service)", entry.email)).fg(Color::Magenta)
        } else {
            Cell::new(&entry.email).fg(Color::Cyan)
        };
        table.add_row(vec![
            account,
            token,
            Cell::new(entry.updated_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} account{}",
        style(entries.len()).bold(),
        if entries.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}
