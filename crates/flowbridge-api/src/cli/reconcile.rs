//! `flowbridge reconcile`: run one cycle (or preview it) from the command line.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use flowbridge_core::reconcile::{CycleOutcome, ListenerMutation, ReconcilePlan};

use crate::state::AppState;

pub async fn reconcile(state: &AppState, dry_run: bool, json: bool) -> Result<()> {
    if dry_run {
        let plan = state.reconciler.preview().await?;
        return print_plan(plan.as_ref(), json);
    }

    let outcome = state.reconciler.run_cycle().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        CycleOutcome::Disabled => {
            println!();
            println!("  {} Application is disabled, nothing reconciled.", style("i").blue().bold());
            println!();
        }
        CycleOutcome::Converged(report) => {
            println!();
            let mark = if report.failed == 0 {
                style("✓").green().bold()
            } else {
                style("!").yellow().bold()
            };
            println!(
                "  {} Reconciled: {} created, {} updated, {} deleted, {} failed",
                mark,
                style(report.created).bold(),
                style(report.updated).bold(),
                style(report.deleted).bold(),
                if report.failed == 0 {
                    style(report.failed).dim()
                } else {
                    style(report.failed).red().bold()
                },
            );
            println!();
        }
    }

    Ok(())
}

fn print_plan(plan: Option<&ReconcilePlan>, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "plan": plan }))?);
        return Ok(());
    }

    let Some(plan) = plan else {
        println!();
        println!("  {} Application is disabled, no plan computed.", style("i").blue().bold());
        println!();
        return Ok(());
    };

    if plan.is_empty() {
        println!();
        println!("  {} Listeners are already in sync.", style("✓").green().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Action").fg(Color::White),
        Cell::new("Id").fg(Color::White),
        Cell::new("Event").fg(Color::White),
        Cell::new("URI").fg(Color::White),
    ]);

    for mutation in &plan.mutations {
        let (action, color, id) = match mutation {
            ListenerMutation::Create { .. } => ("create", Color::Green, String::new()),
            ListenerMutation::Update { id, .. } => ("update", Color::Yellow, id.to_string()),
            ListenerMutation::Delete { id, .. } => ("delete", Color::Red, id.to_string()),
        };
        table.add_row(vec![
            Cell::new(action).fg(color),
            Cell::new(id).fg(Color::DarkGrey),
            Cell::new(mutation.event()).fg(Color::Cyan),
            Cell::new(mutation.uri()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} create, {} update, {} delete {}",
        style(plan.creates()).bold(),
        style(plan.updates()).bold(),
        style(plan.deletes()).bold(),
        style("(dry run, nothing applied)").dim()
    );
    println!();
    Ok(())
}
