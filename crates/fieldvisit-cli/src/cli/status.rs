//! Draft store status dashboard.

use anyhow::Result;
use console::style;

use fieldvisit_infra::sqlite::pool::DATABASE_FILE;
use fieldvisit_types::draft::{DraftKind, DraftSummary};

use crate::state::AppState;

/// Aggregate figures over the stored drafts.
#[derive(Debug, PartialEq)]
struct DraftStats {
    total: usize,
    diagnostic: usize,
    field_visit: usize,
    attachments: u64,
    average_completeness: u8,
}

fn draft_stats(drafts: &[DraftSummary]) -> DraftStats {
    let diagnostic = drafts
        .iter()
        .filter(|d| d.kind == DraftKind::Diagnostic)
        .count();
    let attachments = drafts.iter().map(|d| u64::from(d.attachment_count)).sum();
    let completeness_sum: u64 = drafts.iter().map(|d| u64::from(d.completeness)).sum();
    let average_completeness = if drafts.is_empty() {
        0
    } else {
        (completeness_sum / drafts.len() as u64) as u8
    };

    DraftStats {
        total: drafts.len(),
        diagnostic,
        field_visit: drafts.len() - diagnostic,
        attachments,
        average_completeness,
    }
}

/// Display the status dashboard: draft counts, attachments, config and
/// storage location.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let drafts = state.draft_service.list().await?;
    let stats = draft_stats(&drafts);
    let db_path = state.data_dir.join(DATABASE_FILE);
    let db_bytes = tokio::fs::metadata(&db_path)
        .await
        .map(|m| m.len())
        .unwrap_or(0);

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "drafts": {
                "total": stats.total,
                "diagnostic": stats.diagnostic,
                "field_visit": stats.field_visit,
                "attachments": stats.attachments,
                "average_completeness": stats.average_completeness,
                "swept_on_start": state.swept_on_start,
            },
            "config": state.config,
            "database_bytes": db_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!("  {} fvisit v{}", style("▣").bold(), env!("CARGO_PKG_VERSION"));
    println!();

    println!("  {}", style("── Drafts ──").dim());
    println!("  Total:        {}", style(stats.total).bold());
    println!("  Diagnostic:   {}", stats.diagnostic);
    println!("  Field visit:  {}", stats.field_visit);
    println!("  Attachments:  {}", stats.attachments);
    println!("  Avg complete: {}%", stats.average_completeness);
    if state.swept_on_start > 0 {
        println!(
            "  Expired:      {} removed on startup",
            style(state.swept_on_start).yellow()
        );
    }
    println!();

    println!("  {}", style("── Config ──").dim());
    println!("  Autosave window: {} ms", state.config.autosave_quiescence_ms);
    println!("  Draft expiry:    {} days", state.config.draft_max_age_days);
    println!(
        "  Attachment cap:  {} per file, {} per draft",
        format_bytes(state.config.max_attachment_bytes),
        format_bytes(state.config.max_draft_attachment_bytes)
    );
    println!();

    println!("  {}", style("── System ──").dim());
    println!("  Data dir: {}", style(state.data_dir.display()).dim());
    println!(
        "  Database: {} ({})",
        style("SQLite (WAL mode)").dim(),
        format_bytes(db_bytes)
    );
    println!();

    Ok(())
}

/// Format a byte count with a binary unit suffix.
fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
