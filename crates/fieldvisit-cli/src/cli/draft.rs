//! Draft CLI subcommands.
//!
//! Operator access to the same operations the wizard uses: full saves,
//! merges, attachments, deletion, the expiry sweep, autosave replay and
//! submission finalization.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde::Deserialize;

use fieldvisit_core::service::autosave::{AutosaveCoordinator, DraftWriter};
use fieldvisit_core::tree::{blobs, merge, path};
use fieldvisit_infra::config::resolve_max_age_days;
use fieldvisit_infra::filesystem::detect_mime;
use fieldvisit_infra::filesystem::uploader::DirectoryUploader;
use fieldvisit_types::draft::{
    DraftId, DraftKind, DraftPatch, DraftSummary, SaveDraftRequest, SaveOutcome,
};
use fieldvisit_types::error::{DraftError, DraftWarning};
use fieldvisit_types::form::{Attachment, FormValue};

use crate::state::{AppState, ConcreteDraftService};

/// Draft subcommands.
#[derive(Subcommand)]
pub enum DraftCommand {
    /// Show a draft with its attachments summarized.
    Show {
        /// Farm identifier.
        farm: String,
        /// User identifier.
        user: String,
    },

    /// List all drafts, most recently updated first.
    #[command(alias = "ls")]
    List,

    /// Save a full form tree, replacing the draft's content.
    Save {
        farm: String,
        user: String,

        /// JSON file holding the form tree. Attachments use the
        /// {"$attachment": {...}} form.
        #[arg(long)]
        file: PathBuf,

        /// Wizard step to record (defaults to the stored step, or 0).
        #[arg(long)]
        step: Option<u32>,

        /// Draft kind: diagnostic or field_visit.
        #[arg(long)]
        kind: Option<DraftKind>,
    },

    /// Merge a partial tree into the stored draft.
    Merge {
        farm: String,
        user: String,

        /// JSON file holding the partial tree.
        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        step: Option<u32>,

        #[arg(long)]
        kind: Option<DraftKind>,
    },

    /// Attach a file at a path in the form tree (e.g. step3.photo).
    Attach {
        farm: String,
        user: String,

        /// Tree path such as `step3.photo` or `plots[0].image`.
        path: String,

        /// File to attach.
        file: PathBuf,

        /// Override the MIME type detected from the extension.
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Delete a draft and all of its attachments.
    #[command(alias = "rm")]
    Delete { farm: String, user: String },

    /// Delete drafts not updated within the expiry window.
    Sweep {
        /// Override `draft_max_age_days` from config.toml.
        #[arg(long)]
        max_age_days: Option<u32>,
    },

    /// Feed a JSON Lines file of edit events through the autosave
    /// coordinator, as the wizard would.
    Replay {
        farm: String,
        user: String,

        /// One event per line: {"form": {...}, "step": N}.
        events: PathBuf,

        /// Delay between events, in milliseconds.
        #[arg(long, default_value = "100")]
        gap_ms: u64,
    },

    /// Replace every attachment with a file:// reference to a copy in
    /// `--upload-dir`.
    Finalize {
        farm: String,
        user: String,

        #[arg(long)]
        upload_dir: PathBuf,

        /// Delete the draft afterwards, as a successful submission would.
        #[arg(long)]
        submit: bool,
    },
}

/// Handle a draft subcommand.
pub async fn handle_draft_command(cmd: DraftCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        DraftCommand::Show { farm, user } => show_draft(state, &draft_id(&farm, &user)?, json).await,
        DraftCommand::List => list_drafts(state, json).await,
        DraftCommand::Save {
            farm,
            user,
            file,
            step,
            kind,
        } => save_draft(state, &draft_id(&farm, &user)?, &file, step, kind, json).await,
        DraftCommand::Merge {
            farm,
            user,
            file,
            step,
            kind,
        } => merge_draft(state, &draft_id(&farm, &user)?, &file, step, kind, json).await,
        DraftCommand::Attach {
            farm,
            user,
            path,
            file,
            content_type,
        } => {
            attach_file(
                state,
                &draft_id(&farm, &user)?,
                &path,
                &file,
                content_type,
                json,
            )
            .await
        }
        DraftCommand::Delete { farm, user } => {
            delete_draft(state, &draft_id(&farm, &user)?, json).await
        }
        DraftCommand::Sweep { max_age_days } => sweep_drafts(state, max_age_days, json).await,
        DraftCommand::Replay {
            farm,
            user,
            events,
            gap_ms,
        } => replay_events(state, draft_id(&farm, &user)?, &events, gap_ms, json).await,
        DraftCommand::Finalize {
            farm,
            user,
            upload_dir,
            submit,
        } => finalize_draft(state, &draft_id(&farm, &user)?, &upload_dir, submit, json).await,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn draft_id(farm: &str, user: &str) -> Result<DraftId> {
    DraftId::new(farm, user).with_context(|| format!("Invalid draft key '{farm}' / '{user}'"))
}

async fn read_tree_file(file: &Path) -> Result<FormValue> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;
    Ok(FormValue::from(value))
}

/// JSON view of a tree with attachment payloads replaced by a short label.
fn preview_tree(tree: &FormValue) -> serde_json::Value {
    match tree {
        FormValue::Attachment(attachment) => serde_json::Value::String(describe_attachment(attachment)),
        FormValue::Array(items) => serde_json::Value::Array(items.iter().map(preview_tree).collect()),
        FormValue::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(key, child)| (key.clone(), preview_tree(child)))
                .collect(),
        ),
        scalar => scalar.to_json(),
    }
}

fn describe_attachment(attachment: &Attachment) -> String {
    match &attachment.file_name {
        Some(name) => format!(
            "<attachment {} {}, {} bytes>",
            attachment.content_type,
            name,
            attachment.size_bytes()
        ),
        None => format!(
            "<attachment {}, {} bytes>",
            attachment.content_type,
            attachment.size_bytes()
        ),
    }
}

fn warning_strings(warnings: &[DraftWarning]) -> Vec<String> {
    warnings.iter().map(ToString::to_string).collect()
}

fn print_warnings(warnings: &[DraftWarning]) {
    for warning in warnings {
        eprintln!("  {} {}", style("!").yellow().bold(), style(warning).yellow());
    }
}

fn print_outcome(verb: &str, outcome: &SaveOutcome, json: bool) -> Result<()> {
    let summary = DraftSummary::from(&outcome.draft);

    if json {
        let result = serde_json::json!({
            "draft": summary,
            "warnings": warning_strings(&outcome.warnings),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} '{}' (step {}, {}% complete, {} attachment(s))",
        style("ok").green(),
        verb,
        style(&summary.draft_id).cyan(),
        summary.current_step,
        summary.completeness,
        summary.attachment_count,
    );
    print_warnings(&outcome.warnings);
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn show_draft(state: &AppState, id: &DraftId, json: bool) -> Result<()> {
    let Some(draft) = state.draft_service.load(id).await? else {
        if json {
            println!("{}", serde_json::json!({ "draft": null, "draftId": id }));
        } else {
            println!();
            println!("  {} No draft for '{}'.", style("i").blue().bold(), style(id).cyan());
            println!();
        }
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&draft)?);
        return Ok(());
    }

    println!();
    println!("  {} {}", style("Draft").bold(), style(&draft.draft_id).cyan().bold());
    println!();
    println!("  Kind:         {}", draft.kind);
    println!("  Step:         {}", style(draft.current_step).bold());
    println!("  Completeness: {}%", style(draft.completeness).bold());
    println!("  Attachments:  {}", draft.attachment_count);
    println!(
        "  Created:      {}",
        style(draft.created_at.format("%Y-%m-%d %H:%M:%S UTC")).dim()
    );
    println!(
        "  Updated:      {}",
        style(draft.updated_at.format("%Y-%m-%d %H:%M:%S UTC")).dim()
    );
    println!();
    println!("  {}", style("── Form ──").dim());
    for line in serde_json::to_string_pretty(&preview_tree(&draft.form_tree))?.lines() {
        println!("  {line}");
    }
    println!();
    Ok(())
}

async fn list_drafts(state: &AppState, json: bool) -> Result<()> {
    let drafts = state.draft_service.list().await?;

    if json {
        let result = serde_json::json!({
            "drafts": drafts,
            "count": drafts.len(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if drafts.is_empty() {
        println!();
        println!("  {} No drafts.", style("i").blue().bold());
        println!("     Start one with: fvisit draft save <farm> <user> --file <tree.json>");
        println!();
        return Ok(());
    }

    println!();
    println!("  Drafts ({} total)", drafts.len());
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Draft").fg(Color::White),
        Cell::new("Kind").fg(Color::White),
        Cell::new("Step").fg(Color::White),
        Cell::new("Complete").fg(Color::White),
        Cell::new("Attachments").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for draft in &drafts {
        let completeness_color = match draft.completeness {
            0..=33 => Color::Red,
            34..=66 => Color::Yellow,
            _ => Color::Green,
        };
        table.add_row(vec![
            Cell::new(&draft.draft_id).fg(Color::Cyan),
            Cell::new(draft.kind),
            Cell::new(draft.current_step),
            Cell::new(format!("{}%", draft.completeness)).fg(completeness_color),
            Cell::new(draft.attachment_count),
            Cell::new(draft.updated_at.format("%Y-%m-%d %H:%M")).fg(Color::DarkGrey),
        ]);
    }

    println!("{table}");
    println!();
    Ok(())
}

async fn save_draft(
    state: &AppState,
    id: &DraftId,
    file: &Path,
    step: Option<u32>,
    kind: Option<DraftKind>,
    json: bool,
) -> Result<()> {
    let form_tree = read_tree_file(file).await?;
    let existing = state.draft_service.load(id).await?;

    let request = SaveDraftRequest {
        form_tree,
        current_step: step
            .or_else(|| existing.as_ref().map(|d| d.current_step))
            .unwrap_or(0),
        kind: kind
            .or_else(|| existing.as_ref().map(|d| d.kind))
            .unwrap_or_default(),
    };

    let outcome = state.draft_service.save(id, request).await?;
    print_outcome("Saved", &outcome, json)
}

async fn merge_draft(
    state: &AppState,
    id: &DraftId,
    file: &Path,
    step: Option<u32>,
    kind: Option<DraftKind>,
    json: bool,
) -> Result<()> {
    let form = read_tree_file(file).await?;
    let patch = DraftPatch {
        form,
        current_step: step,
        kind,
    };

    let outcome = state.draft_service.merge_into(id, patch).await?;
    print_outcome("Merged into", &outcome, json)
}

/// Install the file at `at` in the full stored tree and save it.
///
/// Goes through a full save rather than a merge so that array paths keep
/// their sibling elements.
async fn attach_file(
    state: &AppState,
    id: &DraftId,
    at: &str,
    file: &Path,
    content_type: Option<String>,
    json: bool,
) -> Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    let content_type = content_type.unwrap_or_else(|| detect_mime(&file_name));
    let attachment = Attachment::new(content_type, data).with_file_name(file_name);

    let existing = state.draft_service.load(id).await?;
    let (mut tree, current_step, kind) = match existing {
        Some(draft) => (draft.form_tree, draft.current_step, draft.kind),
        None => (FormValue::object(), 0, DraftKind::default()),
    };

    path::set(&mut tree, at, attachment.into())
        .with_context(|| format!("Cannot attach at '{at}'"))?;

    let outcome = state
        .draft_service
        .save(
            id,
            SaveDraftRequest {
                form_tree: tree,
                current_step,
                kind,
            },
        )
        .await?;
    print_outcome("Attached to", &outcome, json)
}

async fn delete_draft(state: &AppState, id: &DraftId, json: bool) -> Result<()> {
    let existed = state.draft_service.delete(id).await?;

    if json {
        let result = serde_json::json!({ "deleted": existed, "draftId": id });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if existed {
        println!();
        println!("  {} Deleted draft '{}'", style("ok").green(), style(id).cyan());
        println!();
    } else {
        println!();
        println!("  {} No draft for '{}'.", style("i").blue().bold(), style(id).cyan());
        println!();
    }
    Ok(())
}

async fn sweep_drafts(state: &AppState, max_age_days: Option<u32>, json: bool) -> Result<()> {
    let days = resolve_max_age_days(&state.config, max_age_days);
    let removed = state.draft_service.sweep_expired(days).await?;

    if json {
        let result = serde_json::json!({
            "removed": removed,
            "maxAgeDays": days,
            "removedOnStart": state.swept_on_start,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        println!(
            "  {} Removed {} draft(s) older than {} day(s)",
            style("ok").green(),
            style(removed + state.swept_on_start).bold(),
            days,
        );
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// One recorded wizard edit.
#[derive(Debug, Deserialize)]
struct ReplayEvent {
    form: serde_json::Value,
    #[serde(default)]
    step: Option<u32>,
}

fn parse_events(content: &str) -> Result<Vec<ReplayEvent>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid event on line {}", index + 1))
        })
        .collect()
}

/// Forwards coalesced writes to the draft service and counts them.
struct CountingWriter {
    service: Arc<ConcreteDraftService>,
    writes: AtomicUsize,
}

impl DraftWriter for CountingWriter {
    async fn write_patch(
        &self,
        draft_id: &DraftId,
        patch: DraftPatch,
    ) -> Result<SaveOutcome, DraftError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.service.merge_into(draft_id, patch).await
    }
}

/// Replay edit events through the autosave coordinator.
///
/// Like the wizard, each event is folded into an in-memory tree and the
/// coordinator is handed a producer for that tree, so only the latest state
/// in each quiescence window is written.
async fn replay_events(
    state: &AppState,
    id: DraftId,
    events_file: &Path,
    gap_ms: u64,
    json: bool,
) -> Result<()> {
    let content = tokio::fs::read_to_string(events_file)
        .await
        .with_context(|| format!("Failed to read {}", events_file.display()))?;
    let events = parse_events(&content)?;
    if events.is_empty() {
        bail!("{} contains no events", events_file.display());
    }

    let writer = Arc::new(CountingWriter {
        service: Arc::clone(&state.draft_service),
        writes: AtomicUsize::new(0),
    });
    let coordinator = AutosaveCoordinator::from_config(Arc::clone(&writer), &state.config);

    let mut tree = FormValue::object();
    let mut step = None;
    for (index, event) in events.iter().enumerate() {
        merge::merge_into(&mut tree, FormValue::from(event.form.clone()));
        step = event.step.or(step);

        let patch = DraftPatch {
            form: tree.clone(),
            current_step: step,
            kind: None,
        };
        coordinator.schedule(id.clone(), move || patch);

        if index + 1 < events.len() {
            tokio::time::sleep(Duration::from_millis(gap_ms)).await;
        }
    }

    let last = coordinator.flush(&id).await.transpose()?;
    let writes = writer.writes.load(Ordering::SeqCst);
    let draft = match last {
        Some(outcome) => Some(outcome.draft),
        None => state.draft_service.load(&id).await?,
    };

    if json {
        let result = serde_json::json!({
            "events": events.len(),
            "writes": writes,
            "windowMs": coordinator.window().as_millis() as u64,
            "draft": draft.as_ref().map(DraftSummary::from),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        println!(
            "  {} Replayed {} event(s) into {} write(s) (window {} ms)",
            style("ok").green(),
            events.len(),
            style(writes).bold(),
            coordinator.window().as_millis(),
        );
        if let Some(draft) = &draft {
            println!(
                "     '{}' is at step {}, {}% complete",
                style(&draft.draft_id).cyan(),
                draft.current_step,
                draft.completeness,
            );
        }
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Finalize
// ---------------------------------------------------------------------------

async fn finalize_draft(
    state: &AppState,
    id: &DraftId,
    upload_dir: &Path,
    submit: bool,
    json: bool,
) -> Result<()> {
    let before = state
        .draft_service
        .load(id)
        .await?
        .with_context(|| format!("No draft for '{id}'"))?;

    let uploader = DirectoryUploader::new(upload_dir);
    let outcome = state
        .draft_service
        .finalize_attachments(id, &uploader)
        .await?
        .with_context(|| format!("No draft for '{id}'"))?;

    let uploaded = blobs::count_attachments(&before.form_tree);
    let deleted = if submit {
        state.draft_service.delete(id).await?
    } else {
        false
    };

    if json {
        let result = serde_json::json!({
            "draftId": id,
            "uploaded": uploaded,
            "formTree": outcome.draft.form_tree,
            "deleted": deleted,
            "warnings": warning_strings(&outcome.warnings),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Finalized '{}': {} attachment(s) uploaded to {}",
        style("ok").green(),
        style(id).cyan(),
        uploaded,
        style(upload_dir.display()).dim(),
    );
    if deleted {
        println!("     Draft submitted and deleted.");
    }
    print_warnings(&outcome.warnings);
    println!();
    Ok(())
}
