use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use scenario::{
    load_scenario, read_scenario, save_scenario, Scenario, ScenarioSummary, ValidateMode,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct CommonOptions {
    pub editor: bool,
    pub json: bool,
    pub apply: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Info { path: String },
    Validate { path: String },
    Uses { path: String, id: String },
    Rename { path: String, old_id: String, new_id: String },
    RenameBatch { path: String, file: String },
    Delete { path: String, id: String },
    Repack { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenameEntry {
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenameBatch {
    pub renames: Vec<RenameEntry>,
}

#[derive(Debug, Serialize)]
struct SectionCount {
    section: &'static str,
    count: usize,
}

#[derive(Debug, Serialize)]
struct UsesReport {
    id: String,
    total: usize,
    sections: Vec<SectionCount>,
}

pub fn run<W: Write>(kind: CommandKind, opts: CommonOptions, stdout: &mut W) -> Result<(), String> {
    match kind {
        CommandKind::Info { path } => run_info(&path, opts, stdout),
        CommandKind::Validate { path } => run_validate(&path, opts, stdout),
        CommandKind::Uses { path, id } => run_uses(&path, &id, opts, stdout),
        CommandKind::Rename {
            path,
            old_id,
            new_id,
        } => run_rename(&path, &old_id, &new_id, opts, stdout),
        CommandKind::RenameBatch { path, file } => run_rename_batch(&path, &file, opts, stdout),
        CommandKind::Delete { path, id } => run_delete(&path, &id, opts, stdout),
        CommandKind::Repack { path } => run_repack(&path, opts, stdout),
    }
}

// Flags are recognized anywhere on the line, before or after the subcommand.
pub fn parse_command(args: &[String]) -> Result<(CommandKind, CommonOptions), String> {
    let mut options = CommonOptions::default();
    let mut words = Vec::with_capacity(args.len());
    for arg in args {
        match arg.as_str() {
            "--editor" => options.editor = true,
            "--json" => options.json = true,
            "--apply" => options.apply = true,
            "--batch" => words.push(arg.as_str()),
            flag if flag.starts_with("--") => return Err(format!("unknown flag '{flag}'")),
            _ => words.push(arg.as_str()),
        }
    }

    let command = *words
        .first()
        .ok_or_else(|| "missing subcommand".to_string())?;
    let command_args = &words[1..];

    let kind = match command {
        "info" => {
            if command_args.len() != 1 {
                return Err("info requires a document path".to_string());
            }
            CommandKind::Info {
                path: command_args[0].to_string(),
            }
        }
        "validate" => {
            if command_args.len() != 1 {
                return Err("validate requires a document path".to_string());
            }
            CommandKind::Validate {
                path: command_args[0].to_string(),
            }
        }
        "uses" => {
            if command_args.len() != 2 {
                return Err("uses requires a document path and an identifier".to_string());
            }
            CommandKind::Uses {
                path: command_args[0].to_string(),
                id: command_args[1].to_string(),
            }
        }
        "rename" => {
            if command_args.len() == 3 && command_args[1] == "--batch" {
                CommandKind::RenameBatch {
                    path: command_args[0].to_string(),
                    file: command_args[2].to_string(),
                }
            } else if command_args.len() == 3 {
                CommandKind::Rename {
                    path: command_args[0].to_string(),
                    old_id: command_args[1].to_string(),
                    new_id: command_args[2].to_string(),
                }
            } else {
                return Err(
                    "rename requires a document path plus an old and new identifier, or --batch <renames.json>"
                        .to_string(),
                );
            }
        }
        "delete" => {
            if command_args.len() != 2 {
                return Err("delete requires a document path and an identifier".to_string());
            }
            CommandKind::Delete {
                path: command_args[0].to_string(),
                id: command_args[1].to_string(),
            }
        }
        "repack" => {
            if command_args.len() != 1 {
                return Err("repack requires a document path".to_string());
            }
            CommandKind::Repack {
                path: command_args[0].to_string(),
            }
        }
        other => return Err(format!("unknown subcommand '{other}'")),
    };

    Ok((kind, options))
}

pub fn parse_rename_batch(raw: &str) -> Result<RenameBatch, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, RenameBatch>(&mut deserializer) {
        Ok(batch) => Ok(batch),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse rename batch json: {source}"))
            } else {
                Err(format!("parse rename batch json at {path}: {source}"))
            }
        }
    }
}

// Info is a read-only report, so it always loads in editor mode and works on
// documents that would fail a strict pass.
fn run_info<W: Write>(path: &str, opts: CommonOptions, stdout: &mut W) -> Result<(), String> {
    let scenario = load_scenario(Path::new(path), ValidateMode::Editor)
        .map_err(|error| format!("failed to load {path}: {error}"))?;
    let summary = ScenarioSummary::capture(&scenario);
    if opts.json {
        let rendered = serde_json::to_string_pretty(&summary)
            .map_err(|error| format!("failed to render summary json: {error}"))?;
        emit(stdout, &rendered)
    } else {
        emit(stdout, &summary.render_human())
    }
}

fn run_validate<W: Write>(path: &str, opts: CommonOptions, stdout: &mut W) -> Result<(), String> {
    let mut scenario =
        read_scenario(Path::new(path)).map_err(|error| format!("failed to read {path}: {error}"))?;
    let errors = scenario.validate_report(validate_mode(opts));
    if errors.is_empty() {
        return emit(stdout, "ok");
    }
    if opts.json {
        let lines = errors.iter().map(ToString::to_string).collect::<Vec<_>>();
        let rendered = serde_json::to_string_pretty(&lines)
            .map_err(|error| format!("failed to render error json: {error}"))?;
        emit(stdout, &rendered)?;
    } else {
        for error in &errors {
            emit(stdout, &format!("error: {error}"))?;
        }
    }
    Err(format!("{} section(s) failed validation", errors.len()))
}

// Pure count mode. Occurrence scanning is textual, so no validation pass is
// needed and the scan works on documents with dangling references.
fn run_uses<W: Write>(
    path: &str,
    id: &str,
    opts: CommonOptions,
    stdout: &mut W,
) -> Result<(), String> {
    let mut scenario =
        read_scenario(Path::new(path)).map_err(|error| format!("failed to read {path}: {error}"))?;
    let counts = scenario.process_identifier_by_section(id, Some(id));
    let total: usize = counts.iter().map(|(_, count)| *count).sum();
    if opts.json {
        let report = UsesReport {
            id: id.to_string(),
            total,
            sections: counts
                .iter()
                .map(|(section, count)| SectionCount {
                    section: section.label(),
                    count: *count,
                })
                .collect(),
        };
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|error| format!("failed to render uses json: {error}"))?;
        emit(stdout, &rendered)
    } else {
        for (section, count) in counts {
            emit(stdout, &format!("{}={count}", section.label()))?;
        }
        emit(stdout, &format!("total={total}"))
    }
}

fn run_rename<W: Write>(
    path: &str,
    old_id: &str,
    new_id: &str,
    opts: CommonOptions,
    stdout: &mut W,
) -> Result<(), String> {
    let mut scenario = load(path, opts)?;
    let counts = scenario.process_identifier_by_section(old_id, Some(old_id));
    let count = scenario
        .rename_definition(old_id, new_id)
        .map_err(|error| error.to_string())?;
    for (section, section_count) in counts {
        emit(stdout, &format!("{}={section_count}", section.label()))?;
    }
    emit(
        stdout,
        &format!("renamed '{old_id}' to '{new_id}': {count} references updated"),
    )?;
    finish(&scenario, path, opts, stdout)
}

fn run_rename_batch<W: Write>(
    path: &str,
    file: &str,
    opts: CommonOptions,
    stdout: &mut W,
) -> Result<(), String> {
    let raw = fs::read_to_string(file).map_err(|error| format!("failed to read {file}: {error}"))?;
    let batch = parse_rename_batch(&raw)?;
    let mut scenario = load(path, opts)?;
    let mut total = 0usize;
    for entry in &batch.renames {
        let count = scenario
            .rename_definition(&entry.old, &entry.new)
            .map_err(|error| format!("rename '{}' to '{}': {error}", entry.old, entry.new))?;
        emit(
            stdout,
            &format!(
                "renamed '{}' to '{}': {count} references updated",
                entry.old, entry.new
            ),
        )?;
        total += count;
    }
    info!(renames = batch.renames.len(), references = total, "batch_renamed");
    finish(&scenario, path, opts, stdout)
}

fn run_delete<W: Write>(
    path: &str,
    id: &str,
    opts: CommonOptions,
    stdout: &mut W,
) -> Result<(), String> {
    let mut scenario = load(path, opts)?;
    let count = scenario
        .delete_definition(id)
        .map_err(|error| error.to_string())?;
    emit(stdout, &format!("deleted '{id}': {count} references removed"))?;
    finish(&scenario, path, opts, stdout)
}

fn run_repack<W: Write>(path: &str, opts: CommonOptions, stdout: &mut W) -> Result<(), String> {
    let mut scenario = load(path, opts)?;
    let before_areas = scenario.areas.len();
    let before_rects = scenario.areas.rect_count();
    scenario
        .repack_areas()
        .map_err(|error| format!("failed to repack areas: {error}"))?;
    emit(
        stdout,
        &format!(
            "repacked {before_areas} areas with {before_rects} rects into {} areas with {} rects",
            scenario.areas.len(),
            scenario.areas.rect_count()
        ),
    )?;
    finish(&scenario, path, opts, stdout)
}

fn validate_mode(opts: CommonOptions) -> ValidateMode {
    if opts.editor {
        ValidateMode::Editor
    } else {
        ValidateMode::Strict
    }
}

fn load(path: &str, opts: CommonOptions) -> Result<Scenario, String> {
    load_scenario(Path::new(path), validate_mode(opts))
        .map_err(|error| format!("failed to load {path}: {error}"))
}

fn finish<W: Write>(
    scenario: &Scenario,
    path: &str,
    opts: CommonOptions,
    stdout: &mut W,
) -> Result<(), String> {
    if opts.apply {
        save_scenario(scenario, Path::new(path)).map_err(|error| error.to_string())?;
        emit(stdout, &format!("wrote {path}"))
    } else {
        emit(stdout, "dry run, pass --apply to write the change")
    }
}

fn emit<W: Write>(stdout: &mut W, line: &str) -> Result<(), String> {
    writeln!(stdout, "{line}").map_err(|error| format!("failed to write output: {error}"))
}
