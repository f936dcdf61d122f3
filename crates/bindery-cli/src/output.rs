use std::io::Write;

use anyhow::Result;
use bindery_core::{CollectionCandidate, FieldDiscovery, SyncSnapshot, ValidationErrors};
use clap::ValueEnum;
use serde::Serialize;

/// Output format for discovery results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Table,
    Json,
    Csv,
}

const SAMPLE_COLUMN_WIDTH: usize = 40;

pub fn json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

pub fn collections(
    out: &mut impl Write,
    candidates: &[CollectionCandidate],
    format: Format,
) -> Result<()> {
    match format {
        Format::Json => json(out, &candidates),
        Format::Csv => {
            let mut writer = csv::Writer::from_writer(out);
            writer.write_record(["path", "item_count", "nested", "allow_listed"])?;
            for c in candidates {
                writer.write_record([
                    c.path.to_string(),
                    c.item_count.to_string(),
                    c.is_nested.to_string(),
                    c.is_allow_listed().to_string(),
                ])?;
            }
            writer.flush()?;
            Ok(())
        }
        Format::Table => {
            if candidates.is_empty() {
                writeln!(out, "No array-valued members found at depth 0 or 1.")?;
                return Ok(());
            }
            let width = column_width(candidates.iter().map(|c| c.path.to_string()), "PATH");
            writeln!(out, "{:<width$}  {:>6}  {:<6}  ALLOW-LISTED", "PATH", "ITEMS", "NESTED")?;
            for c in candidates {
                writeln!(
                    out,
                    "{:<width$}  {:>6}  {:<6}  {}",
                    c.path.to_string(),
                    c.item_count,
                    yes_no(c.is_nested),
                    yes_no(c.is_allow_listed()),
                )?;
            }
            Ok(())
        }
    }
}

pub fn fields(out: &mut impl Write, discovery: &FieldDiscovery, format: Format) -> Result<()> {
    match format {
        Format::Json => json(out, discovery),
        Format::Csv => {
            let mut writer = csv::Writer::from_writer(out);
            writer.write_record(["score", "path", "value_type", "has_value", "sample"])?;
            for c in &discovery.candidates {
                writer.write_record([
                    c.score.to_string(),
                    c.path.to_string(),
                    format!("{:?}", c.value_type).to_lowercase(),
                    c.has_value.to_string(),
                    c.sample.clone(),
                ])?;
            }
            writer.flush()?;
            Ok(())
        }
        Format::Table => {
            if discovery.candidates.is_empty() {
                writeln!(
                    out,
                    "No candidates: the collection is missing, empty, or its first item is not an object."
                )?;
                return Ok(());
            }
            let width = column_width(
                discovery.candidates.iter().map(|c| c.path.to_string()),
                "PATH",
            );
            writeln!(out, "SCORE  {:<width$}  {:<7}  VALUE  SAMPLE", "PATH", "TYPE")?;
            for c in &discovery.candidates {
                writeln!(
                    out,
                    "{:>5}  {:<width$}  {:<7}  {:<5}  {}",
                    c.score,
                    c.path.to_string(),
                    format!("{:?}", c.value_type).to_lowercase(),
                    yes_no(c.has_value),
                    clip(&c.sample, SAMPLE_COLUMN_WIDTH),
                )?;
            }
            writeln!(out, "\nTotal: {} candidates for {}", discovery.total, discovery.field)?;
            if discovery.depth_limited {
                writeln!(out, "Note: deeper objects were not walked (depth limit reached).")?;
            }
            Ok(())
        }
    }
}

pub fn validation(out: &mut impl Write, errors: &ValidationErrors, format: Format) -> Result<()> {
    match format {
        Format::Json => json(out, errors.errors()),
        Format::Csv => {
            let mut writer = csv::Writer::from_writer(out);
            writer.write_record(["path", "message"])?;
            for e in errors.errors() {
                writer.write_record([e.path.as_str(), e.message.as_str()])?;
            }
            writer.flush()?;
            Ok(())
        }
        Format::Table => {
            for e in errors.errors() {
                writeln!(out, "  {}: {}", e.path, e.message)?;
            }
            writeln!(out, "\n{} problem(s) found", errors.len())?;
            Ok(())
        }
    }
}

pub fn snapshot_line(snapshot: &SyncSnapshot) -> String {
    let mut line = format!(
        "[{}] {} {}",
        snapshot.observed_at.format("%Y-%m-%d %H:%M:%S UTC"),
        snapshot.target,
        snapshot.status
    );
    if !snapshot.endpoints.is_empty() {
        let endpoints: Vec<String> = snapshot
            .endpoints
            .iter()
            .map(|e| format!("{}={}", e.id, e.sync_status))
            .collect();
        line.push_str(&format!(" ({})", endpoints.join(", ")));
    }
    if let Some(error) = &snapshot.last_error {
        line.push_str(&format!(" [last read failed: {error}]"));
    }
    line
}

fn column_width(values: impl Iterator<Item = String>, header: &str) -> usize {
    values.map(|v| v.chars().count()).max().unwrap_or(0).max(header.len())
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max.saturating_sub(3)).collect();
    clipped.push_str("...");
    clipped
}
