//! Report artifacts: JSON documents and CSV extracts.

use std::borrow::Cow;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::audit::{AuditReport, Tally};
use crate::regenerate::RegenerationSummary;
use crate::types::{AssetKey, Category};

pub const AUDIT_JSON: &str = "audit_report.json";
pub const FLAGGED_CSV: &str = "flagged.csv";
pub const VOICE_SUMMARY_CSV: &str = "voice_summary.csv";
pub const REGENERATION_JSON: &str = "regeneration_results.json";
pub const REGENERATION_CSV: &str = "regeneration_results.csv";

const FLAGGED_HEADER: &[&str] = &[
    "voice",
    "word",
    "category",
    "confidence",
    "duration_s",
    "regions",
    "first_onset_s",
    "word_onset_s",
    "gap_s",
    "rms",
    "notes",
];

/// Paths of the files written for one audit.
#[derive(Debug, Clone)]
pub struct AuditArtifacts {
    pub report_json: PathBuf,
    pub flagged_csv: PathBuf,
    pub voice_summary_csv: PathBuf,
}

/// Write the full JSON report, the flagged subset and the per-voice summary.
pub fn write_audit_artifacts(dir: &Path, report: &AuditReport) -> Result<AuditArtifacts> {
    std::fs::create_dir_all(dir)?;
    let artifacts = AuditArtifacts {
        report_json: dir.join(AUDIT_JSON),
        flagged_csv: dir.join(FLAGGED_CSV),
        voice_summary_csv: dir.join(VOICE_SUMMARY_CSV),
    };

    write_json(&artifacts.report_json, report)?;

    let flagged: Vec<Vec<String>> = report
        .flagged()
        .map(|r| {
            vec![
                r.voice.clone(),
                r.word.clone(),
                r.category.to_string(),
                format!("{:.2}", r.confidence),
                opt(r.duration_s, 3),
                r.regions.map(|n| n.to_string()).unwrap_or_default(),
                opt(r.first_onset_s, 3),
                opt(r.word_onset_s, 3),
                opt(r.gap_s, 3),
                opt(r.rms, 5),
                r.notes.clone(),
            ]
        })
        .collect();
    write_csv(&artifacts.flagged_csv, FLAGGED_HEADER, &flagged)?;

    let mut header = vec![
        "voice",
        "total",
        "found",
        "missing",
        "errors",
        "clean_pct",
        "contaminated_pct",
        "mean_duration_s",
        "mean_onset_s",
        "max_duration_s",
    ];
    header.extend(Category::ALL.iter().map(|c| c.as_str()));
    let mut rows: Vec<Vec<String>> = report
        .voices
        .iter()
        .map(|v| summary_row(&v.voice, &v.tally))
        .collect();
    rows.push(summary_row("ALL", &report.totals));
    write_csv(&artifacts.voice_summary_csv, &header, &rows)?;

    log::info!("Wrote audit report to {}", dir.display());
    Ok(artifacts)
}

fn summary_row(voice: &str, tally: &Tally) -> Vec<String> {
    let mut row = vec![
        voice.to_string(),
        tally.total.to_string(),
        tally.found.to_string(),
        tally.missing.to_string(),
        tally.errors.to_string(),
        format!("{:.1}", tally.clean_pct),
        format!("{:.1}", tally.contaminated_pct),
        opt(tally.mean_duration_s, 3),
        opt(tally.mean_onset_s, 3),
        opt(tally.max_duration_s, 3),
    ];
    row.extend(
        Category::ALL
            .iter()
            .map(|c| tally.by_category.get(c).copied().unwrap_or(0).to_string()),
    );
    row
}

/// Write the regeneration results as JSON and CSV; returns (json, csv) paths.
pub fn write_regeneration_artifacts(
    dir: &Path,
    summary: &RegenerationSummary,
) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)?;
    let json_path = dir.join(REGENERATION_JSON);
    let csv_path = dir.join(REGENERATION_CSV);

    write_json(&json_path, summary)?;

    let header = [
        "voice",
        "word",
        "outcome",
        "category",
        "duration_s",
        "elapsed_s",
        "sha256",
        "notes",
    ];
    let rows: Vec<Vec<String>> = summary
        .results
        .iter()
        .map(|r| {
            vec![
                r.voice.clone(),
                r.word.clone(),
                r.outcome.to_string(),
                r.category.map(|c| c.to_string()).unwrap_or_default(),
                opt(r.duration_s, 3),
                format!("{:.2}", r.elapsed_s),
                r.sha256.clone().unwrap_or_default(),
                r.notes.clone(),
            ]
        })
        .collect();
    write_csv(&csv_path, &header, &rows)?;

    log::info!("Wrote regeneration results to {}", dir.display());
    Ok((json_path, csv_path))
}

/// Read (voice, word) pairs from a flagged CSV, keeping rows whose category
/// is in `categories`.
pub fn read_flagged_csv(path: &Path, categories: &[Category]) -> Result<Vec<AssetKey>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read flagged CSV: {}", path.display()))?;
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());

    let Some(header) = lines.next() else {
        bail!("Flagged CSV {} is empty", path.display());
    };
    let header = parse_csv_line(header);
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .with_context(|| format!("Flagged CSV {} has no '{}' column", path.display(), name))
    };
    let (voice_col, word_col, category_col) = (column("voice")?, column("word")?, column("category")?);

    let wanted: HashSet<Category> = categories.iter().copied().collect();
    let mut seen = HashSet::new();
    let mut pairs = Vec::new();
    for (n, line) in lines.enumerate() {
        let fields = parse_csv_line(line);
        let field = |i: usize| fields.get(i).map(String::as_str).unwrap_or("");
        let category: Category = field(category_col)
            .parse()
            .map_err(|e: String| anyhow::anyhow!("{}, line {}: {}", path.display(), n + 2, e))?;
        if !wanted.contains(&category) {
            continue;
        }
        let key = AssetKey::new(field(voice_col), field(word_col));
        if key.voice.is_empty() || key.word.is_empty() {
            log::warn!("{}, line {}: missing voice or word, skipped", path.display(), n + 2);
            continue;
        }
        if seen.insert(key.clone()) {
            pairs.push(key);
        }
    }
    Ok(pairs)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

fn write_csv<S: AsRef<str>>(path: &Path, header: &[&str], rows: &[Vec<S>]) -> Result<()> {
    let mut out = String::new();
    push_row(&mut out, header);
    for row in rows {
        push_row(&mut out, row);
    }
    std::fs::write(path, out).with_context(|| format!("Failed to write {}", path.display()))
}

fn push_row<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    let line: Vec<Cow<str>> = fields.iter().map(|f| escape_csv(f.as_ref())).collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

/// Quote a field when it contains a delimiter, quote or line break.
pub fn escape_csv(field: &str) -> Cow<'_, str> {
    if field.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Split one CSV line, honouring double-quoted fields.
pub fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if current.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn opt(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Auditor;
    use crate::testutil::*;
    use crate::vocab::cross_pairs;

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_parse_csv_line() {
        assert_eq!(parse_csv_line("x,dog,CLEAN"), vec!["x", "dog", "CLEAN"]);
        assert_eq!(
            parse_csv_line("x,\"a, b\",\"say \"\"hi\"\"\","),
            vec!["x", "a, b", "say \"hi\"", ""]
        );
    }

    #[test]
    fn test_read_flagged_filters_categories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flagged.csv");
        std::fs::write(
            &path,
            "voice,word,category,notes\n\
             x,dog,CARRIER_PRESENT,\"2 regions, gap 0.09s\"\n\
             x,cat,LATE_ONSET,late\n\
             y,ice_cream,too_short,\n\
             x,dog,CARRIER_PRESENT,dup\n",
        )
        .unwrap();

        let pairs = read_flagged_csv(&path, &[Category::CarrierPresent, Category::TooShort]).unwrap();
        assert_eq!(pairs, vec![AssetKey::new("x", "dog"), AssetKey::new("y", "ice cream")]);
    }

    #[test]
    fn test_read_flagged_requires_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flagged.csv");
        std::fs::write(&path, "voice,word\nx,dog\n").unwrap();
        assert!(read_flagged_csv(&path, &[Category::CarrierPresent]).is_err());
    }

    #[test]
    fn test_audit_artifacts_roundtrip_flagged() {
        let store = MemoryStore::default();
        let voices = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        let words: Vec<String> = ["apple", "ball", "cat", "dog", "egg"].iter().map(|w| w.to_string()).collect();
        let pairs = cross_pairs(&voices, &words);
        for key in &pairs {
            let samples = if key.voice == "x" { carrier_word() } else { clean_word() };
            store.insert(key.clone(), wav_bytes(&samples));
        }
        let config = fast_config();
        let report = Auditor::new(&store, &config).run(&pairs);

        let dir = tempfile::tempdir().unwrap();
        let artifacts = write_audit_artifacts(dir.path(), &report).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&artifacts.report_json).unwrap()).unwrap();
        assert_eq!(json["metadata"]["pair_count"], 15);
        assert_eq!(json["totals"]["by_category"]["CARRIER_PRESENT"], 5);
        assert_eq!(json["recommendation"], "significant");

        let flagged = read_flagged_csv(&artifacts.flagged_csv, &Category::ALL).unwrap();
        let expected: Vec<AssetKey> = pairs.iter().filter(|k| k.voice == "x").cloned().collect();
        assert_eq!(flagged, expected);

        let summary = std::fs::read_to_string(&artifacts.voice_summary_csv).unwrap();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("x,5,5,0,0,0.0,100.0,"));
        assert!(lines[2].starts_with("y,5,5,0,0,100.0,0.0,"));
        assert!(lines[4].starts_with("ALL,15,"));
    }
}
