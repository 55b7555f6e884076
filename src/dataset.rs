//! Motion metadata: the pipe-separated CSV store, date/title filtering,
//! party substitution and dataset summaries.
//!
//! The store is a single `motions.csv` written by the `download` command and
//! read by everything else. Party lists are comma-joined inside one field.
//! Rows that fail to parse are counted and skipped, never fatal.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::logging::{self, obj, v_num, v_str};

pub const FIELD_SEP: char = '|';
pub const LIST_SEP: char = ',';

pub const EXPECTED_COLUMNS: [&str; 13] = [
    "Id",
    "Subject",
    "VoteTime",
    "Url",
    "Size",
    "Accepted",
    "NumProponents",
    "Proponents",
    "NumAbsentees",
    "Absentees",
    "NumOpponents",
    "Opponents",
    "Petitioners",
];

/// One parliamentary motion as stored in the metadata CSV. Read-only to the
/// scoring core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Motion {
    pub id: String,
    pub subject: String,
    /// Full timestamp string as scraped; its first ten characters are the
    /// vote date and are kept verbatim so rewriting the CSV round-trips.
    pub vote_time: String,
    pub vote_date: NaiveDate,
    pub url: String,
    pub size_bytes: u64,
    pub accepted: bool,
    pub num_proponents: u32,
    pub proponents: Vec<String>,
    pub num_absentees: u32,
    pub absentees: Vec<String>,
    pub num_opponents: u32,
    pub opponents: Vec<String>,
    pub petitioners: Vec<String>,
}

/// Split one CSV line on `sep`, honoring double-quoted fields with `""`
/// escapes (the quoting convention the writer below produces).
pub fn split_fields(line: &str, sep: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        if quoted {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    quoted = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' && current.is_empty() {
            quoted = true;
        } else if c == sep {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    fields.push(current);
    fields
}

fn quote_field(field: &str) -> String {
    if field.contains(FIELD_SEP) || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Comma-joined party list to names. Empty fields and the `nan` artifact
/// (pandas' serialization of a missing list in legacy files) normalize to
/// an empty list, never to a placeholder entry.
fn parse_party_list(field: &str) -> Vec<String> {
    field
        .split(LIST_SEP)
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != "nan")
        .map(str::to_string)
        .collect()
}

fn parse_bool(field: &str) -> Result<bool> {
    match field.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(anyhow!("not a boolean: {other}")),
    }
}

/// Parse the vote date from the first ten characters of the timestamp field.
pub fn parse_vote_date(vote_time: &str) -> Result<NaiveDate> {
    let prefix = vote_time.get(..10).ok_or_else(|| anyhow!("timestamp too short: {vote_time}"))?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").context("bad vote date")
}

pub fn parse_row(line: &str) -> Result<Motion> {
    let fields = split_fields(line, FIELD_SEP);
    if fields.len() != EXPECTED_COLUMNS.len() {
        bail!("expected {} columns, got {}", EXPECTED_COLUMNS.len(), fields.len());
    }
    let vote_time = fields[2].clone();
    Ok(Motion {
        id: fields[0].trim().to_string(),
        subject: fields[1].clone(),
        vote_date: parse_vote_date(&vote_time)?,
        vote_time,
        url: fields[3].trim().to_string(),
        size_bytes: fields[4].trim().parse().context("bad size")?,
        accepted: parse_bool(&fields[5])?,
        num_proponents: fields[6].trim().parse().context("bad proponent count")?,
        proponents: parse_party_list(&fields[7]),
        num_absentees: fields[8].trim().parse().context("bad absentee count")?,
        absentees: parse_party_list(&fields[9]),
        num_opponents: fields[10].trim().parse().context("bad opponent count")?,
        opponents: parse_party_list(&fields[11]),
        petitioners: parse_party_list(&fields[12]),
    })
}

pub fn format_row(motion: &Motion) -> String {
    let fields = [
        motion.id.clone(),
        motion.subject.clone(),
        motion.vote_time.clone(),
        motion.url.clone(),
        motion.size_bytes.to_string(),
        if motion.accepted { "true".to_string() } else { "false".to_string() },
        motion.num_proponents.to_string(),
        motion.proponents.join(","),
        motion.num_absentees.to_string(),
        motion.absentees.join(","),
        motion.num_opponents.to_string(),
        motion.opponents.join(","),
        motion.petitioners.join(","),
    ];
    fields.iter().map(|f| quote_field(f)).collect::<Vec<_>>().join("|")
}

/// Load all motions from the CSV store. Bad rows are logged and skipped.
pub fn load_motions(path: &Path) -> Result<Vec<Motion>> {
    let file = File::open(path)
        .with_context(|| format!("cannot open motion store {} (run `download` first)", path.display()))?;
    let mut motions = Vec::new();
    let mut bad_rows = 0u64;
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        if lineno == 0 && trimmed.starts_with("Id|") {
            continue;
        }
        match parse_row(trimmed) {
            Ok(motion) => motions.push(motion),
            Err(err) => {
                bad_rows += 1;
                logging::warn(
                    "dataset",
                    "bad_row",
                    obj(&[("line", v_num(lineno as u64 + 1)), ("reason", v_str(&err.to_string()))]),
                );
            }
        }
    }
    logging::info(
        "dataset",
        "loaded",
        obj(&[("rows", v_num(motions.len() as u64)), ("bad_rows", v_num(bad_rows))]),
    );
    Ok(motions)
}

/// Write the full motion table, replacing the file atomically so a crash
/// mid-write cannot corrupt the store.
pub fn write_motions(path: &Path, motions: &[Motion]) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    {
        let mut out = File::create(&tmp)?;
        writeln!(out, "{}", EXPECTED_COLUMNS.join("|"))?;
        for motion in motions {
            writeln!(out, "{}", format_row(motion))?;
        }
        out.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compile the title filter: case-insensitive, anchored at the start of the
/// subject (the semantics of a pandas `str.match`).
pub fn title_filter(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("(?i)^(?:{pattern})")).context("invalid title regex")
}

/// Restrict the table to a date range (inclusive, `None` = unbounded) and a
/// title filter.
pub fn filter_motions(
    motions: &[Motion],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    title: &Regex,
) -> Vec<Motion> {
    motions
        .iter()
        .filter(|m| start.map_or(true, |s| m.vote_date >= s))
        .filter(|m| end.map_or(true, |e| m.vote_date <= e))
        .filter(|m| title.is_match(&m.subject))
        .cloned()
        .collect()
}

/// Apply party substitutions before motions enter the scoring core: when the
/// alias appears in none of a motion's vote lists and its fallback appears in
/// one, the alias joins that list. The core itself never merges names.
pub fn apply_substitutions(motions: &mut [Motion], substitutions: &BTreeMap<String, String>) {
    for motion in motions.iter_mut() {
        for (alias, fallback) in substitutions {
            let present = motion.proponents.iter().any(|p| p == alias)
                || motion.opponents.iter().any(|p| p == alias)
                || motion.absentees.iter().any(|p| p == alias);
            if present {
                continue;
            }
            if motion.proponents.iter().any(|p| p == fallback) {
                motion.proponents.push(alias.clone());
            } else if motion.opponents.iter().any(|p| p == fallback) {
                motion.opponents.push(alias.clone());
            } else if motion.absentees.iter().any(|p| p == fallback) {
                motion.absentees.push(alias.clone());
            }
        }
    }
}

/// All parties that appear in any vote list, sorted.
pub fn all_parties(motions: &[Motion]) -> Vec<String> {
    let mut parties = BTreeSet::new();
    for motion in motions {
        for list in [&motion.proponents, &motion.opponents, &motion.absentees] {
            for party in list {
                parties.insert(party.clone());
            }
        }
    }
    parties.into_iter().collect()
}

/// Parties missing from at least one motion's vote lists, with how many
/// motions each was missing from, ordered by descending count then name.
pub fn partially_missing(motions: &[Motion]) -> Vec<(String, u64)> {
    let universe: BTreeSet<String> = all_parties(motions).into_iter().collect();
    let mut missing: BTreeMap<String, u64> = BTreeMap::new();
    for motion in motions {
        let mut existing = BTreeSet::new();
        for list in [&motion.proponents, &motion.opponents, &motion.absentees] {
            for party in list {
                existing.insert(party.as_str());
            }
        }
        for party in &universe {
            if !existing.contains(party.as_str()) {
                *missing.entry(party.clone()).or_insert(0) += 1;
            }
        }
    }
    let mut ranked: Vec<(String, u64)> = missing.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

/// Summary of a filtered table for the `info` command.
#[derive(Debug)]
pub struct DatasetInfo {
    pub first_vote: Option<NaiveDate>,
    pub last_vote: Option<NaiveDate>,
    pub motion_count: usize,
    pub all_parties: Vec<String>,
    pub partially_missing: Vec<(String, u64)>,
}

pub fn summarize(motions: &[Motion]) -> DatasetInfo {
    DatasetInfo {
        first_vote: motions.iter().map(|m| m.vote_date).min(),
        last_vote: motions.iter().map(|m| m.vote_date).max(),
        motion_count: motions.len(),
        all_parties: all_parties(motions),
        partially_missing: partially_missing(motions),
    }
}

/// First day of a `YYYY-MM` month argument.
pub fn month_start(arg: &str) -> Result<NaiveDate> {
    let (year, month) = parse_month(arg)?;
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| anyhow!("invalid month: {arg}"))
}

/// Last day of a `YYYY-MM` month argument.
pub fn month_end(arg: &str) -> Result<NaiveDate> {
    let (year, month) = parse_month(arg)?;
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .ok_or_else(|| anyhow!("invalid month: {arg}"))?;
    Ok(first_of_next.pred_opt().expect("no date before year 1"))
}

fn parse_month(arg: &str) -> Result<(i32, u32)> {
    let (year, month) = arg
        .split_once('-')
        .ok_or_else(|| anyhow!("expected YYYY-MM, got {arg}"))?;
    Ok((
        year.parse().with_context(|| format!("bad year in {arg}"))?,
        month.parse().with_context(|| format!("bad month in {arg}"))?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motion(id: &str, date: &str, prop: &[&str], opp: &[&str], abs: &[&str]) -> Motion {
        Motion {
            id: id.to_string(),
            subject: format!("Motie {id}"),
            vote_time: format!("{date} 14:00:00+01:00"),
            vote_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            url: format!("https://example.test/{id}/resource"),
            size_bytes: 1024,
            accepted: true,
            num_proponents: prop.len() as u32,
            proponents: prop.iter().map(|s| s.to_string()).collect(),
            num_absentees: abs.len() as u32,
            absentees: abs.iter().map(|s| s.to_string()).collect(),
            num_opponents: opp.len() as u32,
            opponents: opp.iter().map(|s| s.to_string()).collect(),
            petitioners: vec!["A. Jansen (VVD)".to_string()],
        }
    }

    #[test]
    fn row_round_trips() {
        let m = motion("m1", "2023-03-14", &["VVD", "D66"], &["CDA"], &["SP"]);
        let parsed = parse_row(&format_row(&m)).unwrap();
        assert_eq!(parsed, m);
    }

    #[test]
    fn quoted_separator_in_subject() {
        let mut m = motion("m2", "2023-03-14", &["VVD"], &[], &[]);
        m.subject = "Motie over A|B scenario's".to_string();
        let parsed = parse_row(&format_row(&m)).unwrap();
        assert_eq!(parsed.subject, m.subject);
    }

    #[test]
    fn missing_lists_normalize_to_empty() {
        let line = "id1|Onderwerp|2022-05-01 09:00:00+02:00|https://x/resource|10|true|75|VVD,D66|0||75|CDA|J. de Vries (CDA)";
        let m = parse_row(line).unwrap();
        assert!(m.absentees.is_empty());
        assert_eq!(m.proponents, vec!["VVD", "D66"]);
    }

    #[test]
    fn nan_artifact_is_not_a_party() {
        let line = "id1|Onderwerp|2022-05-01 09:00:00+02:00|https://x/resource|10|true|75|VVD|0|nan|75|CDA|";
        let m = parse_row(line).unwrap();
        assert!(m.absentees.is_empty());
        assert!(m.petitioners.is_empty());
    }

    #[test]
    fn wrong_column_count_rejected() {
        assert!(parse_row("a|b|c").is_err());
    }

    #[test]
    fn filter_by_date_and_title() {
        let motions = vec![
            motion("m1", "2022-01-10", &["VVD"], &["CDA"], &[]),
            motion("m2", "2022-06-15", &["VVD"], &["CDA"], &[]),
            motion("m3", "2023-01-05", &["VVD"], &["CDA"], &[]),
        ];
        let title = title_filter(".*").unwrap();
        let from = NaiveDate::from_ymd_opt(2022, 2, 1);
        let to = NaiveDate::from_ymd_opt(2022, 12, 31);
        let filtered = filter_motions(&motions, from, to, &title);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "m2");

        let title = title_filter("motie m3").unwrap();
        let filtered = filter_motions(&motions, None, None, &title);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "m3");
    }

    #[test]
    fn title_filter_is_anchored() {
        let motions = vec![motion("m1", "2022-01-10", &["VVD"], &[], &[])];
        let title = title_filter("1").unwrap();
        assert!(filter_motions(&motions, None, None, &title).is_empty());
    }

    #[test]
    fn substitution_follows_fallback_list() {
        let mut motions = vec![motion("m1", "2022-01-10", &["GL"], &["CDA"], &["SP"])];
        let subs = BTreeMap::from([
            ("GLPVDA".to_string(), "GL".to_string()),
            ("Omtzigt".to_string(), "CDA".to_string()),
        ]);
        apply_substitutions(&mut motions, &subs);
        assert!(motions[0].proponents.contains(&"GLPVDA".to_string()));
        assert!(motions[0].opponents.contains(&"Omtzigt".to_string()));
    }

    #[test]
    fn substitution_skips_existing_alias() {
        let mut motions = vec![motion("m1", "2022-01-10", &["GL"], &["GLPVDA"], &[])];
        let subs = BTreeMap::from([("GLPVDA".to_string(), "GL".to_string())]);
        apply_substitutions(&mut motions, &subs);
        assert_eq!(motions[0].proponents, vec!["GL"]);
        assert_eq!(motions[0].opponents, vec!["GLPVDA"]);
    }

    #[test]
    fn census_and_missing_counts() {
        let motions = vec![
            motion("m1", "2022-01-10", &["VVD"], &["CDA"], &[]),
            motion("m2", "2022-02-10", &["VVD"], &["D66"], &[]),
        ];
        assert_eq!(all_parties(&motions), vec!["CDA", "D66", "VVD"]);
        let missing = partially_missing(&motions);
        assert_eq!(missing, vec![("CDA".to_string(), 1), ("D66".to_string(), 1)]);
    }

    #[test]
    fn month_bounds() {
        assert_eq!(month_start("2022-02").unwrap(), NaiveDate::from_ymd_opt(2022, 2, 1).unwrap());
        assert_eq!(month_end("2022-02").unwrap(), NaiveDate::from_ymd_opt(2022, 2, 28).unwrap());
        assert_eq!(month_end("2024-12").unwrap(), NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert!(month_start("2022").is_err());
    }
}
