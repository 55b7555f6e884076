//! Motion metadata download from the Tweede Kamer OData API.
//!
//! One query per calendar month: all hand-raise votes changed in that month,
//! expanded with their vote and case data. Records that are not Tweede Kamer
//! motions, carry no document, or have an outcome other than accepted or
//! rejected are dropped, mirroring what the metadata table can represent.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use url::Url;

use crate::config::Config;
use crate::dataset::{self, Motion};
use crate::logging::{self, obj, v_num, v_str};

#[derive(Debug, Deserialize)]
struct ODataPage {
    #[serde(default)]
    value: Vec<BesluitRecord>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct BesluitRecord {
    tekst: Option<String>,
    gewijzigd_op: Option<String>,
    stemming: Vec<StemmingRecord>,
    zaak: Vec<ZaakRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct StemmingRecord {
    soort: Option<String>,
    actor_fractie: Option<String>,
    fractie_grootte: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ZaakRecord {
    onderwerp: Option<String>,
    soort: Option<String>,
    organisatie: Option<String>,
    document: Vec<DocumentRecord>,
    zaak_actor: Vec<ZaakActorRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DocumentRecord {
    id: Option<String>,
    content_length: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ZaakActorRecord {
    relatie: Option<String>,
    actor_naam: Option<String>,
    actor_fractie: Option<String>,
}

pub struct Scraper {
    client: reqwest::Client,
    base: String,
}

impl Scraper {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.fetch_timeout_secs))
            .build()?;
        Ok(Self { client, base: cfg.api_base.trim_end_matches('/').to_string() })
    }

    /// Download all motions voted on between `start` and `end` inclusive.
    pub async fn download_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Motion>> {
        let mut motions = Vec::new();
        for (year, month) in month_span(start, end) {
            let records = self.fetch_month(year, month).await?;
            let parsed: Vec<Motion> =
                records.iter().filter_map(|r| parse_motion(r, &self.base)).collect();
            logging::info(
                "scraper",
                "month_done",
                obj(&[
                    ("month", v_str(&format!("{year}-{month:02}"))),
                    ("records", v_num(records.len() as u64)),
                    ("motions", v_num(parsed.len() as u64)),
                ]),
            );
            motions.extend(parsed);
        }
        Ok(motions)
    }

    async fn fetch_month(&self, year: i32, month: u32) -> Result<Vec<BesluitRecord>> {
        let filter = format!(
            "StemmingsSoort eq 'Met handopsteken' and year(GewijzigdOp) eq {year} and month(GewijzigdOp) eq {month}"
        );
        let mut next = Some(
            Url::parse_with_params(
                &format!("{}/Besluit", self.base),
                &[
                    ("$filter", filter.as_str()),
                    ("$expand", "Stemming,Zaak($expand=Document,ZaakActor)"),
                ],
            )
            .context("bad OData url")?
            .to_string(),
        );

        let mut records = Vec::new();
        while let Some(url) = next {
            let page: ODataPage = self
                .client
                .get(&url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .with_context(|| format!("OData request failed for {year}-{month:02}"))?
                .json()
                .await
                .context("OData response was not valid JSON")?;
            records.extend(page.value);
            next = page.next_link;
        }
        Ok(records)
    }
}

/// Year/month pairs covering the requested range, oldest first.
pub fn month_span(start: NaiveDate, end: NaiveDate) -> Vec<(i32, u32)> {
    use chrono::Datelike;
    let mut months = Vec::new();
    let (mut year, mut month) = (start.year(), start.month());
    while (year, month) <= (end.year(), end.month()) {
        months.push((year, month));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    months
}

/// Turn one OData record into a Motion row, or drop it: not a Tweede Kamer
/// motion, no document, an outcome other than accepted/rejected, or odd
/// voting data all disqualify the record.
fn parse_motion(record: &BesluitRecord, base: &str) -> Option<Motion> {
    let zaak = record.zaak.first()?;
    if zaak.organisatie.as_deref() != Some("Tweede Kamer") {
        return None;
    }
    if zaak.soort.as_deref() != Some("Motie") {
        return None;
    }
    let document = zaak.document.first()?;

    let accepted = match record.tekst.as_deref() {
        Some("Aangenomen.") => true,
        Some("Verworpen.") => false,
        _ => return None,
    };

    let mut num_proponents = 0;
    let mut proponents = Vec::new();
    let mut num_opponents = 0;
    let mut opponents = Vec::new();
    let mut num_absentees = 0;
    let mut absentees = Vec::new();
    for vote in &record.stemming {
        let fractie = vote.actor_fractie.clone()?;
        let size = vote.fractie_grootte?;
        match vote.soort.as_deref() {
            Some("Voor") => {
                num_proponents += size;
                proponents.push(fractie);
            }
            Some("Tegen") => {
                num_opponents += size;
                opponents.push(fractie);
            }
            Some("Niet deelgenomen") => {
                num_absentees += size;
                absentees.push(fractie);
            }
            _ => return None,
        }
    }

    let petitioners = zaak
        .zaak_actor
        .iter()
        .filter(|actor| {
            matches!(actor.relatie.as_deref(), Some("Indiener") | Some("Medeindiener"))
        })
        .filter_map(|actor| {
            let name = actor.actor_naam.as_ref()?;
            Some(match &actor.actor_fractie {
                Some(fractie) => format!("{name} ({fractie})"),
                None => name.clone(),
            })
        })
        .collect();

    let id = document.id.clone()?;
    let vote_time = record.gewijzigd_op.clone()?;
    let vote_date = dataset::parse_vote_date(&vote_time).ok()?;
    Some(Motion {
        url: format!("{base}/document/{id}/resource"),
        id,
        subject: zaak.onderwerp.clone().unwrap_or_default(),
        vote_time,
        vote_date,
        size_bytes: document.content_length.unwrap_or(0),
        accepted,
        num_proponents,
        proponents,
        num_absentees,
        absentees,
        num_opponents,
        opponents,
        petitioners,
    })
}

/// Merge a fresh download into the existing table: rows whose Id reappears
/// in the download are replaced, everything else is kept.
pub fn merge(existing: Vec<Motion>, fresh: Vec<Motion>) -> Vec<Motion> {
    let fresh_ids: BTreeSet<&str> = fresh.iter().map(|m| m.id.as_str()).collect();
    let mut merged: Vec<Motion> =
        existing.into_iter().filter(|m| !fresh_ids.contains(m.id.as_str())).collect();
    merged.extend(fresh);
    merged
}
