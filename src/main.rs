use std::collections::BTreeMap;
use std::io::{self, BufRead};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rand::Rng;

use motiewijzer::checkpoint::{self, Checkpoint};
use motiewijzer::config::Config;
use motiewijzer::dataset::{self, Motion};
use motiewijzer::fetch::{self, DocumentFetcher, HttpFetcher};
use motiewijzer::logging::{self, obj, v_num, v_str};
use motiewijzer::score::Decision;
use motiewijzer::scraper::{self, Scraper};
use motiewijzer::session::{Command, Input, Phase, Provenance, Session};

#[derive(Parser)]
#[command(
    name = "motiewijzer",
    about = "Shows you random parliamentary motions to agree or disagree with, then tells \
             you which party's voting record most closely matches your own opinions. A party \
             that was absent for a vote is counted as having voted contrary to you."
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Download motion metadata. Run this first, e.g. `download 2022-02 --end 2024-06`.
    Download {
        /// First month to download, as YYYY-MM.
        start: String,
        /// Last month to download, as YYYY-MM. Defaults to the current month.
        #[arg(long)]
        end: Option<String>,
    },
    /// Start a scoring session over randomly ordered motions.
    Start {
        /// Show motions from the beginning of this month (YYYY-MM). Default: all.
        #[arg(long)]
        start: Option<String>,
        /// Show motions up to the end of this month (YYYY-MM). Default: today.
        #[arg(long)]
        end: Option<String>,
        /// Case-insensitive filter on motion titles, anchored at the start.
        #[arg(long, default_value = ".*")]
        regex: String,
        /// Seed for the motion order; the same seed reproduces the same order.
        /// Omit for a random one (it is printed so the run can be repeated).
        #[arg(long)]
        seed: Option<u64>,
        /// JSON map from a party to the party whose vote it inherits while it
        /// did not exist, e.g. '{"GLPVDA": "GL", "Omtzigt": "CDA"}'.
        #[arg(long, default_value = "{}")]
        substitution: String,
    },
    /// Resume a scoring session from a saved profile. Without a name, lists profiles.
    Resume { profile: Option<String> },
    /// Summarize the downloaded metadata: dates, counts, parties.
    Info {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long, default_value = ".*")]
        regex: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::from_env();
    match cli.command {
        Cmd::Download { start, end } => cmd_download(&cfg, &start, end.as_deref()).await,
        Cmd::Start { start, end, regex, seed, substitution } => {
            cmd_start(&cfg, start.as_deref(), end.as_deref(), &regex, seed, &substitution).await
        }
        Cmd::Resume { profile } => cmd_resume(&cfg, profile).await,
        Cmd::Info { start, end, regex } => cmd_info(&cfg, start.as_deref(), end.as_deref(), &regex),
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

async fn cmd_download(cfg: &Config, start: &str, end: Option<&str>) -> Result<()> {
    cfg.ensure_dirs()?;
    let start_date = dataset::month_start(start)?;
    let end_date = match end {
        Some(end) => dataset::month_end(end)?,
        None => today(),
    };
    if end_date < start_date {
        bail!("end month lies before start month");
    }

    let scraper = Scraper::new(cfg)?;
    let fresh = scraper.download_range(start_date, end_date).await?;
    let existing = if cfg.motions_path.exists() {
        dataset::load_motions(&cfg.motions_path)?
    } else {
        Vec::new()
    };
    let merged = scraper::merge(existing, fresh);
    dataset::write_motions(&cfg.motions_path, &merged)?;
    logging::info(
        "scraper",
        "store_written",
        obj(&[("rows", v_num(merged.len() as u64))]),
    );
    println!("Motion metadata downloaded; the store now holds {} motions.", merged.len());
    Ok(())
}

/// Resolve CLI month bounds to concrete dates and their provenance strings.
/// The end bound is pinned to a date here so that resuming later re-filters
/// the exact same range instead of a moving "today".
fn resolve_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(Option<NaiveDate>, NaiveDate, String, String)> {
    let start_date = start.map(dataset::month_start).transpose()?;
    let end_date = match end {
        Some(end) => dataset::month_end(end)?,
        None => today(),
    };
    let start_prov = start_date.map(|d| d.to_string()).unwrap_or_default();
    Ok((start_date, end_date, start_prov, end_date.to_string()))
}

fn load_filtered(
    cfg: &Config,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    regex: &str,
) -> Result<Vec<Motion>> {
    let title = dataset::title_filter(regex)?;
    let motions = dataset::load_motions(&cfg.motions_path)?;
    Ok(dataset::filter_motions(&motions, start, end, &title))
}

async fn cmd_start(
    cfg: &Config,
    start: Option<&str>,
    end: Option<&str>,
    regex: &str,
    seed: Option<u64>,
    substitution: &str,
) -> Result<()> {
    cfg.ensure_dirs()?;
    let (start_date, end_date, start_prov, end_prov) = resolve_range(start, end)?;
    let substitutions: BTreeMap<String, String> =
        serde_json::from_str(substitution).context("--substitution is not a JSON string map")?;

    let mut motions = load_filtered(cfg, start_date, Some(end_date), regex)?;
    dataset::apply_substitutions(&mut motions, &substitutions);
    if motions.is_empty() {
        bail!("no motions match the given date range and regex");
    }

    let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
    println!("Session seed: {seed}");
    let included = dataset::all_parties(&motions).into_iter().collect();
    let provenance =
        Provenance { start_date: start_prov, end_date: end_prov, regex: regex.to_string() };
    let session = Session::start(motions, seed, included, provenance);
    run_shell(cfg, session).await
}

async fn cmd_resume(cfg: &Config, profile: Option<String>) -> Result<()> {
    let Some(profile) = profile else {
        let profiles = checkpoint::list_profiles(&cfg.profiles_dir);
        if profiles.is_empty() {
            println!("No saved profiles.");
        } else {
            println!("Saved profiles: {}", profiles.join(", "));
        }
        return Ok(());
    };

    let cp = checkpoint::load(&cfg.profiles_dir, &profile)?;
    if let Some(saved_hash) = &cp.dataset_sha256 {
        match dataset::file_sha256(&cfg.motions_path) {
            Ok(current) if current != *saved_hash => logging::warn(
                "checkpoint",
                "dataset_changed",
                obj(&[("profile", v_str(&profile))]),
            ),
            _ => {}
        }
    }

    let state = cp.into_state();
    let start_date = parse_prov_date(&state.provenance.start_date)?;
    let end_date = parse_prov_date(&state.provenance.end_date)?;
    let motions = load_filtered(cfg, start_date, end_date, &state.provenance.regex)?;
    let session = Session::resume(motions, state)
        .with_context(|| format!("cannot resume profile {profile}"))?;
    println!("Resuming profile '{profile}'.");
    run_shell(cfg, session).await
}

fn parse_prov_date(s: &str) -> Result<Option<NaiveDate>> {
    if s.is_empty() {
        return Ok(None);
    }
    Ok(Some(NaiveDate::parse_from_str(s, "%Y-%m-%d").context("bad date in checkpoint")?))
}

fn cmd_info(cfg: &Config, start: Option<&str>, end: Option<&str>, regex: &str) -> Result<()> {
    let (start_date, end_date, _, _) = resolve_range(start, end)?;
    let motions = load_filtered(cfg, start_date, Some(end_date), regex)?;
    let info = dataset::summarize(&motions);

    match (info.first_vote, info.last_vote) {
        (Some(first), Some(last)) => {
            println!("First motion: {first}");
            println!("Last motion: {last}");
        }
        _ => println!("No motions match the given date range and regex."),
    }
    println!("Motions: {}", info.motion_count);
    println!("All parties: {}", info.all_parties.join(", "));
    let missing: Vec<String> =
        info.partially_missing.iter().map(|(p, n)| format!("{p} ({n})")).collect();
    println!("Partially missing parties: {}", missing.join(", "));
    Ok(())
}

/// Interactive shell: renders prompts, reads one key of input per line, and
/// executes the commands the session controller returns.
async fn run_shell(cfg: &Config, mut session: Session) -> Result<()> {
    let fetcher = HttpFetcher::new(cfg.fetch_timeout_secs)?;
    let commands = session.begin();
    execute(cfg, &fetcher, &session, commands).await;

    let stdin = io::stdin();
    loop {
        render_prompt(&session);
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        let Some(input) = parse_input(line.trim()) else {
            if line.trim() == "q" {
                return Ok(());
            }
            continue;
        };
        let commands = session.step(input);
        execute(cfg, &fetcher, &session, commands).await;
    }
}

fn render_prompt(session: &Session) {
    println!();
    match session.phase() {
        Phase::AwaitingDecision => {
            if let Some(motion) = session.current_motion() {
                println!("Motion: {}", motion.subject);
            }
            println!("Choose one of the following:");
            println!("'i': Show extra information about the motion.");
            println!("'o': Reopen the motion document.");
            println!("'r': Show how much you agree with each party so far.");
            println!("'w <name>': Save this session under a profile name.");
            println!("'+': Agree with the motion and continue.");
            println!("'0': No opinion on the motion and continue.");
            println!("'-': Disagree with the motion and continue.");
            println!("'q': Quit without saving.");
        }
        Phase::Exhausted => {
            println!("There are no motions left.");
            println!("'r': Show how much you agree with each party.");
            println!("'w <name>': Save this session under a profile name.");
            println!("'q': Quit.");
        }
        Phase::Idle => {}
    }
}

fn parse_input(line: &str) -> Option<Input> {
    match line {
        "+" => Some(Input::Decide(Decision::Agree)),
        "-" => Some(Input::Decide(Decision::Disagree)),
        "0" => Some(Input::Decide(Decision::NoOpinion)),
        "i" => Some(Input::ShowInfo),
        "o" => Some(Input::ReopenDocument),
        "r" => Some(Input::ShowStandings),
        _ => {
            let profile = line.strip_prefix("w ")?.trim();
            if profile.is_empty() {
                None
            } else {
                Some(Input::SaveCheckpoint(profile.to_string()))
            }
        }
    }
}

async fn execute(cfg: &Config, fetcher: &HttpFetcher, session: &Session, commands: Vec<Command>) {
    for command in commands {
        match command {
            Command::OpenDocument { index } => {
                if let Some(motion) = session.motion(index) {
                    show_document(cfg, fetcher, motion).await;
                }
            }
            Command::ShowDetails { index } => {
                if let Some(motion) = session.motion(index) {
                    show_details(motion);
                }
            }
            Command::ShowStandings => show_standings(session),
            Command::WriteCheckpoint { profile } => write_checkpoint(cfg, session, &profile),
            Command::ReportMalformed { index, reason } => {
                logging::warn(
                    "session",
                    "malformed_motion",
                    obj(&[("index", v_num(index as u64)), ("reason", v_str(&reason))]),
                );
                println!("Skipping a malformed motion.");
            }
            Command::AnnounceExhausted => {}
        }
    }
}

/// Fetch the motion document and hand it to the platform viewer. Failures
/// are reported and leave the session untouched; 'o' retries.
async fn show_document(cfg: &Config, fetcher: &HttpFetcher, motion: &Motion) {
    let result = match fetcher.fetch(&motion.url).await {
        Ok(bytes) => fetch::store_document(&cfg.pdf_output_path, &bytes)
            .map_err(|err| err.to_string())
            .and_then(|()| fetch::open_document(&cfg.pdf_output_path).map_err(|e| e.to_string())),
        Err(err) => Err(err.to_string()),
    };
    if let Err(reason) = result {
        logging::warn(
            "fetch",
            "document_failed",
            obj(&[("url", v_str(&motion.url)), ("reason", v_str(&reason))]),
        );
        println!("Could not open the motion document; use 'o' to retry.");
    }
}

fn show_details(motion: &Motion) {
    println!("Motion: {}", motion.subject);
    println!("Voted on: {}", motion.vote_date);
    println!("URL: {}", motion.url);
    println!("Outcome: {}", if motion.accepted { "accepted" } else { "rejected" });
    println!("Votes in favor: {}", motion.num_proponents);
    println!("Votes against: {}", motion.num_opponents);
    println!("Absent votes: {}", motion.num_absentees);
    println!("Proponents: {}", motion.proponents.join(", "));
    println!("Opponents: {}", motion.opponents.join(", "));
    println!("Absent parties: {}", motion.absentees.join(", "));
    println!("Submitted by: {}", motion.petitioners.join(", "));
}

fn show_standings(session: &Session) {
    for row in session.standings() {
        println!("{}: {}/{} = {:.1}%", row.party, row.score, row.total, row.percentage);
    }
}

fn write_checkpoint(cfg: &Config, session: &Session, profile: &str) {
    let dataset_sha256 = dataset::file_sha256(&cfg.motions_path).ok();
    let cp = Checkpoint::from_state(&session.state, dataset_sha256);
    match checkpoint::save(&cfg.profiles_dir, profile, &cp) {
        Ok(path) => {
            logging::info("checkpoint", "saved", obj(&[("profile", v_str(profile))]));
            println!("Session saved as '{}' ({}).", profile, path.display());
        }
        Err(err) => println!("Saving failed ({err}); the session is still in memory."),
    }
}
