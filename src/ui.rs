// UI layer: one handler per subcommand. Handlers prompt with `dialoguer`,
// show `indicatif` spinners around network calls and print results to
// stdout; the sync logic itself lives in `sync`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Local};
use crossterm::style::Stylize;
use dialoguer::{Input, Password};
use indicatif::{ProgressBar, ProgressStyle};

use crate::api::{Article, ArticleDraft, EsaClient, ListFilter, Listing, MAX_CATEGORY_PAGES};
use crate::cli::{Cli, Command, FilterArgs, UpdateArgs};
use crate::config::{self, Config};
use crate::error::EsaError;
use crate::notify;
use crate::sync::{self, BatchReport, Conflict, ConflictCheck, ConflictPrompt, UpdateOutcome};

/// Dispatch a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };

    match cli.command {
        Command::Setup => handle_setup(&config_path),
        Command::Version => {
            println!("esa-cli version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::List {
            limit,
            page,
            filter,
        } => {
            let filter = ListFilter {
                page,
                ..filter.to_filter(limit)
            };
            handle_list(&connect(&config_path)?, &filter)
        }
        Command::Fetch {
            number,
            latest,
            filter,
        } => handle_fetch(&connect(&config_path)?, number, latest, &filter),
        Command::Update { file, edits } => handle_update(&connect(&config_path)?, &file, &edits),
        Command::Move {
            number,
            category,
            message,
        } => handle_move(&connect(&config_path)?, number, &category, message),
        Command::Create {
            title,
            category,
            tags,
            body_file,
            message,
            no_wip,
        } => {
            let body_md = match &body_file {
                Some(path) => Some(
                    std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                None => None,
            };
            let draft = ArticleDraft {
                name: title,
                category: category.filter(|c| !c.is_empty()),
                tags: tags.as_deref().map(sync::parse_tag_list).unwrap_or_default(),
                body_md,
                wip: !no_wip,
                message: message.filter(|m| !m.is_empty()),
            };
            handle_create(&connect(&config_path)?, &draft)
        }
        Command::FetchAll {
            filter,
            limit,
            force,
        } => handle_fetch_all(&connect(&config_path)?, &filter.to_filter(limit), force),
        Command::UpdateAll {
            pattern,
            edits,
            force,
        } => handle_update_all(&connect(&config_path)?, pattern.resolve(), &edits, force),
    }
}

/// Build a client from the saved config, or explain how to create one.
fn connect(config_path: &Path) -> Result<EsaClient> {
    let config = config::load_valid_config(config_path)?;
    Ok(EsaClient::connect(&config.team_name, &config.access_token)?)
}

// ---------------------------------------------------------------------------
// setup
// ---------------------------------------------------------------------------

/// Ask for the team and token, test them, then save.
fn handle_setup(config_path: &Path) -> Result<()> {
    let existing = config::load_config_from(config_path).unwrap_or_default();

    println!("{}", "esa-cli setup".bold());
    println!();
    println!("Create an access token first:");
    println!("  1. Open https://{{your-team}}.esa.io/user/applications");
    println!("  2. Under 'Personal access tokens' choose 'Generate new token'");
    println!("  3. Enable the 'read' and 'write' scopes");
    println!("  4. Copy the token (it is only shown once)");
    println!();

    let mut team = Input::<String>::new();
    team.with_prompt("Team name (sub-domain)");
    if !existing.team_name.is_empty() {
        team.default(existing.team_name.clone());
    }
    let team_name = team.interact_text()?.trim().to_string();

    let token = Password::new()
        .with_prompt("Access token (leave empty to keep the saved one)")
        .allow_empty_password(!existing.access_token.is_empty())
        .interact()?;
    let access_token = match token.trim() {
        "" => existing.access_token.clone(),
        t => t.to_string(),
    };

    let config = Config {
        access_token,
        team_name,
    };
    config.validate()?;

    let spinner = spinner("Testing connection...");
    let tested = EsaClient::connect(&config.team_name, &config.access_token)?.test_connection();
    spinner.finish_and_clear();
    tested.context("Connection test failed; check the team name and token")?;

    config::save_config_to(config_path, &config)?;
    println!("{} saved to {}", "Configuration".green(), config_path.display());
    println!();
    println!("Try:");
    println!("  esa-cli list              # latest 10 articles");
    println!("  esa-cli fetch 123         # download article 123");
    println!("  esa-cli update 123-x.md   # push local edits");
    Ok(())
}

// ---------------------------------------------------------------------------
// list / fetch
// ---------------------------------------------------------------------------

fn handle_list(api: &EsaClient, filter: &ListFilter) -> Result<()> {
    let listing = list_with_spinner(api, filter)?;
    if listing.articles.is_empty() {
        println!("No articles matched.");
        return Ok(());
    }
    for article in &listing.articles {
        print_summary(article);
    }
    Ok(())
}

fn handle_fetch(api: &EsaClient, number: Option<u64>, latest: bool, filter: &FilterArgs) -> Result<()> {
    let number = match (latest, number) {
        (true, _) => {
            let listing = list_with_spinner(api, &filter.to_filter(Some(1)))?;
            match listing.articles.first() {
                Some(article) => article.number,
                None => bail!("No article matched the filters"),
            }
        }
        (false, Some(number)) => number,
        (false, None) => bail!("Specify an article number, e.g. 'esa-cli fetch 123'"),
    };

    let spinner = spinner(&format!("Downloading #{number}..."));
    let result = sync::download_article(api, number, &current_dir()?);
    spinner.finish_and_clear();

    let (article, path) = result?;
    println!("{} {}", "Downloaded".green(), path.display());
    println!("  title: {}", display_name(&article));
    if let Some(url) = &article.url {
        println!("  url:   {url}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// update / move / create
// ---------------------------------------------------------------------------

fn handle_update(api: &EsaClient, file: &Path, edits: &UpdateArgs) -> Result<()> {
    let mut prompt = TerminalPrompt;
    let outcome = sync::update_document(api, file, &edits.to_options(), &mut prompt)?;

    match outcome {
        UpdateOutcome::Updated { article, check } => {
            if let ConflictCheck::FetchFailed(e) = &check {
                println!("{} updated without conflict check: {e}", "warning:".yellow());
            }
            println!("{} {}", "Updated".green(), file.display());
            if let Some(url) = &article.url {
                println!("  url: {url}");
            }
        }
        UpdateOutcome::Declined(_) => println!("Update cancelled."),
    }
    Ok(())
}

fn handle_move(api: &EsaClient, number: u64, category: &str, message: Option<String>) -> Result<()> {
    let outcome = sync::move_article(api, number, category, message, &current_dir()?)?;
    println!(
        "{} #{number} to {}",
        "Moved".green(),
        display_name(&outcome.article)
    );
    if let Some(path) = &outcome.local_path {
        println!("  local copy: {}", path.display());
    }
    Ok(())
}

fn handle_create(api: &EsaClient, draft: &ArticleDraft) -> Result<()> {
    let spinner = spinner("Creating article...");
    let result = sync::create_document(api, draft, &current_dir()?);
    spinner.finish_and_clear();

    let (article, path) = result?;
    println!("{} #{} {}", "Created".green(), article.number, display_name(&article));
    println!("  saved to {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// bulk commands
// ---------------------------------------------------------------------------

fn handle_fetch_all(api: &EsaClient, filter: &ListFilter, force: bool) -> Result<()> {
    let listing = list_with_spinner(api, filter)?;
    if listing.articles.is_empty() {
        println!("No articles matched.");
        return Ok(());
    }

    println!("{} article(s) to download:", listing.articles.len());
    for article in &listing.articles {
        print_summary(article);
    }
    println!();
    if !force && !ask_yes_no("Download these articles?")? {
        println!("Cancelled.");
        return Ok(());
    }

    let numbers: Vec<u64> = listing.articles.iter().map(|a| a.number).collect();
    let report = sync::download_articles(api, &numbers, &current_dir()?, |number, result| {
        match result {
            Ok((_, path)) => println!("  {} #{number} -> {}", "ok".green(), path.display()),
            Err(e) => println!("  {} #{number}: {e}", "failed".red()),
        }
    });

    finish_batch("Downloaded", &report)
}

fn handle_update_all(api: &EsaClient, pattern: &str, edits: &UpdateArgs, force: bool) -> Result<()> {
    let files = sync::find_article_files(&current_dir()?, pattern)?;
    if files.is_empty() {
        println!("No article files match '{pattern}'.");
        return Ok(());
    }

    println!("{} file(s) to update:", files.len());
    for file in &files {
        println!("  - {}", file_label(file));
    }
    println!();
    if !force && !ask_yes_no("Update these files?")? {
        println!("Cancelled.");
        return Ok(());
    }

    let mut prompt = TerminalPrompt;
    let report = sync::update_documents(api, &files, &edits.to_options(), &mut prompt, |path, result| {
        let label = file_label(path);
        match result {
            Ok(UpdateOutcome::Updated { .. }) => println!("  {} {label}", "ok".green()),
            Ok(UpdateOutcome::Declined(_)) => println!("  {} {label}: cancelled", "skipped".yellow()),
            Err(e) => println!("  {} {label}: {e}", "failed".red()),
        }
    });

    finish_batch("Updated", &report)
}

/// Print the tally, notify on any success, and fail if anything failed.
fn finish_batch(verb: &str, report: &BatchReport) -> Result<()> {
    println!();
    println!("{verb} {}/{}", report.succeeded.len(), report.total());
    if !report.succeeded.is_empty() {
        notify::send(
            "esa-cli",
            &format!("{verb} {} article(s)", report.succeeded.len()),
        );
    }
    if report.has_failures() {
        bail!("{} of {} failed", report.failed.len(), report.total());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// prompts & helpers
// ---------------------------------------------------------------------------

/// Conflict prompt on the terminal: shows both timestamps, accepts "y".
struct TerminalPrompt;

impl ConflictPrompt for TerminalPrompt {
    fn confirm_overwrite(&mut self, path: &Path, conflict: &Conflict) -> crate::Result<bool> {
        println!(
            "{} #{} ({}) changed remotely after your local copy was synced.",
            "warning:".yellow(),
            conflict.number,
            file_label(path)
        );
        println!("  remote: {}", local_time(&conflict.remote_updated_at));
        println!("  local:  {}", local_time(&conflict.local_updated_at));
        ask_yes_no("Overwrite the remote article?").map_err(|e| EsaError::io("<stdin>", e))
    }
}

/// Blocking y/N question; only "y" (any case) is a yes.
fn ask_yes_no(question: &str) -> std::io::Result<bool> {
    let answer: String = Input::new()
        .with_prompt(format!("{question} (y/N)"))
        .allow_empty(true)
        .interact_text()?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn list_with_spinner(api: &EsaClient, filter: &ListFilter) -> Result<Listing> {
    let spinner = spinner("Fetching articles...");
    let result = api.list_articles(filter);
    spinner.finish_and_clear();

    let listing = result.context("Failed to list articles")?;
    if listing.capped {
        println!(
            "{} stopped after {} pages; older articles in this category were not scanned",
            "warning:".yellow(),
            MAX_CATEGORY_PAGES
        );
    }
    Ok(listing)
}

fn print_summary(article: &Article) {
    let wip = if article.wip { " [WIP]" } else { "" };
    println!("{:>6}: {}{wip}", article.number, display_name(article));
}

fn display_name(article: &Article) -> &str {
    if article.full_name.is_empty() {
        &article.name
    } else {
        &article.full_name
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn local_time(ts: &DateTime<FixedOffset>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("Failed to read the current directory")
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
