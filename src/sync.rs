// Local file synchronization
// --------------------------
// Download, create, move and the conflict-aware update of
// `{number}-{title}.md` documents.
// - Every operation runs sequentially on the calling thread.
// - Bulk variants keep going after a per-document failure and return a
//   `BatchReport`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;

use crate::api::{Article, ArticleDraft, ArticlePatch, EsaClient};
use crate::error::{EsaError, Result};
use crate::frontmatter::{FrontMatter, LocalDocument};
use crate::transport::Transport;

/// Characters replaced with `-` when building a file name from a title.
const UNSAFE_FILENAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Longest title part of a generated file name, in characters.
const MAX_TITLE_CHARS: usize = 100;

// ---------------------------------------------------------------------------
// File names
// ---------------------------------------------------------------------------

/// Article number encoded in a `{number}-{title}.md` file name.
pub fn article_number_from_path(path: &Path) -> Result<u64> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let invalid = || EsaError::FilenameFormat {
        name: name.to_string(),
    };

    let (prefix, _) = name.split_once('-').ok_or_else(invalid)?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    match prefix.parse::<u64>() {
        Ok(number) if number > 0 => Ok(number),
        _ => Err(invalid()),
    }
}

/// True for names shaped like `123-anything.md`.
pub fn is_article_file_name(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\d+-.+\.md$").expect("static regex is valid"))
        .is_match(name)
}

/// `{number}-{title}.md`, with path-hostile characters replaced.
pub fn document_file_name(number: u64, title: &str) -> String {
    let safe: String = title
        .chars()
        .map(|c| if UNSAFE_FILENAME_CHARS.contains(&c) { '-' } else { c })
        .take(MAX_TITLE_CHARS)
        .collect();
    format!("{number}-{safe}.md")
}

/// Article files in `dir` (not recursive) whose names match `pattern`, sorted.
pub fn find_article_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let pattern = glob::Pattern::new(pattern)
        .map_err(|e| EsaError::config(format!("invalid file pattern '{pattern}': {e}")))?;

    let entries = std::fs::read_dir(dir).map_err(|e| EsaError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EsaError::io(dir, e))?;
        if !entry.path().is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if is_article_file_name(name) && pattern.matches(name) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// The local file for `number` in `dir`, if one exists.
pub fn find_local_document(dir: &Path, number: u64) -> Result<Option<PathBuf>> {
    let found = find_article_files(dir, "*.md")?
        .into_iter()
        .find(|path| article_number_from_path(path).ok() == Some(number));
    Ok(found)
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Split a comma-separated tag option, dropping blanks.
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// `(original ++ added) \ removed`, by exact string match. Original order is
/// kept, additions go at the end, and removal wins over addition.
pub fn merge_tags(original: &[String], added: &[String], removed: &[String]) -> Vec<String> {
    original
        .iter()
        .chain(added)
        .filter(|tag| !removed.contains(tag))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Conflict detection
// ---------------------------------------------------------------------------

/// Remote edit that happened after the local copy was synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub number: u64,
    pub remote_updated_at: DateTime<FixedOffset>,
    pub local_updated_at: DateTime<FixedOffset>,
}

/// Result of the fetch-before-update check.
#[derive(Debug)]
pub enum ConflictCheck {
    /// The document has no usable `remote_updated_at`; nothing was fetched.
    NoBaseline,
    /// The remote article is gone (404).
    RemoteMissing,
    /// The fetch failed for another reason; the update proceeds unprotected.
    FetchFailed(EsaError),
    /// Remote is not newer than the local snapshot.
    UpToDate,
    Conflict(Conflict),
}

/// Compare the remote `updated_at` with the snapshot stored in `front_matter`.
pub fn check_conflict<T: Transport>(
    client: &EsaClient<T>,
    number: u64,
    front_matter: &FrontMatter,
) -> ConflictCheck {
    let Some(local_updated_at) = front_matter.remote_updated_at() else {
        return ConflictCheck::NoBaseline;
    };

    let remote = match client.fetch_article(number) {
        Ok(article) => article,
        Err(e) if e.is_not_found() => {
            tracing::debug!(number, "remote article missing, skipping conflict check");
            return ConflictCheck::RemoteMissing;
        }
        Err(e) => {
            tracing::warn!(number, error = %e, "could not fetch remote article; updating without conflict check");
            return ConflictCheck::FetchFailed(e);
        }
    };

    match remote.updated_at {
        Some(remote_updated_at) if remote_updated_at > local_updated_at => {
            ConflictCheck::Conflict(Conflict {
                number,
                remote_updated_at,
                local_updated_at,
            })
        }
        _ => ConflictCheck::UpToDate,
    }
}

/// Asks whether a conflicting update should overwrite the remote article.
pub trait ConflictPrompt {
    fn confirm_overwrite(&mut self, path: &Path, conflict: &Conflict) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// Update flow
// ---------------------------------------------------------------------------

/// Caller-supplied edits applied on top of the local document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Force `wip: false`.
    pub clear_wip: bool,
    /// Replaces the document's category when set.
    pub category: Option<String>,
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
    pub message: Option<String>,
}

/// Terminal state of one document's update.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// Pushed and rewritten from the server's response.
    Updated {
        article: Article,
        check: ConflictCheck,
    },
    /// The user declined to overwrite a newer remote version.
    Declined(Conflict),
}

/// Build the PATCH body from a decoded document and the caller's options.
pub fn build_patch(document: &LocalDocument, options: &UpdateOptions) -> ArticlePatch {
    let fm = &document.front_matter;
    let category = options
        .category
        .clone()
        .unwrap_or_else(|| fm.category.clone());

    ArticlePatch {
        name: Some(fm.title.clone()),
        category: Some(category),
        tags: Some(merge_tags(&fm.tags, &options.add_tags, &options.remove_tags)),
        body_md: Some(document.body.clone()),
        wip: Some(fm.wip && !options.clear_wip),
        message: options.message.clone(),
    }
}

/// Push one local document: read, check for a newer remote version, push,
/// then rewrite the file from the server's response.
///
/// Nothing touches the network if the file name or contents are invalid,
/// and a declined conflict makes no mutating call.
pub fn update_document<T: Transport>(
    client: &EsaClient<T>,
    path: &Path,
    options: &UpdateOptions,
    prompt: &mut dyn ConflictPrompt,
) -> Result<UpdateOutcome> {
    let number = article_number_from_path(path)?;
    let document = LocalDocument::read(path)?;

    let check = check_conflict(client, number, &document.front_matter);
    if let ConflictCheck::Conflict(conflict) = &check {
        if !prompt.confirm_overwrite(path, conflict)? {
            tracing::info!(number, "update declined after conflict");
            return Ok(UpdateOutcome::Declined(conflict.clone()));
        }
    }

    let patch = build_patch(&document, options);
    let article = client.update_article(number, &patch)?;

    LocalDocument::from_article(&article)
        .write(path)
        .map_err(committed(number, path))?;

    Ok(UpdateOutcome::Updated { article, check })
}

/// Per-item results of a bulk operation.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, EsaError)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Update every file in order. A failure (including a declined conflict)
/// is recorded and the loop moves on. `on_result` sees each outcome as it
/// happens.
pub fn update_documents<T: Transport>(
    client: &EsaClient<T>,
    paths: &[PathBuf],
    options: &UpdateOptions,
    prompt: &mut dyn ConflictPrompt,
    mut on_result: impl FnMut(&Path, &Result<UpdateOutcome>),
) -> BatchReport {
    let mut report = BatchReport::default();

    for path in paths {
        let result = update_document(client, path, options, prompt);
        on_result(path, &result);

        let label = path.display().to_string();
        match result {
            Ok(UpdateOutcome::Updated { .. }) => report.succeeded.push(label),
            Ok(UpdateOutcome::Declined(_)) => report.failed.push((label, EsaError::Aborted)),
            Err(e) => report.failed.push((label, e)),
        }
    }

    report
}

// ---------------------------------------------------------------------------
// Download, create, move
// ---------------------------------------------------------------------------

/// Write `article` into `dir` as a local document and return the path.
pub fn save_article(article: &Article, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(document_file_name(article.number, &article.name));
    LocalDocument::from_article(article).write(&path)?;
    Ok(path)
}

/// Fetch one article and save it into `dir`.
pub fn download_article<T: Transport>(
    client: &EsaClient<T>,
    number: u64,
    dir: &Path,
) -> Result<(Article, PathBuf)> {
    let article = client.fetch_article(number)?;
    let path = save_article(&article, dir)?;
    tracing::info!(number, path = %path.display(), "downloaded article");
    Ok((article, path))
}

/// Download each number in order, continuing past failures.
pub fn download_articles<T: Transport>(
    client: &EsaClient<T>,
    numbers: &[u64],
    dir: &Path,
    mut on_result: impl FnMut(u64, &Result<(Article, PathBuf)>),
) -> BatchReport {
    let mut report = BatchReport::default();

    for &number in numbers {
        let result = download_article(client, number, dir);
        on_result(number, &result);

        match result {
            Ok((_, path)) => report.succeeded.push(path.display().to_string()),
            Err(e) => report.failed.push((format!("#{number}"), e)),
        }
    }

    report
}

/// Create a remote article, then save the server's version locally.
pub fn create_document<T: Transport>(
    client: &EsaClient<T>,
    draft: &ArticleDraft,
    dir: &Path,
) -> Result<(Article, PathBuf)> {
    let article = client.create_article(draft)?;
    let path = save_article(&article, dir)?;
    Ok((article, path))
}

/// Result of moving an article to another category.
#[derive(Debug)]
pub struct MoveOutcome {
    pub article: Article,
    /// Local file whose front matter was updated, if one exists.
    pub local_path: Option<PathBuf>,
}

/// Change only the category of `number`. A local copy in `dir` gets the new
/// category. Its `remote_updated_at` is refreshed only when it holds no
/// unpushed edits, so pending local changes still trigger the conflict
/// prompt on their next update.
pub fn move_article<T: Transport>(
    client: &EsaClient<T>,
    number: u64,
    category: &str,
    message: Option<String>,
    dir: &Path,
) -> Result<MoveOutcome> {
    let patch = ArticlePatch {
        category: Some(category.to_string()),
        message,
        ..ArticlePatch::default()
    };
    let article = client.update_article(number, &patch)?;

    // The move is committed from here on, so local failures are LocalWrite.
    let Some(path) = find_local_document(dir, number).map_err(committed(number, dir))? else {
        return Ok(MoveOutcome {
            article,
            local_path: None,
        });
    };

    let mut local = LocalDocument::read(&path).map_err(committed(number, &path))?;
    let server = LocalDocument::from_article(&article);
    let in_sync = local.body == server.body.trim_end()
        && local.front_matter.title == server.front_matter.title
        && local.front_matter.tags == server.front_matter.tags
        && local.front_matter.wip == server.front_matter.wip;

    local.front_matter.category = server.front_matter.category.clone();
    if in_sync {
        local.front_matter.remote_updated_at = server.front_matter.remote_updated_at;
    }
    local.write(&path).map_err(committed(number, &path))?;

    Ok(MoveOutcome {
        article,
        local_path: Some(path),
    })
}

/// Wrap a local failure that happened after the remote change went through.
fn committed(number: u64, path: &Path) -> impl FnOnce(EsaError) -> EsaError + '_ {
    move |source| EsaError::LocalWrite {
        number,
        path: path.to_path_buf(),
        source: Box::new(source),
    }
}
