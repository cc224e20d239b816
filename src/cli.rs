// CLI definitions and tracing setup.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::api::ListFilter;
use crate::sync::{parse_tag_list, UpdateOptions};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// esa-cli: edit esa.io articles as local Markdown files.
#[derive(Parser, Debug)]
#[command(
    name = "esa-cli",
    version,
    about = "Download esa.io articles as Markdown files, edit them locally and push them back.",
    long_about = None,
)]
pub struct Cli {
    /// Config file (defaults to ~/.esa-cli-config.json).
    #[arg(long, global = true, env = "ESA_CLI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store the team name and access token.
    Setup,

    /// List articles.
    List {
        /// Number of articles to show.
        limit: Option<usize>,

        /// Result page to show (1-based). A category filter always scans
        /// from the first page.
        #[arg(short, long)]
        page: Option<u32>,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Download one article as `{number}-{title}.md`.
    Fetch {
        /// Article number.
        #[arg(required_unless_present = "latest")]
        number: Option<u64>,

        /// Download the newest article matching the filters instead.
        #[arg(long, conflicts_with = "number")]
        latest: bool,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Push a local file back to esa.
    Update {
        /// Local file named `{number}-{title}.md`.
        file: PathBuf,

        #[command(flatten)]
        edits: UpdateArgs,
    },

    /// Move an article to another category.
    Move {
        /// Article number.
        number: u64,

        /// Destination category path, e.g. `dev/api`.
        category: String,

        /// Revision message.
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Create a new article and download it.
    Create {
        /// Article title.
        title: String,

        /// Category path.
        #[arg(short, long)]
        category: Option<String>,

        /// Tags (comma-separated).
        #[arg(short, long)]
        tags: Option<String>,

        /// Read the body from this file.
        #[arg(short, long)]
        body_file: Option<PathBuf>,

        /// Revision message.
        #[arg(short, long)]
        message: Option<String>,

        /// Publish immediately instead of creating a WIP draft.
        #[arg(short, long)]
        no_wip: bool,
    },

    /// Download every article matching the filters.
    FetchAll {
        #[command(flatten)]
        filter: FilterArgs,

        /// Maximum number of articles.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        force: bool,
    },

    /// Push every local article file matching a pattern.
    UpdateAll {
        #[command(flatten)]
        pattern: PatternArgs,

        #[command(flatten)]
        edits: UpdateArgs,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        force: bool,
    },

    /// Print the version.
    Version,
}

/// Search filters shared by `list`, `fetch` and `fetch-all`.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Category path (includes sub-categories).
    #[arg(short, long)]
    pub category: Option<String>,

    /// Tag.
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Search words.
    #[arg(short, long)]
    pub query: Option<String>,

    /// Author screen name.
    #[arg(short = 'u', long, alias = "user")]
    pub author: Option<String>,
}

impl FilterArgs {
    pub fn to_filter(&self, limit: Option<usize>) -> ListFilter {
        ListFilter {
            category: self.category.clone(),
            tag: self.tag.clone(),
            query: self.query.clone(),
            author: self.author.clone(),
            limit,
            page: None,
        }
    }
}

/// File name pattern for `update-all`, given positionally or with `-p`.
#[derive(Args, Debug, Clone, Default)]
pub struct PatternArgs {
    /// File name pattern, e.g. `12*-*.md` (default `*.md`).
    #[arg(value_name = "PATTERN", conflicts_with = "pattern_flag")]
    pub pattern: Option<String>,

    /// Same as the positional pattern.
    #[arg(short = 'p', long = "pattern", id = "pattern_flag", value_name = "PATTERN")]
    pub pattern_flag: Option<String>,
}

impl PatternArgs {
    pub fn resolve(&self) -> &str {
        self.pattern
            .as_deref()
            .or(self.pattern_flag.as_deref())
            .unwrap_or("*.md")
    }
}

/// Edits applied while pushing a document.
#[derive(Args, Debug, Clone, Default)]
pub struct UpdateArgs {
    /// Clear the WIP flag.
    #[arg(short, long)]
    pub no_wip: bool,

    /// Change the category.
    #[arg(short, long)]
    pub category: Option<String>,

    /// Tags to add (comma-separated).
    #[arg(short, long)]
    pub add_tags: Option<String>,

    /// Tags to remove (comma-separated).
    #[arg(short, long)]
    pub remove_tags: Option<String>,

    /// Revision message.
    #[arg(short, long)]
    pub message: Option<String>,
}

impl UpdateArgs {
    pub fn to_options(&self) -> UpdateOptions {
        UpdateOptions {
            clear_wip: self.no_wip,
            category: self.category.clone().filter(|c| !c.is_empty()),
            add_tags: self.add_tags.as_deref().map(parse_tag_list).unwrap_or_default(),
            remove_tags: self
                .remove_tags
                .as_deref()
                .map(parse_tag_list)
                .unwrap_or_default(),
            message: self.message.clone().filter(|m| !m.is_empty()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing on stderr; stdout is reserved for command output.
pub fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "esa_cli=warn",
        1 => "esa_cli=info",
        2 => "esa_cli=debug",
        _ => "esa_cli=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}
