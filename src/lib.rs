// Library root
// ------------
// The binary (`main.rs`) only parses arguments and hands them to `ui`.
//
// Module responsibilities:
// - `frontmatter`: encodes/decodes local `{number}-{title}.md` documents.
// - `api` + `transport`: the esa.io REST client and its swappable HTTP layer.
// - `sync`: download/create/move and the conflict-aware update flow.
// - `config`: the JSON credentials file.
// - `cli` + `ui`: argument definitions and the terminal flows.
// - `notify`: best-effort desktop notifications.
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod frontmatter;
pub mod notify;
pub mod sync;
pub mod transport;
pub mod ui;

pub use error::{EsaError, Result};
