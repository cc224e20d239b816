// Front-matter codec for local article files
// ------------------------------------------
// A local document looks like:
//
//     ---
//     title: API Spec
//     category: dev/api
//     tags:
//     - api
//     wip: true
//     remote_updated_at: 2024-01-02T09:00:00+09:00
//     ---
//
//     # Body
//
// Only the first two `---` lines delimit the metadata; later ones belong to
// the body. The body round-trips verbatim except for trailing whitespace,
// which decoding trims (encoding always ends the file with one newline).

use std::path::Path;

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::{Deserialize, Deserializer, Serialize};

use crate::api::Article;
use crate::error::{EsaError, Result};

/// Marker line that opens and closes the metadata block.
pub const DELIMITER: &str = "---";

/// Metadata block of a local document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontMatter {
    pub title: String,

    /// Slash-delimited path; empty means uncategorized.
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub wip: bool,

    /// Remote `updated_at` captured at the last sync. Absent for drafts
    /// that were never pushed.
    #[serde(default, skip_serializing_if = "is_blank")]
    pub remote_updated_at: Option<String>,
}

impl FrontMatter {
    /// Parsed `remote_updated_at`. A value that is not RFC 3339 counts as
    /// unknown, so the conflict check is skipped rather than failing.
    pub fn remote_updated_at(&self) -> Option<DateTime<FixedOffset>> {
        let raw = self.remote_updated_at.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Some(ts),
            Err(e) => {
                tracing::warn!(value = raw, error = %e, "ignoring unparsable remote_updated_at");
                None
            }
        }
    }
}

impl From<&Article> for FrontMatter {
    fn from(article: &Article) -> Self {
        Self {
            title: article.name.clone(),
            category: article.category.clone().unwrap_or_default(),
            tags: article.tags.clone(),
            wip: article.wip,
            remote_updated_at: article
                .updated_at
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

/// A decoded local file: metadata plus Markdown body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDocument {
    pub front_matter: FrontMatter,
    pub body: String,
}

impl LocalDocument {
    /// Projection of a remote article, stamped with its `updated_at`.
    pub fn from_article(article: &Article) -> Self {
        Self {
            front_matter: FrontMatter::from(article),
            body: article.body_md.clone(),
        }
    }

    /// Encode into file contents.
    pub fn render(&self) -> Result<String> {
        let yaml = serde_yaml::to_string(&self.front_matter)
            .map_err(|e| EsaError::parse(format!("failed to encode front matter: {e}")))?;

        let mut out = String::with_capacity(yaml.len() + self.body.len() + 16);
        out.push_str(DELIMITER);
        out.push('\n');
        out.push_str(&yaml);
        if !yaml.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(DELIMITER);
        out.push_str("\n\n");
        out.push_str(self.body.trim_end());
        out.push('\n');
        Ok(out)
    }

    /// Decode file contents. Fails unless the text opens with a delimiter
    /// line and a second delimiter line follows.
    pub fn parse(content: &str) -> Result<Self> {
        let (meta, body) = split_front_matter(content)?;

        let front_matter: FrontMatter = serde_yaml::from_str(meta)
            .map_err(|e| EsaError::parse(format!("invalid front matter: {e}")))?;

        let body = body
            .strip_prefix("\r\n")
            .or_else(|| body.strip_prefix('\n'))
            .unwrap_or(body)
            .trim_end()
            .to_string();

        Ok(Self { front_matter, body })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EsaError::io(path, e))?;
        Self::parse(&content).map_err(|e| match e {
            EsaError::Parse { message } => {
                EsaError::parse(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let content = self.render()?;
        std::fs::write(path, content).map_err(|e| EsaError::io(path, e))
    }
}

/// Split into (metadata, rest-after-closing-delimiter).
fn split_front_matter(content: &str) -> Result<(&str, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut lines = content.split_inclusive('\n');
    let first = lines
        .next()
        .ok_or_else(|| EsaError::parse("document is empty"))?;
    if !is_delimiter(first) {
        return Err(EsaError::parse(
            "front matter must start with a '---' line",
        ));
    }

    let meta_start = first.len();
    let mut offset = meta_start;
    for line in lines {
        if is_delimiter(line) {
            return Ok((&content[meta_start..offset], &content[offset + line.len()..]));
        }
        offset += line.len();
    }

    Err(EsaError::parse("front matter is missing its closing '---' line"))
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end_matches(['\n', '\r']) == DELIMITER
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use proptest::collection::vec;
    use proptest::prelude::*;

    use super::*;

    fn doc(title: &str, category: &str, tags: &[&str], wip: bool, body: &str) -> LocalDocument {
        LocalDocument {
            front_matter: FrontMatter {
                title: title.into(),
                category: category.into(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                wip,
                remote_updated_at: None,
            },
            body: body.into(),
        }
    }

    #[test]
    fn round_trip_preserves_fields_and_body() {
        let original = doc("API Spec", "dev", &["api", "auth"], true, "# Hello");
        let text = original.render().expect("render");
        assert!(text.starts_with("---\ntitle: API Spec\n"));
        assert!(text.contains("---\n\n# Hello\n"));
        assert!(!text.contains("remote_updated_at"));

        let parsed = LocalDocument::parse(&text).expect("parse");
        assert_eq!(parsed, original);
    }

    #[test]
    fn round_trip_keeps_tag_order_and_awkward_values() {
        let mut original = doc(
            "yes: no",
            "日報/2024/01",
            &["zeta", "alpha", "2024", "true"],
            false,
            "line one\n\n---\nnot metadata\n  indented",
        );
        original.front_matter.remote_updated_at = Some("2024-01-01T00:00:00Z".into());

        let parsed = LocalDocument::parse(&original.render().expect("render")).expect("parse");
        assert_eq!(parsed, original);
    }

    #[test]
    fn body_keeps_leading_blank_lines_and_trims_trailing_whitespace() {
        let original = doc("t", "", &[], false, "\n\n    code block\n\n\n");
        let parsed = LocalDocument::parse(&original.render().expect("render")).expect("parse");
        assert_eq!(parsed.body, "\n\n    code block");
    }

    #[test]
    fn single_delimiter_is_a_parse_error() {
        for input in [
            "---\ntitle: x\nbody without closing marker\n",
            "title: x\n---\nbody\n",
            "no delimiters at all",
            "",
            "---",
        ] {
            let err = LocalDocument::parse(input).unwrap_err();
            assert!(matches!(err, EsaError::Parse { .. }), "input {input:?}");
        }
    }

    #[test]
    fn text_before_first_delimiter_is_rejected() {
        let err = LocalDocument::parse("preamble\n---\ntitle: x\n---\nbody").unwrap_err();
        assert!(matches!(err, EsaError::Parse { .. }));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = LocalDocument::parse("---\ntitle: [unclosed\n---\n\nbody").unwrap_err();
        assert!(matches!(err, EsaError::Parse { .. }));
    }

    #[test]
    fn missing_optional_keys_default_and_unknown_keys_are_ignored() {
        let text = "---\ntitle: Draft\nauthor: someone\nextra:\n  nested: 1\n---\n\nbody";
        let parsed = LocalDocument::parse(text).expect("parse");
        assert_eq!(parsed.front_matter.title, "Draft");
        assert_eq!(parsed.front_matter.category, "");
        assert!(parsed.front_matter.tags.is_empty());
        assert!(!parsed.front_matter.wip);
        assert_eq!(parsed.front_matter.remote_updated_at, None);
        assert_eq!(parsed.body, "body");
    }

    #[test]
    fn null_values_fall_back_to_defaults() {
        let text = "---\ntitle: t\ncategory:\ntags:\nwip:\n---\nbody\n";
        let parsed = LocalDocument::parse(text).expect("parse");
        assert_eq!(parsed.front_matter.category, "");
        assert!(parsed.front_matter.tags.is_empty());
        assert!(!parsed.front_matter.wip);
    }

    #[test]
    fn crlf_documents_parse() {
        let text = "---\r\ntitle: t\r\n---\r\n\r\nbody\r\n";
        let parsed = LocalDocument::parse(text).expect("parse");
        assert_eq!(parsed.front_matter.title, "t");
        assert_eq!(parsed.body, "body");
    }

    #[test]
    fn remote_updated_at_parsing() {
        let mut fm = FrontMatter {
            title: "t".into(),
            remote_updated_at: Some("2024-01-02T09:00:00+09:00".into()),
            ..FrontMatter::default()
        };
        let ts = fm.remote_updated_at().expect("valid timestamp");
        assert_eq!(ts.to_rfc3339(), "2024-01-02T09:00:00+09:00");

        fm.remote_updated_at = Some("yesterday".into());
        assert_eq!(fm.remote_updated_at(), None);

        fm.remote_updated_at = Some("  ".into());
        assert_eq!(fm.remote_updated_at(), None);
    }

    #[test]
    fn read_reports_path_on_parse_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("1-broken.md");
        std::fs::write(&path, "no front matter").expect("write");

        let err = LocalDocument::read(&path).unwrap_err();
        assert!(err.to_string().contains("1-broken.md"));
    }

    fn body_char() -> impl Strategy<Value = char> {
        prop_oneof![
            (b'a'..=b'z').prop_map(char::from),
            (b'0'..=b'9').prop_map(char::from),
            Just(' '),
            Just('\n'),
            Just('\t'),
            Just('-'),
            Just('#'),
            Just(':'),
            Just('*'),
            Just('"'),
            Just('日'),
            Just('本'),
        ]
    }

    fn body() -> impl Strategy<Value = String> {
        vec(body_char(), 0..120).prop_map(|chars| chars.into_iter().collect())
    }

    fn document() -> impl Strategy<Value = LocalDocument> {
        (
            "[a-zA-Z0-9 :#'\"/_.,!?-]{0,24}",
            "[a-z0-9/ _-]{0,20}",
            vec("[a-zA-Z0-9_-]{1,10}", 0..5),
            any::<bool>(),
            proptest::option::of("2024-0[1-9]-1[0-9]T0[0-9]:00:00Z"),
            body(),
        )
            .prop_map(|(title, category, tags, wip, remote_updated_at, body)| LocalDocument {
                front_matter: FrontMatter {
                    title,
                    category,
                    tags,
                    wip,
                    remote_updated_at,
                },
                body,
            })
    }

    /// Lines that are never a bare delimiter.
    fn non_delimiter_lines() -> impl Strategy<Value = Vec<String>> {
        vec("[a-z: -]{0,6}".prop_filter("not a delimiter", |l| l != DELIMITER), 0..8)
    }

    proptest! {
        #[test]
        fn parse_inverts_render(doc in document()) {
            let rendered = doc.render().expect("render");
            let parsed = LocalDocument::parse(&rendered).expect("parse");

            prop_assert_eq!(&parsed.front_matter, &doc.front_matter);
            prop_assert_eq!(parsed.body.as_str(), doc.body.trim_end());
        }

        #[test]
        fn fewer_than_two_delimiters_is_a_parse_error(
            mut lines in non_delimiter_lines(),
            delimiter_at in proptest::option::of(0usize..8),
        ) {
            if let Some(at) = delimiter_at {
                let at = at.min(lines.len());
                lines.insert(at, DELIMITER.to_string());
            }
            let content = lines.join("\n");

            let result = LocalDocument::parse(&content);
            prop_assert!(
                matches!(result, Err(EsaError::Parse { .. })),
                "expected a parse error for {:?}",
                content
            );
        }
    }
}
