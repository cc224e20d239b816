// API client module: a small blocking client for the esa.io v1 REST API.
// It maps JSON payloads to `Article` values and turns non-success status
// codes into `EsaError`s. The HTTP call itself goes through a `Transport`
// so tests can script responses.

use chrono::{DateTime, FixedOffset};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{EsaError, Result};
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

pub const DEFAULT_BASE_URL: &str = "https://api.esa.io/v1";

/// Page size used when no limit is given.
pub const DEFAULT_PER_PAGE: usize = 10;

/// Largest page the API serves.
pub const MAX_PER_PAGE: usize = 100;

/// Hard cap on pages scanned for a client-side category filter
/// (`MAX_CATEGORY_PAGES * MAX_PER_PAGE` = 2000 articles).
pub const MAX_CATEGORY_PAGES: u32 = 20;

/// A remote article as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub number: u64,
    pub name: String,
    /// `category/name`, or just `name` when uncategorized.
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub wip: bool,
    #[serde(default)]
    pub body_md: String,
    #[serde(default)]
    pub created_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Fields to change on update. `None` fields are left untouched server-side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArticlePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_md: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wip: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A new article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleDraft {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_md: Option<String>,
    pub wip: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Search options for listing articles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Category path; matched client-side, including sub-categories.
    pub category: Option<String>,
    pub tag: Option<String>,
    /// Free-text search words.
    pub query: Option<String>,
    /// Screen name of the author.
    pub author: Option<String>,
    /// Max results. Without a category this is the page size (default 10);
    /// with one, it truncates the filtered result (default: everything found).
    pub limit: Option<usize>,
    pub page: Option<u32>,
}

impl ListFilter {
    /// The `q` parameter: tag and author use esa's search qualifiers.
    pub fn search_query(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(tag) = non_empty(&self.tag) {
            parts.push(format!("tag:{tag}"));
        }
        if let Some(author) = non_empty(&self.author) {
            parts.push(format!("user:{author}"));
        }
        if let Some(query) = non_empty(&self.query) {
            parts.push(query.to_string());
        }
        (!parts.is_empty()).then(|| parts.join(" "))
    }

    fn category(&self) -> Option<&str> {
        non_empty(&self.category).map(|c| c.trim_end_matches('/'))
    }
}

/// Result of a listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub articles: Vec<Article>,
    /// True when the category scan stopped at [`MAX_CATEGORY_PAGES`] with
    /// pages left unread.
    pub capped: bool,
}

#[derive(Deserialize)]
struct PostsPage {
    #[serde(default)]
    posts: Vec<Article>,
    #[serde(default)]
    next_page: Option<u32>,
}

#[derive(Serialize)]
struct PostEnvelope<'a, T> {
    post: &'a T,
}

/// Client bound to one team. Generic over the transport so tests can
/// substitute a scripted one.
pub struct EsaClient<T: Transport = ReqwestTransport> {
    transport: T,
    base_url: String,
    team_name: String,
    access_token: String,
}

impl EsaClient<ReqwestTransport> {
    /// Production client talking to api.esa.io.
    pub fn connect(team_name: &str, access_token: &str) -> Result<Self> {
        Ok(Self::new(ReqwestTransport::new()?, team_name, access_token))
    }
}

impl<T: Transport> EsaClient<T> {
    pub fn new(transport: T, team_name: &str, access_token: &str) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            team_name: team_name.to_string(),
            access_token: access_token.to_string(),
        }
    }

    /// Point the client at another API root.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn team_name(&self) -> &str {
        &self.team_name
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// `/teams/{team}` with the team name percent-encoded.
    fn team_path(&self) -> String {
        format!("/teams/{}", urlencoding::encode(&self.team_name))
    }

    /// Check that the token can read the team. Used by `setup`.
    pub fn test_connection(&self) -> Result<()> {
        let path = self.team_path();
        let res = self.send(Method::GET, &path, None)?;
        match res.status {
            200..=299 => Ok(()),
            401 => Err(EsaError::Api {
                status: 401,
                body: "access token is invalid".into(),
            }),
            404 => Err(EsaError::Api {
                status: 404,
                body: format!(
                    "team '{}' does not exist or is not accessible",
                    self.team_name
                ),
            }),
            status => Err(EsaError::Api {
                status,
                body: res.body,
            }),
        }
    }

    /// List articles. A category filter triggers a paginated scan with a
    /// client-side path-prefix match, because the API does not reliably
    /// include sub-categories.
    pub fn list_articles(&self, filter: &ListFilter) -> Result<Listing> {
        match filter.category() {
            None => {
                let per_page = filter
                    .limit
                    .unwrap_or(DEFAULT_PER_PAGE)
                    .clamp(1, MAX_PER_PAGE);
                let page = self.list_page(filter, filter.page.unwrap_or(1), per_page)?;
                Ok(Listing {
                    articles: page.posts,
                    capped: false,
                })
            }
            Some(category) => self.list_in_category(filter, category),
        }
    }

    fn list_in_category(&self, filter: &ListFilter, category: &str) -> Result<Listing> {
        let mut all = Vec::new();
        let mut capped = false;

        for page_number in 1..=MAX_CATEGORY_PAGES {
            let page = self.list_page(filter, page_number, MAX_PER_PAGE)?;
            let fetched = page.posts.len();
            all.extend(page.posts);

            if fetched < MAX_PER_PAGE || page.next_page.is_none() {
                break;
            }
            if page_number == MAX_CATEGORY_PAGES {
                capped = true;
                tracing::warn!(
                    scanned = all.len(),
                    "category scan stopped at the {} page cap",
                    MAX_CATEGORY_PAGES
                );
            }
        }

        let mut articles = filter_by_category(all, category);
        if let Some(limit) = filter.limit {
            articles.truncate(limit);
        }
        Ok(Listing { articles, capped })
    }

    fn list_page(&self, filter: &ListFilter, page: u32, per_page: usize) -> Result<PostsPage> {
        let mut path = format!("{}/posts?page={page}&per_page={per_page}", self.team_path());
        if let Some(q) = filter.search_query() {
            path.push_str("&q=");
            path.push_str(&urlencoding::encode(&q));
        }

        let res = self.send(Method::GET, &path, None)?;
        decode(check(res, None)?)
    }

    pub fn fetch_article(&self, number: u64) -> Result<Article> {
        let path = format!("{}/posts/{number}", self.team_path());
        let res = self.send(Method::GET, &path, None)?;
        decode(check(res, Some(number))?)
    }

    /// PATCH an article. Each success creates a new server-side revision.
    pub fn update_article(&self, number: u64, patch: &ArticlePatch) -> Result<Article> {
        let path = format!("{}/posts/{number}", self.team_path());
        let body = serde_json::to_value(PostEnvelope { post: patch })?;
        let res = self.send(Method::PATCH, &path, Some(body))?;
        let article: Article = decode(check(res, Some(number))?)?;
        tracing::info!(number, "updated article");
        Ok(article)
    }

    pub fn create_article(&self, draft: &ArticleDraft) -> Result<Article> {
        let path = format!("{}/posts", self.team_path());
        let body = serde_json::to_value(PostEnvelope { post: draft })?;
        let res = self.send(Method::POST, &path, Some(body))?;
        let article: Article = decode(check(res, None)?)?;
        tracing::info!(number = article.number, "created article");
        Ok(article)
    }

    fn send(&self, method: Method, path: &str, body: Option<serde_json::Value>) -> Result<HttpResponse> {
        let request = HttpRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            token: self.access_token.clone(),
            body,
        };
        self.transport.execute(&request)
    }
}

/// Keep articles whose path equals `category` or lies beneath it.
pub fn filter_by_category(articles: Vec<Article>, category: &str) -> Vec<Article> {
    let category = category.trim_end_matches('/');
    let prefix = format!("{category}/");
    let within = |path: &str| path == category || path.starts_with(&prefix);

    articles
        .into_iter()
        .filter(|a| within(&a.full_name) || a.category.as_deref().is_some_and(|c| within(c)))
        .collect()
}

fn check(res: HttpResponse, number: Option<u64>) -> Result<HttpResponse> {
    if res.is_success() {
        return Ok(res);
    }
    match (res.status, number) {
        (404, Some(number)) => Err(EsaError::NotFound { number }),
        (status, _) => Err(EsaError::Api {
            status,
            body: res.body,
        }),
    }
}

fn decode<D: DeserializeOwned>(res: HttpResponse) -> Result<D> {
    Ok(serde_json::from_str(&res.body)?)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::transport::mock::MockTransport;

    fn client() -> EsaClient<MockTransport> {
        EsaClient::new(MockTransport::new(), "docs", "secret")
    }

    fn article_json(number: u64, full_name: &str) -> serde_json::Value {
        let (category, name) = match full_name.rsplit_once('/') {
            Some((c, n)) => (json!(c), n),
            None => (json!(null), full_name),
        };
        json!({
            "number": number,
            "name": name,
            "full_name": full_name,
            "category": category,
            "tags": ["api"],
            "wip": false,
            "body_md": "body",
            "created_at": "2024-01-01T09:00:00+09:00",
            "updated_at": "2024-01-02T09:00:00+09:00",
            "url": format!("https://docs.esa.io/posts/{number}"),
        })
    }

    #[test]
    fn fetch_sends_bearer_token_and_decodes() {
        let client = client();
        client.transport().push_json(200, article_json(42, "dev/API Spec"));

        let article = client.fetch_article(42).expect("fetch");
        assert_eq!(article.number, 42);
        assert_eq!(article.name, "API Spec");
        assert_eq!(article.category.as_deref(), Some("dev"));
        assert_eq!(
            article.updated_at.expect("updated_at").to_rfc3339(),
            "2024-01-02T09:00:00+09:00"
        );

        let requests = client.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].url, "https://api.esa.io/v1/teams/docs/posts/42");
        assert_eq!(requests[0].token, "secret");
    }

    #[test]
    fn fetch_maps_404_to_not_found() {
        let client = client();
        client.transport().push_status(404);

        let err = client.fetch_article(7).unwrap_err();
        assert!(matches!(err, EsaError::NotFound { number: 7 }));
    }

    #[test]
    fn server_errors_carry_status_and_body() {
        let client = client();
        client
            .transport()
            .push_json(500, json!({"error": "internal"}));

        match client.fetch_article(7).unwrap_err() {
            EsaError::Api { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("internal"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn update_wraps_patch_under_post_and_omits_unset_fields() {
        let client = client().with_base_url("http://localhost:9000/v1/");
        client.transport().push_json(200, article_json(5, "dev/Title"));

        let patch = ArticlePatch {
            category: Some("dev".into()),
            message: Some("move".into()),
            ..ArticlePatch::default()
        };
        client.update_article(5, &patch).expect("update");

        let request = &client.transport().requests()[0];
        assert_eq!(request.method, Method::PATCH);
        assert_eq!(request.url, "http://localhost:9000/v1/teams/docs/posts/5");
        assert_eq!(
            request.body,
            Some(json!({"post": {"category": "dev", "message": "move"}}))
        );
    }

    #[test]
    fn create_posts_draft() {
        let client = client();
        client.transport().push_json(201, article_json(9, "notes/New"));

        let draft = ArticleDraft {
            name: "New".into(),
            category: Some("notes".into()),
            tags: vec!["a".into()],
            body_md: None,
            wip: true,
            message: None,
        };
        let created = client.create_article(&draft).expect("create");
        assert_eq!(created.number, 9);

        let request = &client.transport().requests()[0];
        assert_eq!(request.method, Method::POST);
        assert!(request.url.ends_with("/teams/docs/posts"));
        assert_eq!(
            request.body,
            Some(json!({"post": {"name": "New", "category": "notes", "tags": ["a"], "wip": true}}))
        );
    }

    #[test]
    fn list_folds_filters_into_search_query() {
        let client = client();
        client.transport().push_json(
            200,
            json!({"posts": [article_json(1, "a"), article_json(2, "b")], "next_page": null}),
        );

        let filter = ListFilter {
            tag: Some("api".into()),
            author: Some("alice".into()),
            query: Some("auth flow".into()),
            limit: Some(500),
            ..ListFilter::default()
        };
        let listing = client.list_articles(&filter).expect("list");
        assert_eq!(listing.articles.len(), 2);
        assert!(!listing.capped);

        let url = &client.transport().requests()[0].url;
        assert!(url.contains("per_page=100"), "{url}");
        assert!(url.contains("page=1"), "{url}");
        assert!(url.contains("q=tag%3Aapi%20user%3Aalice%20auth%20flow"), "{url}");
    }

    #[test]
    fn category_listing_paginates_and_filters_client_side() {
        let client = client();
        let first: Vec<_> = (1..=100)
            .map(|n| {
                if n % 2 == 0 {
                    article_json(n, &format!("dev/api/Doc {n}"))
                } else {
                    article_json(n, &format!("dev-ops/Doc {n}"))
                }
            })
            .collect();
        client
            .transport()
            .push_json(200, json!({"posts": first, "next_page": 2}))
            .push_json(
                200,
                json!({"posts": [article_json(101, "dev/Top")], "next_page": null}),
            );

        let filter = ListFilter {
            category: Some("dev/".into()),
            ..ListFilter::default()
        };
        let listing = client.list_articles(&filter).expect("list");

        assert_eq!(client.transport().requests().len(), 2);
        assert_eq!(listing.articles.len(), 51);
        assert!(listing
            .articles
            .iter()
            .all(|a| a.full_name.starts_with("dev/")));
        for request in client.transport().requests() {
            assert!(!request.url.contains("category"), "{}", request.url);
        }
    }

    #[test]
    fn category_scan_stops_at_page_cap() {
        let client = client();
        for page in 0..MAX_CATEGORY_PAGES {
            let posts: Vec<_> = (0..MAX_PER_PAGE as u64)
                .map(|i| article_json(u64::from(page) * 100 + i + 1, "dev/Doc"))
                .collect();
            client
                .transport()
                .push_json(200, json!({"posts": posts, "next_page": page + 2}));
        }

        let filter = ListFilter {
            category: Some("dev".into()),
            limit: Some(3),
            ..ListFilter::default()
        };
        let listing = client.list_articles(&filter).expect("list");

        assert!(listing.capped);
        assert_eq!(listing.articles.len(), 3);
        assert_eq!(
            client.transport().requests().len(),
            MAX_CATEGORY_PAGES as usize
        );
    }

    #[test]
    fn category_filter_matches_exact_and_nested_paths() {
        let articles: Vec<Article> = ["dev", "dev/api/Doc", "devtools/Doc", "other/dev/Doc"]
            .iter()
            .enumerate()
            .map(|(i, name)| {
                serde_json::from_value(article_json(i as u64 + 1, name)).expect("article")
            })
            .collect();

        let kept: Vec<_> = filter_by_category(articles, "dev")
            .into_iter()
            .map(|a| a.full_name)
            .collect();
        assert_eq!(kept, vec!["dev", "dev/api/Doc"]);
    }

    #[test]
    fn test_connection_reports_bad_token() {
        let client = client();
        client.transport().push_status(401);

        let err = client.test_connection().unwrap_err();
        assert!(err.to_string().contains("access token is invalid"));
        assert!(client.transport().requests()[0].url.ends_with("/teams/docs"));
    }

    #[test]
    fn team_name_is_percent_encoded_in_paths() {
        let client = EsaClient::new(MockTransport::new(), "my team/x", "secret");
        client.transport().push_json(200, article_json(3, "dev/Doc"));
        client
            .transport()
            .push_json(200, json!({"posts": [], "next_page": null}));

        client.fetch_article(3).expect("fetch");
        client
            .list_articles(&ListFilter::default())
            .expect("list");

        let requests = client.transport().requests();
        assert_eq!(
            requests[0].url,
            "https://api.esa.io/v1/teams/my%20team%2Fx/posts/3"
        );
        assert!(
            requests[1].url.starts_with("https://api.esa.io/v1/teams/my%20team%2Fx/posts?"),
            "{}",
            requests[1].url
        );
    }

    #[test]
    fn list_requests_the_given_page() {
        let client = client();
        client
            .transport()
            .push_json(200, json!({"posts": [], "next_page": null}));

        let filter = ListFilter {
            page: Some(3),
            limit: Some(20),
            ..ListFilter::default()
        };
        client.list_articles(&filter).expect("list");

        let url = &client.transport().requests()[0].url;
        assert!(url.contains("?page=3&per_page=20"), "{url}");
    }
}
