//! GitHub transport.
//!
//! The sync pipeline talks to the issue tracker only through
//! [`IssueTransport`], one page per call. [`GithubTransport`] is the
//! production implementation over `reqwest`:
//!
//! - The first page is `GET {api_url}/repos/{owner}/{name}/issues` with
//!   `per_page`, an optional `since`, and `state=all` when closed issues
//!   are requested.
//! - Later pages follow the exact URL from the `Link: <...>; rel="next"`
//!   header of the previous response.
//!
//! Every request, including link follows and GraphQL calls, carries the
//! same header set: `Accept: application/vnd.github+json`,
//! `X-GitHub-Api-Version`, `User-Agent`, and `Authorization: Bearer` when
//! a token is configured.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::RequestBuilder;
use serde::Deserialize;
use tracing::debug;

use crate::config::{Config, GithubConfig};
use crate::error::{MirrorError, Result};
use crate::models::RepoName;

pub const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const GITHUB_JSON: &str = "application/vnd.github+json";

/// Which page to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    First {
        repo: RepoName,
        /// `yyyy-MM-ddTHH:mm:ssZ`; absent on a full-history fetch.
        since: Option<String>,
        per_page: u32,
        include_closed: bool,
    },
    /// An opaque URL from a previous page's `rel="next"` link.
    Next { link: String },
}

/// One fetched page, before any decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuePage {
    pub status: u16,
    pub body: String,
    pub next: Option<String>,
}

impl IssuePage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait IssueTransport: Send + Sync {
    async fn fetch_issue_page(&self, request: &PageRequest) -> Result<IssuePage>;
}

/// Extract the `rel="next"` target from a `Link` header value.
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        let is_next = segments.any(|param| {
            let param = param.trim();
            param
                .strip_prefix("rel=")
                .map(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"))
                .unwrap_or(false)
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

pub struct GithubTransport {
    client: reqwest::Client,
    config: GithubConfig,
    token: Option<String>,
}

impl GithubTransport {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
            token: config.resolved_token(),
        })
    }

    fn with_headers(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header(ACCEPT, GITHUB_JSON)
            .header(API_VERSION_HEADER, &self.config.api_version)
            .header(USER_AGENT, &self.config.user_agent);
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => builder,
        }
    }

    fn issues_url(&self, repo: &RepoName) -> String {
        format!(
            "{}/repos/{}/{}/issues",
            self.config.api_url.trim_end_matches('/'),
            repo.owner(),
            repo.name()
        )
    }

    /// The first `first` discussions of `repo`, oldest first.
    pub async fn list_discussions(&self, repo: &RepoName, first: u32) -> Result<Vec<Discussion>> {
        let body = serde_json::json!({
            "query": DISCUSSIONS_QUERY,
            "variables": {
                "owner": repo.owner(),
                "name": repo.name(),
                "first": first,
            },
        });

        let response = self
            .with_headers(self.client.post(&self.config.graphql_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(MirrorError::Transport {
                repo: repo.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        parse_discussions(repo, &text)
    }
}

#[async_trait]
impl IssueTransport for GithubTransport {
    async fn fetch_issue_page(&self, request: &PageRequest) -> Result<IssuePage> {
        let builder = match request {
            PageRequest::First {
                repo,
                since,
                per_page,
                include_closed,
            } => {
                let mut query: Vec<(&str, String)> = vec![("per_page", per_page.to_string())];
                if let Some(since) = since {
                    query.push(("since", since.clone()));
                }
                if *include_closed {
                    query.push(("state", "all".to_string()));
                }
                self.client.get(self.issues_url(repo)).query(&query)
            }
            PageRequest::Next { link } => self.client.get(link),
        };

        let response = self.with_headers(builder).send().await?;
        let status = response.status().as_u16();
        let next = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_next_link);
        let body = response.text().await?;

        debug!(status, has_next = next.is_some(), "fetched issue page");
        Ok(IssuePage { status, body, next })
    }
}

const DISCUSSIONS_QUERY: &str = "\
query($owner: String!, $name: String!, $first: Int!) {
  repository(owner: $owner, name: $name) {
    discussions(first: $first, orderBy: {field: CREATED_AT, direction: ASC}) {
      nodes { title createdAt }
    }
  }
}";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discussion {
    pub title: String,
    pub created_at: String,
}

#[derive(Deserialize)]
struct GraphqlResponse {
    data: Option<GraphqlData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlData {
    repository: Option<GraphqlRepository>,
}

#[derive(Deserialize)]
struct GraphqlRepository {
    discussions: GraphqlConnection,
}

#[derive(Deserialize)]
struct GraphqlConnection {
    nodes: Vec<Discussion>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

fn parse_discussions(repo: &RepoName, text: &str) -> Result<Vec<Discussion>> {
    let malformed = |reason: String| MirrorError::MalformedPayload {
        repo: repo.to_string(),
        reason,
    };

    let response: GraphqlResponse =
        serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
    if !response.errors.is_empty() {
        let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(malformed(messages.join("; ")));
    }

    response
        .data
        .and_then(|d| d.repository)
        .map(|r| r.discussions.nodes)
        .ok_or_else(|| malformed("response has no repository data".to_string()))
}

/// `issue-mirror discussions <owner/name>`: print discussion titles.
pub async fn run_discussions(cfg: &Config, repo: &RepoName, first: u32) -> anyhow::Result<()> {
    let transport = GithubTransport::new(&cfg.github)?;
    let discussions = transport.list_discussions(repo, first).await?;

    if discussions.is_empty() {
        println!("No discussions.");
        return Ok(());
    }
    for d in &discussions {
        println!("{}  {}", d.created_at, d.title);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_next_link_github_format() {
        let header = r#"<https://api.github.com/repositories/1/issues?page=2>; rel="next", <https://api.github.com/repositories/1/issues?page=5>; rel="last""#;
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://api.github.com/repositories/1/issues?page=2")
        );
    }

    #[test]
    fn test_parse_next_link_absent_on_last_page() {
        let header = r#"<https://api.github.com/x?page=1>; rel="first", <https://api.github.com/x?page=4>; rel="prev""#;
        assert_eq!(parse_next_link(header), None);
    }

    #[test]
    fn test_parse_next_link_unquoted_and_multi_rel() {
        assert_eq!(
            parse_next_link("<http://h/p2>; rel=next").as_deref(),
            Some("http://h/p2")
        );
        assert_eq!(
            parse_next_link(r#"<http://h/p2>; rel="next last""#).as_deref(),
            Some("http://h/p2")
        );
    }

    #[test]
    fn test_parse_discussions() {
        let repo: RepoName = "acme/widgets".parse().unwrap();
        let text = r#"{"data":{"repository":{"discussions":{"nodes":[
            {"title":"Welcome","createdAt":"2024-01-02T03:04:05Z"}
        ]}}}}"#;
        let discussions = parse_discussions(&repo, text).unwrap();
        assert_eq!(
            discussions,
            vec![Discussion {
                title: "Welcome".to_string(),
                created_at: "2024-01-02T03:04:05Z".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_discussions_graphql_errors() {
        let repo: RepoName = "acme/widgets".parse().unwrap();
        let err = parse_discussions(&repo, r#"{"data":null,"errors":[{"message":"Bad credentials"}]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("Bad credentials"));
    }
}
