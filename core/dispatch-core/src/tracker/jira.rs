//! Jira Cloud ticket source (`POST /rest/api/3/search/jql`).

use super::TicketSource;
use crate::config::TrackerConfig;
use crate::error::{DispatchError, Result};
use crate::labels::{parse_profile, ProfileDefaults};
use crate::types::WorkItem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

const SITE_ENV: &str = "JIRA_SITE";
const EMAIL_ENV: &str = "JIRA_EMAIL";
const TOKEN_ENV: &str = "JIRA_TOKEN";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const NO_SUMMARY: &str = "No summary";

#[derive(Clone)]
pub struct JiraCredentials {
    pub site: String,
    pub email: String,
    pub token: String,
}

impl std::fmt::Debug for JiraCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiraCredentials")
            .field("site", &self.site)
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl JiraCredentials {
    /// `JIRA_SITE` wins over the configured site; email and token are env-only.
    pub fn from_env(configured_site: Option<&str>) -> Result<Self> {
        Self::from_lookup(configured_site, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        configured_site: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let non_empty = |value: Option<String>| value.filter(|value| !value.trim().is_empty());
        let site = non_empty(lookup(SITE_ENV))
            .or_else(|| non_empty(configured_site.map(str::to_string)))
            .ok_or_else(|| DispatchError::MissingCredential(SITE_ENV.to_string()))?;
        let email = non_empty(lookup(EMAIL_ENV))
            .ok_or_else(|| DispatchError::MissingCredential(EMAIL_ENV.to_string()))?;
        let token = non_empty(lookup(TOKEN_ENV))
            .ok_or_else(|| DispatchError::MissingCredential(TOKEN_ENV.to_string()))?;

        let site = site
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();
        Ok(Self { site, email, token })
    }

    pub fn search_url(&self) -> String {
        format!("https://{}/rest/api/3/search/jql", self.site)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    jql: &'a str,
    fields: &'a [String],
    max_results: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub issues: Vec<Issue>,
}

#[derive(Debug, Deserialize)]
pub struct Issue {
    pub key: String,
    #[serde(default)]
    pub fields: IssueFields,
}

#[derive(Debug, Default, Deserialize)]
pub struct IssueFields {
    pub summary: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub status: Option<NamedField>,
    pub parent: Option<KeyField>,
    pub comment: Option<CommentField>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NamedField {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct KeyField {
    pub key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentField {
    pub total: Option<u32>,
}

pub fn parse_search_response(body: &str) -> Result<SearchResponse> {
    serde_json::from_str(body).map_err(|source| DispatchError::Json {
        context: "parsing Jira search response".to_string(),
        source,
    })
}

/// The parse boundary for tracker payloads: everything loosely typed stops here.
pub fn issue_to_work_item(issue: Issue, defaults: &ProfileDefaults) -> WorkItem {
    let fields = issue.fields;
    let summary = fields
        .summary
        .filter(|summary| !summary.trim().is_empty())
        .unwrap_or_else(|| NO_SUMMARY.to_string());
    WorkItem {
        id: issue.key,
        summary,
        status: fields.status.and_then(|status| status.name).unwrap_or_default(),
        parent_id: fields.parent.and_then(|parent| parent.key),
        comment_count: fields.comment.and_then(|comment| comment.total).unwrap_or(0),
        profile: parse_profile(&fields.labels, defaults),
    }
}

pub struct JiraSource {
    client: reqwest::blocking::Client,
    credentials: JiraCredentials,
    queries: Vec<String>,
    fields: Vec<String>,
    max_results: u32,
    defaults: ProfileDefaults,
}

impl JiraSource {
    pub fn new(
        credentials: JiraCredentials,
        tracker: &TrackerConfig,
        defaults: ProfileDefaults,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| DispatchError::Http {
                context: "building HTTP client".to_string(),
                source,
            })?;
        Ok(Self {
            client,
            credentials,
            queries: tracker
                .queries
                .iter()
                .filter(|query| !query.trim().is_empty())
                .cloned()
                .collect(),
            fields: tracker.fields.clone(),
            max_results: tracker.max_results,
            defaults,
        })
    }

    fn search(&self, jql: &str) -> Result<SearchResponse> {
        let response = self
            .client
            .post(self.credentials.search_url())
            .basic_auth(&self.credentials.email, Some(&self.credentials.token))
            .json(&SearchRequest {
                jql,
                fields: &self.fields,
                max_results: self.max_results,
            })
            .send()
            .map_err(|source| DispatchError::Http {
                context: "searching Jira".to_string(),
                source,
            })?;

        let status = response.status();
        let body = response.text().map_err(|source| DispatchError::Http {
            context: "reading Jira response".to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(DispatchError::TrackerStatus {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        parse_search_response(&body)
    }
}

impl TicketSource for JiraSource {
    /// Runs every query in order and concatenates results, first occurrence of
    /// a key wins. Any failing query fails the whole poll so a partial listing
    /// never reads as removals.
    fn poll(&mut self) -> Result<Vec<WorkItem>> {
        let mut seen = BTreeSet::new();
        let mut items = Vec::new();
        for jql in &self.queries {
            for issue in self.search(jql)?.issues {
                if seen.insert(issue.key.clone()) {
                    items.push(issue_to_work_item(issue, &self.defaults));
                }
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelTier;
    use std::collections::HashMap;

    const RESPONSE: &str = r#"{
        "issues": [
            {
                "key": "KAN-1",
                "fields": {
                    "summary": "Fix login",
                    "labels": ["IA:MODEL:STRONG", "IA:CAP:THINK"],
                    "status": {"name": "Agent-Ready"},
                    "comment": {"total": 3}
                }
            },
            {
                "key": "KAN-2",
                "fields": {
                    "parent": {"key": "KAN-1"},
                    "status": {"name": "In Review"}
                }
            }
        ],
        "isLast": true
    }"#;

    #[test]
    fn parse_response_into_work_items() {
        let response = parse_search_response(RESPONSE).unwrap();
        let items: Vec<_> = response
            .issues
            .into_iter()
            .map(|issue| issue_to_work_item(issue, &ProfileDefaults::default()))
            .collect();

        assert_eq!(items[0].id, "KAN-1");
        assert_eq!(items[0].comment_count, 3);
        assert_eq!(items[0].profile.model, ModelTier::Strong);
        assert!(items[0].profile.thinking);
        assert_eq!(items[1].summary, "No summary");
        assert_eq!(items[1].parent_id.as_deref(), Some("KAN-1"));
        assert_eq!(items[1].status, "In Review");
    }

    #[test]
    fn malformed_response_is_an_error() {
        assert!(parse_search_response("<html>").is_err());
        assert!(parse_search_response("{}").unwrap().issues.is_empty());
    }

    #[test]
    fn credentials_prefer_env_site_and_require_token() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("JIRA_SITE", "https://env.atlassian.net/"),
            ("JIRA_EMAIL", "ops@example.com"),
            ("JIRA_TOKEN", "secret"),
        ]);
        let lookup = |key: &str| env.get(key).map(|value| value.to_string());
        let credentials = JiraCredentials::from_lookup(Some("cfg.atlassian.net"), lookup).unwrap();
        assert_eq!(credentials.site, "env.atlassian.net");
        assert_eq!(
            credentials.search_url(),
            "https://env.atlassian.net/rest/api/3/search/jql"
        );
        assert!(!format!("{credentials:?}").contains("secret"));

        let missing = JiraCredentials::from_lookup(Some("cfg.atlassian.net"), |key| {
            (key == "JIRA_EMAIL").then(|| "ops@example.com".to_string())
        });
        assert!(matches!(missing, Err(DispatchError::MissingCredential(name)) if name == "JIRA_TOKEN"));
    }
}
