//! Jira REST search client

use anyhow::Result;
use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;

use super::auth::TokenFile;
use super::http::{build_client, endpoint, read_json};
use super::TicketSource;
use crate::config::Settings;
use crate::domain::TicketRecord;
use crate::AuditError;

/// Fields requested for every search; part of the search cache key.
pub const FIELDS: &str = "key,summary,status,issuetype,assignee,fixVersions,updated";

pub const MAX_RESULTS: u64 = 100;

const SERVICE: &str = "Jira";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    issues: Vec<RawIssue>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIssue {
    key: String,
    #[serde(default)]
    fields: RawFields,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFields {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    status: Option<Named>,
    #[serde(default)]
    issuetype: Option<Named>,
    #[serde(default)]
    assignee: Option<Person>,
    #[serde(default)]
    fix_versions: Option<Vec<Named>>,
    #[serde(default)]
    updated: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Named {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Person {
    #[serde(default)]
    display_name: Option<String>,
}

struct BasicAuth {
    email: String,
    token: String,
}

/// Jira REST client. A usable OAuth token wins; otherwise basic credentials
/// are sent when configured.
pub struct JiraClient {
    client: Client,
    base_url: String,
    browse_root: String,
    token_file: Option<TokenFile>,
    basic: Option<BasicAuth>,
}

impl JiraClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let configured = site_root(&settings.jira_base_url);
        let token_file = settings.jira_token_file.as_deref().map(TokenFile::new);
        let base_url = token_file
            .as_ref()
            .and_then(|file| token_api_root(file))
            .unwrap_or_else(|| configured.clone());
        if base_url.is_empty() {
            return Err(AuditError::Config("JIRA_BASE_URL is not set".to_string()).into());
        }

        let basic = (!settings.jira_email.trim().is_empty()).then(|| BasicAuth {
            email: settings.jira_email.trim().to_string(),
            token: settings.jira_api_token.clone(),
        });

        Ok(Self {
            client: build_client(settings.http_timeout_secs)?,
            browse_root: if configured.is_empty() { base_url.clone() } else { configured },
            base_url,
            token_file,
            basic,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        if let Some(file) = &self.token_file {
            if let Some(token) = file.ensure_fresh(&self.client, Utc::now())? {
                return Ok(request.bearer_auth(token));
            }
            tracing::debug!(path = %file.path().display(), "no usable OAuth token; trying basic auth");
        }
        Ok(match &self.basic {
            Some(basic) => request.basic_auth(&basic.email, Some(&basic.token)),
            None => request,
        })
    }

    fn search_page(&self, jql: &str, start_at: u64, max_results: u64, fields: &str) -> Result<SearchPage> {
        let mut url = endpoint(&self.base_url, &["rest", "api", "2", "search"])?;
        url.query_pairs_mut()
            .append_pair("jql", jql)
            .append_pair("startAt", &start_at.to_string())
            .append_pair("maxResults", &max_results.to_string())
            .append_pair("fields", fields);
        let response = self.authorize(self.client.get(url.as_str()))?.send()?;
        read_json(SERVICE, response)
    }

    /// Run `jql` with `maxResults=0` so malformed queries fail before any
    /// cached search is attempted.
    pub fn validate_jql(&self, jql: &str) -> Result<()> {
        self.search_page(jql, 0, 0, "key").map(|_| ()).map_err(|err| {
            let snippet = jql.chars().take(500).collect::<String>().replace('\n', " ");
            err.context(format!("JQL validation failed. JQL: {snippet}"))
        })
    }

    fn to_record(&self, issue: RawIssue) -> TicketRecord {
        let link = Some(format!("{}/browse/{}", self.browse_root, issue.key));
        ticket_from_raw(issue, link)
    }

    /// Lightweight connectivity check against `/myself`.
    pub fn ping(&self) -> (bool, String) {
        let result = endpoint(&self.base_url, &["rest", "api", "2", "myself"])
            .and_then(|url| self.authorize(self.client.get(url.as_str())))
            .and_then(|req| req.send().map_err(Into::into));
        match result {
            Ok(resp) if resp.status().is_success() => (true, "Jira OK".to_string()),
            Ok(resp) if matches!(resp.status().as_u16(), 401 | 403) => {
                (false, format!("Jira auth failed ({}).", resp.status().as_u16()))
            }
            Ok(resp) => (false, format!("Jira error: HTTP {}", resp.status().as_u16())),
            Err(err) => (false, format!("Jira error: {err:#}")),
        }
    }
}

impl TicketSource for JiraClient {
    fn search(&self, query: &str) -> Result<Vec<TicketRecord>> {
        let first = self.search_page(query, 0, MAX_RESULTS, FIELDS)?;
        let total = first.total;
        let mut issues = first.issues;
        // Servers may cap maxResults below the request, so the next offset is
        // the number of issues received so far.
        while (issues.len() as u64) < total {
            let start = issues.len() as u64;
            let page = self.search_page(query, start, MAX_RESULTS, FIELDS)?;
            if page.issues.is_empty() {
                tracing::warn!(start, total, "Jira returned an empty page before total; stopping");
                break;
            }
            issues.extend(page.issues);
        }
        tracing::debug!(count = issues.len(), "Jira search complete");
        Ok(issues.into_iter().map(|issue| self.to_record(issue)).collect())
    }
}

fn ticket_from_raw(issue: RawIssue, link: Option<String>) -> TicketRecord {
    let fields = issue.fields;
    TicketRecord {
        key: issue.key,
        summary: fields.summary.unwrap_or_default(),
        status: fields.status.map(|s| s.name).unwrap_or_default(),
        issue_type: fields.issuetype.map(|t| t.name).unwrap_or_default(),
        assignee: fields.assignee.and_then(|a| a.display_name).unwrap_or_default(),
        fix_versions: fields.fix_versions.unwrap_or_default().into_iter().map(|v| v.name).collect(),
        updated: fields.updated,
        link,
    }
}

/// Configured site root with trailing `/` and `/browse` removed.
fn site_root(configured: &str) -> String {
    let base = configured.trim().trim_end_matches('/');
    if base.to_ascii_lowercase().ends_with("/browse") {
        base[..base.len() - "/browse".len()].to_string()
    } else {
        base.to_string()
    }
}

fn token_api_root(file: &TokenFile) -> Option<String> {
    match file.load() {
        Ok(token) => token.and_then(|t| t.api_root()),
        Err(err) => {
            tracing::warn!(path = %file.path().display(), "ignoring unreadable token file: {err:#}");
            None
        }
    }
}

/// Fill `{fix_version}` in a JQL template.
pub fn render_jql(template: &str, fix_version: &str) -> String {
    template.replace("{fix_version}", fix_version)
}
