//! Bitbucket Server commit client

use anyhow::Result;
use reqwest::blocking::Client;
use reqwest::StatusCode;

use super::http::{build_client, endpoint, read_json};
use super::{CommitPage, CommitSource};
use crate::config::Settings;
use crate::AuditError;

const SERVICE: &str = "Bitbucket";

pub struct BitbucketClient {
    client: Client,
    base_url: String,
    email: String,
    app_password: String,
}

impl BitbucketClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let base_url = settings.bitbucket_base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(AuditError::Config("BITBUCKET_BASE_URL is not set".to_string()).into());
        }
        Ok(Self {
            client: build_client(settings.http_timeout_secs)?,
            base_url,
            email: settings.bitbucket_email.clone(),
            app_password: settings.bitbucket_app_password.clone(),
        })
    }

    /// Commit feed for one branch.
    pub fn commits<'a>(&'a self, project: &'a str, repo: &'a str, branch: &'a str) -> BranchCommits<'a> {
        BranchCommits { client: self, project, repo, branch }
    }

    fn get(&self, url: &url::Url) -> reqwest::blocking::RequestBuilder {
        let request = self.client.get(url.as_str());
        if self.email.is_empty() {
            request
        } else {
            request.basic_auth(&self.email, Some(&self.app_password))
        }
    }

    /// Web root used for browser links (the REST suffix stripped).
    fn web_root(&self) -> &str {
        self.base_url.strip_suffix("/rest/api/1.0").unwrap_or(&self.base_url)
    }

    /// Lightweight connectivity check: list at most one repo of `project`.
    pub fn ping(&self, project: &str) -> (bool, String) {
        let url = match endpoint(&self.base_url, &["projects", project, "repos"]) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("limit", "1");
                url
            }
            Err(err) => return (false, format!("Bitbucket error: {err:#}")),
        };
        match self.get(&url).send() {
            Ok(resp) if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                (false, format!("Bitbucket auth failed ({}).", resp.status().as_u16()))
            }
            Ok(resp) if resp.status().is_success() => (true, "Bitbucket OK".to_string()),
            Ok(resp) => (false, format!("Bitbucket error: HTTP {}", resp.status().as_u16())),
            Err(err) => (false, format!("Bitbucket error: {err}")),
        }
    }
}

/// `GET /projects/{project}/repos/{repo}/commits?until={branch}` pages.
pub struct BranchCommits<'a> {
    client: &'a BitbucketClient,
    project: &'a str,
    repo: &'a str,
    branch: &'a str,
}

impl CommitSource for BranchCommits<'_> {
    fn fetch_page(&self, start: u64, limit: u32) -> Result<CommitPage> {
        let mut url = endpoint(
            &self.client.base_url,
            &["projects", self.project, "repos", self.repo, "commits"],
        )?;
        url.query_pairs_mut()
            .append_pair("until", self.branch)
            .append_pair("start", &start.to_string())
            .append_pair("limit", &limit.to_string());

        let response = self.client.get(&url).send()?;
        read_json(SERVICE, response)
    }

    fn commit_link(&self, commit_id: &str) -> Option<String> {
        Some(format!(
            "{}/projects/{}/repos/{}/commits/{}",
            self.client.web_root(),
            self.project,
            self.repo,
            commit_id
        ))
    }
}
