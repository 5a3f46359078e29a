//! Connectivity check

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use crate::config::{load_config, Settings};
use crate::fetch::{BitbucketClient, JiraClient};

#[derive(Args)]
pub struct PingArgs {
    /// Bitbucket project key to check; defaults to the first repo in the audit config
    #[arg(short, long, value_name = "KEY")]
    pub project: Option<String>,

    /// Audit config used to pick a default project
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

pub fn run(args: PingArgs, settings: &Settings) -> Result<()> {
    let project = match args.project {
        Some(project) => project,
        None => {
            let cwd = std::env::current_dir()?;
            let config = load_config(&cwd, args.config.as_deref())?;
            match config.repo_refs()?.into_iter().next() {
                Some(repo) => repo.project,
                None => anyhow::bail!("no project to check; pass --project"),
            }
        }
    };

    let mut all_ok = true;

    let (ok, message) = match BitbucketClient::new(settings) {
        Ok(client) => client.ping(&project),
        Err(err) => (false, format!("Bitbucket error: {err:#}")),
    };
    println!("{message}");
    all_ok &= ok;

    if settings.jira_base_url.trim().is_empty() && settings.jira_token_file.is_none() {
        println!("Jira not configured; skipping");
    } else {
        let (ok, message) = match JiraClient::new(settings) {
            Ok(client) => client.ping(),
            Err(err) => (false, format!("Jira error: {err:#}")),
        };
        println!("{message}");
        all_ok &= ok;
    }

    if !all_ok {
        anyhow::bail!("connectivity check failed");
    }
    Ok(())
}
