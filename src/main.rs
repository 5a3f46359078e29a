//! release-audit: audit a release by reconciling Jira tickets with Bitbucket commits

use anyhow::Result;

fn main() -> Result<()> {
    release_audit::cli::run()
}
