//! Git repository URLs and the few git commands jx runs

use anyhow::{Result, anyhow};
use regex::Regex;
use std::path::Path;

use crate::utils::process;

pub const KIND_GITHUB: &str = "github";
pub const KIND_BITBUCKET_SERVER: &str = "bitbucketserver";
pub const KIND_BITBUCKET_CLOUD: &str = "bitbucketcloud";
pub const KIND_GITEA: &str = "gitea";
pub const KIND_GITLAB: &str = "gitlab";

/// Every supported git provider kind
pub const KIND_GITS: &[&str] = &[
    KIND_GITHUB,
    KIND_BITBUCKET_SERVER,
    KIND_BITBUCKET_CLOUD,
    KIND_GITEA,
    KIND_GITLAB,
];

/// A parsed git repository URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitInfo {
    /// Host, including any port
    pub host: String,
    pub organisation: String,
    pub name: String,
    scheme: String,
}

impl GitInfo {
    /// Parse `https://host/owner/repo(.git)`, `ssh://git@host/owner/repo.git`
    /// or `git@host:owner/repo.git`
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        let http = Regex::new(r"^(https?|ssh)://(?:[^@/]+@)?([^/]+)/(.+)$")?;
        let scp = Regex::new(r"^[^@/]+@([^:/]+):(.+)$")?;

        let (scheme, host, path) = if let Some(c) = http.captures(url) {
            (c[1].to_string(), c[2].to_string(), c[3].to_string())
        } else if let Some(c) = scp.captures(url) {
            ("ssh".to_string(), c[1].to_string(), c[2].to_string())
        } else {
            return Err(anyhow!("unsupported git URL {}", url));
        };

        let path = path.trim_end_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        let (organisation, name) = path
            .rsplit_once('/')
            .filter(|(org, name)| !org.is_empty() && !name.is_empty())
            .ok_or_else(|| anyhow!("git URL {} has no owner and repository", url))?;

        Ok(Self {
            host,
            organisation: organisation.to_string(),
            name: name.to_string(),
            scheme,
        })
    }

    /// Base URL of the git server; ssh remotes map to https
    pub fn provider_url(&self) -> String {
        let scheme = if self.scheme == "http" { "http" } else { "https" };
        format!("{}://{}", scheme, self.host)
    }

    pub fn https_url(&self) -> String {
        format!("{}/{}/{}.git", self.provider_url(), self.organisation, self.name)
    }
}

/// Provider kind of the well-known SaaS servers, `None` otherwise
pub fn saas_git_kind(server_url: &str) -> Option<&'static str> {
    let host = server_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    match host {
        "github.com" => Some(KIND_GITHUB),
        "gitlab.com" => Some(KIND_GITLAB),
        "bitbucket.org" => Some(KIND_BITBUCKET_CLOUD),
        _ => None,
    }
}

/// Clone `url` into `dir`
pub fn clone(url: &str, dir: &Path) -> Result<()> {
    let dest = dir.display().to_string();
    process::run_mutating("git", &["clone", url, &dest])
}

/// Pull the current branch of the repository at `dir`
pub fn pull(dir: &Path) -> Result<()> {
    let dest = dir.display().to_string();
    process::run_mutating("git", &["-C", &dest, "pull"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_https_url() {
        let info = GitInfo::parse("https://github.com/myorg/env-production.git").unwrap();
        assert_eq!(info.host, "github.com");
        assert_eq!(info.organisation, "myorg");
        assert_eq!(info.name, "env-production");
        assert_eq!(info.provider_url(), "https://github.com");
    }

    #[test]
    fn test_parse_scp_url() {
        let info = GitInfo::parse("git@gitlab.com:group/sub/repo.git").unwrap();
        assert_eq!(info.host, "gitlab.com");
        assert_eq!(info.organisation, "group/sub");
        assert_eq!(info.name, "repo");
        assert_eq!(info.provider_url(), "https://gitlab.com");
        assert_eq!(info.https_url(), "https://gitlab.com/group/sub/repo.git");
    }

    #[test]
    fn test_parse_keeps_port_and_http() {
        let info = GitInfo::parse("http://gitea.local:3000/org/repo/").unwrap();
        assert_eq!(info.provider_url(), "http://gitea.local:3000");
        assert_eq!(info.name, "repo");
    }

    #[test]
    fn test_parse_rejects_bad_urls() {
        assert!(GitInfo::parse("not a url").is_err());
        assert!(GitInfo::parse("https://github.com/onlyowner").is_err());
    }

    #[test]
    fn test_saas_git_kind() {
        assert_eq!(saas_git_kind("https://github.com"), Some(KIND_GITHUB));
        assert_eq!(saas_git_kind("https://gitlab.com"), Some(KIND_GITLAB));
        assert_eq!(saas_git_kind("https://bitbucket.org"), Some(KIND_BITBUCKET_CLOUD));
        assert_eq!(saas_git_kind("https://git.example.com"), None);
    }
}
