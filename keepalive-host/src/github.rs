//! GitHub REST implementation of [`SourceHost`].

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::types::{CommitInfo, FileWrite, HostIdentity, RepoInfo, TrackedFile};
use crate::{Credential, RepoSlug, SourceHost};

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("keepalive/", env!("CARGO_PKG_VERSION"));

/// GitHub client. Cheap to clone; the connection pool is shared.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
}

// ---------------------------------------------------------------------------
// Wire types (partial GitHub API responses)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CommitItem {
    sha: String,
    commit: CommitDetail,
    #[serde(default)]
    author: Option<Account>,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    author: Option<GitAuthor>,
}

#[derive(Debug, Deserialize)]
struct GitAuthor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Account {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    path: String,
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContents<'a> {
    message: &'a str,
    content: String,
    sha: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

impl CommitItem {
    fn into_commit(self, now: DateTime<Utc>) -> CommitInfo {
        let git_author = self.commit.author;
        let author = self
            .author
            .map(|a| a.login)
            .filter(|login| !login.is_empty())
            .or_else(|| git_author.as_ref().and_then(|a| a.name.clone()))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());
        let date = git_author.and_then(|a| a.date).unwrap_or(now);
        CommitInfo {
            sha: self.sha,
            author,
            message: self.commit.message,
            date,
        }
    }
}

impl ContentItem {
    fn into_tracked_file(self) -> Result<TrackedFile, HostError> {
        if let Some(enc) = self.encoding.as_deref() {
            if enc != "base64" {
                return Err(HostError::Decode(format!("unsupported encoding '{enc}'")));
            }
        }
        let content = decode_content(self.content.as_deref().unwrap_or_default())?;
        Ok(TrackedFile {
            path: self.path,
            content,
            revision: self.sha,
        })
    }
}

/// GitHub wraps base64 payloads at 60 columns; strip whitespace before decoding.
fn decode_content(encoded: &str) -> Result<String, HostError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| HostError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| HostError::Decode(e.to_string()))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl GitHubClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, HostError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(HostError::Http)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/repos/{owner}/{name}/contents/{file_path}`, each segment percent-encoded.
    fn contents_url(&self, repo: &RepoSlug, file_path: &str) -> Result<Url, HostError> {
        let invalid = || HostError::Decode(format!("invalid API base URL '{}'", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["repos", repo.owner.as_str(), repo.name.as_str(), "contents"])
            .extend(file_path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }

    fn get(&self, credential: &Credential, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {}", credential.expose()))
            .header("Accept", "application/vnd.github+json")
    }
}

/// Map a non-success response to [`HostError`].
async fn error_for(resp: Response) -> HostError {
    let status = resp.status();
    let message = resp
        .json::<ApiMessage>()
        .await
        .map(|m| m.message)
        .unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED => HostError::Unauthorized,
        StatusCode::NOT_FOUND => HostError::NotFound(message),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => HostError::Conflict(message),
        _ => HostError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl SourceHost for GitHubClient {
    async fn list_recent_commits(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        limit: u8,
    ) -> Result<Vec<CommitInfo>, HostError> {
        let path = format!("/repos/{}/{}/commits?per_page={}", repo.owner, repo.name, limit.max(1));
        let resp = self.get(credential, &path).send().await?;
        // 409 is GitHub's answer for a repository with no commits yet.
        if resp.status() == StatusCode::CONFLICT {
            return Ok(vec![]);
        }
        if !resp.status().is_success() {
            return Err(error_for(resp).await);
        }
        let items: Vec<CommitItem> = resp.json().await?;
        let now = Utc::now();
        Ok(items.into_iter().map(|c| c.into_commit(now)).collect())
    }

    async fn read_tracked_file(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
    ) -> Result<Option<TrackedFile>, HostError> {
        let path = format!("/repos/{}/{}/readme", repo.owner, repo.name);
        let resp = self.get(credential, &path).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(error_for(resp).await);
        }
        let item: ContentItem = resp.json().await?;
        item.into_tracked_file().map(Some)
    }

    async fn write_tracked_file(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
        write: &FileWrite,
    ) -> Result<(), HostError> {
        let url = self.contents_url(repo, &write.path)?;
        let body = PutContents {
            message: &write.message,
            content: STANDARD.encode(write.content.as_bytes()),
            sha: &write.revision,
        };
        let resp = self
            .client
            .put(url)
            .header("Authorization", format!("Bearer {}", credential.expose()))
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_for(resp).await);
        }
        tracing::debug!(repo = %repo, path = %write.path, "tracked file written");
        Ok(())
    }

    async fn validate_credential(
        &self,
        credential: &Credential,
    ) -> Result<Option<HostIdentity>, HostError> {
        let resp = self.get(credential, "/user").send().await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(error_for(resp).await);
        }
        Ok(Some(resp.json().await?))
    }

    async fn repository_info(
        &self,
        credential: &Credential,
        repo: &RepoSlug,
    ) -> Result<Option<RepoInfo>, HostError> {
        let path = format!("/repos/{}/{}", repo.owner, repo.name);
        let resp = self.get(credential, &path).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(error_for(resp).await);
        }
        Ok(Some(resp.json().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn commit_author_prefers_login() {
        let json = r#"{
            "sha": "def",
            "commit": {"message": "fix", "author": {"name": "Bob B", "date": "2025-06-01T12:00:00Z"}},
            "author": {"login": "bob"}
        }"#;
        let item: CommitItem = serde_json::from_str(json).unwrap();
        let commit = item.into_commit(now());
        assert_eq!(commit.author, "bob");
        assert_eq!(commit.date.to_rfc3339(), "2025-06-01T12:00:00+00:00");
    }

    #[test]
    fn commit_author_falls_back_to_git_name_then_unknown() {
        let with_name = r#"{"sha": "a", "commit": {"message": "m", "author": {"name": "Carol"}}, "author": null}"#;
        let item: CommitItem = serde_json::from_str(with_name).unwrap();
        let commit = item.into_commit(now());
        assert_eq!(commit.author, "Carol");
        assert_eq!(commit.date, now(), "missing date falls back to now");

        let bare = r#"{"sha": "b", "commit": {"message": "m"}}"#;
        let item: CommitItem = serde_json::from_str(bare).unwrap();
        assert_eq!(item.into_commit(now()).author, "Unknown");
    }

    #[test]
    fn readme_content_with_line_wrapping_decodes() {
        let encoded = STANDARD.encode("# Title\n\nSome text that is long enough to wrap.\n");
        let (head, tail) = encoded.split_at(20);
        let json = serde_json::json!({
            "path": "README.md",
            "sha": "blob1",
            "content": format!("{head}\n{tail}\n"),
            "encoding": "base64"
        });
        let item: ContentItem = serde_json::from_value(json).unwrap();
        let file = item.into_tracked_file().unwrap();
        assert_eq!(file.path, "README.md");
        assert_eq!(file.revision, "blob1");
        assert_eq!(file.content, "# Title\n\nSome text that is long enough to wrap.\n");
    }

    #[test]
    fn non_utf8_readme_is_a_decode_error() {
        let encoded = STANDARD.encode([0xff_u8, 0xfe, 0x00]);
        let err = decode_content(&encoded).unwrap_err();
        assert!(matches!(err, HostError::Decode(_)));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = GitHubClient::new("https://ghe.example.com/api/v3/").unwrap();
        assert_eq!(client.base_url(), "https://ghe.example.com/api/v3");
        assert_eq!(client.url("/user"), "https://ghe.example.com/api/v3/user");
    }

    #[test]
    fn contents_url_encodes_each_path_segment() {
        let client = GitHubClient::new("https://ghe.example.com/api/v3/").unwrap();
        let repo = RepoSlug::new("octo", "notes").unwrap();

        let url = client.contents_url(&repo, "README.md").unwrap();
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/repos/octo/notes/contents/README.md"
        );

        let url = client.contents_url(&repo, "docs/read me?#.md").unwrap();
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/repos/octo/notes/contents/docs/read%20me%3F%23.md"
        );
    }

    #[test]
    fn put_body_carries_revision_and_base64_content() {
        let body = PutContents {
            message: "Auto-commit: now",
            content: STANDARD.encode("hi."),
            sha: "rev2",
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["sha"], "rev2");
        assert_eq!(v["content"], "aGku");
    }
}
