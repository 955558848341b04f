use crate::{
    cache::ReleaseCache,
    filter::{filter_assets, RawAsset},
    release::ReleaseSnapshot,
};
use async_trait::async_trait;
use lazy_regex::Lazy;
use log::debug;
use reqwest::{
    header::{HeaderValue, ACCEPT, AUTHORIZATION},
    Client, RequestBuilder, StatusCode,
};
use serde::Deserialize;
use std::env;
use thiserror::Error;
use url::Url;

pub(crate) static DEFAULT_API_BASE_URL: Lazy<Url> = Lazy::new(|| {
    Url::parse("https://api.github.com").expect("the default API base URL is valid")
});
pub(crate) static PROJECT_BASE_URL: Lazy<Url> =
    Lazy::new(|| Url::parse("https://github.com").expect("the default project base URL is valid"));

const GITHUB_JSON: &str = "application/vnd.github+json";

#[derive(Debug, Error)]
pub enum ReleaseFetchError {
    #[error("`{0}` is not a repository name in the form owner/name")]
    InvalidRepo(String),
    #[error("request for release info from {url} failed: {source}")]
    Transport {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("request for release info from {url} returned {status}")]
    Status { url: Url, status: StatusCode },
    #[error("could not parse the release info returned by {url}: {source}")]
    Decode {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
}

/// Something that can look up a release for a repository.
#[async_trait]
pub trait ReleaseSource: Send + Sync + std::fmt::Debug {
    /// Returns the release tagged `version`, or the latest release if `version` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the release cannot be fetched or parsed.
    async fn fetch_release(
        &self,
        repo: &str,
        version: Option<&str>,
    ) -> Result<ReleaseSnapshot, ReleaseFetchError>;
}

#[derive(Debug, Deserialize)]
pub(crate) struct Release {
    pub(crate) tag_name: String,
    pub(crate) html_url: Url,
    #[serde(default)]
    pub(crate) assets: Vec<RawAsset>,
}

/// Fetches releases from the GitHub REST API, with a short-lived cache in front of it.
#[derive(Debug)]
pub struct GitHubReleases {
    client: Client,
    api_base_url: Url,
    token: Option<String>,
    cache: ReleaseCache,
}

impl GitHubReleases {
    /// If no token is given, the `GITHUB_TOKEN` env var is used if it is set.
    #[must_use]
    pub fn new(
        client: Client,
        api_base_url: Option<Url>,
        mut token: Option<String>,
        cache: ReleaseCache,
    ) -> Self {
        if token.is_none() {
            token = env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
            if token.is_some() {
                debug!("Using GitHub token from the GITHUB_TOKEN environment variable.");
            }
        }

        Self {
            client,
            api_base_url: api_base_url.unwrap_or_else(|| DEFAULT_API_BASE_URL.clone()),
            token,
            cache,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &ReleaseCache {
        &self.cache
    }

    pub(crate) fn release_info_url(
        &self,
        repo: &str,
        version: Option<&str>,
    ) -> Result<Url, ReleaseFetchError> {
        let (owner, name) = split_repo(repo)?;

        let mut url = self.api_base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| ReleaseFetchError::InvalidRepo(repo.to_string()))?;
            segments
                .pop_if_empty()
                .extend(&["repos", owner, name, "releases"]);
            if let Some(tag) = version {
                segments.extend(&["tags", tag]);
            } else {
                segments.push("latest");
            }
        }

        Ok(url)
    }

    fn maybe_add_token_header(&self, mut req_builder: RequestBuilder) -> RequestBuilder {
        if let Some(token) = self.token.as_deref() {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(mut auth_val) => {
                    debug!("Adding token to GitHub request.");
                    auth_val.set_sensitive(true);
                    req_builder = req_builder.header(AUTHORIZATION, auth_val);
                }
                Err(e) => debug!("Not sending a GitHub token that is not a valid header: {e}"),
            }
        } else {
            debug!("No token given.");
        }
        req_builder
    }

    async fn request_release(&self, url: Url) -> Result<Release, ReleaseFetchError> {
        debug!("Getting release info from `{url}`");

        let req_builder = self
            .client
            .get(url.clone())
            .header(ACCEPT, HeaderValue::from_static(GITHUB_JSON));
        let resp = self
            .maybe_add_token_header(req_builder)
            .send()
            .await
            .map_err(|source| ReleaseFetchError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ReleaseFetchError::Status { url, status });
        }

        resp.json::<Release>()
            .await
            .map_err(|source| ReleaseFetchError::Decode { url, source })
    }
}

#[async_trait]
impl ReleaseSource for GitHubReleases {
    async fn fetch_release(
        &self,
        repo: &str,
        version: Option<&str>,
    ) -> Result<ReleaseSnapshot, ReleaseFetchError> {
        let key = ReleaseCache::key(self.api_base_url.as_str(), repo, version);
        if let Some(snapshot) = self.cache.get(&key) {
            return Ok(snapshot);
        }

        let url = self.release_info_url(repo, version)?;
        let release = self.request_release(url).await?;
        let snapshot = ReleaseSnapshot {
            version: release.tag_name,
            release_page_url: release.html_url,
            assets: filter_assets(release.assets),
        };
        debug!(
            "release {} of {repo} has {} downloadable assets",
            snapshot.version,
            snapshot.assets.len(),
        );

        self.cache.set(&key, &snapshot);
        Ok(snapshot)
    }
}

/// Splits `owner/name` into its two parts.
pub(crate) fn split_repo(repo: &str) -> Result<(&str, &str), ReleaseFetchError> {
    let mut parts = repo.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
            Ok((owner, name))
        }
        _ => Err(ReleaseFetchError::InvalidRepo(repo.to_string())),
    }
}

/// The human-facing release page for a repository, built without asking the API. This is where
/// visitors are sent when nothing else works.
#[must_use]
pub fn release_page_url(project_base_url: &Url, repo: &str, version: Option<&str>) -> Url {
    let mut url = project_base_url.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty();
        segments.extend(repo.split('/').filter(|p| !p.is_empty()));
        segments.push("releases");
        if let Some(tag) = version {
            segments.extend(&["tag", tag]);
        } else {
            segments.push("latest");
        }
    }
    url
}
