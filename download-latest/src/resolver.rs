use crate::{
    forge::ReleaseSource,
    matcher::{match_asset, match_pattern, MatchOverrides},
    platform::{Arch, Os, PlatformSignature},
    release::{Asset, ReleaseSnapshot},
};
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use url::Url;

pub(crate) const DEFAULT_TEXT: &str = "Download for {os}";
pub(crate) const DEFAULT_NO_MATCH_TEXT: &str = "View all downloads";

/// The download decision for one visitor. This is everything a button, redirect, or asset list
/// needs to render itself.
///
/// `url` is always usable as an href: it is the matched asset's URL when there is a match,
/// otherwise the configured no-match URL, otherwise the release page. Only the no-match URL can be
/// relative.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub url: String,
    pub asset: Option<String>,
    pub os: Os,
    pub arch: Arch,
    pub version: Option<String>,
    pub release_page_url: Url,
    pub all_assets: Vec<Asset>,
    pub matched: bool,
}

impl ResolutionResult {
    /// The matched asset itself, if there is one.
    #[must_use]
    pub fn matched_asset(&self) -> Option<&Asset> {
        let name = self.asset.as_deref()?;
        self.all_assets.iter().find(|a| a.name == name)
    }

    #[must_use]
    pub fn platform(&self) -> PlatformSignature {
        PlatformSignature::new(self.os, self.arch)
    }
}

/// `DownloadLatest` resolves the right download for one visitor. Use the
/// [`DownloadLatestBuilder`](crate::DownloadLatestBuilder) struct to create a new instance.
///
/// The visitor's platform is detected once, when the instance is built, and the resolution is done
/// at most once per instance. Every call to [`DownloadLatest::resolve`] returns the same result.
#[derive(Debug)]
pub struct DownloadLatest {
    repo: String,
    version: Option<String>,
    overrides: MatchOverrides,
    pattern: Option<Regex>,
    text: String,
    no_match_text: String,
    no_match_url: Option<String>,
    context_menu: bool,
    release_page_url: Url,
    platform: PlatformSignature,
    source: Arc<dyn ReleaseSource>,
    result: OnceCell<ResolutionResult>,
}

pub(crate) struct Settings {
    pub(crate) repo: String,
    pub(crate) version: Option<String>,
    pub(crate) overrides: MatchOverrides,
    pub(crate) pattern: Option<Regex>,
    pub(crate) text: String,
    pub(crate) no_match_text: String,
    pub(crate) no_match_url: Option<String>,
    pub(crate) context_menu: bool,
    pub(crate) release_page_url: Url,
    pub(crate) platform: PlatformSignature,
}

impl DownloadLatest {
    pub(crate) fn new(settings: Settings, source: Arc<dyn ReleaseSource>) -> Self {
        let Settings {
            repo,
            version,
            overrides,
            pattern,
            text,
            no_match_text,
            no_match_url,
            context_menu,
            release_page_url,
            platform,
        } = settings;

        Self {
            repo,
            version,
            overrides,
            pattern,
            text,
            no_match_text,
            no_match_url,
            context_menu,
            release_page_url,
            platform,
            source,
            result: OnceCell::new(),
        }
    }

    /// Works out which download to offer. The first call fetches the release. Every later call,
    /// including calls made while the first one is still in flight, gets the same result.
    ///
    /// This never fails. If the release info cannot be fetched, the result points at the release
    /// page and has `matched` set to false.
    pub async fn resolve(&self) -> &ResolutionResult {
        self.result.get_or_init(|| self.compute()).await
    }

    /// The result of an earlier call to [`DownloadLatest::resolve`], if it has finished.
    #[must_use]
    pub fn resolved(&self) -> Option<&ResolutionResult> {
        self.result.get()
    }

    #[must_use]
    pub fn repo(&self) -> &str {
        &self.repo
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    #[must_use]
    pub fn platform(&self) -> PlatformSignature {
        self.platform
    }

    #[must_use]
    pub fn overrides(&self) -> &MatchOverrides {
        &self.overrides
    }

    #[must_use]
    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    /// The label template used when an asset matched.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The label template used when nothing matched.
    #[must_use]
    pub fn no_match_text(&self) -> &str {
        &self.no_match_text
    }

    #[must_use]
    pub fn no_match_url(&self) -> Option<&str> {
        self.no_match_url.as_deref()
    }

    /// Whether the rendering layer should offer a secondary action that opens the release page.
    #[must_use]
    pub fn context_menu(&self) -> bool {
        self.context_menu
    }

    async fn compute(&self) -> ResolutionResult {
        match self
            .source
            .fetch_release(&self.repo, self.version.as_deref())
            .await
        {
            Ok(release) => self.result_for_release(release),
            Err(e) => {
                warn!("could not get release info for {}: {e}", self.repo);
                self.degraded_result()
            }
        }
    }

    fn result_for_release(&self, release: ReleaseSnapshot) -> ResolutionResult {
        let asset = self.pick_asset(&release.assets).cloned();
        if let Some(a) = &asset {
            info!("picked {} from release {}", a.name, release.version);
        } else {
            info!(
                "no asset in release {} matched {}",
                release.version,
                self.platform.key()
            );
        }

        let url = asset
            .as_ref()
            .map(|a| a.url.to_string())
            .or_else(|| self.no_match_url.clone())
            .unwrap_or_else(|| release.release_page_url.to_string());

        ResolutionResult {
            url,
            matched: asset.is_some(),
            asset: asset.map(|a| a.name),
            os: self.platform.os,
            arch: self.platform.arch,
            version: Some(release.version),
            release_page_url: release.release_page_url,
            all_assets: release.assets,
        }
    }

    fn pick_asset<'a>(&self, assets: &'a [Asset]) -> Option<&'a Asset> {
        if let Some(pattern) = &self.pattern {
            debug!("looking for an asset matching the pattern {}", pattern.as_str());
            return match_pattern(assets, pattern);
        }

        if !self.platform.is_known() {
            debug!(
                "not matching any asset because the platform ({}) is not fully known",
                self.platform.key(),
            );
            return None;
        }

        match_asset(
            assets,
            self.platform.os,
            self.platform.arch,
            Some(&self.overrides),
        )
    }

    fn degraded_result(&self) -> ResolutionResult {
        ResolutionResult {
            url: self.release_page_url.to_string(),
            asset: None,
            os: self.platform.os,
            arch: self.platform.arch,
            version: None,
            release_page_url: self.release_page_url.clone(),
            all_assets: vec![],
            matched: false,
        }
    }
}
