/// The `builder` module contains the `DownloadLatestBuilder` struct which is used to create a
/// `DownloadLatest` instance.
use crate::{
    cache::ReleaseCache,
    detector::{detect, PlatformSignals},
    forge::{release_page_url, split_repo, GitHubReleases, ReleaseSource, PROJECT_BASE_URL},
    matcher::{compile_pattern, MatchOverrides},
    platform::PlatformSignature,
    resolver::{DownloadLatest, Settings, DEFAULT_NO_MATCH_TEXT, DEFAULT_TEXT},
};
use anyhow::{anyhow, Context, Result};
use log::debug;
use reqwest::{
    header::{HeaderMap, HeaderValue, USER_AGENT},
    Client,
};
use std::sync::Arc;
use url::{ParseError, Url};

/// `DownloadLatestBuilder` is used to create a [`DownloadLatest`] instance.
#[derive(Debug, Default)]
#[allow(clippy::module_name_repetitions)]
pub struct DownloadLatestBuilder<'a> {
    repo: Option<&'a str>,
    version: Option<&'a str>,
    match_rules: Vec<(&'a str, Vec<&'a str>)>,
    pattern: Option<&'a str>,
    text: Option<&'a str>,
    no_match_text: Option<&'a str>,
    no_match_url: Option<&'a str>,
    context_menu: bool,
    signals: Option<PlatformSignals>,
    platform: Option<PlatformSignature>,
    api_base_url: Option<&'a str>,
    project_base_url: Option<&'a str>,
    token: Option<&'a str>,
    cache: Option<ReleaseCache>,
    source: Option<Arc<dyn ReleaseSource>>,
}

impl<'a> DownloadLatestBuilder<'a> {
    /// Returns a new empty `DownloadLatestBuilder`.
    #[must_use]
    pub fn new() -> Self {
        DownloadLatestBuilder::default()
    }

    /// Set the repository to offer downloads from. This can either be just the owner/name, like
    /// `rustdesk/rustdesk`, or a URL to any page in the project, like
    /// `https://github.com/rustdesk/rustdesk/releases`.
    ///
    /// You must set this.
    #[must_use]
    pub fn repo(mut self, repo: &'a str) -> Self {
        self.repo = Some(repo);
        self
    }

    /// Set the release tag to offer. By default the most recent release is used. An empty string
    /// is the same as not setting this.
    #[must_use]
    pub fn version(mut self, version: &'a str) -> Self {
        self.version = Some(version);
        self
    }

    /// Replace the built-in matching rule for a platform key like `linux-x64` with the given
    /// patterns. The patterns are tried in order and always match case-insensitively. You can
    /// also use this to add rules for platforms that have no built-in rule.
    #[must_use]
    pub fn match_rule(mut self, key: &'a str, patterns: &[&'a str]) -> Self {
        self.match_rules.push((key, patterns.to_vec()));
        self
    }

    /// Always offer the first asset matching this pattern, whatever the visitor's platform. When
    /// this is set, the platform rules (including any set with `match_rule`) are not used.
    #[must_use]
    pub fn pattern(mut self, pattern: &'a str) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Set the label template for a matched download. `{os}`, `{arch}`, and `{version}` are
    /// replaced. Defaults to "Download for {os}".
    #[must_use]
    pub fn text(mut self, text: &'a str) -> Self {
        self.text = Some(text);
        self
    }

    /// Set the label used when nothing matched. Defaults to "View all downloads".
    #[must_use]
    pub fn no_match_text(mut self, text: &'a str) -> Self {
        self.no_match_text = Some(text);
        self
    }

    /// Set where to send visitors when nothing matched. Defaults to the release page.
    ///
    /// This may be an absolute URL or a relative reference such as `/downloads`, which is used as
    /// the button's href unchanged.
    #[must_use]
    pub fn no_match_url(mut self, url: &'a str) -> Self {
        self.no_match_url = Some(url);
        self
    }

    /// Ask the rendering layer to offer a secondary action that opens the release page.
    #[must_use]
    pub fn context_menu(mut self, enabled: bool) -> Self {
        self.context_menu = enabled;
        self
    }

    /// Set the environment signals used to detect the visitor's platform. If neither this nor
    /// `platform` is set, the platform is unknown and no asset will match unless `pattern` is set.
    ///
    /// You cannot set this and `platform`.
    #[must_use]
    pub fn signals(mut self, signals: PlatformSignals) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Set the visitor's platform directly instead of detecting it.
    ///
    /// You cannot set this and `signals`.
    #[must_use]
    pub fn platform(mut self, platform: PlatformSignature) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Set the base URL for the release API. This is useful for testing or for GitHub Enterprise.
    /// This should be something like `https://github.my-corp.example.com/api/v3`.
    #[must_use]
    pub fn api_base_url(mut self, api_base_url: &'a str) -> Self {
        self.api_base_url = Some(api_base_url);
        self
    }

    /// Set the base URL used to build release page links when the API cannot be reached. Defaults
    /// to `https://github.com`.
    #[must_use]
    pub fn project_base_url(mut self, project_base_url: &'a str) -> Self {
        self.project_base_url = Some(project_base_url);
        self
    }

    /// Set a token to use for API requests. If this is not set, then the `GITHUB_TOKEN` env var is
    /// used if it is set.
    #[must_use]
    pub fn token(mut self, token: &'a str) -> Self {
        self.token = Some(token);
        self
    }

    /// Set the release cache. By default every instance shares one in-memory cache for the whole
    /// process.
    #[must_use]
    pub fn cache(mut self, cache: ReleaseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a custom source for release info instead of the GitHub API.
    ///
    /// You cannot set this with `api_base_url`, `token`, or `cache`, since those only configure
    /// the default source.
    #[must_use]
    pub fn source(mut self, source: Arc<dyn ReleaseSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Builds a new [`DownloadLatest`] instance and returns it. This is where the visitor's
    /// platform is detected.
    ///
    /// # Errors
    ///
    /// If you have tried to set incompatible options, have not set a `repo`, or have set a pattern
    /// or URL that cannot be parsed, then this method will return an error.
    pub fn build(self) -> Result<DownloadLatest> {
        let Some(repo) = self.repo else {
            return Err(anyhow!("You must set a repo"));
        };
        if self.signals.is_some() && self.platform.is_some() {
            return Err(anyhow!("You cannot set both signals and platform"));
        }
        if self.source.is_some()
            && (self.api_base_url.is_some() || self.token.is_some() || self.cache.is_some())
        {
            return Err(anyhow!(
                "You cannot set a source with api_base_url, token, or cache"
            ));
        }

        let repo = parse_repo(repo)?;
        let version = self.version.filter(|v| !v.is_empty()).map(String::from);

        let mut overrides = MatchOverrides::new();
        for (key, patterns) in &self.match_rules {
            overrides.insert(*key, patterns)?;
        }
        let pattern = self.pattern.map(compile_pattern).transpose()?;

        let no_match_url = self.no_match_url.map(parse_href).transpose()?;
        let project_base_url = self
            .project_base_url
            .map(|u| Url::parse(u).with_context(|| format!("invalid project base URL `{u}`")))
            .transpose()?
            .unwrap_or_else(|| PROJECT_BASE_URL.clone());

        let platform = self.determine_platform();
        debug!("visitor platform is {}", platform.key());

        let source = match self.source {
            Some(s) => s,
            None => {
                let api_base_url = self
                    .api_base_url
                    .map(|u| Url::parse(u).with_context(|| format!("invalid API base URL `{u}`")))
                    .transpose()?;
                Arc::new(GitHubReleases::new(
                    reqwest_client()?,
                    api_base_url,
                    self.token.map(String::from),
                    self.cache.unwrap_or_default(),
                ))
            }
        };

        let settings = Settings {
            release_page_url: release_page_url(&project_base_url, &repo, version.as_deref()),
            repo,
            version,
            overrides,
            pattern,
            text: self.text.unwrap_or(DEFAULT_TEXT).to_string(),
            no_match_text: self.no_match_text.unwrap_or(DEFAULT_NO_MATCH_TEXT).to_string(),
            no_match_url,
            context_menu: self.context_menu,
            platform,
        };

        Ok(DownloadLatest::new(settings, source))
    }

    fn determine_platform(&self) -> PlatformSignature {
        if let Some(p) = self.platform {
            return p;
        }
        detect(self.signals.as_ref().unwrap_or(&PlatformSignals::default()))
    }
}

fn parse_repo(repo: &str) -> Result<String> {
    let (path, from_url) = if repo.starts_with("http://") || repo.starts_with("https://") {
        let url = Url::parse(repo).with_context(|| format!("could not parse repo URL `{repo}`"))?;
        (url.path().to_string(), true)
    } else {
        (repo.to_string(), false)
    };

    let parts = path
        .split('/')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>();
    // A URL can point at any page in the project, but a bare name must be exactly owner/name.
    let parsed = match (parts.as_slice(), from_url) {
        ([owner, name, ..], true) | ([owner, name], false) => format!("{owner}/{name}"),
        _ => return Err(anyhow!("could not parse owner and repo name from `{repo}`")),
    };
    split_repo(&parsed)?;

    debug!("Parsed {repo} = {parsed}");
    Ok(parsed)
}

// Relative references are resolved by whatever page renders the link, so they are kept as given.
fn parse_href(href: &str) -> Result<String> {
    match Url::parse(href) {
        Ok(_) => Ok(href.to_string()),
        Err(ParseError::RelativeUrlWithoutBase)
            if !href.is_empty() && !href.contains(char::is_whitespace) =>
        {
            Ok(href.to_string())
        }
        Err(e) => Err(anyhow!("invalid no-match URL `{href}`: {e}")),
    }
}

fn reqwest_client() -> Result<Client> {
    let builder = Client::builder().gzip(true);

    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("download-latest version {}", super::VERSION))?,
    );
    Ok(builder.default_headers(headers).build()?)
}
