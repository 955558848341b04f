//! A library for pointing a visitor at the right download from a project's GitHub releases.
//!
//! Given a few signals about the visitor's machine (a user agent string, and the client hints
//! when a browser sends them), `download-latest` works out their OS and CPU architecture, fetches
//! the project's latest (or pinned) release, and picks the one asset that best fits. When nothing
//! fits, or the release cannot be fetched, it falls back to a URL you choose or to the release
//! page, so there is always somewhere to send the visitor.
//!
//! This project also ships a CLI tool named `download-latest`, which is handy for checking how a
//! project's assets will be matched for each platform.
//!
//! The main entry point for programmatic use is the [`DownloadLatestBuilder`] struct. Here is an
//! example of its usage:
//!
//! ```ignore
//! use download_latest::{DownloadLatestBuilder, PlatformSignals};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dl = DownloadLatestBuilder::new()
//!         .repo("rustdesk/rustdesk")
//!         .signals(PlatformSignals::from_user_agent(user_agent))
//!         .build()?;
//!
//!     let result = dl.resolve().await;
//!     println!("{}", result.url);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## How the Right Asset Is Picked
//!
//! Every supported platform has a key like `macos-arm64` or `linux-x64`, and each key has an
//! ordered list of filename patterns. The patterns are tried one at a time. For each pattern the
//! assets are scanned in the order the release lists them, and the first asset that matches wins.
//! So an earlier pattern always beats a later one, and within one pattern the release's order
//! breaks ties.
//!
//! Before matching, checksum and signature files (`.sha256`, `.sha512`, `.sig`, `.asc`,
//! `.blockmap`, `.zsync`) are dropped.
//!
//! You can replace the patterns for any key with [`DownloadLatestBuilder::match_rule`], or skip
//! platform matching entirely with [`DownloadLatestBuilder::pattern`].
//!
//! If the visitor's OS or architecture cannot be worked out, no asset is matched. A pattern still
//! applies in that case, since it does not depend on the platform.
//!
//! ## Caching
//!
//! Release info is cached for five minutes. By default the cache is shared by every instance in
//! the process. See [`ReleaseCache`] to plug in your own storage.
//!
//! ## Features
//!
//! This crate offers several features to control the TLS dependency used by `reqwest`:
//!
#![doc = document_features::document_features!()]

mod builder;
mod cache;
mod classifier;
mod config;
mod detector;
mod filter;
mod forge;
mod matcher;
mod platform;
mod release;
mod resolver;
mod rules;
mod view;

pub use crate::{
    builder::DownloadLatestBuilder,
    cache::{CacheStorage, Clock, MemoryStorage, ReleaseCache, SystemClock, DEFAULT_TTL_SECONDS},
    classifier::{classify, classify_name},
    config::{Declaration, MatchPatterns, Placement, WidgetConfig},
    detector::{detect, NavigatorSignals, PlatformSignals, UserAgentData},
    filter::{filter_assets, is_excluded_name, RawAsset},
    forge::{release_page_url, GitHubReleases, ReleaseFetchError, ReleaseSource},
    matcher::{compile_pattern, match_asset, match_asset_for_key, match_pattern, MatchOverrides},
    platform::{Arch, Os, PlatformKey, PlatformSignature},
    release::{Asset, ReleaseSnapshot},
    resolver::{DownloadLatest, ResolutionResult},
    rules::{default_rule, BUILT_IN_PLATFORMS},
    view::{
        format_size, group_assets, platform_choices, platform_label, render_label, AssetGroup,
        ButtonView, PlatformChoice, PlatformFilter,
    },
};

// The version of the `download-latest` crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(feature = "logging")]
use fern::{
    colors::{Color, ColoredLevelConfig},
    Dispatch,
};

/// This function initializes logging for the application. It's public for the sake of the
/// `download-latest` binary, but it lives in the library crate so that test code can also enable
/// logging.
///
/// # Errors
///
/// This can return a `log::SetLoggerError` error.
#[cfg(feature = "logging")]
pub fn init_logger(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    let line_colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::BrightBlack)
        .debug(Color::BrightBlack)
        .trace(Color::BrightBlack);
    let level_colors = line_colors.info(Color::Green).debug(Color::Black);

    Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{color_line}[{target}][{level}{color_line}] {message}\x1B[0m",
                color_line = format_args!(
                    "\x1B[{}m",
                    line_colors.get_color(&record.level()).to_fg_str()
                ),
                target = record.target(),
                level = level_colors.color(record.level()),
                message = message,
            ));
        })
        .level(level)
        // These are very noisy.
        .level_for("hyper", log::LevelFilter::Error)
        .level_for("hyper_util", log::LevelFilter::Error)
        .level_for("reqwest", log::LevelFilter::Error)
        .chain(std::io::stderr())
        .apply()
}
