use anyhow::{Error, Result};
use clap::{Arg, ArgAction, ArgGroup, ArgMatches, Command};
use download_latest::{
    format_size, group_assets, platform_choices, Arch, ButtonView, DownloadLatest,
    DownloadLatestBuilder, MatchPatterns, NavigatorSignals, Os, PlatformFilter,
    PlatformSignals, PlatformSignature, ResolutionResult, UserAgentData, WidgetConfig,
};
use log::{debug, error};
use serde::Serialize;
use std::{path::Path, str::FromStr};
use strum::VariantNames;
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error("{0:}")]
    InvalidArgsError(String),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cmd = cmd();
    let matches = cmd.get_matches();
    let res = init_logger_from_matches(&matches);
    if let Err(e) = res {
        eprintln!("Error creating logger: {e}");
        std::process::exit(126);
    }

    // The builder borrows from the config, so it has to live here.
    let config = match make_config(&matches) {
        Ok(c) => c,
        Err(e) => {
            print_err(&e);
            std::process::exit(127);
        }
    };
    let status = match make_download_latest(&matches, &config) {
        Ok(dl) => {
            let result = dl.resolve().await;
            match print_result(&matches, &dl, result) {
                Ok(()) => i32::from(matches.get_flag("require-match") && !result.matched),
                Err(e) => {
                    print_err(&e);
                    1
                }
            }
        }
        Err(e) => {
            print_err(&e);
            127
        }
    };
    std::process::exit(status);
}

const MAX_TERM_WIDTH: usize = 100;

#[allow(clippy::too_many_lines)]
fn cmd() -> Command {
    Command::new("download-latest")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Daniel Raffel")
        .about("Shows which release download a visitor would be offered")
        .arg(Arg::new("repo").long("repo").short('r').help(concat!(
            "The project whose releases to look at, like rustdesk/rustdesk",
            " or https://github.com/rustdesk/rustdesk.",
        )))
        .arg(
            Arg::new("tag")
                .long("tag")
                .short('t')
                .help("The release tag to look at. Defaults to the latest release."),
        )
        .arg(Arg::new("config").long("config").short('c').help(concat!(
            "A JSON widget config file. Any option given on the command line overrides the",
            " same option in the file.",
        )))
        .arg(Arg::new("pattern").long("pattern").short('p').help(concat!(
            "Always pick the first asset whose name matches this regex, whatever the platform.",
            " The match is case-insensitive. When this is set, --match is ignored.",
        )))
        .arg(
            Arg::new("match")
                .long("match")
                .short('m')
                .action(ArgAction::Append)
                .value_name("KEY=REGEX")
                .help(concat!(
                    "Replace the matching rule for a platform key like linux-x64. Pass this more",
                    " than once for the same key to give several patterns, which are tried in",
                    " order.",
                )),
        )
        .arg(
            Arg::new("user-agent")
                .long("user-agent")
                .help("A User-Agent string to detect the visitor's platform from."),
        )
        .arg(Arg::new("ua-platform").long("ua-platform").help(concat!(
            "The platform client hint (Sec-CH-UA-Platform), like macOS or Windows. This wins",
            " over the OS in --user-agent.",
        )))
        .arg(Arg::new("ua-arch").long("ua-arch").help(concat!(
            "The architecture client hint (Sec-CH-UA-Arch), like arm or x86. This is only used",
            " together with --ua-platform.",
        )))
        .arg(
            Arg::new("navigator-platform")
                .long("navigator-platform")
                .help("The legacy navigator.platform string, like MacIntel or Linux aarch64."),
        )
        .arg(
            Arg::new("os")
                .long("os")
                .value_parser(clap::builder::PossibleValuesParser::new(Os::VARIANTS))
                .help("Set the visitor's OS directly instead of detecting it."),
        )
        .arg(
            Arg::new("arch")
                .long("arch")
                .value_parser(clap::builder::PossibleValuesParser::new(Arch::VARIANTS))
                .help("Set the visitor's CPU architecture directly instead of detecting it."),
        )
        .arg(Arg::new("text").long("text").help(concat!(
            "The button label when an asset matched. {os}, {arch}, and {version} are replaced.",
            " Defaults to \"Download for {os}\".",
        )))
        .arg(
            Arg::new("no-match-text")
                .long("no-match-text")
                .help("The button label when nothing matched. Defaults to \"View all downloads\"."),
        )
        .arg(
            Arg::new("no-match-url")
                .long("no-match-url")
                .help(concat!(
                    "Where to send visitors when nothing matched. This may be relative, like",
                    " `/downloads`. Defaults to the release page.",
                )),
        )
        .arg(
            Arg::new("context-menu")
                .long("context-menu")
                .action(ArgAction::SetTrue)
                .help("Offer the release page as a secondary action on the button."),
        )
        .arg(
            Arg::new("list")
                .long("list")
                .action(ArgAction::SetTrue)
                .help("Also show every asset in the release, grouped by platform."),
        )
        .arg(
            Arg::new("platforms")
                .long("platforms")
                .action(ArgAction::SetTrue)
                .help("Also show which asset each platform would be offered."),
        )
        .arg(
            Arg::new("exclude")
                .long("exclude")
                .action(ArgAction::Append)
                .value_name("KEY")
                .help("Hide a platform key from --list and --platforms. Use `other` for unclassified assets."),
        )
        .arg(
            Arg::new("include")
                .long("include")
                .action(ArgAction::Append)
                .value_name("KEY")
                .help("Only show these platform keys in --list and --platforms."),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the result as JSON."),
        )
        .arg(
            Arg::new("require-match")
                .long("require-match")
                .action(ArgAction::SetTrue)
                .help("Exit with status 1 if no asset matched."),
        )
        .arg(Arg::new("api-base-url").long("api-base-url").help(concat!(
            "The base URL for the GitHub API. This is useful for testing or if you want to",
            " operate against GitHub Enterprise. This should be something like",
            " `https://github.my-corp.example.com/api/v3`.",
        )))
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose output."),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("Enable debugging output."),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Suppresses most output."),
        )
        .group(ArgGroup::new("log-level").args(["verbose", "debug", "quiet"]))
        .max_term_width(MAX_TERM_WIDTH)
}

pub(crate) fn init_logger_from_matches(matches: &ArgMatches) -> Result<(), log::SetLoggerError> {
    let level = if matches.get_flag("debug") {
        log::LevelFilter::Debug
    } else if matches.get_flag("verbose") {
        log::LevelFilter::Info
    } else if matches.get_flag("quiet") {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Warn
    };

    download_latest::init_logger(level)
}

const SIGNAL_ARGS: [&str; 4] = ["user-agent", "ua-platform", "ua-arch", "navigator-platform"];

fn validate_args(matches: &ArgMatches) -> Result<()> {
    if !(matches.contains_id("repo") || matches.contains_id("config")) {
        return Err(
            CliError::InvalidArgsError("You must pass a --repo or --config.".to_string()).into(),
        );
    }

    for a in ["os", "arch"] {
        if !matches.contains_id(a) {
            continue;
        }
        if let Some(s) = SIGNAL_ARGS.iter().find(|s| matches.contains_id(s)) {
            return Err(CliError::InvalidArgsError(format!(
                "You cannot combine the --{a} and --{s} options"
            ))
            .into());
        }
    }

    if matches.contains_id("ua-arch") && !matches.contains_id("ua-platform") {
        return Err(CliError::InvalidArgsError(
            "You cannot pass --ua-arch without --ua-platform".to_string(),
        )
        .into());
    }

    Ok(())
}

/// Builds the widget config from the `--config` file, if any, with command line options laid over
/// it.
fn make_config(matches: &ArgMatches) -> Result<WidgetConfig> {
    validate_args(matches)?;

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => WidgetConfig::from_file(Path::new(path))?,
        None => WidgetConfig::default(),
    };

    if let Some(r) = matches.get_one::<String>("repo") {
        config.repo.clone_from(r);
    }
    if let Some(t) = matches.get_one::<String>("tag") {
        config.version = Some(t.clone());
    }
    if let Some(p) = matches.get_one::<String>("pattern") {
        config.pattern = Some(p.clone());
    }
    if let Some(t) = matches.get_one::<String>("text") {
        config.text = Some(t.clone());
    }
    if let Some(t) = matches.get_one::<String>("no-match-text") {
        config.no_match_text = Some(t.clone());
    }
    if let Some(u) = matches.get_one::<String>("no-match-url") {
        config.no_match_url = Some(u.clone());
    }
    if matches.get_flag("context-menu") {
        config.context_menu = true;
    }

    // Every --match for a key replaces whatever the config file had for that key.
    let mut cli_rules: Vec<(String, Vec<String>)> = vec![];
    for m in matches.get_many::<String>("match").unwrap_or_default() {
        let (key, pattern) = parse_match_arg(m)?;
        match cli_rules.iter_mut().find(|(k, _)| *k == key) {
            Some((_, patterns)) => patterns.push(pattern),
            None => cli_rules.push((key, vec![pattern])),
        }
    }
    for (key, patterns) in cli_rules {
        config
            .match_rules
            .insert(key, MatchPatterns::Many(patterns));
    }

    if config.repo.is_empty() {
        return Err(CliError::InvalidArgsError(
            "The config file does not set a repo, so you must pass --repo.".to_string(),
        )
        .into());
    }

    debug!("config: {config:?}");
    Ok(config)
}

fn parse_match_arg(arg: &str) -> Result<(String, String)> {
    match arg.split_once('=') {
        Some((key, pattern)) if !key.trim().is_empty() && !pattern.is_empty() => {
            Ok((key.trim().to_ascii_lowercase(), pattern.to_string()))
        }
        _ => Err(CliError::InvalidArgsError(format!(
            "The --match value `{arg}` is not in the form KEY=REGEX"
        ))
        .into()),
    }
}

fn make_download_latest<'a>(
    matches: &'a ArgMatches,
    config: &'a WidgetConfig,
) -> Result<DownloadLatest> {
    let mut builder = config.builder();
    if let Some(url) = matches.get_one::<String>("api-base-url") {
        builder = builder.api_base_url(url);
    }
    builder = with_platform(builder, matches)?;
    builder.build()
}

fn with_platform<'a>(
    builder: DownloadLatestBuilder<'a>,
    matches: &ArgMatches,
) -> Result<DownloadLatestBuilder<'a>> {
    if let Some(signals) = signals_from_matches(matches) {
        return Ok(builder.signals(signals));
    }

    // Without any browser signals we assume the visitor is on this machine.
    let host = PlatformSignature::host();
    let os = match matches.get_one::<String>("os") {
        Some(o) => Os::from_str(o)?,
        None => host.os,
    };
    let arch = match matches.get_one::<String>("arch") {
        Some(a) => Arch::from_str(a)?,
        None => host.arch,
    };
    Ok(builder.platform(PlatformSignature::new(os, arch)))
}

fn signals_from_matches(matches: &ArgMatches) -> Option<PlatformSignals> {
    if !SIGNAL_ARGS.iter().any(|a| matches.contains_id(a)) {
        return None;
    }

    let user_agent_data = matches
        .get_one::<String>("ua-platform")
        .map(|p| UserAgentData {
            platform: Some(p.clone()),
            architecture: matches.get_one::<String>("ua-arch").cloned(),
        });
    let user_agent = matches.get_one::<String>("user-agent").cloned();
    let platform = matches.get_one::<String>("navigator-platform").cloned();
    let navigator = (user_agent.is_some() || platform.is_some())
        .then_some(NavigatorSignals {
            user_agent,
            platform,
        });

    Some(PlatformSignals {
        user_agent_data,
        navigator,
    })
}

fn platform_filter(matches: &ArgMatches) -> PlatformFilter {
    PlatformFilter::new(
        matches
            .get_many::<String>("exclude")
            .unwrap_or_default()
            .map(String::as_str),
        matches
            .get_many::<String>("include")
            .unwrap_or_default()
            .map(String::as_str),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Output<'a> {
    #[serde(flatten)]
    result: &'a ResolutionResult,
    button: ButtonView,
    #[serde(skip_serializing_if = "Option::is_none")]
    groups: Option<Vec<download_latest::AssetGroup>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    platforms: Option<Vec<download_latest::PlatformChoice>>,
}

fn print_result(
    matches: &ArgMatches,
    dl: &DownloadLatest,
    result: &ResolutionResult,
) -> Result<()> {
    let filter = platform_filter(matches);
    let output = Output {
        result,
        button: ButtonView::new(result, dl),
        groups: matches
            .get_flag("list")
            .then(|| group_assets(&result.all_assets, &filter)),
        platforms: matches
            .get_flag("platforms")
            .then(|| platform_choices(result, Some(dl.overrides()), &filter)),
    };

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print!("{}", render_text(&output));
    Ok(())
}

fn render_text(output: &Output<'_>) -> String {
    let result = output.result;
    let mut text = format!(
        "platform: {}\nversion:  {}\nasset:    {}\nurl:      {}\nlabel:    {}\n",
        result.platform().key(),
        result.version.as_deref().unwrap_or("(unknown)"),
        result.asset.as_deref().unwrap_or("(no match)"),
        output.button.href,
        output.button.label,
    );
    if let Some(secondary) = &output.button.secondary {
        text.push_str(&format!("releases: {secondary}\n"));
    }

    if let Some(groups) = &output.groups {
        for group in groups {
            text.push_str(&format!("\n{} ({}):\n", group.label, group.key));
            for asset in &group.assets {
                text.push_str(&format!(
                    "  {} ({})\n    {}\n",
                    asset.name,
                    format_size(asset.size),
                    asset.url,
                ));
            }
        }
    }

    if let Some(choices) = &output.platforms {
        text.push('\n');
        for choice in choices {
            text.push_str(&format!(
                "{} {:<14} {}\n",
                if choice.selected { "*" } else { " " },
                choice.key.as_str(),
                choice.asset.as_ref().map_or("-", |a| a.name.as_str()),
            ));
        }
    }

    text
}

fn print_err(e: &Error) {
    error!("{e}");
    if let Some(ce) = e.downcast_ref::<CliError>() {
        match ce {
            CliError::InvalidArgsError(_) => {
                println!();
                if let Err(e) = cmd().print_help() {
                    eprintln!("could not print help: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use download_latest::{Asset, PlatformKey};
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn matches(args: &[&str]) -> ArgMatches {
        cmd()
            .try_get_matches_from(std::iter::once("download-latest").chain(args.iter().copied()))
            .unwrap()
    }

    fn invalid_args_message(res: Result<WidgetConfig>) -> String {
        let err = res.unwrap_err();
        assert!(
            err.downcast_ref::<CliError>().is_some(),
            "{err} is an invalid args error"
        );
        err.to_string()
    }

    #[test]
    fn command_is_valid() {
        cmd().debug_assert();
    }

    #[test]
    fn repo_or_config_is_required() {
        let msg = invalid_args_message(make_config(&matches(&["--tag", "v1"])));
        assert_eq!(msg, "You must pass a --repo or --config.");
    }

    #[rstest]
    #[case::os_and_user_agent(&["--os", "linux", "--user-agent", "Mozilla"], "--os", "--user-agent")]
    #[case::arch_and_ua_platform(&["--arch", "x64", "--ua-platform", "Linux"], "--arch", "--ua-platform")]
    fn explicit_platform_conflicts_with_signals(
        #[case] args: &[&str],
        #[case] first: &str,
        #[case] second: &str,
    ) {
        let mut all = vec!["--repo", "a/b"];
        all.extend_from_slice(args);
        let msg = invalid_args_message(make_config(&matches(&all)));
        assert_eq!(
            msg,
            format!("You cannot combine the {first} and {second} options")
        );
    }

    #[test]
    fn ua_arch_needs_ua_platform() {
        let msg = invalid_args_message(make_config(&matches(&[
            "--repo", "a/b", "--ua-arch", "arm",
        ])));
        assert_eq!(msg, "You cannot pass --ua-arch without --ua-platform");
    }

    #[test]
    fn log_level_flags_conflict() {
        assert!(cmd()
            .try_get_matches_from(["download-latest", "--repo", "a/b", "-v", "-q"])
            .is_err());
    }

    #[test]
    fn unknown_os_is_rejected_by_clap() {
        assert!(cmd()
            .try_get_matches_from(["download-latest", "--repo", "a/b", "--os", "beos"])
            .is_err());
    }

    #[rstest]
    #[case::simple("linux-x64=\\.deb$", ("linux-x64", "\\.deb$"))]
    #[case::uppercase_key("Linux-X64=\\.deb$", ("linux-x64", "\\.deb$"))]
    #[case::equals_in_pattern("windows-x64=a=b", ("windows-x64", "a=b"))]
    fn match_args(#[case] arg: &str, #[case] expect: (&str, &str)) -> Result<()> {
        let (key, pattern) = parse_match_arg(arg)?;
        assert_eq!((key.as_str(), pattern.as_str()), expect);
        Ok(())
    }

    #[rstest]
    #[case::no_equals("linux-x64")]
    #[case::empty_key("=\\.deb$")]
    #[case::empty_pattern("linux-x64=")]
    fn bad_match_args(#[case] arg: &str) {
        assert!(parse_match_arg(arg).is_err());
    }

    #[test]
    fn options_from_command_line() -> Result<()> {
        let config = make_config(&matches(&[
            "--repo",
            "rustdesk/rustdesk",
            "--tag",
            "1.4.5",
            "--match",
            "linux-x64=\\.deb$",
            "--match",
            "linux-x64=\\.rpm$",
            "--text",
            "Get {os}",
            "--context-menu",
        ]))?;
        assert_eq!(config.repo, "rustdesk/rustdesk");
        assert_eq!(config.version.as_deref(), Some("1.4.5"));
        assert_eq!(
            config.match_rules.get("linux-x64").map(MatchPatterns::patterns),
            Some(vec!["\\.deb$", "\\.rpm$"]),
        );
        assert_eq!(config.text.as_deref(), Some("Get {os}"));
        assert!(config.context_menu);
        Ok(())
    }

    #[test]
    fn command_line_overrides_config_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(
            file,
            r#"{{
                "repo": "acme/app",
                "version": "v1.0.0",
                "match": {{ "linux-x64": ".AppImage$", "windows-x64": ".msi$" }},
                "noMatchText": "See all"
            }}"#
        )?;
        let path = file.path().to_string_lossy().to_string();

        let config = make_config(&matches(&[
            "--config",
            &path,
            "--tag",
            "v2.0.0",
            "--match",
            "linux-x64=\\.deb$",
        ]))?;
        assert_eq!(config.repo, "acme/app");
        assert_eq!(config.version.as_deref(), Some("v2.0.0"));
        assert_eq!(config.no_match_text.as_deref(), Some("See all"));
        assert_eq!(
            config.match_rules.get("linux-x64").map(MatchPatterns::patterns),
            Some(vec!["\\.deb$"]),
        );
        assert_eq!(
            config.match_rules.get("windows-x64").map(MatchPatterns::patterns),
            Some(vec![".msi$"]),
        );
        Ok(())
    }

    #[test]
    fn config_file_without_repo() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, r#"{{ "repo": "" }}"#)?;
        let path = file.path().to_string_lossy().to_string();
        let msg = invalid_args_message(make_config(&matches(&["--config", &path])));
        assert_eq!(
            msg,
            "The config file does not set a repo, so you must pass --repo."
        );
        Ok(())
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(make_config(&matches(&["--config", "/does/not/exist.json"])).is_err());
    }

    #[test]
    fn signals_from_args() {
        assert_eq!(signals_from_matches(&matches(&["--repo", "a/b"])), None);

        let signals = signals_from_matches(&matches(&[
            "--repo",
            "a/b",
            "--ua-platform",
            "macOS",
            "--ua-arch",
            "arm",
        ]))
        .unwrap();
        assert_eq!(
            signals,
            PlatformSignals {
                user_agent_data: Some(UserAgentData {
                    platform: Some("macOS".to_string()),
                    architecture: Some("arm".to_string()),
                }),
                navigator: None,
            }
        );

        let signals = signals_from_matches(&matches(&[
            "--repo",
            "a/b",
            "--navigator-platform",
            "Linux aarch64",
        ]))
        .unwrap();
        assert_eq!(
            signals.navigator,
            Some(NavigatorSignals {
                user_agent: None,
                platform: Some("Linux aarch64".to_string()),
            })
        );
    }

    #[test]
    fn platform_from_args() -> Result<()> {
        let m = matches(&["--repo", "a/b", "--os", "windows", "--arch", "arm64"]);
        let config = make_config(&m)?;
        let dl = make_download_latest(&m, &config)?;
        assert_eq!(
            dl.platform(),
            PlatformSignature::new(Os::Windows, Arch::Arm64)
        );

        let m = matches(&[
            "--repo",
            "a/b",
            "--user-agent",
            "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
        ]);
        let config = make_config(&m)?;
        let dl = make_download_latest(&m, &config)?;
        assert_eq!(dl.platform(), PlatformSignature::new(Os::Linux, Arch::X64));
        Ok(())
    }

    #[test]
    fn filter_from_args() {
        let filter = platform_filter(&matches(&[
            "--repo",
            "a/b",
            "--exclude",
            "ios-arm64",
            "--exclude",
            "other",
            "--include",
            "macos-arm64",
        ]));
        assert!(filter.exclude.contains(&PlatformKey::from("ios-arm64")));
        assert!(filter.exclude.contains(&PlatformKey::other()));
        assert!(filter.allows(&PlatformKey::from("macos-arm64")));
        assert!(!filter.allows(&PlatformKey::from("linux-x64")));
    }

    #[test]
    fn text_output() -> Result<()> {
        let m = matches(&["--repo", "acme/app", "--os", "linux", "--arch", "x64"]);
        let config = make_config(&m)?;
        let dl = make_download_latest(&m, &config)?;
        let asset = Asset {
            name: "app-x86_64.AppImage".to_string(),
            url: "https://example.com/app-x86_64.AppImage".parse()?,
            size: 12_897_485,
        };
        let result = ResolutionResult {
            url: asset.url.to_string(),
            asset: Some(asset.name.clone()),
            os: Os::Linux,
            arch: Arch::X64,
            version: Some("v1.0.0".to_string()),
            release_page_url: "https://github.com/acme/app/releases/tag/v1.0.0".parse()?,
            all_assets: vec![asset],
            matched: true,
        };
        let output = Output {
            result: &result,
            button: ButtonView::new(&result, &dl),
            groups: Some(group_assets(&result.all_assets, &PlatformFilter::default())),
            platforms: None,
        };

        assert_eq!(
            render_text(&output),
            concat!(
                "platform: linux-x64\n",
                "version:  v1.0.0\n",
                "asset:    app-x86_64.AppImage\n",
                "url:      https://example.com/app-x86_64.AppImage\n",
                "label:    Download for Linux\n",
                "\n",
                "Linux (x64) (linux-x64):\n",
                "  app-x86_64.AppImage (12.3 MB)\n",
                "    https://example.com/app-x86_64.AppImage\n",
            )
        );
        Ok(())
    }
}
