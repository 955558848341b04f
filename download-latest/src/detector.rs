use crate::platform::{Arch, Os, PlatformSignature};
use log::debug;
use serde::{Deserialize, Serialize};

/// The structured platform hints a browser exposes through User-Agent Client Hints.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UserAgentData {
    pub platform: Option<String>,
    pub architecture: Option<String>,
}

/// The legacy `navigator.userAgent` and `navigator.platform` strings.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct NavigatorSignals {
    pub user_agent: Option<String>,
    pub platform: Option<String>,
}

/// Everything the detector can look at. When `navigator` is `None` we are not running in a
/// browser-like context at all.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSignals {
    pub user_agent_data: Option<UserAgentData>,
    pub navigator: Option<NavigatorSignals>,
}

impl PlatformSignals {
    /// Signals from a plain user agent string, as sent in a `User-Agent` header.
    #[must_use]
    pub fn from_user_agent(user_agent: &str) -> Self {
        Self {
            user_agent_data: None,
            navigator: Some(NavigatorSignals {
                user_agent: Some(user_agent.to_string()),
                platform: None,
            }),
        }
    }
}

/// Works out the visitor's OS and CPU architecture. This never fails. Anything we cannot figure out
/// is reported as `unknown`.
#[must_use]
pub fn detect(signals: &PlatformSignals) -> PlatformSignature {
    let mut os = None;
    let mut arch = None;

    if let Some(hints) = &signals.user_agent_data {
        if let Some(platform) = hints.platform.as_deref() {
            os = os_from_client_hint(&platform.to_lowercase());
            debug!("client hint platform `{platform}` gives OS {os:?}");

            if let Some(a) = hints.architecture.as_deref().filter(|a| !a.is_empty()) {
                arch = Some(match a.to_lowercase().as_str() {
                    "arm" | "arm64" => Arch::Arm64,
                    _ => Arch::X64,
                });
                debug!("client hint architecture `{a}` gives {arch:?}");
            }
        }
    }

    if let Some(nav) = &signals.navigator {
        let ua = nav.user_agent.as_deref().unwrap_or_default().to_lowercase();
        let plat = nav.platform.as_deref().unwrap_or_default().to_lowercase();

        if os.is_none() {
            os = os_from_user_agent(&ua);
            debug!("user agent gives OS {os:?}");
        }

        if arch.is_none() {
            arch = Some(arch_from_user_agent(&ua, &plat, os));
            debug!("user agent and platform give {arch:?}");
        }
    }

    PlatformSignature::new(os.unwrap_or_default(), arch.unwrap_or_default())
}

fn os_from_client_hint(platform: &str) -> Option<Os> {
    match platform {
        "macos" | "mac os x" => Some(Os::MacOs),
        "windows" => Some(Os::Windows),
        "linux" | "chromeos" => Some(Os::Linux),
        _ => None,
    }
}

// iOS and Android user agents also mention "Mac OS X" and "Linux", so they have to be checked
// first.
fn os_from_user_agent(ua: &str) -> Option<Os> {
    if ["iphone", "ipad", "ipod"].iter().any(|d| ua.contains(d)) {
        Some(Os::IOs)
    } else if ua.contains("android") {
        Some(Os::Android)
    } else if ua.contains("mac") {
        Some(Os::MacOs)
    } else if ua.contains("win") {
        Some(Os::Windows)
    } else if ua.contains("linux") || ua.contains("cros") {
        Some(Os::Linux)
    } else {
        None
    }
}

fn arch_from_user_agent(ua: &str, plat: &str, os: Option<Os>) -> Arch {
    if ua.contains("arm") || ua.contains("aarch64") || plat.contains("arm") {
        return Arch::Arm64;
    }
    match os {
        // Browsers on Apple Silicon still report an Intel user agent, and most Macs sold today are
        // Apple Silicon.
        Some(Os::MacOs | Os::IOs | Os::Android) => Arch::Arm64,
        Some(Os::Windows | Os::Linux | Os::Unknown) | None => Arch::X64,
    }
}
