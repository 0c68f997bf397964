//! Context builders — turn the raw values a browser reports (location,
//! referrer, user agent, screen size) into page and user context snapshots.

use folio_core::types::{DeviceType, PageContext, UserContext};
use serde::{Deserialize, Serialize};
use url::Url;

/// Raw environment values reported by the browser alongside events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientHints {
    pub user_agent: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub language: String,
    pub timezone: String,
}

/// Build a page context from an absolute URL.
pub fn page_context(
    raw_url: &str,
    title: &str,
    referrer: Option<&str>,
) -> Result<PageContext, url::ParseError> {
    let url = Url::parse(raw_url)?;
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());

    Ok(PageContext {
        path: url.path().to_string(),
        title: title.to_string(),
        url: url.to_string(),
        referrer: referrer.and_then(non_empty),
        query: url.query().and_then(non_empty),
        hash: url.fragment().and_then(non_empty),
        load_time: None,
    })
}

/// Build a user context from client hints. Session counters are left at zero;
/// the session fills them in.
pub fn user_context(hints: &ClientHints) -> UserContext {
    UserContext {
        device_type: detect_device(&hints.user_agent),
        screen_width: hints.screen_width,
        screen_height: hints.screen_height,
        viewport_width: hints.viewport_width,
        viewport_height: hints.viewport_height,
        browser: detect_browser(&hints.user_agent).to_string(),
        platform: detect_platform(&hints.user_agent).to_string(),
        language: hints.language.clone(),
        timezone: hints.timezone.clone(),
        session_page_views: 0,
        session_event_count: 0,
    }
}

pub fn detect_device(user_agent: &str) -> DeviceType {
    let ua = user_agent.to_ascii_lowercase();
    if ua.is_empty() {
        DeviceType::Unknown
    } else if ua.contains("ipad")
        || ua.contains("tablet")
        || (ua.contains("android") && !ua.contains("mobile"))
    {
        DeviceType::Tablet
    } else if ua.contains("mobi") || ua.contains("iphone") || ua.contains("android") {
        DeviceType::Mobile
    } else {
        DeviceType::Desktop
    }
}

// Order matters: Edge and Opera also advertise Chrome, Chrome also advertises Safari.
pub fn detect_browser(user_agent: &str) -> &'static str {
    let ua = user_agent.to_ascii_lowercase();
    if ua.contains("edg/") {
        "Edge"
    } else if ua.contains("opr/") || ua.contains("opera") {
        "Opera"
    } else if ua.contains("firefox/") || ua.contains("fxios/") {
        "Firefox"
    } else if ua.contains("chrome/") || ua.contains("crios/") {
        "Chrome"
    } else if ua.contains("safari/") {
        "Safari"
    } else {
        "Unknown"
    }
}

// iOS agents mention "Mac OS X" and Android agents mention "Linux".
pub fn detect_platform(user_agent: &str) -> &'static str {
    let ua = user_agent.to_ascii_lowercase();
    if ua.contains("windows") {
        "Windows"
    } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ipod") {
        "iOS"
    } else if ua.contains("mac os x") || ua.contains("macintosh") {
        "macOS"
    } else if ua.contains("android") {
        "Android"
    } else if ua.contains("cros") {
        "ChromeOS"
    } else if ua.contains("linux") {
        "Linux"
    } else {
        "Unknown"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";
    const FIREFOX_ANDROID_TABLET: &str = "Mozilla/5.0 (Android 13; Tablet; rv:120.0) Gecko/120.0 Firefox/120.0";
    const CHROME_ANDROID_PHONE: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";

    #[test]
    fn test_page_context_splits_url() {
        let page = page_context(
            "https://example.com/projects/folio?tab=stack#readme",
            "Folio",
            Some("https://github.com/"),
        )
        .unwrap();
        assert_eq!(page.path, "/projects/folio");
        assert_eq!(page.query.as_deref(), Some("tab=stack"));
        assert_eq!(page.hash.as_deref(), Some("readme"));
        assert_eq!(page.referrer.as_deref(), Some("https://github.com/"));
    }

    #[test]
    fn test_page_context_drops_empty_parts() {
        let page = page_context("https://example.com/", "Home", Some("")).unwrap();
        assert_eq!(page.path, "/");
        assert!(page.query.is_none());
        assert!(page.hash.is_none());
        assert!(page.referrer.is_none());
    }

    #[test]
    fn test_page_context_rejects_relative_url() {
        assert!(page_context("/relative", "x", None).is_err());
    }

    #[test]
    fn test_user_agent_detection() {
        assert_eq!(detect_device(CHROME_MAC), DeviceType::Desktop);
        assert_eq!(detect_browser(CHROME_MAC), "Chrome");
        assert_eq!(detect_platform(CHROME_MAC), "macOS");

        assert_eq!(detect_device(SAFARI_IPHONE), DeviceType::Mobile);
        assert_eq!(detect_browser(SAFARI_IPHONE), "Safari");
        assert_eq!(detect_platform(SAFARI_IPHONE), "iOS");

        assert_eq!(detect_browser(EDGE_WINDOWS), "Edge");
        assert_eq!(detect_platform(EDGE_WINDOWS), "Windows");

        assert_eq!(detect_device(FIREFOX_ANDROID_TABLET), DeviceType::Tablet);
        assert_eq!(detect_browser(FIREFOX_ANDROID_TABLET), "Firefox");

        assert_eq!(detect_device(CHROME_ANDROID_PHONE), DeviceType::Mobile);
        assert_eq!(detect_platform(CHROME_ANDROID_PHONE), "Android");

        assert_eq!(detect_device(""), DeviceType::Unknown);
    }

    #[test]
    fn test_user_context_from_hints() {
        let hints: ClientHints = serde_json::from_value(serde_json::json!({
            "userAgent": SAFARI_IPHONE,
            "screenWidth": 390,
            "screenHeight": 844,
            "language": "en-GB",
            "timezone": "Europe/London"
        }))
        .unwrap();
        let user = user_context(&hints);
        assert_eq!(user.device_type, DeviceType::Mobile);
        assert_eq!(user.screen_width, 390);
        assert_eq!(user.viewport_width, 0);
        assert_eq!(user.language, "en-GB");
        assert_eq!(user.session_page_views, 0);
    }
}
