//! User-agent parsing for the `client_details` stored with each access token.
//!
//! Recognises the common browsers, desktop and mobile operating systems,
//! a handful of device brands and well-known crawlers. Anything unknown is
//! reported as `null` rather than guessed.

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// "desktop", "smartphone" or "tablet"
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OsInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    /// CPU architecture, e.g. "x64" or "ARM"
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// `{"device": {...}, "os": {...}, "client": {...}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientDetails {
    pub device: DeviceInfo,
    pub os: OsInfo,
    pub client: ClientInfo,
}

const BOT_MARKERS: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "slurp",
    "curl/",
    "wget/",
    "python-requests",
    "headlesschrome",
    "facebookexternalhit",
    "lighthouse",
];

pub fn is_bot(user_agent: &str) -> bool {
    let ua = user_agent.to_lowercase();
    BOT_MARKERS.iter().any(|marker| ua.contains(marker))
}

/// Parse a user-agent string. Returns `None` for crawlers and other bots.
#[must_use]
pub fn parse_user_agent(user_agent: &str) -> Option<ClientDetails> {
    if is_bot(user_agent) {
        return None;
    }

    let (brand, model) = detect_brand_model(user_agent);
    let (os_name, os_version) = detect_os(user_agent);
    let (client_name, client_version) = detect_client(user_agent);

    Some(ClientDetails {
        device: DeviceInfo {
            kind: detect_device_type(&user_agent.to_lowercase()),
            brand,
            model,
        },
        os: OsInfo {
            name: os_name,
            version: os_version,
            platform: detect_platform(user_agent),
        },
        client: ClientInfo {
            name: client_name,
            version: client_version,
        },
    })
}

fn detect_device_type(ua: &str) -> Option<String> {
    let kind = if ua.contains("ipad") || ua.contains("tablet") || (ua.contains("android") && !ua.contains("mobile")) {
        "tablet"
    } else if ua.contains("mobile")
        || ua.contains("iphone")
        || ua.contains("ipod")
        || ua.contains("android")
        || ua.contains("windows phone")
    {
        "smartphone"
    } else if ua.contains("windows") || ua.contains("macintosh") || ua.contains("x11") || ua.contains("cros") {
        "desktop"
    } else {
        return None;
    };
    Some(kind.to_string())
}

fn detect_brand_model(ua: &str) -> (Option<String>, Option<String>) {
    for model in ["iPhone", "iPad", "iPod"] {
        if ua.contains(model) {
            return (Some("Apple".to_string()), Some(model.to_string()));
        }
    }
    if ua.contains("Macintosh") {
        return (Some("Apple".to_string()), None);
    }
    if ua.contains("Android") {
        let model = android_model(ua);
        let brand = model.as_deref().and_then(|m| {
            if m.starts_with("SM-") || m.starts_with("GT-") {
                Some("Samsung")
            } else if m.starts_with("Pixel") {
                Some("Google")
            } else if m.starts_with("Redmi") || m.starts_with("Mi ") {
                Some("Xiaomi")
            } else {
                None
            }
        });
        return (brand.map(str::to_string), model);
    }
    (None, None)
}

/// Android puts the model right before " Build/" or the closing parenthesis.
fn android_model(ua: &str) -> Option<String> {
    let start = ua.find("Android")?;
    let inside = &ua[start..];
    let inside = &inside[..inside.find(')')?];
    let model = inside.split(';').nth(1)?.trim();
    let model = model.split(" Build/").next().unwrap_or(model).trim();
    (!model.is_empty() && model != "K").then(|| model.to_string())
}

fn detect_os(ua: &str) -> (Option<String>, Option<String>) {
    if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod") {
        return (Some("iOS".to_string()), extract_ios_version(ua));
    }
    if ua.contains("Windows") {
        return (Some("Windows".to_string()), extract_windows_version(ua));
    }
    if ua.contains("Macintosh") || ua.contains("Mac OS X") {
        return (Some("Mac".to_string()), extract_macos_version(ua));
    }
    if ua.contains("Android") {
        return (Some("Android".to_string()), extract_version(ua, "Android "));
    }
    if ua.contains("CrOS") {
        return (Some("Chrome OS".to_string()), None);
    }
    if ua.contains("Ubuntu") {
        return (Some("Ubuntu".to_string()), None);
    }
    if ua.contains("Linux") {
        return (Some("GNU/Linux".to_string()), None);
    }
    (None, None)
}

fn detect_platform(ua: &str) -> Option<String> {
    let platform = if ua.contains("x86_64") || ua.contains("Win64") || ua.contains("WOW64") || ua.contains("amd64") {
        "x64"
    } else if ua.contains("arm") || ua.contains("aarch64") || ua.contains("Android") || ua.contains("iPhone") || ua.contains("iPad") {
        "ARM"
    } else if ua.contains("i686") || ua.contains("i386") || ua.contains("Windows NT") {
        "x86"
    } else {
        return None;
    };
    Some(platform.to_string())
}

fn detect_client(ua: &str) -> (Option<String>, Option<String>) {
    // more specific products first: most of them also claim to be Chrome or Safari
    const PRODUCTS: &[(&str, &str)] = &[
        ("Edg/", "Microsoft Edge"),
        ("Edge/", "Microsoft Edge"),
        ("OPR/", "Opera"),
        ("SamsungBrowser/", "Samsung Browser"),
        ("Firefox/", "Firefox"),
        ("FxiOS/", "Firefox"),
        ("CriOS/", "Chrome Mobile iOS"),
        ("Chrome/", "Chrome"),
        ("okhttp/", "OkHttp"),
    ];
    for (prefix, name) in PRODUCTS {
        if ua.contains(prefix) {
            return (Some((*name).to_string()), extract_version(ua, prefix));
        }
    }
    if ua.contains("Safari/") {
        let name = if ua.contains("Mobile") { "Mobile Safari" } else { "Safari" };
        return (Some(name.to_string()), extract_version(ua, "Version/"));
    }
    if ua.contains("Trident/") || ua.contains("MSIE ") {
        return (
            Some("Internet Explorer".to_string()),
            extract_version(ua, "MSIE ").or_else(|| extract_version(ua, "rv:")),
        );
    }
    (None, None)
}

fn extract_version(ua: &str, prefix: &str) -> Option<String> {
    let start = ua.find(prefix)? + prefix.len();
    let rest = &ua[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(rest.len());
    let version = rest[..end].trim_end_matches('.');
    (!version.is_empty()).then(|| version.to_string())
}

fn extract_windows_version(ua: &str) -> Option<String> {
    let version = match extract_version(ua, "Windows NT ")?.as_str() {
        "10.0" => "10",
        "6.3" => "8.1",
        "6.2" => "8",
        "6.1" => "7",
        "6.0" => "Vista",
        "5.1" => "XP",
        _ => return None,
    };
    Some(version.to_string())
}

fn extract_macos_version(ua: &str) -> Option<String> {
    let prefix = "Mac OS X ";
    let start = ua.find(prefix)? + prefix.len();
    let rest = &ua[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '_' && c != '.')
        .unwrap_or(rest.len());
    let version = &rest[..end];
    (!version.is_empty()).then(|| version.replace('_', "."))
}

fn extract_ios_version(ua: &str) -> Option<String> {
    for prefix in ["iPhone OS ", "CPU OS "] {
        if let Some(start) = ua.find(prefix) {
            let rest = &ua[start + prefix.len()..];
            let end = rest
                .find(|c: char| !c.is_ascii_digit() && c != '_')
                .unwrap_or(rest.len());
            if end > 0 {
                return Some(rest[..end].replace('_', "."));
            }
        }
    }
    None
}
