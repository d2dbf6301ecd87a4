//! Device identity for the hello message.
//!
//! The host shows a short human-readable tag per connected controller so an
//! operator can tell the devices apart. The tag combines coarse platform
//! facts with a short slug that is generated once and persisted in the
//! settings file, so the same device keeps the same tag across sessions.

use serde::Serialize;
use uuid::Uuid;

/// Coarse facts about the device this controller runs on.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub os: String,
    pub arch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl DeviceInfo {
    /// Gather platform facts from compile-time constants and the
    /// environment. Never fails; absent facts stay `None`.
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            hostname: std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()),
            locale: std::env::var("LANG").ok().filter(|l| !l.is_empty()),
        }
    }
}

/// Generate a fresh 4-character uppercase slug.
pub fn generate_slug() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..4].to_uppercase()
}

/// Build the display tag shown on the host, e.g. `linux x86_64 • 3F0A`.
pub fn device_tag(info: &DeviceInfo, slug: &str) -> String {
    format!("{} {} • {}", info.os, info.arch, slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_four_uppercase_hex_chars() {
        let slug = generate_slug();
        assert_eq!(slug.len(), 4);
        assert!(slug.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(slug, slug.to_uppercase());
    }

    #[test]
    fn tag_combines_platform_and_slug() {
        let info = DeviceInfo {
            os: "linux".into(),
            arch: "aarch64".into(),
            hostname: None,
            locale: None,
        };
        assert_eq!(device_tag(&info, "AB12"), "linux aarch64 • AB12");
    }

    #[test]
    fn collect_reports_compile_time_platform() {
        let info = DeviceInfo::collect();
        assert_eq!(info.os, std::env::consts::OS);
        assert_eq!(info.arch, std::env::consts::ARCH);
    }
}
