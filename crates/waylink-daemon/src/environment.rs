//! Session and desktop detection.
//!
//! Resolved once at startup into an [`Environment`] that is handed to the
//! components that care, instead of being looked up again on every use.

use std::fmt;

/// Desktop environment the session runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopType {
    Kde4,
    Kde5,
    Kde6,
    Gnome,
    Cinnamon,
    Mate,
    Lxde,
    Xfce,
    Deepin,
    Ukui,
    Unity,
    Sway,
    Unknown,
}

impl DesktopType {
    /// Parse `XDG_CURRENT_DESKTOP` (a colon-separated list, first match
    /// wins) together with `KDE_SESSION_VERSION`.
    pub fn from_env_values(
        current_desktop: Option<&str>,
        kde_session_version: Option<&str>,
    ) -> Self {
        let Some(current_desktop) = current_desktop else {
            return Self::Unknown;
        };
        for desktop in current_desktop.split(':') {
            let desktop = desktop.trim().to_ascii_lowercase();
            let kind = match desktop.as_str() {
                "kde" => match kde_session_version.map(str::trim) {
                    Some("6") => Self::Kde6,
                    Some("5") => Self::Kde5,
                    _ => Self::Kde4,
                },
                "x-cinnamon" | "cinnamon" => Self::Cinnamon,
                "gnome" => Self::Gnome,
                "mate" => Self::Mate,
                "lxde" => Self::Lxde,
                "xfce" => Self::Xfce,
                "deepin" => Self::Deepin,
                "ukui" => Self::Ukui,
                "unity" => Self::Unity,
                "sway" => Self::Sway,
                _ => continue,
            };
            return kind;
        }
        Self::Unknown
    }
}

impl fmt::Display for DesktopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Kde4 => "KDE4",
            Self::Kde5 => "KDE5",
            Self::Kde6 => "KDE6",
            Self::Gnome => "GNOME",
            Self::Cinnamon => "Cinnamon",
            Self::Mate => "MATE",
            Self::Lxde => "LXDE",
            Self::Xfce => "XFCE",
            Self::Deepin => "Deepin",
            Self::Ukui => "UKUI",
            Self::Unity => "Unity",
            Self::Sway => "Sway",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Session facts, read once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    session_type: Option<String>,
    desktop: DesktopType,
}

impl Environment {
    pub fn new(session_type: Option<String>, desktop: DesktopType) -> Self {
        Self {
            session_type,
            desktop,
        }
    }

    /// Read `XDG_SESSION_TYPE`, `XDG_CURRENT_DESKTOP` and
    /// `KDE_SESSION_VERSION` from the process environment.
    pub fn detect() -> Self {
        let session_type = std::env::var("XDG_SESSION_TYPE").ok();
        let current_desktop = std::env::var("XDG_CURRENT_DESKTOP").ok();
        let kde_version = std::env::var("KDE_SESSION_VERSION").ok();
        Self::new(
            session_type,
            DesktopType::from_env_values(current_desktop.as_deref(), kde_version.as_deref()),
        )
    }

    pub fn is_session_type(&self, kind: &str) -> bool {
        self.session_type.as_deref() == Some(kind)
    }

    pub fn session_type(&self) -> Option<&str> {
        self.session_type.as_deref()
    }

    pub fn desktop_type(&self) -> DesktopType {
        self.desktop
    }

    /// Running under Plasma 5, whose layout switcher reads `kxkbrc`.
    pub fn is_kde(&self) -> bool {
        self.desktop == DesktopType::Kde5
    }

    pub fn is_wayland_session(&self) -> bool {
        self.is_session_type("wayland")
    }

    /// Plasma on Wayland, where keyboard layouts are synced through `kxkbrc`.
    pub fn is_plasma_wayland(&self) -> bool {
        self.is_kde() && self.is_wayland_session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kde_versions() {
        assert_eq!(DesktopType::from_env_values(Some("KDE"), Some("5")), DesktopType::Kde5);
        assert_eq!(DesktopType::from_env_values(Some("KDE"), Some("6")), DesktopType::Kde6);
        assert_eq!(DesktopType::from_env_values(Some("KDE"), None), DesktopType::Kde4);
    }

    #[test]
    fn first_known_entry_wins() {
        assert_eq!(
            DesktopType::from_env_values(Some("ubuntu:GNOME"), None),
            DesktopType::Gnome
        );
        assert_eq!(
            DesktopType::from_env_values(Some("X-Cinnamon"), None),
            DesktopType::Cinnamon
        );
        assert_eq!(DesktopType::from_env_values(Some("foo"), None), DesktopType::Unknown);
        assert_eq!(DesktopType::from_env_values(None, None), DesktopType::Unknown);
    }

    #[test]
    fn session_type_match_is_exact() {
        let env = Environment::new(Some("wayland".to_string()), DesktopType::Kde5);
        assert!(env.is_wayland_session());
        assert!(!env.is_session_type("x11"));
        assert!(env.is_kde());

        let env = Environment::new(None, DesktopType::Gnome);
        assert!(!env.is_wayland_session());
        assert!(!env.is_kde());
    }

    #[test]
    fn plasma_wayland_needs_both_kde_and_wayland() {
        let wayland = Some("wayland".to_string());
        assert!(Environment::new(wayland.clone(), DesktopType::Kde5).is_plasma_wayland());
        assert!(!Environment::new(Some("x11".to_string()), DesktopType::Kde5).is_plasma_wayland());
        assert!(!Environment::new(wayland, DesktopType::Gnome).is_plasma_wayland());
    }
}
