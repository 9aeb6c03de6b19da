//! Keyboard layout synchronisation with the KDE Plasma shell.
//!
//! When the active input-method group changes, its default layout is
//! written into `kxkbrc`, applied to the primary display, and announced to
//! the shell so its layout indicator reloads.

use std::path::PathBuf;

use tracing::debug;

use crate::bus::{BusSignal, SessionBus};
use crate::environment::Environment;
use crate::error::DaemonError;
use crate::focus::FocusGroup;
use crate::instance::{Instance, DEFAULT_XKB_RULES};
use crate::kxkbrc::IniDocument;
use crate::layout::parse_layout;

/// Result of handling a group change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Not running under Plasma on Wayland.
    Inactive,
    /// There is no primary display to apply the layout to.
    NoPrimaryDisplay,
    /// No session bus is available.
    NoBus,
    /// The layout was written, applied and announced.
    Applied { layout: String, variant: String },
}

pub struct LayoutSync {
    environment: Environment,
    kxkbrc: PathBuf,
    bus: Option<Box<dyn SessionBus>>,
}

impl LayoutSync {
    pub fn new(
        environment: Environment,
        kxkbrc: PathBuf,
        bus: Option<Box<dyn SessionBus>>,
    ) -> Self {
        Self {
            environment,
            kxkbrc,
            bus,
        }
    }

    /// Whether group changes are synchronised in this session at all.
    pub fn is_active(&self) -> bool {
        self.environment.is_plasma_wayland()
    }

    /// React to a change of the active input-method group.
    pub fn on_group_changed(
        &self,
        primary: Option<&FocusGroup>,
        instance: &dyn Instance,
    ) -> Result<SyncOutcome, DaemonError> {
        if !self.is_active() {
            return Ok(SyncOutcome::Inactive);
        }
        let Some(group) = primary else {
            return Ok(SyncOutcome::NoPrimaryDisplay);
        };
        let Some(bus) = self.bus.as_deref() else {
            return Ok(SyncOutcome::NoBus);
        };

        let (layout, variant) = parse_layout(&instance.current_group_default_layout());
        debug!(%layout, %variant, "syncing layout to kxkbrc");

        let mut config = IniDocument::load(&self.kxkbrc)?;
        config.set_value_by_path("Layout/LayoutList", &layout);
        config.set_value_by_path("Layout/VariantList", &variant);
        config.set_value_by_path("Layout/DisplayNames", "");
        config.set_value_by_path("Layout/Use", "true");
        let model = config
            .value_by_path("Layout/Model")
            .unwrap_or_default()
            .to_string();
        let options = config
            .value_by_path("Layout/Options")
            .unwrap_or_default()
            .to_string();

        instance.set_xkb_parameters(group.display(), DEFAULT_XKB_RULES, &model, &options);
        config.save_atomic(&self.kxkbrc)?;
        bus.emit_signal(&BusSignal::new("/Layouts", "org.kde.keyboard", "reloadConfig"))?;

        Ok(SyncOutcome::Applied { layout, variant })
    }
}
