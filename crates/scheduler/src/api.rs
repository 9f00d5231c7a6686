use std::sync::Arc;

use autopilot_core_types::{NavigationEvent, Settings};
use parking_lot::RwLock;

use crate::model::DispatchOutcome;

/// Reacts to navigations by cancelling the running flow and starting the one
/// routed for the new location.
pub trait Dispatcher: Send + Sync {
    /// Handle one navigation. The bookkeeping completes before this returns;
    /// the flow itself runs on a spawned task, so a tokio runtime must be active.
    fn on_navigation(&self, event: NavigationEvent) -> DispatchOutcome;

    /// Cancel the active flow and any pending start. Returns whether anything
    /// was still active.
    fn cancel_active(&self) -> bool;
}

impl<D> Dispatcher for Arc<D>
where
    D: Dispatcher + ?Sized,
{
    fn on_navigation(&self, event: NavigationEvent) -> DispatchOutcome {
        (**self).on_navigation(event)
    }

    fn cancel_active(&self) -> bool {
        (**self).cancel_active()
    }
}

/// Settings read once per dispatch.
pub trait SettingsProvider: Send + Sync {
    fn load(&self) -> Settings;
}

impl SettingsProvider for Settings {
    fn load(&self) -> Settings {
        self.clone()
    }
}

/// Settings that can be replaced while the dispatcher runs.
#[derive(Default)]
pub struct SharedSettings {
    inner: RwLock<Settings>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    pub fn replace(&self, settings: Settings) {
        *self.inner.write() = settings;
    }
}

impl SettingsProvider for SharedSettings {
    fn load(&self) -> Settings {
        self.inner.read().clone()
    }
}
