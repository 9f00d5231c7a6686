use std::sync::Arc;

use autopilot_core_types::{Location, NavigationEvent, NavigationKind};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

pub type NavigationSender = mpsc::UnboundedSender<NavigationEvent>;
pub type NavigationReceiver = mpsc::UnboundedReceiver<NavigationEvent>;

/// Producer of deduplicated navigation events.
pub trait NavigationSource: Send + Sync {
    /// Hand out the event stream. Only the first call gets one; later calls
    /// return `None` so a source is never observed twice.
    fn subscribe(&self) -> Option<NavigationReceiver>;
}

#[derive(Default)]
struct HistoryState {
    last: Option<Location>,
    sender: Option<NavigationSender>,
    subscribed: bool,
}

/// Adapter the host drives with its history calls.
///
/// Every call is normalised into a `NavigationEvent`; a location equal to the
/// last one seen is dropped. Events emitted before anyone subscribed only
/// update the last seen location.
#[derive(Default)]
pub struct HistoryNavigationSource {
    state: Mutex<HistoryState>,
}

static GLOBAL: Lazy<Arc<HistoryNavigationSource>> =
    Lazy::new(|| Arc::new(HistoryNavigationSource::new()));

impl HistoryNavigationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source for a host already showing `initial`; a history call to the
    /// same location is treated as a duplicate.
    pub fn with_location(initial: impl Into<Location>) -> Self {
        Self {
            state: Mutex::new(HistoryState {
                last: Some(initial.into()),
                ..HistoryState::default()
            }),
        }
    }

    /// Process-wide instance for hosts with a single history.
    pub fn global() -> Arc<HistoryNavigationSource> {
        Arc::clone(&GLOBAL)
    }

    pub fn push_state(&self, location: impl Into<Location>) -> bool {
        self.emit(NavigationKind::PushState, location.into())
    }

    pub fn replace_state(&self, location: impl Into<Location>) -> bool {
        self.emit(NavigationKind::ReplaceState, location.into())
    }

    pub fn pop_state(&self, location: impl Into<Location>) -> bool {
        self.emit(NavigationKind::PopState, location.into())
    }

    /// A full reload always routes again, even to the current location.
    pub fn load(&self, location: impl Into<Location>) -> bool {
        let location = location.into();
        self.state.lock().last = None;
        self.emit(NavigationKind::Load, location)
    }

    pub fn last_location(&self) -> Option<Location> {
        self.state.lock().last.clone()
    }

    /// Returns whether a new event was emitted.
    fn emit(&self, kind: NavigationKind, location: Location) -> bool {
        let mut state = self.state.lock();
        if state.last.as_ref() == Some(&location) {
            trace!(%location, %kind, "navigation suppressed: location unchanged");
            return false;
        }
        state.last = Some(location.clone());

        let event = NavigationEvent::new(kind, location);
        debug!(location = %event.location, kind = %event.kind, "navigation observed");
        if let Some(sender) = &state.sender {
            if sender.send(event).is_err() {
                debug!("navigation subscriber went away");
                state.sender = None;
            }
        }
        true
    }
}

impl NavigationSource for HistoryNavigationSource {
    fn subscribe(&self) -> Option<NavigationReceiver> {
        let mut state = self.state.lock();
        if state.subscribed {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.sender = Some(tx);
        state.subscribed = true;
        Some(rx)
    }
}
