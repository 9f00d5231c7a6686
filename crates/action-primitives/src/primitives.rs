//! Page interface and element primitives
//!
//! Primitives available to flow steps:
//! 1. click - Trigger a control after re-checking it is present and enabled
//! 2. set_value - Assign a value and notify the page framework of the change
//! 3. select - Choose a dropdown option by value or text
//! 4. wait - Bounded wait for an element to appear

mod click;
mod select;
mod type_text;
mod wait;

pub use click::*;
pub use select::*;
pub use type_text::*;
pub use wait::*;

use autopilot_core_types::Location;
use serde_json::Value;
use tokio::sync::watch;

use crate::{
    errors::ActionError,
    types::{AnchorDescriptor, ElementHandle, ElementId},
};

/// External page state the flows operate on.
///
/// Queries return snapshots; mutations address elements by id so a primitive can
/// re-read an element right before touching it. Implementations publish a
/// notification on `mutations()` for every structural change.
pub trait Page: Send + Sync {
    /// Current location of the page.
    fn location(&self) -> Location;

    /// First element matching the anchor, in document order.
    fn query(&self, anchor: &AnchorDescriptor) -> Option<ElementHandle>;

    /// Every element matching the anchor, in document order.
    fn query_all(&self, anchor: &AnchorDescriptor) -> Vec<ElementHandle>;

    /// Fresh snapshot of a previously queried element.
    fn element(&self, id: ElementId) -> Option<ElementHandle>;

    /// Write the value through the element's native setter.
    fn assign_value(&self, id: ElementId, value: &str) -> Result<(), ActionError>;

    /// Tell the page framework the value changed (input + change events).
    fn notify_change(&self, id: ElementId) -> Result<(), ActionError>;

    fn click(&self, id: ElementId) -> Result<(), ActionError>;

    /// Hydration data embedded by the page, if any.
    fn page_data(&self) -> Option<Value>;

    /// Subscribe to structural mutation notifications.
    fn mutations(&self) -> watch::Receiver<u64>;

    /// Two-phase value update; returns the value the element reports afterwards.
    fn set_value(&self, id: ElementId, value: &str) -> Result<String, ActionError> {
        self.assign_value(id, value)?;
        self.notify_change(id)?;
        self.element(id)
            .map(|element| element.value)
            .ok_or_else(|| ActionError::ElementMissing(format!("element {} detached", id.0)))
    }
}
