//! In-memory page used by tests and scenario simulation.

use std::collections::HashMap;
use std::sync::Arc;

use autopilot_core_types::Location;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::trace;

use crate::{
    errors::ActionError,
    primitives::Page,
    types::{AnchorDescriptor, ElementHandle, ElementId, SelectOption},
};

/// Declarative description of an element held by `MemoryPage`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementNode {
    pub tag: String,
    pub text: String,
    pub name: Option<String>,
    /// CSS selectors this element answers to.
    pub selectors: Vec<String>,
    pub class_name: String,
    pub disabled: bool,
    pub value: String,
    pub checked: Option<bool>,
    pub options: Vec<SelectOption>,
}

impl ElementNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selectors.push(selector.into());
        self
    }

    pub fn class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }

    pub fn options(mut self, options: Vec<SelectOption>) -> Self {
        self.options = options;
        self
    }

    fn matches(&self, anchor: &AnchorDescriptor) -> bool {
        match anchor {
            AnchorDescriptor::Css(selector) => {
                self.selectors.iter().any(|s| s == selector) || self.tag == *selector
            }
            AnchorDescriptor::Name(name) => self.name.as_deref() == Some(name.as_str()),
            AnchorDescriptor::Text {
                content,
                exact,
                tag,
            } => {
                if tag.as_deref().is_some_and(|tag| tag != self.tag) {
                    return false;
                }
                let text = self.text.trim();
                if *exact {
                    text == content
                } else {
                    text.contains(content.as_str())
                }
            }
            AnchorDescriptor::Tag(tag) => self.tag == *tag,
        }
    }

    fn snapshot(&self, id: ElementId) -> ElementHandle {
        ElementHandle {
            id,
            tag: self.tag.clone(),
            text: self.text.clone(),
            name: self.name.clone(),
            class_name: self.class_name.clone(),
            disabled: self.disabled,
            value: self.value.clone(),
            checked: self.checked,
            options: self.options.clone(),
        }
    }
}

#[derive(Default)]
struct PageState {
    location: Option<Location>,
    nodes: Vec<Option<ElementNode>>,
    data: Option<Value>,
    clicks: HashMap<ElementId, u32>,
    notifications: HashMap<ElementId, u32>,
}

/// Page whose DOM is a flat list of `ElementNode`s.
///
/// Inserting, removing or updating an element and replacing the page data count as
/// structural mutations. Value assignment and clicks do not, matching what a
/// child-list mutation observer would report.
pub struct MemoryPage {
    state: RwLock<PageState>,
    changes: watch::Sender<u64>,
}

impl MemoryPage {
    pub fn new(location: impl Into<Location>) -> Arc<Self> {
        let (changes, _) = watch::channel(0);
        Arc::new(Self {
            state: RwLock::new(PageState {
                location: Some(location.into()),
                ..Default::default()
            }),
            changes,
        })
    }

    pub fn insert(&self, node: ElementNode) -> ElementId {
        let id = {
            let mut state = self.state.write();
            state.nodes.push(Some(node));
            ElementId(state.nodes.len() - 1)
        };
        trace!(element = id.0, "element inserted");
        self.bump();
        id
    }

    pub fn remove(&self, id: ElementId) -> bool {
        let removed = {
            let mut state = self.state.write();
            state
                .nodes
                .get_mut(id.0)
                .and_then(|slot| slot.take())
                .is_some()
        };
        if removed {
            self.bump();
        }
        removed
    }

    /// Mutate an element in place; counts as a structural mutation.
    pub fn update<F>(&self, id: ElementId, apply: F) -> bool
    where
        F: FnOnce(&mut ElementNode),
    {
        let updated = {
            let mut state = self.state.write();
            match state.nodes.get_mut(id.0).and_then(|slot| slot.as_mut()) {
                Some(node) => {
                    apply(node);
                    true
                }
                None => false,
            }
        };
        if updated {
            self.bump();
        }
        updated
    }

    /// Remove every element, keeping ids monotonic.
    pub fn clear(&self) {
        {
            let mut state = self.state.write();
            for slot in state.nodes.iter_mut() {
                *slot = None;
            }
        }
        self.bump();
    }

    pub fn set_location(&self, location: impl Into<Location>) {
        self.state.write().location = Some(location.into());
    }

    pub fn set_page_data(&self, data: Value) {
        self.state.write().data = Some(data);
        self.bump();
    }

    pub fn click_count(&self, id: ElementId) -> u32 {
        self.state.read().clicks.get(&id).copied().unwrap_or(0)
    }

    pub fn value_of(&self, id: ElementId) -> Option<String> {
        self.element(id).map(|element| element.value)
    }

    pub fn total_clicks(&self) -> u32 {
        self.state.read().clicks.values().sum()
    }

    /// How many times the framework was notified of a value change on `id`.
    pub fn change_notifications(&self, id: ElementId) -> u32 {
        self.state.read().notifications.get(&id).copied().unwrap_or(0)
    }

    pub fn total_change_notifications(&self) -> u32 {
        self.state.read().notifications.values().sum()
    }

    /// Live mutation subscriptions; zero once every wait has settled.
    pub fn mutation_subscribers(&self) -> usize {
        self.changes.receiver_count()
    }

    fn bump(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }

    fn with_node<R>(
        &self,
        id: ElementId,
        apply: impl FnOnce(&mut ElementNode) -> R,
    ) -> Result<R, ActionError> {
        let mut state = self.state.write();
        state
            .nodes
            .get_mut(id.0)
            .and_then(|slot| slot.as_mut())
            .map(apply)
            .ok_or_else(|| ActionError::ElementMissing(format!("element {} not attached", id.0)))
    }
}

impl Page for MemoryPage {
    fn location(&self) -> Location {
        self.state
            .read()
            .location
            .clone()
            .unwrap_or_else(|| Location::new(""))
    }

    fn query(&self, anchor: &AnchorDescriptor) -> Option<ElementHandle> {
        let state = self.state.read();
        state.nodes.iter().enumerate().find_map(|(idx, slot)| {
            slot.as_ref()
                .filter(|node| node.matches(anchor))
                .map(|node| node.snapshot(ElementId(idx)))
        })
    }

    fn query_all(&self, anchor: &AnchorDescriptor) -> Vec<ElementHandle> {
        let state = self.state.read();
        state
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| {
                slot.as_ref()
                    .filter(|node| node.matches(anchor))
                    .map(|node| node.snapshot(ElementId(idx)))
            })
            .collect()
    }

    fn element(&self, id: ElementId) -> Option<ElementHandle> {
        let state = self.state.read();
        state
            .nodes
            .get(id.0)
            .and_then(|slot| slot.as_ref())
            .map(|node| node.snapshot(id))
    }

    fn assign_value(&self, id: ElementId, value: &str) -> Result<(), ActionError> {
        self.with_node(id, |node| {
            node.value = value.to_string();
            for option in node.options.iter_mut() {
                option.selected = option.value == value;
            }
        })
    }

    fn notify_change(&self, id: ElementId) -> Result<(), ActionError> {
        let mut state = self.state.write();
        let attached = state
            .nodes
            .get(id.0)
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        if !attached {
            return Err(ActionError::ElementMissing(format!(
                "element {} not attached",
                id.0
            )));
        }
        *state.notifications.entry(id).or_insert(0) += 1;
        Ok(())
    }

    fn click(&self, id: ElementId) -> Result<(), ActionError> {
        self.with_node(id, |node| {
            // A label wrapping a radio selects it.
            if node.tag == "label" && node.checked.is_some() {
                node.checked = Some(true);
            }
        })?;
        *self.state.write().clicks.entry(id).or_insert(0) += 1;
        Ok(())
    }

    fn page_data(&self) -> Option<Value> {
        self.state.read().data.clone()
    }

    fn mutations(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}
