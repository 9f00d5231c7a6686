//! Core data types for action primitives

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::primitives::Page;

/// Read-only view of a dispatch's cancellation token.
///
/// Flows and waits can observe cancellation but never trigger it; only the
/// dispatcher holding the underlying token can.
#[derive(Clone, Debug)]
pub struct CancelSignal(CancellationToken);

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolves once the owning dispatcher cancels the token.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.0.cancelled()
    }

    /// A signal that is never cancelled, for one-off runs outside a dispatcher.
    pub fn never() -> Self {
        Self(CancellationToken::new())
    }
}

impl From<&CancellationToken> for CancelSignal {
    fn from(token: &CancellationToken) -> Self {
        Self(token.clone())
    }
}

/// Execution context for action primitives
///
/// Contains everything a step needs to touch the page:
/// - The page collaborator
/// - The cancellation signal of the dispatch the step belongs to
/// - Unique action ID for tracing and correlation
#[derive(Clone)]
pub struct ExecCtx {
    /// External page state
    pub page: Arc<dyn Page>,

    /// Cancellation signal for cooperative cancellation
    pub cancel: CancelSignal,

    /// Unique identifier for this execution
    pub action_id: String,
}

impl ExecCtx {
    /// Create a new execution context
    pub fn new(page: Arc<dyn Page>, cancel: CancelSignal) -> Self {
        Self {
            page,
            cancel,
            action_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Use a caller supplied correlation id instead of a random one.
    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = action_id.into();
        self
    }

    /// Check if this context has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Anchor descriptor for element targeting
///
/// Represents different strategies for locating elements:
/// - CSS selector
/// - Form control name attribute
/// - Text content matching, optionally restricted to a tag
/// - Bare tag name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorDescriptor {
    /// CSS selector
    Css(String),

    /// `name` attribute of a form control
    Name(String),

    /// Text content (exact or partial match)
    Text {
        content: String,
        exact: bool,
        #[serde(default)]
        tag: Option<String>,
    },

    /// Every element with this tag
    Tag(String),
}

impl AnchorDescriptor {
    pub fn css(selector: impl Into<String>) -> Self {
        AnchorDescriptor::Css(selector.into())
    }

    pub fn name(name: impl Into<String>) -> Self {
        AnchorDescriptor::Name(name.into())
    }

    /// Element of the given tag whose trimmed text equals `content`.
    pub fn exact_text(tag: &str, content: impl Into<String>) -> Self {
        AnchorDescriptor::Text {
            content: content.into(),
            exact: true,
            tag: Some(tag.to_string()),
        }
    }

    /// Element of the given tag whose trimmed text contains `content`.
    pub fn partial_text(tag: &str, content: impl Into<String>) -> Self {
        AnchorDescriptor::Text {
            content: content.into(),
            exact: false,
            tag: Some(tag.to_string()),
        }
    }
}

impl fmt::Display for AnchorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnchorDescriptor::Css(s) => write!(f, "css:{}", s),
            AnchorDescriptor::Name(n) => write!(f, "name:{}", n),
            AnchorDescriptor::Text {
                content,
                exact,
                tag,
            } => {
                let mode = if *exact { "exact" } else { "partial" };
                match tag {
                    Some(tag) => write!(f, "text:{}:{}:'{}'", tag, mode, content),
                    None => write!(f, "text:{}:'{}'", mode, content),
                }
            }
            AnchorDescriptor::Tag(t) => write!(f, "tag:{}", t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub usize);

/// Option of a select control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub selected: bool,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            text: text.into(),
            hidden: false,
            selected: false,
        }
    }
}

/// Point-in-time snapshot of one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub id: ElementId,
    pub tag: String,
    pub text: String,
    pub name: Option<String>,
    pub class_name: String,
    pub disabled: bool,
    pub value: String,
    /// Checked state of the element or of the radio/checkbox it wraps.
    pub checked: Option<bool>,
    pub options: Vec<SelectOption>,
}

impl ElementHandle {
    /// Option values a quantity selector accepts; the `"0"` placeholder is excluded.
    pub fn valid_values(&self) -> Vec<String> {
        self.options
            .iter()
            .filter(|option| option.value != "0")
            .map(|option| option.value.clone())
            .collect()
    }

    /// First option whose value or text equals `item`.
    pub fn find_option(&self, item: &str) -> Option<&SelectOption> {
        self.options
            .iter()
            .find(|option| option.value == item || option.text == item)
    }
}

/// Select method for dropdown selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SelectMethod {
    /// Select by value attribute
    #[default]
    Value,

    /// Match either the value or the visible text
    ValueOrText,
}
