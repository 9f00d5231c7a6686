//! Flow Orchestration Layer
//!
//! The selection and application flows, the recorder that turns their step
//! transitions into a `FlowRun`, and the executor the dispatcher calls.

pub mod application;
pub mod errors;
pub mod executor;
pub mod insight;
pub mod recorder;
pub mod selection;
pub mod types;

pub use application::ApplicationFlow;
pub use errors::FlowError;
pub use executor::{DefaultFlowExecutor, FlowExecutor};
pub use insight::{FormSchema, PageInsight};
pub use recorder::StepRecorder;
pub use selection::SelectionFlow;
pub use types::{Flow, FlowContext, SiteProfile};
