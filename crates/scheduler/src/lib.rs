pub mod api;
pub mod error;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod route_events;
pub mod schedule;

pub use api::{Dispatcher, SettingsProvider, SharedSettings};
pub use error::SchedulerError;
pub use model::{DispatchOutcome, DispatchOutput, RouteRule, RouteTable, SubmitHandle};
pub use orchestrator::Orchestrator;
pub use route_events::{HistoryNavigationSource, NavigationReceiver, NavigationSource};
pub use schedule::{delay_until, Clock, FixedClock, ScheduleTarget, SystemClock};
