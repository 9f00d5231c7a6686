use std::sync::Arc;
use std::time::Duration;

use action_flow::{FlowContext, FlowExecutor};
use action_primitives::{CancelSignal, ExecCtx, Page};
use autopilot_core_types::{
    DispatchId, FlowId, Location, NavigationEvent, NavigationKind, Settings, StepEvent,
};
use autopilot_event_bus::EventBus;
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{Dispatcher, SettingsProvider};
use crate::error::SchedulerError;
use crate::metrics;
use crate::model::{DispatchOutcome, DispatchOutput, DispatchTimeline, RouteTable, SubmitHandle};
use crate::route_events::NavigationSource;
use crate::schedule::{delay_until, Clock, ScheduleTarget, SystemClock};

#[derive(Default)]
struct DispatchState {
    /// Cancellation context of the latest navigation, routed or not
    current: Option<CancellationToken>,
    /// Pending scheduled start, if the latest dispatch is still waiting
    pending_start: Option<CancellationToken>,
    /// Task of the latest routed dispatch; the next one waits for it
    last_task: Option<JoinHandle<()>>,
}

/// A routed dispatch waiting for its task.
struct QueuedRun {
    flow: FlowId,
    dispatch_id: DispatchId,
    settings: Settings,
    delay_ms: u64,
    context: CancellationToken,
    pending: Option<CancellationToken>,
    previous: Option<JoinHandle<()>>,
    completion: oneshot::Sender<DispatchOutput>,
}

/// Decrements the in-flight count when a flow task ends, panicking or not.
struct InFlightGuard(Arc<watch::Sender<usize>>);

impl InFlightGuard {
    fn enter(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Owns the single active cancellation context and starts routed flows.
pub struct Orchestrator {
    routes: RouteTable,
    executor: Arc<dyn FlowExecutor>,
    page: Arc<dyn Page>,
    settings: Arc<dyn SettingsProvider>,
    clock: Arc<dyn Clock>,
    events: Option<Arc<dyn EventBus<StepEvent>>>,
    state: Mutex<DispatchState>,
    /// Flow tasks spawned and not yet finished
    in_flight: Arc<watch::Sender<usize>>,
}

impl Orchestrator {
    pub fn new(
        routes: RouteTable,
        executor: Arc<dyn FlowExecutor>,
        page: Arc<dyn Page>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            routes,
            executor,
            page,
            settings,
            clock: Arc::new(SystemClock),
            events: None,
            state: Mutex::new(DispatchState::default()),
            in_flight: Arc::new(watch::channel(0).0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventBus<StepEvent>>) -> Self {
        self.events = Some(events);
        self
    }

    /// Deliver every event of `source`, in order, to this dispatcher.
    pub fn attach(
        self: &Arc<Self>,
        source: &dyn NavigationSource,
    ) -> Result<JoinHandle<()>, SchedulerError> {
        let mut events = source.subscribe().ok_or(SchedulerError::AlreadySubscribed)?;
        let dispatcher = Arc::clone(self);
        Ok(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                dispatcher.on_navigation(event);
            }
            debug!("navigation source closed");
        }))
    }

    /// Route the page the host started on, as a full page load.
    pub fn boot(&self, location: impl Into<Location>) -> DispatchOutcome {
        self.on_navigation(NavigationEvent::new(NavigationKind::Load, location))
    }

    /// Wait until every dispatched flow has finished. Dispatching while
    /// waiting is fine; the wait then covers the new flow too.
    pub async fn idle(&self) {
        let mut in_flight = self.in_flight.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = in_flight.wait_for(|count| *count == 0).await;
    }

    fn start_delay(&self, settings: &Settings) -> u64 {
        match ScheduleTarget::from_settings(&settings.common) {
            Ok(target) => delay_until(target.as_ref(), &self.clock.now()),
            Err(err) => {
                warn!(error = %err, "ignoring start schedule");
                0
            }
        }
    }

    fn spawn_run(&self, run: QueuedRun) -> JoinHandle<()> {
        let QueuedRun {
            flow,
            dispatch_id,
            settings,
            delay_ms,
            context,
            pending,
            previous,
            completion,
        } = run;
        let executor = Arc::clone(&self.executor);
        let page = Arc::clone(&self.page);
        let events = self.events.clone();
        let mut timeline = DispatchTimeline::default();
        let start_at = timeline.dispatched_at + Duration::from_millis(delay_ms);
        let in_flight = InFlightGuard::enter(&self.in_flight);

        tokio::spawn(async move {
            let _in_flight = in_flight;
            // The superseded flow stops at its next suspension point; never
            // let two flows touch the page at once.
            if let Some(previous) = previous {
                if let Err(err) = previous.await {
                    warn!(%dispatch_id, error = %err, "previous flow task ended abnormally");
                }
            }

            if let Some(pending) = pending {
                tokio::select! {
                    biased;
                    _ = pending.cancelled() => {}
                    _ = sleep_until(start_at) => {}
                }
            }

            if context.is_cancelled() {
                info!(%dispatch_id, %flow, "flow start suppressed by newer navigation");
                metrics::record_suppressed();
                let _ = completion.send(DispatchOutput::suppressed(timeline));
                return;
            }

            metrics::record_started();
            timeline.started_at = Some(Instant::now());
            let exec = ExecCtx::new(page, CancelSignal::from(&context))
                .with_action_id(dispatch_id.0.clone());
            let mut ctx = FlowContext::new(exec, dispatch_id, Arc::new(settings));
            if let Some(events) = events {
                ctx = ctx.with_events(events);
            }

            let run = executor.execute(flow, ctx).await;
            timeline.finished_at = Some(Instant::now());
            metrics::record_outcome(run.outcome);
            let _ = completion.send(DispatchOutput::ran(run, timeline));
        })
    }
}

impl Dispatcher for Orchestrator {
    fn on_navigation(&self, event: NavigationEvent) -> DispatchOutcome {
        let mut state = self.state.lock();

        // 1. Cancel the previous flow
        if let Some(previous) = state.current.take() {
            if !previous.is_cancelled() {
                previous.cancel();
                debug!("previous flow aborted");
            }
        }
        // 2. Cancel a scheduled start that has not fired yet
        if let Some(pending) = state.pending_start.take() {
            pending.cancel();
        }
        // 3. Fresh context, current even if nothing is routed
        let context = CancellationToken::new();
        state.current = Some(context.clone());

        // 4. Route
        let Some(flow) = self.routes.resolve(&event.location) else {
            info!(location = %event.location, "no route target");
            metrics::record_unrouted();
            return DispatchOutcome::Unrouted;
        };

        // 5. Schedule
        let settings = self.settings.load();
        let delay_ms = self.start_delay(&settings);
        let dispatch_id = DispatchId::new();
        let pending = if delay_ms > 0 {
            let pending = context.child_token();
            state.pending_start = Some(pending.clone());
            metrics::record_scheduled();
            info!(%dispatch_id, %flow, delay_ms, "scheduled start");
            Some(pending)
        } else {
            None
        };
        info!(
            %dispatch_id,
            %flow,
            location = %event.location,
            kind = %event.kind,
            "route matched"
        );
        metrics::record_dispatched();

        // 6. Start
        let (tx, rx) = oneshot::channel();
        let previous = state.last_task.take();
        let task = self.spawn_run(QueuedRun {
            flow,
            dispatch_id: dispatch_id.clone(),
            settings,
            delay_ms,
            context,
            pending,
            previous,
            completion: tx,
        });
        state.last_task = Some(task);

        DispatchOutcome::Dispatched(SubmitHandle {
            dispatch_id,
            flow,
            delay_ms,
            receiver: rx,
        })
    }

    fn cancel_active(&self) -> bool {
        let mut state = self.state.lock();
        if let Some(pending) = state.pending_start.take() {
            pending.cancel();
        }
        match &state.current {
            Some(current) if !current.is_cancelled() => {
                current.cancel();
                true
            }
            _ => false,
        }
    }
}
