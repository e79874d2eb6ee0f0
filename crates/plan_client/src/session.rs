use std::{
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use shared::{
    domain::{FormInput, MealPlan, PlanId, PlanResult, SessionState},
    error::RequestError,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    builder::{build, PlanRequest},
    transport::{send_with_deadline, HttpTransport, PlanTransport},
    validator::validate,
    ClientConfig,
};

pub const CANCELLED_MESSAGE: &str = "request cancelled";

type Listener = Arc<dyn Fn(&SessionState) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A request is now in flight; its result arrives through subscribers.
    Started { generation: u64 },
    /// A request was already in flight; the submit was dropped.
    Ignored,
    /// The form failed validation and the session moved to `Failed`.
    Rejected(RequestError),
}

struct SessionInner {
    state: SessionState,
    generation: u64,
    in_flight: Option<JoinHandle<()>>,
    listeners: Vec<(u64, Listener)>,
    next_listener_id: u64,
    pending: VecDeque<SessionState>,
    notifying: bool,
}

/// Drives one form through Idle → Submitting → Succeeded/Failed.
///
/// At most one request is in flight; a submit while `Submitting` is ignored.
/// Each transition is queued and delivered to every listener in order. The
/// thread that made a transition delivers it before returning, unless it is
/// already delivering, in which case the transition waits its turn.
pub struct PlanSession {
    transport: Arc<dyn PlanTransport>,
    config: ClientConfig,
    inner: Arc<Mutex<SessionInner>>,
}

/// Handle returned by [`PlanSession::subscribe`]. Dropping it keeps the
/// listener registered; call [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: u64,
    inner: Weak<Mutex<SessionInner>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

impl PlanSession {
    pub fn new(config: ClientConfig) -> Arc<Self> {
        Self::new_with_transport(config, Arc::new(HttpTransport::new()))
    }

    pub fn new_with_transport(
        config: ClientConfig,
        transport: Arc<dyn PlanTransport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            config,
            inner: Arc::new(Mutex::new(SessionInner {
                state: SessionState::Idle,
                generation: 0,
                in_flight: None,
                listeners: Vec::new(),
                next_listener_id: 0,
                pending: VecDeque::new(),
                notifying: false,
            })),
        })
    }

    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribes a channel that receives every transition in order.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<SessionState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |state| {
            let _ = tx.send(state.clone());
        });
        (subscription, rx)
    }

    /// Validates `input` and starts a request on the current Tokio runtime.
    pub fn submit(self: &Arc<Self>, input: FormInput) -> SubmitOutcome {
        let mut inner = self.lock();
        if inner.state.is_submitting() {
            debug!(generation = inner.generation, "submit ignored while a request is in flight");
            return SubmitOutcome::Ignored;
        }

        let request = match build(input) {
            Ok(request) => request,
            Err(err) => {
                info!(error = %err, "plan form rejected");
                self.commit(inner, SessionState::Failed(err.clone()));
                return SubmitOutcome::Rejected(err);
            }
        };

        inner.generation += 1;
        let generation = inner.generation;
        info!(
            generation,
            endpoint = %self.config.endpoint,
            diet = ?request.diet(),
            goal = request.goal(),
            named = request.name().is_some(),
            "submitting plan request"
        );
        self.commit(inner, SessionState::Submitting);

        // A listener may have cancelled during the Submitting notification.
        if self.lock().generation != generation {
            return SubmitOutcome::Started { generation };
        }

        let session = Arc::clone(self);
        let handle = tokio::spawn(async move { session.run(generation, request).await });

        let mut inner = self.lock();
        if inner.generation == generation && inner.state.is_submitting() {
            inner.in_flight = Some(handle);
        }
        SubmitOutcome::Started { generation }
    }

    /// Abandons the in-flight request. Returns `false` when nothing was in
    /// flight.
    pub fn cancel(&self) -> bool {
        let mut inner = self.lock();
        if !inner.state.is_submitting() {
            return false;
        }
        inner.generation += 1;
        if let Some(handle) = inner.in_flight.take() {
            handle.abort();
        }
        info!(generation = inner.generation, "plan request cancelled");
        self.commit(
            inner,
            SessionState::Failed(RequestError::Network(CANCELLED_MESSAGE.to_string())),
        );
        true
    }

    /// Confirms one candidate from a `Choices` result with the service. On
    /// success the session narrows to `Succeeded(Single(plan))`; on failure
    /// the choices stay in place and the error is returned.
    pub async fn confirm_selection(&self, plan_id: &PlanId) -> Result<MealPlan, RequestError> {
        let Some(endpoint) = self.config.confirm_endpoint.clone() else {
            return Err(RequestError::validation(
                "No confirmation endpoint is configured",
            ));
        };

        let (plan, generation) = {
            let inner = self.lock();
            let candidate = match &inner.state {
                SessionState::Succeeded(result @ PlanResult::Choices(_)) => {
                    result.candidate(plan_id)
                }
                _ => {
                    return Err(RequestError::validation(
                        "There are no plan choices to confirm",
                    ))
                }
            };
            match candidate {
                Some(candidate) => (candidate.plan.clone(), inner.generation),
                None => {
                    return Err(RequestError::validation(format!(
                        "Unknown plan id {plan_id}"
                    )))
                }
            }
        };

        info!(%plan_id, %endpoint, "confirming plan selection");
        let timeout = self.config.timeout;
        send_with_deadline(
            timeout,
            self.transport.confirm_selection(plan_id, &endpoint, timeout),
        )
        .await
        .inspect_err(|err| warn!(%plan_id, error = %err, "plan selection failed"))?;

        let inner = self.lock();
        let still_choosing = inner.generation == generation
            && matches!(inner.state, SessionState::Succeeded(PlanResult::Choices(_)));
        if still_choosing {
            self.commit(inner, SessionState::Succeeded(PlanResult::Single(plan.clone())));
        } else {
            debug!(%plan_id, "session moved on before selection was confirmed");
        }
        Ok(plan)
    }

    async fn run(self: Arc<Self>, generation: u64, request: PlanRequest) {
        let timeout = self.config.timeout;
        let outcome = send_with_deadline(
            timeout,
            self.transport.send(&request, &self.config.endpoint, timeout),
        )
        .await
        .and_then(|raw| validate(&raw));

        let next = match outcome {
            Ok(result) => {
                info!(generation, "plan request succeeded");
                SessionState::Succeeded(result)
            }
            Err(err) => {
                warn!(generation, error = %err, "plan request failed");
                SessionState::Failed(err)
            }
        };

        let mut inner = self.lock();
        if inner.generation != generation || !inner.state.is_submitting() {
            debug!(generation, current = inner.generation, "discarding stale plan response");
            return;
        }
        inner.in_flight = None;
        self.commit(inner, next);
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `next` and drains the notification queue. Listeners run without
    /// the lock held so they may call back into the session. A panicking
    /// listener is logged and skipped.
    fn commit<'a>(&'a self, mut inner: MutexGuard<'a, SessionInner>, next: SessionState) {
        inner.state = next.clone();
        inner.pending.push_back(next);
        if inner.notifying {
            return;
        }
        inner.notifying = true;

        loop {
            let Some(state) = inner.pending.pop_front() else {
                inner.notifying = false;
                return;
            };
            let listeners: Vec<(u64, Listener)> = inner.listeners.clone();
            drop(inner);
            for (id, listener) in listeners {
                if panic::catch_unwind(AssertUnwindSafe(|| listener(&state))).is_err() {
                    warn!(listener = id, "session listener panicked");
                }
            }
            inner = self.lock();
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
