//! Debounced, per-session coalescing of suggestion queries.
//!
//! Terminal output arrives in bursts; only the settled state after a burst is
//! worth asking about. Every append snapshot overwrites the pending context
//! of its session and restarts that session's quiet-period timer. When the
//! timer fires the pending context is dispatched, unless a query for the
//! session is still in flight. At most one query per session is ever out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::{SuggestionService, Suggestions, TerminalContext};
use crate::error::SessionError;
use crate::session::InstanceId;
use crate::surface::OutputSnapshot;

/// Default quiet period before a query goes out.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(5000);

/// Timer and query completions, tagged with the generation that armed them so
/// stale ones can be told apart.
#[derive(Debug)]
pub enum CoalescerEvent {
    TimerFired {
        instance_id: InstanceId,
        generation: u64,
    },
    QueryFinished {
        instance_id: InstanceId,
        generation: u64,
        result: Result<Suggestions, SessionError>,
    },
}

/// Fresh suggestions for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionUpdate {
    pub instance_id: InstanceId,
    pub suggestions: Suggestions,
}

/// Coalescing state of one session.
#[derive(Debug, Default)]
struct SuggestionRequest {
    /// Latest context not yet dispatched.
    pending_context: Option<TerminalContext>,
    timer: Option<(u64, JoinHandle<()>)>,
    in_flight: bool,
    query: Option<(u64, JoinHandle<()>)>,
}

impl SuggestionRequest {
    fn cancel_timer(&mut self) {
        if let Some((_, timer)) = self.timer.take() {
            timer.abort();
        }
    }

    fn cancel_all(&mut self) {
        self.cancel_timer();
        if let Some((_, query)) = self.query.take() {
            query.abort();
        }
        self.in_flight = false;
        self.pending_context = None;
    }
}

pub struct SuggestionCoalescer {
    service: Arc<dyn SuggestionService>,
    debounce: Duration,
    requests: HashMap<InstanceId, SuggestionRequest>,
    next_generation: u64,
    events_tx: mpsc::UnboundedSender<CoalescerEvent>,
    events_rx: mpsc::UnboundedReceiver<CoalescerEvent>,
}

impl SuggestionCoalescer {
    pub fn new(service: Arc<dyn SuggestionService>, debounce: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            service,
            debounce,
            requests: HashMap::new(),
            next_generation: 0,
            events_tx,
            events_rx,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    fn generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Record a snapshot for a session.
    ///
    /// Returns `false` if the snapshot was discarded because it was not
    /// caused by appended output.
    pub fn observe(
        &mut self,
        instance_id: InstanceId,
        snapshot: &OutputSnapshot,
        additional_context: &str,
    ) -> bool {
        if !snapshot.is_appending {
            trace!(instance_id, "ignoring non-append snapshot");
            return false;
        }

        let generation = self.generation();
        let timer = self.spawn_timer(instance_id, generation);

        let request = self.requests.entry(instance_id).or_default();
        request.pending_context = Some(TerminalContext {
            viewport: snapshot.viewport.clone(),
            current_line: snapshot.cursor_line.clone(),
            additional_context: additional_context.to_string(),
        });
        request.cancel_timer();
        request.timer = Some((generation, timer));
        true
    }

    fn spawn_timer(&self, instance_id: InstanceId, generation: u64) -> JoinHandle<()> {
        let deadline = Instant::now() + self.debounce;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = events.send(CoalescerEvent::TimerFired {
                instance_id,
                generation,
            });
        })
    }

    fn dispatch(&mut self, instance_id: InstanceId, context: TerminalContext) {
        let generation = self.generation();
        let service = Arc::clone(&self.service);
        let events = self.events_tx.clone();

        debug!(instance_id, generation, "dispatching suggestion query");
        let task = tokio::spawn(async move {
            let result = service.query(context).await;
            let _ = events.send(CoalescerEvent::QueryFinished {
                instance_id,
                generation,
                result,
            });
        });

        let request = self.requests.entry(instance_id).or_default();
        request.in_flight = true;
        request.query = Some((generation, task));
    }

    /// Wait for the next timer or query completion.
    pub async fn next_event(&mut self) -> Option<CoalescerEvent> {
        self.events_rx.recv().await
    }

    /// Apply a timer or query completion. Returns suggestions that should be
    /// shown.
    pub fn handle_event(&mut self, event: CoalescerEvent) -> Option<SuggestionUpdate> {
        match event {
            CoalescerEvent::TimerFired {
                instance_id,
                generation,
            } => {
                self.on_timer(instance_id, generation);
                None
            }
            CoalescerEvent::QueryFinished {
                instance_id,
                generation,
                result,
            } => self.on_query_finished(instance_id, generation, result),
        }
    }

    fn on_timer(&mut self, instance_id: InstanceId, generation: u64) {
        let Some(request) = self.requests.get_mut(&instance_id) else {
            return;
        };
        if request.timer.as_ref().map(|(g, _)| *g) != Some(generation) {
            trace!(instance_id, generation, "stale timer");
            return;
        }
        request.timer = None;

        if request.in_flight {
            // Completion handling re-arms for whatever is pending by then.
            debug!(instance_id, "query in flight, deferring");
            return;
        }
        if let Some(context) = request.pending_context.take() {
            self.dispatch(instance_id, context);
        }
    }

    fn on_query_finished(
        &mut self,
        instance_id: InstanceId,
        generation: u64,
        result: Result<Suggestions, SessionError>,
    ) -> Option<SuggestionUpdate> {
        let request = self.requests.get_mut(&instance_id)?;
        if request.query.as_ref().map(|(g, _)| *g) != Some(generation) {
            trace!(instance_id, generation, "dropping stale query result");
            return None;
        }
        request.query = None;
        request.in_flight = false;

        if request.pending_context.is_some() && request.timer.is_none() {
            let next = self.generation();
            let timer = self.spawn_timer(instance_id, next);
            if let Some(request) = self.requests.get_mut(&instance_id) {
                request.timer = Some((next, timer));
            }
        }

        match result {
            Ok(suggestions) => {
                debug!(instance_id, count = suggestions.items.len(), "suggestions received");
                Some(SuggestionUpdate {
                    instance_id,
                    suggestions,
                })
            }
            Err(e) => {
                warn!(instance_id, error = %e, "suggestion query failed");
                None
            }
        }
    }

    /// Drop everything pending or in flight for a session that went away.
    pub fn forget(&mut self, instance_id: InstanceId) {
        if let Some(mut request) = self.requests.remove(&instance_id) {
            request.cancel_all();
            debug!(instance_id, "suggestion state dropped");
        }
    }

    pub fn is_in_flight(&self, instance_id: InstanceId) -> bool {
        self.requests
            .get(&instance_id)
            .is_some_and(|r| r.in_flight)
    }

    pub fn has_pending(&self, instance_id: InstanceId) -> bool {
        self.requests
            .get(&instance_id)
            .is_some_and(|r| r.pending_context.is_some())
    }

    pub fn has_timer(&self, instance_id: InstanceId) -> bool {
        self.requests
            .get(&instance_id)
            .is_some_and(|r| r.timer.is_some())
    }
}

impl Drop for SuggestionCoalescer {
    fn drop(&mut self) {
        for request in self.requests.values_mut() {
            request.cancel_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockService {
        calls: Mutex<Vec<(Instant, TerminalContext)>>,
        delay: Duration,
        fail: bool,
    }

    impl MockService {
        fn calls(&self) -> Vec<(Instant, TerminalContext)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SuggestionService for MockService {
        async fn query(&self, context: TerminalContext) -> Result<Suggestions, SessionError> {
            self.calls
                .lock()
                .unwrap()
                .push((Instant::now(), context.clone()));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(SessionError::QueryFailed("model unavailable".to_string()));
            }
            Ok(Suggestions {
                items: vec![format!("{} --help", context.current_line)],
                observation: "testing".to_string(),
                received_at: Utc::now(),
            })
        }
    }

    fn snapshot(line: &str) -> OutputSnapshot {
        OutputSnapshot {
            viewport: format!("$ {line}"),
            cursor_line: line.to_string(),
            is_appending: true,
        }
    }

    fn coalescer(service: &Arc<MockService>) -> SuggestionCoalescer {
        SuggestionCoalescer::new(service.clone(), DEFAULT_DEBOUNCE)
    }

    /// Handle events until nothing happens for a minute of virtual time.
    async fn pump(coalescer: &mut SuggestionCoalescer) -> Vec<SuggestionUpdate> {
        let mut updates = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(60), coalescer.next_event()).await
        {
            updates.extend(coalescer.handle_event(event));
        }
        updates
    }

    #[tokio::test(start_paused = true)]
    async fn burst_within_window_collapses_into_one_query_with_latest_context() {
        let service = Arc::new(MockService::default());
        let mut coalescer = coalescer(&service);
        let start = Instant::now();

        assert!(coalescer.observe(1, &snapshot("first"), ""));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(coalescer.observe(1, &snapshot("second"), ""));

        let updates = pump(&mut coalescer).await;
        let calls = service.calls();

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0 - start, Duration::from_millis(6000));
        assert_eq!(calls[0].1.current_line, "second");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].instance_id, 1);
        assert_eq!(updates[0].suggestions.items, vec!["second --help".to_string()]);
        assert!(!coalescer.is_in_flight(1));
    }

    #[tokio::test(start_paused = true)]
    async fn many_snapshots_dispatch_exactly_once() {
        let service = Arc::new(MockService::default());
        let mut coalescer = coalescer(&service);

        for i in 0..20 {
            coalescer.observe(3, &snapshot(&format!("line {i}")), "cwd: ~/src");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        pump(&mut coalescer).await;

        let calls = service.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.current_line, "line 19");
        assert_eq!(calls[0].1.additional_context, "cwd: ~/src");
    }

    #[tokio::test(start_paused = true)]
    async fn non_append_snapshots_are_discarded() {
        let service = Arc::new(MockService::default());
        let mut coalescer = coalescer(&service);

        let redraw = OutputSnapshot {
            is_appending: false,
            ..snapshot("ls")
        };
        assert!(!coalescer.observe(1, &redraw, ""));
        assert!(!coalescer.has_timer(1));

        pump(&mut coalescer).await;
        assert!(service.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_are_debounced_independently() {
        let service = Arc::new(MockService::default());
        let mut coalescer = coalescer(&service);

        coalescer.observe(1, &snapshot("one"), "");
        coalescer.observe(2, &snapshot("two"), "");
        let updates = pump(&mut coalescer).await;

        assert_eq!(service.calls().len(), 2);
        let mut ids: Vec<_> = updates.iter().map(|u| u.instance_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_firing_during_flight_defers_until_completion() {
        let service = Arc::new(MockService {
            delay: Duration::from_secs(8),
            ..Default::default()
        });
        let mut coalescer = coalescer(&service);
        let start = Instant::now();

        coalescer.observe(1, &snapshot("first"), "");
        // Let the first query go out at t=5s.
        let event = coalescer.next_event().await.unwrap();
        coalescer.handle_event(event);
        assert!(coalescer.is_in_flight(1));

        tokio::time::sleep(Duration::from_secs(1)).await;
        coalescer.observe(1, &snapshot("second"), "");

        let updates = pump(&mut coalescer).await;
        let calls = service.calls();

        // Second timer fires at 11s while the first query runs until 13s;
        // completion re-arms and the second query goes out at 18s.
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0 - start, Duration::from_secs(5));
        assert_eq!(calls[1].0 - start, Duration::from_secs(18));
        assert_eq!(calls[1].1.current_line, "second");
        assert_eq!(updates.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_query_clears_flight_and_does_not_retry() {
        let service = Arc::new(MockService {
            fail: true,
            ..Default::default()
        });
        let mut coalescer = coalescer(&service);

        coalescer.observe(1, &snapshot("ls"), "");
        let updates = pump(&mut coalescer).await;

        assert!(updates.is_empty());
        assert_eq!(service.calls().len(), 1);
        assert!(!coalescer.is_in_flight(1));
        assert!(!coalescer.has_timer(1));

        // The next snapshot starts a fresh cycle.
        coalescer.observe(1, &snapshot("ls -la"), "");
        pump(&mut coalescer).await;
        assert_eq!(service.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn forgotten_session_never_applies_in_flight_result() {
        let service = Arc::new(MockService {
            delay: Duration::from_secs(3),
            ..Default::default()
        });
        let mut coalescer = coalescer(&service);

        coalescer.observe(1, &snapshot("make"), "");
        let event = coalescer.next_event().await.unwrap();
        coalescer.handle_event(event);
        assert!(coalescer.is_in_flight(1));

        coalescer.forget(1);
        assert!(pump(&mut coalescer).await.is_empty());
        assert_eq!(service.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn result_queued_before_forget_is_dropped() {
        let service = Arc::new(MockService::default());
        let mut coalescer = coalescer(&service);

        coalescer.observe(1, &snapshot("cargo"), "");
        let fired = coalescer.next_event().await.unwrap();
        coalescer.handle_event(fired);
        let finished = coalescer.next_event().await.unwrap();
        assert!(matches!(finished, CoalescerEvent::QueryFinished { .. }));

        coalescer.forget(1);
        assert!(coalescer.handle_event(finished).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn forget_cancels_pending_timer() {
        let service = Arc::new(MockService::default());
        let mut coalescer = coalescer(&service);

        coalescer.observe(1, &snapshot("vim"), "");
        assert!(coalescer.has_pending(1));
        coalescer.forget(1);

        pump(&mut coalescer).await;
        assert!(service.calls().is_empty());
        assert!(!coalescer.has_pending(1));
    }
}
