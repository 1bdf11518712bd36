//! Application Lifecycle Observer
//!
//! Tracks whether the app holds foreground focus and notifies subscribers
//! once per observed transition. Reports made while handlers are running
//! (including from inside a handler) are queued and delivered in order after
//! the current transition finishes, so no handler ever sees a transition
//! re-entrantly and none is coalesced away.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Execution state as reported by the platform
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Active,
    Background,
    Inactive,
}

impl Default for AppState {
    fn default() -> Self {
        AppState::Active
    }
}

type Handler = Arc<dyn Fn(AppState, AppState) + Send + Sync>;

struct ObserverState {
    current: AppState,
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
    pending: VecDeque<(AppState, AppState)>,
    dispatching: bool,
}

/// Shared handle; clones observe the same state.
#[derive(Clone)]
pub struct LifecycleObserver {
    state: Arc<Mutex<ObserverState>>,
}

/// Registration token. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    state: Weak<Mutex<ObserverState>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            let mut state = state.lock();
            state.handlers.retain(|(id, _)| *id != self.id);
            debug!(subscription = self.id, "Lifecycle handler removed");
        }
    }
}

/// Clears the dispatching flag if a handler panics mid-dispatch.
/// A normal exit clears it under the same lock that saw the queue empty.
struct DispatchGuard<'a> {
    state: &'a Mutex<ObserverState>,
    armed: bool,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.lock().dispatching = false;
        }
    }
}

impl LifecycleObserver {
    pub fn new(initial: AppState) -> Self {
        Self {
            state: Arc::new(Mutex::new(ObserverState {
                current: initial,
                next_id: 0,
                handlers: Vec::new(),
                pending: VecDeque::new(),
                dispatching: false,
            })),
        }
    }

    pub fn current(&self) -> AppState {
        self.state.lock().current
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().handlers.len()
    }

    /// Register `handler(previous, next)` for every future transition.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(AppState, AppState) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.handlers.push((id, Arc::new(handler)));
        Subscription {
            id,
            state: Arc::downgrade(&self.state),
        }
    }

    /// Record the platform's new state. Reporting the current state again is
    /// not a transition and notifies nobody.
    pub fn report(&self, next: AppState) {
        {
            let mut state = self.state.lock();
            if state.current == next {
                return;
            }
            let previous = state.current;
            state.current = next;
            state.pending.push_back((previous, next));
            debug!(?previous, ?next, "Lifecycle transition");
            if state.dispatching {
                return;
            }
            state.dispatching = true;
        }

        let mut guard = DispatchGuard { state: &self.state, armed: true };
        loop {
            let (transition, handlers) = {
                let mut state = self.state.lock();
                match state.pending.pop_front() {
                    Some(t) => {
                        let handlers: Vec<Handler> =
                            state.handlers.iter().map(|(_, h)| Arc::clone(h)).collect();
                        (t, handlers)
                    }
                    None => {
                        state.dispatching = false;
                        guard.armed = false;
                        break;
                    }
                }
            };
            let (previous, next) = transition;
            for handler in handlers {
                handler(previous, next);
            }
        }
    }
}

impl Default for LifecycleObserver {
    fn default() -> Self {
        Self::new(AppState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(observer: &LifecycleObserver) -> (Arc<Mutex<Vec<(AppState, AppState)>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = observer.subscribe(move |prev, next| sink.lock().push((prev, next)));
        (seen, sub)
    }

    #[test]
    fn test_every_transition_delivered_once() {
        let observer = LifecycleObserver::new(AppState::Active);
        let (seen, _sub) = recorder(&observer);

        observer.report(AppState::Inactive);
        observer.report(AppState::Background);
        observer.report(AppState::Active);

        assert_eq!(
            *seen.lock(),
            vec![
                (AppState::Active, AppState::Inactive),
                (AppState::Inactive, AppState::Background),
                (AppState::Background, AppState::Active),
            ]
        );
        assert_eq!(observer.current(), AppState::Active);
    }

    #[test]
    fn test_same_state_is_not_a_transition() {
        let observer = LifecycleObserver::new(AppState::Active);
        let (seen, _sub) = recorder(&observer);
        observer.report(AppState::Active);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let observer = LifecycleObserver::new(AppState::Active);
        let (seen, sub) = recorder(&observer);
        assert_eq!(observer.subscriber_count(), 1);
        drop(sub);
        assert_eq!(observer.subscriber_count(), 0);
        observer.report(AppState::Background);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_report_from_handler_is_queued_not_reentrant() {
        let observer = LifecycleObserver::new(AppState::Background);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let depth = Arc::new(Mutex::new(0u32));

        let inner = observer.clone();
        let sink = Arc::clone(&seen);
        let in_handler = Arc::clone(&depth);
        let _sub = observer.subscribe(move |prev, next| {
            *in_handler.lock() += 1;
            assert_eq!(*in_handler.lock(), 1, "handler entered re-entrantly");
            sink.lock().push((prev, next));
            if next == AppState::Active {
                inner.report(AppState::Inactive);
            }
            *in_handler.lock() -= 1;
        });

        observer.report(AppState::Active);

        assert_eq!(
            *seen.lock(),
            vec![
                (AppState::Background, AppState::Active),
                (AppState::Active, AppState::Inactive),
            ]
        );
    }

    #[test]
    fn test_concurrent_reports_form_unbroken_chain() {
        let observer = LifecycleObserver::new(AppState::Active);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(Mutex::new(0u32));
        let overlapped = Arc::new(Mutex::new(false));

        let _sub = {
            let seen = Arc::clone(&seen);
            let running = Arc::clone(&running);
            let overlapped = Arc::clone(&overlapped);
            observer.subscribe(move |prev, next| {
                {
                    let mut running = running.lock();
                    *running += 1;
                    if *running > 1 {
                        *overlapped.lock() = true;
                    }
                }
                seen.lock().push((prev, next));
                *running.lock() -= 1;
            })
        };

        let reporters: Vec<_> = [
            [AppState::Background, AppState::Active],
            [AppState::Inactive, AppState::Background],
        ]
        .into_iter()
        .map(|states| {
            let observer = observer.clone();
            std::thread::spawn(move || {
                for i in 0..2000 {
                    observer.report(states[i % 2]);
                }
            })
        })
        .collect();
        for reporter in reporters {
            reporter.join().unwrap();
        }

        let seen = seen.lock();
        assert!(!seen.is_empty());
        assert!(!*overlapped.lock());
        assert_eq!(seen[0].0, AppState::Active);
        for pair in seen.windows(2) {
            assert_eq!(pair[0].1, pair[1].0, "transition lost between deliveries");
        }
        assert_eq!(seen.last().map(|t| t.1), Some(observer.current()));
    }
}

