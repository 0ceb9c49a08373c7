// Selector subscriptions. Each observer keeps the last value its selector produced and only
// fires when the new value differs under the equality its author chose.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::state::TelemetryState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

trait Observer: Send {
    fn observe(&mut self, state: &TelemetryState);
}

struct SelectorObserver<T, S, E, C> {
    selector: S,
    equals: E,
    callback: C,
    last: T,
}

impl<T, S, E, C> Observer for SelectorObserver<T, S, E, C>
where
    T: Send,
    S: Fn(&TelemetryState) -> T + Send,
    E: Fn(&T, &T) -> bool + Send,
    C: FnMut(&T, &T) + Send,
{
    fn observe(&mut self, state: &TelemetryState) {
        let next = (self.selector)(state);
        if (self.equals)(&self.last, &next) {
            return;
        }
        let previous = std::mem::replace(&mut self.last, next);
        (self.callback)(&self.last, &previous);
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    observers: Vec<(SubscriptionId, Box<dyn Observer>)>,
    live: HashSet<SubscriptionId>,
    dispatching: bool,
    pending: bool,
}

/// Observer list with round-based dispatch.
///
/// During a round the observers are taken out of the registry, so callbacks may subscribe,
/// unsubscribe or mutate the store without deadlocking. Observers added mid-round join at
/// the end of the round; a publish issued mid-round schedules one more round against the
/// latest state instead of nesting. A panicking callback is logged and the round goes on;
/// the observer stays registered.
#[derive(Default)]
pub(crate) struct Subscribers {
    inner: Mutex<Registry>,
}

impl Subscribers {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add<T, S, E, C>(
        &self,
        current: &TelemetryState,
        selector: S,
        equals: E,
        callback: C,
    ) -> SubscriptionId
    where
        T: Send + 'static,
        S: Fn(&TelemetryState) -> T + Send + 'static,
        E: Fn(&T, &T) -> bool + Send + 'static,
        C: FnMut(&T, &T) + Send + 'static,
    {
        let last = selector(current);
        let observer = SelectorObserver {
            selector,
            equals,
            callback,
            last,
        };
        let mut reg = self.lock();
        let id = SubscriptionId(reg.next_id);
        reg.next_id += 1;
        reg.live.insert(id);
        reg.observers.push((id, Box::new(observer)));
        id
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut reg = self.lock();
        if !reg.live.remove(&id) {
            return false;
        }
        // Mid-round the observer is out of the list; it is dropped when the round ends.
        reg.observers.retain(|(oid, _)| *oid != id);
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().live.len()
    }

    pub(crate) fn publish(&self, current: impl Fn() -> Arc<TelemetryState>) {
        {
            let mut reg = self.lock();
            if reg.dispatching {
                reg.pending = true;
                return;
            }
            reg.dispatching = true;
        }
        loop {
            let state = current();
            let mut round = std::mem::take(&mut self.lock().observers);
            for (id, observer) in round.iter_mut() {
                let live = self.lock().live.contains(id);
                if live {
                    let observed =
                        panic::catch_unwind(AssertUnwindSafe(|| observer.observe(&state)));
                    if observed.is_err() {
                        tracing::error!(
                            operation = "publish",
                            subscription = id.0,
                            "subscriber callback panicked"
                        );
                    }
                }
            }

            let mut reg = self.lock();
            let added = std::mem::take(&mut reg.observers);
            round.extend(added);
            round.retain(|(id, _)| reg.live.contains(id));
            reg.observers = round;
            if reg.pending {
                reg.pending = false;
                continue;
            }
            reg.dispatching = false;
            break;
        }
    }
}
