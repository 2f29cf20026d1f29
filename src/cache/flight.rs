//! In-flight computation tracking for single-flight caches.

use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex};

use dashmap::DashMap;

use crate::lock::{condvar_wait_until, mutex_lock};

const SOURCE: &str = "cache::flight";

/// Tracks keys that currently have a computation running.
///
/// The first caller to [`InFlight::join`] a key becomes its leader; later
/// callers receive the leader's [`Flight`] and block on it until the leader's
/// guard is dropped, whether the computation succeeded, failed or panicked.
pub(crate) struct InFlight<K> {
    flights: DashMap<K, Arc<Flight>>,
}

pub(crate) enum Role<'a, K: Eq + Hash> {
    Leader(FlightGuard<'a, K>),
    Follower(Arc<Flight>),
}

#[derive(Default)]
pub(crate) struct Flight {
    landed: Mutex<bool>,
    signal: Condvar,
}

impl Flight {
    /// Block until the leader of this flight has finished.
    pub(crate) fn wait(&self) {
        let guard = mutex_lock(&self.landed, SOURCE, "wait");
        let _guard = condvar_wait_until(&self.signal, guard, SOURCE, "wait", |landed| *landed);
    }

    fn land(&self) {
        *mutex_lock(&self.landed, SOURCE, "land") = true;
        self.signal.notify_all();
    }
}

impl<K: Eq + Hash + Clone> InFlight<K> {
    pub(crate) fn new() -> Self {
        Self {
            flights: DashMap::new(),
        }
    }

    pub(crate) fn join(&self, key: &K) -> Role<'_, K> {
        use dashmap::mapref::entry::Entry;

        match self.flights.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                let flight = Arc::new(Flight::default());
                vacant.insert(Arc::clone(&flight));
                Role::Leader(FlightGuard {
                    key: key.clone(),
                    flight,
                    flights: &self.flights,
                })
            }
            Entry::Occupied(occupied) => Role::Follower(Arc::clone(occupied.get())),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.flights.len()
    }
}

pub(crate) struct FlightGuard<'a, K: Eq + Hash> {
    key: K,
    flight: Arc<Flight>,
    flights: &'a DashMap<K, Arc<Flight>>,
}

impl<K: Eq + Hash> Drop for FlightGuard<'_, K> {
    fn drop(&mut self) {
        self.flights.remove(&self.key);
        self.flight.land();
    }
}
