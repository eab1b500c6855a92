//! In-flight request coalescing
//!
//! Tracks one pending ticket per key. The first caller for a key creates the
//! ticket and receives a [`Resolver`]; everyone arriving before the ticket is
//! removed attaches to the same shared future and gets a clone of its result.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

/// A shared handle on the eventual result of one fetch
///
/// Resolves to `None` only if the owner dropped its [`Resolver`] without
/// settling it.
pub type Ticket<T> = Shared<BoxFuture<'static, Option<T>>>;

/// Settles a ticket; held by the caller that created it
#[derive(Debug)]
pub struct Resolver<T> {
    id: u64,
    tx: oneshot::Sender<T>,
}

/// Outcome of [`InFlight::get_or_create`]
pub enum Claim<T> {
    /// A fetch was already running for the key
    Existing(Ticket<T>),
    /// This caller created the ticket and must settle it
    Created {
        ticket: Ticket<T>,
        resolver: Resolver<T>,
    },
}

impl<T> Claim<T> {
    pub fn already_existed(&self) -> bool {
        matches!(self, Claim::Existing(_))
    }
}

struct Pending<T> {
    id: u64,
    ticket: Ticket<T>,
}

/// Map of pending fetches keyed by `K`
pub struct InFlight<K, T> {
    tickets: DashMap<K, Pending<T>>,
    next_id: AtomicU64,
}

impl<K, T> Default for InFlight<K, T>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self {
            tickets: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<K: Hash + Eq, T> std::fmt::Debug for InFlight<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight")
            .field("pending", &self.tickets.len())
            .finish()
    }
}

impl<K, T> InFlight<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pending ticket for `key`, creating one if none exists
    ///
    /// The lookup and the insert happen under the same shard lock, so two
    /// concurrent callers can never both receive [`Claim::Created`].
    pub fn get_or_create(&self, key: K) -> Claim<T> {
        match self.tickets.entry(key) {
            Entry::Occupied(pending) => Claim::Existing(pending.get().ticket.clone()),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel();
                let ticket: Ticket<T> = rx.map(Result::ok).boxed().shared();
                slot.insert(Pending {
                    id,
                    ticket: ticket.clone(),
                });
                Claim::Created {
                    ticket,
                    resolver: Resolver { id, tx },
                }
            }
        }
    }

    /// Delivers `value` to every waiter and removes the ticket
    ///
    /// Only the ticket this resolver created is removed; if it was already
    /// removed and replaced, the newer ticket is left alone.
    pub fn settle(&self, key: &K, resolver: Resolver<T>, value: T) {
        let Resolver { id, tx } = resolver;
        // Nobody left waiting is fine.
        let _ = tx.send(value);
        self.tickets.remove_if(key, |_, pending| pending.id == id);
    }

    /// Removes the ticket for `key`; a no-op when there is none
    pub fn remove(&self, key: &K) {
        self.tickets.remove(key);
    }

    pub fn contains(&self, key: &K) -> bool {
        self.tickets.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_second_claim_attaches_to_existing() {
        let inflight: InFlight<&str, u32> = InFlight::new();

        let first = inflight.get_or_create("schedule");
        let second = inflight.get_or_create("schedule");

        assert!(!first.already_existed());
        assert!(second.already_existed());
        assert_eq!(inflight.len(), 1);
    }

    #[tokio::test]
    async fn test_settle_delivers_to_all_waiters_and_removes() {
        let inflight: InFlight<&str, u32> = InFlight::new();

        let Claim::Created { ticket, resolver } = inflight.get_or_create("drivers") else {
            panic!("first claim must create");
        };
        let Claim::Existing(follower) = inflight.get_or_create("drivers") else {
            panic!("second claim must attach");
        };

        inflight.settle(&"drivers", resolver, 42);

        assert_eq!(ticket.await, Some(42));
        assert_eq!(follower.await, Some(42));
        assert!(inflight.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_resolver_yields_none() {
        let inflight: InFlight<&str, u32> = InFlight::new();

        let Claim::Created { ticket, resolver } = inflight.get_or_create("results") else {
            panic!("first claim must create");
        };
        drop(resolver);

        assert_eq!(ticket.await, None);
    }

    #[test]
    fn test_debug_reports_pending_count() {
        let inflight: InFlight<String, u32> = InFlight::new();
        let _claim = inflight.get_or_create("schedule".to_string());
        assert_eq!(format!("{:?}", inflight), "InFlight { pending: 1 }");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let inflight: InFlight<&str, u32> = InFlight::new();

        inflight.remove(&"missing");
        let _claim = inflight.get_or_create("present");
        inflight.remove(&"present");
        inflight.remove(&"present");

        assert!(!inflight.contains(&"present"));
    }

    #[tokio::test]
    async fn test_settle_after_remove_keeps_newer_ticket() {
        let inflight: InFlight<&str, u32> = InFlight::new();

        let Claim::Created { resolver: old, .. } = inflight.get_or_create("k") else {
            panic!("first claim must create");
        };
        inflight.remove(&"k");
        let Claim::Created { ticket: newer, resolver: new } = inflight.get_or_create("k") else {
            panic!("claim after removal must create");
        };

        inflight.settle(&"k", old, 1);
        assert!(inflight.contains(&"k"), "Stale resolver must not remove the newer ticket");

        inflight.settle(&"k", new, 2);
        assert_eq!(newer.await, Some(2));
        assert!(inflight.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_create_exactly_once() {
        let inflight: Arc<InFlight<u32, u32>> = Arc::new(InFlight::new());

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let inflight = Arc::clone(&inflight);
                tokio::spawn(async move { !inflight.get_or_create(7).already_existed() })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
    }
}
