//! # Dispatch Core
//!
//! Owns the subscription table and performs fan-out.
//!
//! ```text
//!   publish("a:b:c")
//!        │
//!        ├── by_pattern["a:b:c"]  ─┐
//!        ├── by_pattern["a:*"]     │
//!        ├── by_pattern["a:b:*"]   ├─ dedup by handler ─▶ spawn 1 task each
//!        ├── by_pattern["*"]       │
//!        └── by_correlation[cid] ──┘
//! ```
//!
//! The table sits behind a `parking_lot::RwLock` held only while collecting
//! entries; handlers run on spawned tasks, never under the lock.

use crate::errors::{panic_message, BusFault};
use crate::handler::EventHandler;
use crate::subscription::{ReplyFilter, SubscribeOptions, SubscriptionId};
use futures::FutureExt;
use nexus_types::{CorrelationId, Envelope, Pattern};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug_span, Instrument};

/// Receives handler failures caught on dispatch tasks.
pub(crate) trait FaultObserver: Clone + Send + Sync + 'static {
    fn handler_failed(&self, fault: BusFault, envelope: &Envelope);
}

pub(crate) struct Entry {
    id: SubscriptionId,
    pattern: Pattern,
    handler: Arc<dyn EventHandler>,
    once: bool,
    reply_to: Option<ReplyFilter>,
    /// Set by the first publish that selects a `once` entry.
    claimed: AtomicBool,
}

impl Entry {
    /// Identity used for per-publish de-duplication.
    fn handler_key(&self) -> *const () {
        Arc::as_ptr(&self.handler).cast::<()>()
    }

    fn fault(&self, envelope: &Envelope, message: String, panicked: bool) -> BusFault {
        BusFault::Handler {
            handler: self.handler.name().to_string(),
            subscription: self.id,
            event_type: envelope.event_type().clone(),
            event_id: envelope.id(),
            message,
            panicked,
        }
    }
}

enum Slot {
    Pattern(Pattern),
    Correlation(CorrelationId),
}

#[derive(Default)]
struct SubscriptionTable {
    by_pattern: HashMap<Pattern, Vec<Arc<Entry>>>,
    by_correlation: HashMap<CorrelationId, Vec<Arc<Entry>>>,
    index: HashMap<SubscriptionId, Slot>,
}

impl SubscriptionTable {
    fn insert(&mut self, entry: Arc<Entry>) {
        let slot = match &entry.reply_to {
            Some(filter) => {
                self.by_correlation
                    .entry(filter.correlation_id.clone())
                    .or_default()
                    .push(Arc::clone(&entry));
                Slot::Correlation(filter.correlation_id.clone())
            }
            None => {
                self.by_pattern
                    .entry(entry.pattern.clone())
                    .or_default()
                    .push(Arc::clone(&entry));
                Slot::Pattern(entry.pattern.clone())
            }
        };
        self.index.insert(entry.id, slot);
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let Some(slot) = self.index.remove(&id) else {
            return false;
        };
        match slot {
            Slot::Pattern(pattern) => remove_from(&mut self.by_pattern, &pattern, id),
            Slot::Correlation(cid) => remove_from(&mut self.by_correlation, &cid, id),
        }
        true
    }
}

fn remove_from<K>(map: &mut HashMap<K, Vec<Arc<Entry>>>, key: &K, id: SubscriptionId)
where
    K: std::hash::Hash + Eq,
{
    if let Some(bucket) = map.get_mut(key) {
        bucket.retain(|entry| entry.id != id);
        if bucket.is_empty() {
            map.remove(key);
        }
    }
}

/// The subscription table plus fan-out.
#[derive(Default)]
pub(crate) struct Dispatcher {
    table: RwLock<SubscriptionTable>,
}

impl Dispatcher {
    pub(crate) fn insert(
        &self,
        pattern: Pattern,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> SubscriptionId {
        let (once, reply_to) = options.into_parts();
        let id = SubscriptionId::next();
        let entry = Arc::new(Entry {
            id,
            pattern,
            handler,
            once,
            reply_to,
            claimed: AtomicBool::new(false),
        });
        self.table.write().insert(entry);
        id
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        self.table.write().remove(id)
    }

    /// Drop every subscription. Returns how many were removed.
    pub(crate) fn clear(&self) -> usize {
        let mut table = self.table.write();
        let removed = table.index.len();
        *table = SubscriptionTable::default();
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.table.read().index.len()
    }

    /// Pending reply subscriptions (in-flight requests).
    pub(crate) fn pending_replies(&self) -> usize {
        self.table.read().by_correlation.values().map(Vec::len).sum()
    }

    pub(crate) fn counts_by_pattern(&self) -> BTreeMap<String, usize> {
        self.table
            .read()
            .by_pattern
            .iter()
            .map(|(pattern, bucket)| (pattern.to_string(), bucket.len()))
            .collect()
    }

    /// Entries to invoke for `envelope`, at most one per handler.
    ///
    /// `once` entries are claimed atomically, so two concurrent publishes
    /// never both fire the same one, and are then removed from the table.
    fn matching(&self, envelope: &Envelope) -> Vec<Arc<Entry>> {
        let mut matched = Vec::new();
        let mut fired_once = Vec::new();

        {
            let table = self.table.read();
            let candidates = Pattern::candidates(envelope.event_type());

            let by_pattern = candidates
                .iter()
                .filter_map(|pattern| table.by_pattern.get(pattern))
                .flatten();
            let by_correlation = envelope
                .correlation_id()
                .and_then(|cid| table.by_correlation.get(cid))
                .into_iter()
                .flatten()
                .filter(|entry| {
                    entry
                        .reply_to
                        .as_ref()
                        .is_some_and(|filter| filter.request_id != envelope.id())
                });

            let mut seen: HashSet<*const ()> = HashSet::new();
            for entry in by_pattern.chain(by_correlation) {
                if seen.contains(&entry.handler_key()) {
                    continue;
                }
                if entry.once && entry.claimed.swap(true, Ordering::AcqRel) {
                    continue;
                }
                seen.insert(entry.handler_key());
                if entry.once {
                    fired_once.push(entry.id);
                }
                matched.push(Arc::clone(entry));
            }
        }

        if !fired_once.is_empty() {
            let mut table = self.table.write();
            for id in fired_once {
                table.remove(id);
            }
        }

        matched
    }

    /// Spawn one task per matched handler and return without awaiting them.
    ///
    /// Returns the number of handlers scheduled.
    pub(crate) fn fan_out<O: FaultObserver>(
        &self,
        runtime: &Handle,
        envelope: Arc<Envelope>,
        observer: &O,
    ) -> usize {
        let entries = self.matching(&envelope);

        for entry in &entries {
            let entry = Arc::clone(entry);
            let envelope = Arc::clone(&envelope);
            let observer = observer.clone();
            let span = debug_span!(
                "handler",
                subscription_id = %entry.id,
                handler = %entry.handler.name(),
                event_type = %envelope.event_type(),
            );

            runtime.spawn(
                async move {
                    let outcome = AssertUnwindSafe(entry.handler.handle(Arc::clone(&envelope)))
                        .catch_unwind()
                        .await;

                    let fault = match outcome {
                        Ok(Ok(())) => return,
                        Ok(Err(err)) => entry.fault(&envelope, format!("{err:#}"), false),
                        Err(panic) => entry.fault(&envelope, panic_message(panic.as_ref()), true),
                    };
                    observer.handler_failed(fault, &envelope);
                }
                .instrument(span),
            );
        }

        entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use nexus_types::EventType;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Clone, Default)]
    struct Faults(Arc<Mutex<Vec<BusFault>>>);

    impl FaultObserver for Faults {
        fn handler_failed(&self, fault: BusFault, _envelope: &Envelope) {
            self.0.lock().push(fault);
        }
    }

    fn envelope(ty: &str) -> Envelope {
        Envelope::new(EventType::parse(ty).unwrap(), json!({}), "TEST", 0)
    }

    fn noop() -> Arc<dyn EventHandler> {
        handler_fn("noop", |_| async { Ok(()) })
    }

    fn explode() -> anyhow::Result<()> {
        panic!("panicking handler")
    }

    fn pattern(p: &str) -> Pattern {
        Pattern::parse(p).unwrap()
    }

    #[test]
    fn test_matching_covers_all_candidate_buckets() {
        let dispatcher = Dispatcher::default();
        for p in ["a:b:c", "a:*", "a:b:*", "*", "a:x", "b:*"] {
            dispatcher.insert(pattern(p), noop(), SubscribeOptions::default());
        }
        assert_eq!(dispatcher.matching(&envelope("a:b:c")).len(), 4);
        assert_eq!(dispatcher.matching(&envelope("a:b")).len(), 3);
        assert_eq!(dispatcher.matching(&envelope("c")).len(), 1);
    }

    #[test]
    fn test_same_handler_on_two_patterns_matches_once() {
        let dispatcher = Dispatcher::default();
        let shared = noop();
        dispatcher.insert(pattern("order:*"), Arc::clone(&shared), SubscribeOptions::default());
        dispatcher.insert(pattern("*"), shared, SubscribeOptions::default());
        assert_eq!(dispatcher.matching(&envelope("order:created")).len(), 1);
    }

    #[test]
    fn test_once_entry_fires_once_and_is_removed() {
        let dispatcher = Dispatcher::default();
        dispatcher.insert(pattern("a:*"), noop(), SubscribeOptions::once());
        assert_eq!(dispatcher.len(), 1);
        assert_eq!(dispatcher.matching(&envelope("a:b")).len(), 1);
        assert_eq!(dispatcher.len(), 0);
        assert!(dispatcher.matching(&envelope("a:b")).is_empty());
    }

    #[test]
    fn test_reply_entry_ignores_the_request_itself() {
        let dispatcher = Dispatcher::default();
        let cid = CorrelationId::generate();
        let request = envelope("rpc:ask").with_correlation_id(cid.clone());
        dispatcher.insert(
            Pattern::Universal,
            noop(),
            SubscribeOptions::reply(cid.clone(), request.id()),
        );
        assert_eq!(dispatcher.pending_replies(), 1);
        assert!(dispatcher.matching(&request).is_empty());

        let unrelated = envelope("rpc:answer");
        assert!(dispatcher.matching(&unrelated).is_empty());

        let reply = envelope("rpc:answer").with_correlation_id(cid);
        assert_eq!(dispatcher.matching(&reply).len(), 1);
        assert_eq!(dispatcher.pending_replies(), 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let dispatcher = Dispatcher::default();
        let a = dispatcher.insert(pattern("a:*"), noop(), SubscribeOptions::default());
        dispatcher.insert(pattern("b:*"), noop(), SubscribeOptions::default());
        assert!(dispatcher.remove(a));
        assert!(!dispatcher.remove(a));
        assert_eq!(dispatcher.counts_by_pattern().get("b:*"), Some(&1));
        assert!(!dispatcher.counts_by_pattern().contains_key("a:*"));
        assert_eq!(dispatcher.clear(), 1);
        assert_eq!(dispatcher.len(), 0);
    }

    #[tokio::test]
    async fn test_fan_out_isolates_failures() {
        let dispatcher = Dispatcher::default();
        let (tx, mut rx) = mpsc::unbounded_channel();

        dispatcher.insert(
            pattern("*"),
            handler_fn("broken", |_| async {
                Err::<(), _>(anyhow::anyhow!("broken handler"))
            }),
            SubscribeOptions::default(),
        );
        dispatcher.insert(
            pattern("*"),
            handler_fn("panicky", |_| async { explode() }),
            SubscribeOptions::default(),
        );
        for _ in 0..2 {
            let tx = tx.clone();
            dispatcher.insert(
                pattern("*"),
                handler_fn("healthy", move |env| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(env.id());
                        Ok(())
                    }
                }),
                SubscribeOptions::default(),
            );
        }

        let faults = Faults::default();
        let env = Arc::new(envelope("x:y"));
        let scheduled = dispatcher.fan_out(&Handle::current(), Arc::clone(&env), &faults);
        assert_eq!(scheduled, 4);

        for _ in 0..2 {
            let id = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(id, env.id());
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        let faults = faults.0.lock();
        assert_eq!(faults.len(), 2);
        assert!(faults
            .iter()
            .any(|f| matches!(f, BusFault::Handler { panicked: true, .. })));
    }
}
