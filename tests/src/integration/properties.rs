//! # Bus Guarantees
//!
//! End-to-end checks of the guarantees every Nexus bus gives its callers:
//!
//! 1. **Isolation**: one failing handler never starves its siblings
//! 2. **Non-blocking publish**: publish returns before handlers run
//! 3. **Wildcard matching**: `a:b:*` covers `a:b` and its children
//! 4. **Bounded history**: only the newest `capacity` envelopes survive
//! 5. **Request/reply**: a correlated reply resolves, silence times out
//! 6. **Single resolution**: the first of two racing replies wins
//! 7. **Veto**: a vetoed type reaches neither history nor subscribers
//! 8. **Typed handlers**: stateful `EventHandler` impls are named in faults

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use nexus_bus::{
        handler_fn, middleware_fn, BusConfig, BusError, EventBus, EventHandler, HistoryFilter,
        Verdict,
    };
    use nexus_types::{matches, topics, Envelope, EventType};
    use parking_lot::Mutex;
    use serde_json::json;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// Handler that keeps every envelope it sees.
    fn recorder(name: &str) -> (Arc<dyn EventHandler>, Arc<Mutex<Vec<Arc<Envelope>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = handler_fn(name, move |env| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(env);
                Ok(())
            }
        });
        (handler, seen)
    }

    fn types(seen: &Mutex<Vec<Arc<Envelope>>>) -> Vec<String> {
        let mut types: Vec<String> = seen
            .lock()
            .iter()
            .map(|env| env.event_type().as_str().to_string())
            .collect();
        types.sort();
        types
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    /// Tallies judgments and rejects any without a quality score.
    #[derive(Default)]
    struct JudgmentTally {
        scored: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for JudgmentTally {
        fn name(&self) -> &str {
            "judgment-tally"
        }

        async fn handle(&self, envelope: Arc<Envelope>) -> anyhow::Result<()> {
            anyhow::ensure!(
                envelope.payload().get("q").is_some(),
                "judgment {} has no quality score",
                envelope.id()
            );
            self.scored.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn failing() -> anyhow::Result<()> {
        panic!("handler blew up")
    }

    // =============================================================================
    // ISOLATION AND NON-BLOCKING DISPATCH
    // =============================================================================

    #[tokio::test]
    async fn test_failing_handlers_do_not_affect_siblings() {
        let bus = EventBus::new(BusConfig::named("CORE"));
        let (first, first_seen) = recorder("first");
        let (second, second_seen) = recorder("second");

        bus.subscribe("judgment:*", first).unwrap();
        bus.subscribe(
            "judgment:created",
            handler_fn("erroring", |_env| async {
                Err::<(), _>(anyhow::anyhow!("rejected"))
            }),
        )
        .unwrap();
        bus.subscribe(
            "judgment:created",
            handler_fn("panicking", |_env| async { failing() }),
        )
        .unwrap();
        bus.subscribe("*", second).unwrap();

        let outcome = bus
            .emit(topics::core_bus::JUDGMENT_CREATED, json!({"q": 0.7}))
            .unwrap();
        assert_eq!(outcome.handlers(), 4);
        settle().await;

        let first_seen = first_seen.lock();
        let second_seen = second_seen.lock();
        let published_id = outcome.envelope().unwrap().id();
        assert_eq!(first_seen.len(), 1);
        assert_eq!(first_seen[0].id(), published_id);
        assert!(second_seen.iter().any(|env| env.id() == published_id));

        let faults = bus.query(
            &HistoryFilter::all()
                .with_event_type(EventType::parse(topics::system::HANDLER_ERROR).unwrap()),
        );
        assert_eq!(faults.len(), 2);
        assert!(faults
            .iter()
            .all(|fault| fault.causation_id() == Some(published_id)));
        assert_eq!(bus.stats().handler_faults, 2);
    }

    #[tokio::test]
    async fn test_publish_returns_before_slow_handlers() {
        let bus = EventBus::new(BusConfig::named("CORE"));
        let finished = Arc::new(AtomicUsize::new(0));
        for i in 0..5 {
            let finished = Arc::clone(&finished);
            bus.subscribe(
                "learning:event",
                handler_fn(format!("slow-{i}"), move |_env| {
                    let finished = Arc::clone(&finished);
                    async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .unwrap();
        }

        let started = std::time::Instant::now();
        let outcome = bus.emit("learning:event", json!(null)).unwrap();
        let elapsed = started.elapsed();

        assert_eq!(outcome.handlers(), 5);
        assert!(elapsed < Duration::from_millis(50), "publish took {elapsed:?}");
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_typed_handler_keeps_state_and_is_named_in_faults() {
        let bus = EventBus::new(BusConfig::named("CORE"));
        let tally = Arc::new(JudgmentTally::default());
        bus.subscribe("judgment:created", Arc::clone(&tally) as Arc<dyn EventHandler>)
            .unwrap();

        bus.emit("judgment:created", json!({"q": 0.8})).unwrap();
        bus.emit("judgment:created", json!({"q": 0.4})).unwrap();
        let unscored = bus.emit("judgment:created", json!({})).unwrap();
        settle().await;

        assert_eq!(tally.scored.load(Ordering::SeqCst), 2);
        let faults = bus.query(
            &HistoryFilter::all()
                .with_event_type(EventType::parse(topics::system::HANDLER_ERROR).unwrap()),
        );
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].payload()["handler"], "judgment-tally");
        assert_eq!(
            faults[0].causation_id(),
            Some(unscored.envelope().unwrap().id())
        );
    }

    // =============================================================================
    // ROUTING
    // =============================================================================

    #[tokio::test]
    async fn test_wildcard_matching() {
        assert!(matches("a:b:*", "a:b:c"));
        assert!(matches("a:b:*", "a:b"));
        assert!(!matches("a:b:*", "a:x"));
        assert!(matches("*", "anything:at:all"));

        let bus = EventBus::new(BusConfig::named("CORE"));
        let (scoped, scoped_seen) = recorder("scoped");
        let (everything, everything_seen) = recorder("everything");
        bus.subscribe("a:b:*", scoped).unwrap();
        bus.subscribe("*", everything).unwrap();

        for event_type in ["a:b:c", "a:b", "a:x"] {
            bus.emit(event_type, json!(null)).unwrap();
        }
        settle().await;

        assert_eq!(types(&scoped_seen), vec!["a:b", "a:b:c"]);
        assert_eq!(types(&everything_seen), vec!["a:b", "a:b:c", "a:x"]);
    }

    #[tokio::test]
    async fn test_order_created_reaches_each_subscriber_once() {
        let bus = EventBus::new(BusConfig::named("CORE"));
        let (orders, orders_seen) = recorder("orders");
        let (audit, audit_seen) = recorder("audit");

        // The same handler under two overlapping patterns still runs once.
        bus.subscribe("order:*", Arc::clone(&orders)).unwrap();
        bus.subscribe("order:created", orders).unwrap();
        bus.subscribe("*", audit).unwrap();

        bus.emit("order:created", json!({"id": 1})).unwrap();
        settle().await;

        assert_eq!(orders_seen.lock().len(), 1);
        assert_eq!(audit_seen.lock().len(), 1);

        let history = bus.query(
            &HistoryFilter::all().with_event_type(EventType::parse("order:created").unwrap()),
        );
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].payload(), &json!({"id": 1}));
    }

    // =============================================================================
    // HISTORY
    // =============================================================================

    #[tokio::test]
    async fn test_history_keeps_most_recent_in_order() {
        let capacity = 5;
        let bus = EventBus::new(BusConfig::named("CORE").with_history_capacity(capacity));
        for seq in 0..capacity + 3 {
            bus.emit("perception:received", json!({"seq": seq})).unwrap();
        }

        let history = bus.query(&HistoryFilter::all());
        let seqs: Vec<u64> = history
            .iter()
            .filter_map(|env| env.payload()["seq"].as_u64())
            .collect();
        assert_eq!(seqs, vec![3, 4, 5, 6, 7]);

        let newest = bus.query(&HistoryFilter::all().with_limit(2));
        assert_eq!(newest[0].payload()["seq"], 6);
        assert_eq!(newest[1].payload()["seq"], 7);

        let stats = bus.stats();
        assert_eq!(stats.history_size, capacity);
        assert_eq!(stats.events_published, 8);
    }

    // =============================================================================
    // REQUEST / REPLY
    // =============================================================================

    fn responder(bus: &EventBus, replies: &'static [i64], delay: Duration) {
        let responder_bus = bus.clone();
        bus.subscribe(
            "calc:add",
            handler_fn("calculator", move |request| {
                let bus = responder_bus.clone();
                async move {
                    tokio::time::sleep(delay).await;
                    for n in replies {
                        bus.reply(&request, "calc:result", json!({"n": n}))?;
                    }
                    Ok::<(), anyhow::Error>(())
                }
            }),
        )
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_resolves_or_times_out() {
        let bus = EventBus::new(BusConfig::named("CORE"));
        responder(&bus, &[3], Duration::from_millis(50));

        let reply = bus
            .request("calc:add", json!({"a": 1, "b": 2}), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(reply, json!({"n": 3}));

        let started = tokio::time::Instant::now();
        let err = bus
            .request("calc:sub", json!(null), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(matches!(err, BusError::RequestTimeout { timeout_ms: 100, .. }));

        let stats = bus.stats();
        assert_eq!(stats.pending_requests, 0);
        assert_eq!(stats.requests_timed_out, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_racing_replies_resolve_once() {
        let bus = EventBus::new(BusConfig::named("CORE"));
        responder(&bus, &[1, 2], Duration::from_millis(10));

        let reply = bus
            .request("calc:add", json!(null), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(reply, json!({"n": 1}));

        settle().await;
        let results = bus.query(
            &HistoryFilter::all().with_event_type(EventType::parse("calc:result").unwrap()),
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].correlation_id(), results[1].correlation_id());
        assert_eq!(bus.stats().pending_requests, 0);
    }

    // =============================================================================
    // MIDDLEWARE
    // =============================================================================

    #[tokio::test]
    async fn test_vetoed_type_never_reaches_history_or_subscribers() {
        let bus = EventBus::new(BusConfig::named("CORE"));
        bus.use_middleware(middleware_fn("secrets", |env| {
            Ok(if env.event_type().as_str() == "x:secret" {
                Verdict::veto("not for this bus")
            } else {
                Verdict::Continue
            })
        }));
        let (direct, direct_seen) = recorder("direct");
        let (everything, everything_seen) = recorder("everything");
        bus.subscribe("x:secret", direct).unwrap();
        bus.subscribe("*", everything).unwrap();

        for _ in 0..3 {
            assert!(bus.emit("x:secret", json!(null)).unwrap().is_blocked());
        }
        assert!(bus.emit("x:public", json!(null)).unwrap().is_published());
        settle().await;

        assert!(direct_seen.lock().is_empty());
        assert_eq!(types(&everything_seen), vec!["x:public"]);
        let history = bus.query(&HistoryFilter::all());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event_type().as_str(), "x:public");
        assert_eq!(bus.stats().events_blocked, 3);
    }
}
