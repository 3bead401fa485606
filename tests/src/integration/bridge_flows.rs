//! # Multi-Bus Flows
//!
//! Events crossing bus boundaries through `nexus-bridge`.
//!
//! ## Flows Tested:
//!
//! 1. **Loop prevention**: mirrored rules never ping-pong
//! 2. **CORE -> AGENT / AUTOMATION**: budget and learning broadcasts
//! 3. **AGENT -> CORE**: votes arrive traced back to their origin
//! 4. **Telemetry**: bridge counters show up in the Prometheus export

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use nexus_bridge::{Bridge, BridgeRule, StandardTopology, CORE_TO_AGENT};
    use nexus_bus::{BusConfig, EventBus, HistoryFilter, PublishOptions};
    use nexus_telemetry::{encode_metrics, register_metrics};
    use nexus_types::topics::{agent_bus, automation_bus, core_bus};
    use nexus_types::{BusId, CorrelationId, EventType};
    use serde_json::json;
    use tokio::time::timeout;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn standard_buses() -> (EventBus, EventBus, EventBus) {
        (
            EventBus::new(BusConfig::named("CORE")),
            EventBus::new(BusConfig::named("AUTOMATION")),
            EventBus::new(BusConfig::named("AGENT")),
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // =============================================================================
    // LOOP PREVENTION
    // =============================================================================

    #[tokio::test]
    async fn test_mirrored_rules_forward_exactly_once() {
        let bus1 = EventBus::new(BusConfig::named("BUS1"));
        let bus2 = EventBus::new(BusConfig::named("BUS2"));
        let outbound = Bridge::new("out", vec![BridgeRule::new("a-to-b", "x:a", "x:b").unwrap()]);
        let inbound = Bridge::new("in", vec![BridgeRule::new("b-to-a", "x:b", "x:a").unwrap()]);
        outbound.start(&bus1, &bus2).unwrap();
        inbound.start(&bus2, &bus1).unwrap();

        let before = inbound.stats().loops_prevented;
        bus1.emit("x:a", json!({"n": 1})).unwrap();
        settle().await;

        let on_bus2 = bus2.query(&HistoryFilter::all());
        assert_eq!(on_bus2.len(), 1);
        assert_eq!(on_bus2[0].event_type().as_str(), "x:b");
        assert_eq!(bus1.query(&HistoryFilter::all()).len(), 1);
        assert_eq!(inbound.stats().loops_prevented - before, 1);
        assert_eq!(outbound.stats().loops_prevented, 0);
    }

    // =============================================================================
    // STANDARD TOPOLOGY
    // =============================================================================

    #[tokio::test]
    async fn test_budget_exhausted_reaches_agents_and_automation() {
        let (core, automation, agent) = standard_buses();
        let topology = StandardTopology::wire(&core, &automation, &agent).unwrap();
        let mut agent_stream = agent.stream("budget:*").unwrap();
        let mut automation_stream = automation.stream("budget:*").unwrap();

        let cid = CorrelationId::new("budget-cycle-7").unwrap();
        let original = core
            .publish(
                core_bus::BUDGET_EXHAUSTED,
                json!({"spent": 10.0}),
                PublishOptions::new().with_correlation_id(cid.clone()),
            )
            .unwrap();
        let original_id = original.envelope().unwrap().id();

        for stream in [&mut agent_stream, &mut automation_stream] {
            let forwarded = timeout(Duration::from_secs(1), stream.next())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(forwarded.event_type().as_str(), core_bus::BUDGET_EXHAUSTED);
            assert!(forwarded.is_bridged());
            assert_eq!(forwarded.causation_id(), Some(original_id));
            assert_eq!(forwarded.correlation_id(), Some(&cid));
            assert_eq!(forwarded.source_tag(), "CORE");
            assert!(forwarded.has_visited(&BusId::new("CORE")));
        }

        // Only CORE -> AGENT carries budget warnings.
        core.emit(core_bus::BUDGET_WARNING, json!(null)).unwrap();
        let warning = timeout(Duration::from_secs(1), agent_stream.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(warning.event_type().as_str(), core_bus::BUDGET_WARNING);
        settle().await;
        assert!(automation
            .query(&HistoryFilter::all().with_event_type(
                EventType::parse(core_bus::BUDGET_WARNING).unwrap()
            ))
            .is_empty());

        let core_to_agent = topology.bridge(CORE_TO_AGENT).unwrap().stats();
        assert_eq!(core_to_agent.forwarded_total, 2);
    }

    #[tokio::test]
    async fn test_agent_votes_do_not_echo_back() {
        let (core, automation, agent) = standard_buses();
        let topology = StandardTopology::wire(&core, &automation, &agent).unwrap();

        agent.emit(agent_bus::VOTE, json!({"agent": "guardian", "score": 0.9})).unwrap();
        automation.emit(automation_bus::TX_CONFIRMED, json!({"sig": "abc"})).unwrap();
        core.emit(core_bus::USER_FEEDBACK, json!({"rating": 5})).unwrap();
        settle().await;

        let on_core = core.query(&HistoryFilter::all().with_source_tag("AGENT"));
        assert_eq!(on_core.len(), 1);
        assert!(on_core[0].is_bridged());
        assert_eq!(on_core[0].genealogy(), &[BusId::new("AGENT")]);

        // User feedback has no rule and stays on CORE.
        assert_eq!(agent.query(&HistoryFilter::all()).len(), 1);
        assert_eq!(automation.query(&HistoryFilter::all()).len(), 1);
        assert_eq!(core.query(&HistoryFilter::all()).len(), 3);

        let stats = topology.stats();
        assert_eq!(stats.forwarded_total, 2);
        assert_eq!(stats.loops_prevented, 0);

        assert_eq!(topology.stop(), 20);
        agent.emit(agent_bus::VOTE, json!(null)).unwrap();
        settle().await;
        assert_eq!(core.query(&HistoryFilter::all()).len(), 3);
    }

    // =============================================================================
    // TELEMETRY
    // =============================================================================

    #[tokio::test]
    async fn test_bridge_activity_is_exported() {
        // Registration fails harmlessly if another test got there first.
        let _ = register_metrics();
        let bus1 = EventBus::new(BusConfig::named("EXPORT-1"));
        let bus2 = EventBus::new(BusConfig::named("EXPORT-2"));
        let bridge = Bridge::new("export", vec![BridgeRule::forward("metric:sample").unwrap()]);
        bridge.start(&bus1, &bus2).unwrap();

        bus1.emit("metric:sample", json!(null)).unwrap();
        settle().await;

        let text = encode_metrics().unwrap();
        assert!(text.contains("nexus_bridge_forwarded_total"));
        assert!(text.contains("bridge=\"export\""));
        assert!(text.contains("nexus_bus_events_published_total"));
    }
}
