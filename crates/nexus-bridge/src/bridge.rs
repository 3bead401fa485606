//! # Cross-Bus Bridge
//!
//! A set of permanent subscriptions on a source bus that republish matching
//! envelopes on a destination bus.
//!
//! ## Loop Prevention
//!
//! Every forwarded envelope is marked `bridged`. A bridged envelope is never
//! forwarded again, by this bridge or any other, even when a rule matches.
//! With `A -> B` on one bridge and `B -> A` on the reverse bridge, publishing
//! `A` yields exactly one `B` and one prevented loop.

use crate::domain::{
    BridgeCounters, BridgeError, BridgeRule, BridgeState, BridgeStats, SourceTagPolicy,
};
use async_trait::async_trait;
use nexus_bus::{EventBus, EventHandler, PublishOptions, PublishOutcome, SubscribeOptions, Subscription};
use nexus_telemetry::metrics::{BRIDGE_FORWARDED, BRIDGE_LOOPS_PREVENTED};
use nexus_types::{BusId, Envelope};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct Running {
    source: BusId,
    destination: BusId,
    subscriptions: Vec<Subscription>,
}

/// Forwards events between two buses under a static rule table.
pub struct Bridge {
    name: String,
    rules: Vec<Arc<BridgeRule>>,
    policy: SourceTagPolicy,
    counters: Arc<BridgeCounters>,
    running: Mutex<Option<Running>>,
}

impl Bridge {
    /// Create a stopped bridge.
    #[must_use]
    pub fn new(name: impl Into<String>, rules: Vec<BridgeRule>) -> Self {
        let counters = Arc::new(BridgeCounters::new(rules.len()));
        Self {
            name: name.into(),
            rules: rules.into_iter().map(Arc::new).collect(),
            policy: SourceTagPolicy::default(),
            counters,
            running: Mutex::new(None),
        }
    }

    /// Choose how forwarded envelopes are tagged.
    #[must_use]
    pub fn with_source_tag_policy(mut self, policy: SourceTagPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn rules(&self) -> impl Iterator<Item = &BridgeRule> {
        self.rules.iter().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn state(&self) -> BridgeState {
        if self.running.lock().is_some() {
            BridgeState::Running
        } else {
            BridgeState::Stopped
        }
    }

    /// Subscribe every rule on `source`, forwarding to `destination`.
    ///
    /// All-or-nothing: if any rule cannot subscribe, the ones already
    /// subscribed are removed and the bridge stays stopped.
    ///
    /// # Errors
    ///
    /// - `BridgeError::AlreadyRunning` - the bridge is running
    /// - `BridgeError::Subscribe` - the source bus rejected a rule pattern
    pub fn start(&self, source: &EventBus, destination: &EventBus) -> Result<(), BridgeError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(BridgeError::AlreadyRunning {
                bridge: self.name.clone(),
            });
        }

        let mut subscriptions = Vec::with_capacity(self.rules.len());
        for (index, rule) in self.rules.iter().enumerate() {
            let forwarder = Arc::new(Forwarder {
                label: format!("bridge:{}:{}", self.name, rule.name()),
                bridge: self.name.clone(),
                rule_index: index,
                rule: Arc::clone(rule),
                policy: self.policy.clone(),
                source: source.id().clone(),
                destination: destination.clone(),
                counters: Arc::clone(&self.counters),
            });

            match source.subscribe_pattern(rule.source().clone(), forwarder, SubscribeOptions::default()) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(err) => {
                    for subscription in subscriptions {
                        subscription.unsubscribe();
                    }
                    return Err(BridgeError::Subscribe {
                        bridge: self.name.clone(),
                        rule: rule.name().to_string(),
                        source: err,
                    });
                }
            }
        }

        info!(
            bridge = %self.name,
            source = %source.id(),
            destination = %destination.id(),
            rules = self.rules.len(),
            "Bridge started"
        );
        *running = Some(Running {
            source: source.id().clone(),
            destination: destination.id().clone(),
            subscriptions,
        });
        Ok(())
    }

    /// Remove every bridge-owned subscription. Forwards already published
    /// are not retracted. No-op when stopped.
    ///
    /// Returns the number of subscriptions removed.
    pub fn stop(&self) -> usize {
        let Some(running) = self.running.lock().take() else {
            return 0;
        };
        let removed = running
            .subscriptions
            .into_iter()
            .map(Subscription::unsubscribe)
            .filter(|removed| *removed)
            .count();
        info!(
            bridge = %self.name,
            source = %running.source,
            destination = %running.destination,
            removed,
            "Bridge stopped"
        );
        removed
    }

    /// Read-only status.
    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        let (state, source, destination) = match &*self.running.lock() {
            Some(running) => (
                BridgeState::Running,
                Some(running.source.clone()),
                Some(running.destination.clone()),
            ),
            None => (BridgeState::Stopped, None, None),
        };

        let mut forwarded_by_rule = BTreeMap::new();
        for (rule, counter) in self.rules.iter().zip(&self.counters.forwarded) {
            *forwarded_by_rule.entry(rule.name().to_string()).or_insert(0) +=
                BridgeCounters::get(counter);
        }

        BridgeStats {
            name: self.name.clone(),
            state,
            source,
            destination,
            forwarded_total: forwarded_by_rule.values().sum(),
            forwarded_by_rule,
            loops_prevented: BridgeCounters::get(&self.counters.loops_prevented),
            blocked: BridgeCounters::get(&self.counters.blocked),
            forward_failures: BridgeCounters::get(&self.counters.forward_failures),
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("name", &self.name)
            .field("rules", &self.rules)
            .field("policy", &self.policy)
            .field("state", &self.state())
            .finish()
    }
}

/// Subscription handler for one rule.
struct Forwarder {
    label: String,
    bridge: String,
    rule_index: usize,
    rule: Arc<BridgeRule>,
    policy: SourceTagPolicy,
    source: BusId,
    destination: EventBus,
    counters: Arc<BridgeCounters>,
}

impl Forwarder {
    fn forward(&self, original: &Envelope) -> Result<PublishOutcome, nexus_bus::BusError> {
        let event_type = self.rule.destination_for(original.event_type());
        let payload = self.rule.apply(original.payload().clone());

        let mut options = PublishOptions::new()
            .with_causation_id(original.id())
            .with_source_tag(self.policy.resolve(original, self.destination.id()));
        if let Some(cid) = original.correlation_id() {
            options = options.with_correlation_id(cid.clone());
        }

        let envelope = self
            .destination
            .build_envelope(event_type.as_str(), payload, options)?
            .into_bridged(original, self.source.clone());
        self.destination.publish_envelope(envelope)
    }
}

#[async_trait]
impl EventHandler for Forwarder {
    fn name(&self) -> &str {
        &self.label
    }

    async fn handle(&self, envelope: Arc<Envelope>) -> anyhow::Result<()> {
        if envelope.is_bridged() {
            BridgeCounters::bump(&self.counters.loops_prevented);
            BRIDGE_LOOPS_PREVENTED.with_label_values(&[self.bridge.as_str()]).inc();
            debug!(
                bridge = %self.bridge,
                rule = %self.rule.name(),
                event_type = %envelope.event_type(),
                event_id = %envelope.id(),
                genealogy = ?envelope.genealogy(),
                "Loop prevented, bridged envelope not re-forwarded"
            );
            return Ok(());
        }

        match self.forward(&envelope) {
            Ok(PublishOutcome::Published { envelope: forwarded, .. }) => {
                BridgeCounters::bump(&self.counters.forwarded[self.rule_index]);
                BRIDGE_FORWARDED
                    .with_label_values(&[self.bridge.as_str(), self.rule.name()])
                    .inc();
                debug!(
                    bridge = %self.bridge,
                    rule = %self.rule.name(),
                    source_event_id = %envelope.id(),
                    event_id = %forwarded.id(),
                    destination = %self.destination.id(),
                    event_type = %forwarded.event_type(),
                    "Envelope forwarded"
                );
            }
            Ok(PublishOutcome::Blocked {
                middleware, reason, ..
            }) => {
                BridgeCounters::bump(&self.counters.blocked);
                debug!(
                    bridge = %self.bridge,
                    rule = %self.rule.name(),
                    middleware = %middleware,
                    reason = %reason,
                    "Forward vetoed by destination middleware"
                );
            }
            Err(err) => {
                BridgeCounters::bump(&self.counters.forward_failures);
                warn!(
                    bridge = %self.bridge,
                    rule = %self.rule.name(),
                    destination = %self.destination.id(),
                    error = %err,
                    "Forward rejected by destination bus"
                );
            }
        }
        Ok(())
    }
}
