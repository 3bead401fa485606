//! # Standard Three-Bus Topology
//!
//! ```text
//!            ┌─────────── agent-to-core ───────────┐
//!            │                                     ▼
//!     ┌────────────┐                         ┌────────────┐
//!     │ AGENT bus  │◀──── core-to-agent ─────│  CORE bus  │
//!     └────────────┘                         └────────────┘
//!                                              ▲        │
//!                          automation-to-core  │        │  core-to-automation
//!                                              │        ▼
//!                                          ┌────────────────┐
//!                                          │ AUTOMATION bus │
//!                                          └────────────────┘
//! ```
//!
//! | Bridge | Forwarded types |
//! |--------|-----------------|
//! | agent-to-core | `pbft:reply`, `agent:veto`, `collective:signal`, `llm:benchmark_done`, `agent:vote` |
//! | core-to-agent | `judgment:created`, `perception:received`, `budget:warning`, `budget:exhausted`, `learning:meta_cycle`, `emergence:detected` |
//! | automation-to-core | `market:price_tick`, `social:signal`, `solana:tx_confirmed`, `solana:tx_failed`, `market:alert` |
//! | core-to-automation | `budget:exhausted`, `learning:meta_cycle`, `emergence:detected`, `decide:made` |
//!
//! Every rule is a pass-through: the event keeps its type on the far side.

use crate::bridge::Bridge;
use crate::domain::{BridgeError, BridgeRule, BridgeStats};
use nexus_bus::EventBus;
use nexus_types::topics::{agent_bus, automation_bus, core_bus};
use serde::Serialize;

pub const AGENT_TO_CORE: &str = "agent-to-core";
pub const CORE_TO_AGENT: &str = "core-to-agent";
pub const AUTOMATION_TO_CORE: &str = "automation-to-core";
pub const CORE_TO_AUTOMATION: &str = "core-to-automation";

const AGENT_TO_CORE_TOPICS: &[&str] = &[
    agent_bus::PBFT_REPLY,
    agent_bus::VETO,
    agent_bus::COLLECTIVE_SIGNAL,
    agent_bus::LLM_BENCHMARK_DONE,
    agent_bus::VOTE,
];

const CORE_TO_AGENT_TOPICS: &[&str] = &[
    core_bus::JUDGMENT_CREATED,
    core_bus::PERCEPTION_RECEIVED,
    core_bus::BUDGET_WARNING,
    core_bus::BUDGET_EXHAUSTED,
    core_bus::META_CYCLE,
    core_bus::EMERGENCE_DETECTED,
];

const AUTOMATION_TO_CORE_TOPICS: &[&str] = &[
    automation_bus::PRICE_TICK,
    automation_bus::SOCIAL_SIGNAL,
    automation_bus::TX_CONFIRMED,
    automation_bus::TX_FAILED,
    automation_bus::MARKET_ALERT,
];

const CORE_TO_AUTOMATION_TOPICS: &[&str] = &[
    core_bus::BUDGET_EXHAUSTED,
    core_bus::META_CYCLE,
    core_bus::EMERGENCE_DETECTED,
    core_bus::DECISION_MADE,
];

fn passthrough_bridge(name: &str, topics: &[&str]) -> Result<Bridge, BridgeError> {
    let rules = topics
        .iter()
        .map(|topic| BridgeRule::forward(topic))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Bridge::new(name, rules))
}

/// Aggregate status of all four bridges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyStats {
    pub bridges: Vec<BridgeStats>,
    pub forwarded_total: u64,
    pub loops_prevented: u64,
}

/// The four running bridges linking the core, automation and agent buses.
///
/// Dropping the topology stops every bridge.
#[derive(Debug)]
pub struct StandardTopology {
    bridges: Vec<Bridge>,
}

impl StandardTopology {
    /// Build and start all four bridges.
    ///
    /// # Errors
    ///
    /// Returns the first bridge that fails to start. Bridges started before
    /// it are stopped again.
    pub fn wire(
        core: &EventBus,
        automation: &EventBus,
        agent: &EventBus,
    ) -> Result<Self, BridgeError> {
        let plan = [
            (AGENT_TO_CORE, AGENT_TO_CORE_TOPICS, agent, core),
            (CORE_TO_AGENT, CORE_TO_AGENT_TOPICS, core, agent),
            (AUTOMATION_TO_CORE, AUTOMATION_TO_CORE_TOPICS, automation, core),
            (CORE_TO_AUTOMATION, CORE_TO_AUTOMATION_TOPICS, core, automation),
        ];

        let mut bridges = Vec::with_capacity(plan.len());
        for (name, topics, source, destination) in plan {
            let bridge = passthrough_bridge(name, topics)?;
            // Already-started bridges stop when `bridges` drops on error.
            bridge.start(source, destination)?;
            bridges.push(bridge);
        }

        tracing::info!(
            core = %core.id(),
            automation = %automation.id(),
            agent = %agent.id(),
            "Standard bus topology wired"
        );
        Ok(Self { bridges })
    }

    pub fn bridges(&self) -> &[Bridge] {
        &self.bridges
    }

    #[must_use]
    pub fn bridge(&self, name: &str) -> Option<&Bridge> {
        self.bridges.iter().find(|bridge| bridge.name() == name)
    }

    /// Stop every bridge. Returns the number of subscriptions removed.
    pub fn stop(&self) -> usize {
        self.bridges.iter().map(Bridge::stop).sum()
    }

    #[must_use]
    pub fn stats(&self) -> TopologyStats {
        let bridges: Vec<BridgeStats> = self.bridges.iter().map(Bridge::stats).collect();
        TopologyStats {
            forwarded_total: bridges.iter().map(|s| s.forwarded_total).sum(),
            loops_prevented: bridges.iter().map(|s| s.loops_prevented).sum(),
            bridges,
        }
    }
}
