//! # Well-Known Event Types
//!
//! Event types used by the standard three-bus deployment.
//!
//! | Bus | Concern |
//! |-----|---------|
//! | CORE | judgment pipeline, learning, budget, user feedback |
//! | AUTOMATION | triggers, scheduled perception, market/social/chain signals |
//! | AGENT | agent lifecycle, votes, consensus protocol messages |
//!
//! Every constant here is exercised by `test_all_well_known_types_parse`,
//! so a typo fails the build's test run rather than silently never matching.

/// Namespace reserved for events emitted by the bus itself.
pub const SYSTEM_NAMESPACE: &str = "system";

/// Events emitted by the bus itself.
pub mod system {
    /// A subscribed handler failed or panicked.
    pub const HANDLER_ERROR: &str = "system:handler:error";
}

/// CORE bus events.
pub mod core_bus {
    pub const JUDGMENT_REQUESTED: &str = "judgment:requested";
    pub const JUDGMENT_CREATED: &str = "judgment:created";
    pub const JUDGMENT_FAILED: &str = "judgment:failed";
    pub const CONSENSUS_REACHED: &str = "consensus:reached";
    pub const CONSENSUS_FAILED: &str = "consensus:failed";
    pub const LEARNING_EVENT: &str = "learning:event";
    pub const Q_TABLE_UPDATED: &str = "learning:q_table_updated";
    pub const META_CYCLE: &str = "learning:meta_cycle";
    pub const PERCEPTION_RECEIVED: &str = "perception:received";
    pub const ANOMALY_DETECTED: &str = "perception:anomaly";
    pub const BUDGET_WARNING: &str = "budget:warning";
    pub const BUDGET_EXHAUSTED: &str = "budget:exhausted";
    pub const USER_FEEDBACK: &str = "user:feedback";
    pub const EMERGENCE_DETECTED: &str = "emergence:detected";
    pub const DECISION_MADE: &str = "decide:made";
}

/// AUTOMATION bus events.
pub mod automation_bus {
    pub const TRIGGER_FIRED: &str = "trigger:fired";
    pub const TRIGGER_BLOCKED: &str = "trigger:blocked";
    pub const AUTOMATION_TICK: &str = "automation:tick";
    pub const PRICE_TICK: &str = "market:price_tick";
    pub const MARKET_ALERT: &str = "market:alert";
    pub const SOCIAL_SIGNAL: &str = "social:signal";
    pub const TX_CONFIRMED: &str = "solana:tx_confirmed";
    pub const TX_FAILED: &str = "solana:tx_failed";
    pub const LEARN_BATCH: &str = "schedule:learn_batch";
}

/// AGENT bus events.
pub mod agent_bus {
    pub const AGENT_ACTIVATED: &str = "agent:activated";
    pub const AGENT_DEACTIVATED: &str = "agent:deactivated";
    pub const VOTE: &str = "agent:vote";
    pub const VETO: &str = "agent:veto";
    pub const PBFT_REPLY: &str = "pbft:reply";
    pub const COLLECTIVE_SIGNAL: &str = "collective:signal";
    pub const LLM_SELECTED: &str = "llm:selected";
    pub const LLM_BENCHMARK_DONE: &str = "llm:benchmark_done";
}
