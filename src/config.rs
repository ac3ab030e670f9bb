//! Runtime configuration loaded from the environment

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agents::errors::{AgentError, AgentResult};

/// What the executor does when one step of a dispatch round fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Abort the round on the first failure and propagate it
    FailFast,
    /// Let every step of the round finish, then report the plan as failed
    CompleteRound,
}

impl FromStr for DispatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail_fast" => Ok(DispatchPolicy::FailFast),
            "complete_round" => Ok(DispatchPolicy::CompleteRound),
            other => Err(format!("Unknown dispatch policy: {}", other)),
        }
    }
}

/// Whether the health monitor may restart an agent that is mid-task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Restart stale agents unconditionally; in-flight results are dropped
    Always,
    /// Defer the restart while the agent has in-flight tasks
    SkipBusy,
}

impl FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(RestartPolicy::Always),
            "skip_busy" => Ok(RestartPolicy::SkipBusy),
            other => Err(format!("Unknown restart policy: {}", other)),
        }
    }
}

/// How the executor settles agents that tie for a step and steps that wait for one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Candidate list order and arrival order
    FirstCome,
    /// The waiting step of the higher priority task gets the agent first
    Priority,
    /// Among tied agents, the better success rate and then the longer uptime wins
    Performance,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first_come" => Ok(ConflictPolicy::FirstCome),
            "priority" => Ok(ConflictPolicy::Priority),
            "performance" => Ok(ConflictPolicy::Performance),
            other => Err(format!("Unknown conflict policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub heartbeat_interval: Duration,
    pub stale_after: Duration,
    pub health_check_interval: Duration,
    pub restart_policy: RestartPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(300),
            health_check_interval: Duration::from_secs(60),
            restart_policy: RestartPolicy::Always,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub poll_interval: Duration,
    pub dispatch_policy: DispatchPolicy,
    /// Checkpoint after every step transition, not only at plan boundaries
    pub checkpoint_steps: bool,
    pub conflict_policy: ConflictPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            dispatch_policy: DispatchPolicy::FailFast,
            checkpoint_steps: true,
            conflict_policy: ConflictPolicy::FirstCome,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub event_capacity: usize,
    pub control_capacity: usize,
    pub autostart: Vec<String>,
    pub orchestrator: OrchestratorConfig,
    pub executor: ExecutorConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_url: None,
            event_capacity: 256,
            control_capacity: 64,
            autostart: Vec::new(),
            orchestrator: OrchestratorConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Reads configuration from process environment variables
    pub fn from_env() -> AgentResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary lookup, unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> AgentResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("COORDINATOR_BIND_ADDR") {
            config.bind_addr = parse("COORDINATOR_BIND_ADDR", &addr)?;
        }
        config.database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        if let Some(v) = lookup("EVENT_BUS_CAPACITY") {
            config.event_capacity = parse("EVENT_BUS_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("CONTROL_CHANNEL_CAPACITY") {
            config.control_capacity = parse("CONTROL_CHANNEL_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("AGENTS_AUTOSTART") {
            config.autostart = v
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from)
                .collect();
        }

        let orchestrator = &mut config.orchestrator;
        if let Some(v) = lookup("AGENT_HEARTBEAT_INTERVAL_SECS") {
            orchestrator.heartbeat_interval = secs("AGENT_HEARTBEAT_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("AGENT_STALE_AFTER_SECS") {
            orchestrator.stale_after = secs("AGENT_STALE_AFTER_SECS", &v)?;
        }
        if let Some(v) = lookup("HEALTH_CHECK_INTERVAL_SECS") {
            orchestrator.health_check_interval = secs("HEALTH_CHECK_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("HEALTH_RESTART_POLICY") {
            orchestrator.restart_policy = parse("HEALTH_RESTART_POLICY", &v)?;
        }

        let executor = &mut config.executor;
        if let Some(v) = lookup("PLAN_POLL_INTERVAL_MS") {
            let millis: u64 = parse("PLAN_POLL_INTERVAL_MS", &v)?;
            if millis == 0 {
                return Err(AgentError::ConfigError(
                    "PLAN_POLL_INTERVAL_MS must be positive".to_string(),
                ));
            }
            executor.poll_interval = Duration::from_millis(millis);
        }
        if let Some(v) = lookup("PLAN_DISPATCH_POLICY") {
            executor.dispatch_policy = parse("PLAN_DISPATCH_POLICY", &v)?;
        }
        if let Some(v) = lookup("PLAN_CHECKPOINT_STEPS") {
            executor.checkpoint_steps = parse("PLAN_CHECKPOINT_STEPS", &v)?;
        }
        if let Some(v) = lookup("PLAN_CONFLICT_POLICY") {
            executor.conflict_policy = parse("PLAN_CONFLICT_POLICY", &v)?;
        }

        if config.orchestrator.stale_after <= config.orchestrator.heartbeat_interval {
            return Err(AgentError::ConfigError(
                "AGENT_STALE_AFTER_SECS must exceed AGENT_HEARTBEAT_INTERVAL_SECS".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse<T>(key: &str, value: &str) -> AgentResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AgentError::ConfigError(format!("{}: {}", key, e)))
}

fn secs(key: &str, value: &str) -> AgentResult<Duration> {
    let secs: u64 = parse(key, value)?;
    if secs == 0 {
        return Err(AgentError::ConfigError(format!("{} must be positive", key)));
    }
    Ok(Duration::from_secs(secs))
}
