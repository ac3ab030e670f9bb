//! Heartbeat-based health checking
//!
//! The only self-healing mechanism: an agent whose heartbeat is older than
//! `stale_after` is assumed hung and restarted.

use std::sync::{Arc, PoisonError};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Orchestrator;
use crate::agents::events::AgentEvent;
use crate::config::RestartPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Alive,
    Stale,
}

/// Most recent assessment of one agent; only the latest value is kept
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentHealth {
    pub agent_id: String,
    pub last_heartbeat: DateTime<Utc>,
    pub liveness: Liveness,
    pub checked_at: DateTime<Utc>,
}

impl Orchestrator {
    /// Latest snapshot per live agent, ordered by id
    pub fn health_snapshot(&self) -> Vec<AgentHealth> {
        let mut snapshot: Vec<AgentHealth> = self
            .health
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        snapshot.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        snapshot
    }

    pub async fn check_health(&self) -> Vec<String> {
        self.check_health_at(Utc::now()).await
    }

    /// Assesses every live agent as of `now` and restarts the stale ones
    ///
    /// Returns the ids a restart was attempted for.
    pub async fn check_health_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let stale_after = ChronoDuration::from_std(self.config.stale_after)
            .unwrap_or_else(|_| ChronoDuration::seconds(300));

        let agents: Vec<_> = self.agents.read().await.values().cloned().collect();
        let mut stale = Vec::new();
        {
            let mut health = self.health.write().unwrap_or_else(PoisonError::into_inner);
            for agent in &agents {
                let last_heartbeat = agent.core().last_heartbeat();
                let liveness = if now - last_heartbeat > stale_after {
                    Liveness::Stale
                } else {
                    Liveness::Alive
                };
                health.insert(
                    agent.id().to_string(),
                    AgentHealth {
                        agent_id: agent.id().to_string(),
                        last_heartbeat,
                        liveness,
                        checked_at: now,
                    },
                );
                if liveness == Liveness::Stale {
                    stale.push(Arc::clone(agent));
                }
            }
        }

        let mut restarted = Vec::new();
        for agent in stale {
            let agent_id = agent.id().to_string();
            let busy = agent.core().inflight_tasks();
            if self.config.restart_policy == RestartPolicy::SkipBusy && busy > 0 {
                info!(agent_id = %agent_id, inflight = busy, "Stale agent is busy; restart deferred");
                continue;
            }
            if busy > 0 {
                warn!(agent_id = %agent_id, inflight = busy, "Restarting stale agent with in-flight tasks");
            } else {
                warn!(agent_id = %agent_id, "Restarting stale agent");
            }

            let reason = format!("heartbeat older than {}s", stale_after.num_seconds());
            if let Err(e) = self.restart_agent(&agent_id).await {
                warn!(agent_id = %agent_id, error = %e, "Health restart failed; agent left stopped");
            }
            self.events.publish(AgentEvent::AgentRestarted {
                agent_id: agent_id.clone(),
                reason,
            });
            restarted.push(agent_id);
        }
        restarted
    }
}

/// Runs `check_health` every `health_check_interval` until `shutdown` is cancelled
pub fn spawn_health_monitor(orchestrator: Arc<Orchestrator>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(orchestrator.config.health_check_interval);
        ticker.tick().await;
        info!(
            interval_secs = orchestrator.config.health_check_interval.as_secs(),
            "Health monitor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let restarted = orchestrator.check_health().await;
                    if restarted.is_empty() {
                        debug!("Health check passed");
                    } else {
                        info!(count = restarted.len(), "Health check restarted agents");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Health monitor shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::events::EventBus;
    use crate::agents::factory::AgentFactory;
    use crate::agents::types::AgentType;
    use crate::config::{ExecutorConfig, OrchestratorConfig};
    use crate::domain::repositories::AgentRecord;
    use crate::infrastructure::repositories::{InMemoryAgentRepository, InMemoryPlanRepository};
    use std::time::Duration;

    fn orchestrator(policy: RestartPolicy) -> Arc<Orchestrator> {
        let plans = Arc::new(InMemoryPlanRepository::new());
        Orchestrator::new(
            Arc::new(InMemoryAgentRepository::with_records([AgentRecord::new(
                "sys",
                "System",
                AgentType::System,
            )])),
            plans.clone(),
            AgentFactory::new(plans, ExecutorConfig::default()),
            EventBus::new(64),
            OrchestratorConfig {
                restart_policy: policy,
                ..OrchestratorConfig::default()
            },
            ExecutorConfig::default(),
        )
    }

    #[tokio::test]
    async fn fresh_agents_are_alive() {
        let orchestrator = orchestrator(RestartPolicy::Always);
        orchestrator.start_agent("sys").await.unwrap();

        assert!(orchestrator.check_health().await.is_empty());
        let snapshot = orchestrator.health_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].liveness, Liveness::Alive);
    }

    #[tokio::test]
    async fn stale_agent_is_restarted_with_fresh_heartbeat() {
        let orchestrator = orchestrator(RestartPolicy::Always);
        orchestrator.start_agent("sys").await.unwrap();
        let mut events = orchestrator.events().subscribe();

        let later = Utc::now() + ChronoDuration::minutes(10);
        assert_eq!(orchestrator.check_health_at(later).await, vec!["sys"]);
        assert!(orchestrator.is_running("sys").await);

        let mut restarts = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, AgentEvent::AgentRestarted { .. }) {
                restarts += 1;
            }
        }
        assert_eq!(restarts, 1);
    }

    #[tokio::test]
    async fn monitor_stops_on_cancel() {
        let orchestrator = orchestrator(RestartPolicy::Always);
        let shutdown = CancellationToken::new();
        let handle = spawn_health_monitor(orchestrator, shutdown.clone());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
