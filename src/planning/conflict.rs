//! Conflict resolution between agents that both match a need
//!
//! Two simple, swappable policies: task priority for resource contention and
//! recent performance for capability overlap. Ties keep the earlier contender.

use std::sync::Arc;

use crate::agents::types::AgentInfo;
use crate::config::ConflictPolicy;

/// An agent competing for a resource or a step, with the priority of the task it serves
#[derive(Debug, Clone)]
pub struct Contender {
    pub agent: AgentInfo,
    pub priority: i32,
}

impl Contender {
    pub fn new(agent: AgentInfo, priority: i32) -> Self {
        Self { agent, priority }
    }
}

pub trait ConflictResolver: Send + Sync {
    /// Picks the winner; `None` only when there are no contenders
    fn resolve<'a>(&self, contenders: &'a [Contender]) -> Option<&'a Contender>;
}

/// Higher task priority wins
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityResolver;

impl ConflictResolver for PriorityResolver {
    fn resolve<'a>(&self, contenders: &'a [Contender]) -> Option<&'a Contender> {
        first_max_by(contenders, |c| c.priority as f64)
    }
}

/// Better success rate wins, then longer uptime
#[derive(Debug, Clone, Copy, Default)]
pub struct PerformanceResolver;

impl ConflictResolver for PerformanceResolver {
    fn resolve<'a>(&self, contenders: &'a [Contender]) -> Option<&'a Contender> {
        let best_rate = contenders
            .iter()
            .map(|c| c.agent.metrics.success_rate())
            .fold(None, |acc: Option<f64>, rate| Some(acc.map_or(rate, |a| a.max(rate))))?;

        let leaders: Vec<&Contender> = contenders
            .iter()
            .filter(|c| (c.agent.metrics.success_rate() - best_rate).abs() < f64::EPSILON)
            .collect();

        let mut winner = leaders[0];
        for &candidate in &leaders[1..] {
            if candidate.agent.metrics.uptime_secs > winner.agent.metrics.uptime_secs {
                winner = candidate;
            }
        }
        Some(winner)
    }
}

/// Keeps the list order: the first contender always wins
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstComeResolver;

impl ConflictResolver for FirstComeResolver {
    fn resolve<'a>(&self, contenders: &'a [Contender]) -> Option<&'a Contender> {
        contenders.first()
    }
}

/// The resolver a configured policy stands for
pub fn resolver_for(policy: ConflictPolicy) -> Arc<dyn ConflictResolver> {
    match policy {
        ConflictPolicy::FirstCome => Arc::new(FirstComeResolver),
        ConflictPolicy::Priority => Arc::new(PriorityResolver),
        ConflictPolicy::Performance => Arc::new(PerformanceResolver),
    }
}

fn first_max_by<F>(contenders: &[Contender], key: F) -> Option<&Contender>
where
    F: Fn(&Contender) -> f64,
{
    let mut best: Option<&Contender> = None;
    for contender in contenders {
        if best.map_or(true, |b| key(contender) > key(b)) {
            best = Some(contender);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::{AgentMetrics, AgentStatus, AgentType};
    use chrono::Utc;

    fn contender(id: &str, priority: i32, metrics: AgentMetrics) -> Contender {
        Contender::new(
            AgentInfo {
                id: id.to_string(),
                name: id.to_string(),
                agent_type: AgentType::Assistant,
                status: AgentStatus::Active,
                capabilities: vec![],
                last_heartbeat: Utc::now(),
                metrics,
            },
            priority,
        )
    }

    #[test]
    fn priority_higher_wins() {
        let contenders = vec![
            contender("low", 1, AgentMetrics::default()),
            contender("high", 5, AgentMetrics::default()),
        ];

        assert_eq!(PriorityResolver.resolve(&contenders).unwrap().agent.id, "high");
    }

    #[test]
    fn priority_tie_keeps_first() {
        let contenders = vec![
            contender("a", 3, AgentMetrics::default()),
            contender("b", 3, AgentMetrics::default()),
        ];

        assert_eq!(PriorityResolver.resolve(&contenders).unwrap().agent.id, "a");
    }

    #[test]
    fn performance_prefers_success_rate_then_uptime() {
        let contenders = vec![
            contender(
                "flaky",
                0,
                AgentMetrics {
                    tasks_completed: 1,
                    tasks_failed: 1,
                    uptime_secs: 1000,
                },
            ),
            contender(
                "young",
                0,
                AgentMetrics {
                    tasks_completed: 2,
                    tasks_failed: 0,
                    uptime_secs: 10,
                },
            ),
            contender(
                "veteran",
                0,
                AgentMetrics {
                    tasks_completed: 9,
                    tasks_failed: 0,
                    uptime_secs: 500,
                },
            ),
        ];

        assert_eq!(PerformanceResolver.resolve(&contenders).unwrap().agent.id, "veteran");
    }

    #[test]
    fn empty_contenders_resolve_to_none() {
        assert!(PriorityResolver.resolve(&[]).is_none());
        assert!(PerformanceResolver.resolve(&[]).is_none());
        assert!(FirstComeResolver.resolve(&[]).is_none());
    }
}
