//! Agent leases for step dispatch
//!
//! An executor runs at most one step per agent at a time. Steps that find the
//! agent busy queue up, and when the lease is released the conflict resolver
//! picks which waiting step goes next.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

use super::conflict::{ConflictResolver, Contender};

pub(crate) struct AgentLeases {
    resolver: Arc<dyn ConflictResolver>,
    slots: Mutex<HashMap<String, Slot>>,
}

#[derive(Default)]
struct Slot {
    waiting: Vec<Waiter>,
}

struct Waiter {
    contender: Contender,
    grant: oneshot::Sender<()>,
}

/// Exclusive use of one agent; released on drop
pub(crate) struct AgentLease {
    leases: Arc<AgentLeases>,
    agent_id: String,
}

impl Drop for AgentLease {
    fn drop(&mut self) {
        self.leases.release(&self.agent_id);
    }
}

impl AgentLeases {
    pub(crate) fn new(resolver: Arc<dyn ConflictResolver>) -> Arc<Self> {
        Arc::new(Self {
            resolver,
            slots: Mutex::new(HashMap::new()),
        })
    }

    /// Waits until the contender's agent is free
    pub(crate) async fn acquire(self: &Arc<Self>, contender: Contender) -> AgentLease {
        let agent_id = contender.agent.id.clone();
        let pending = {
            let mut slots = self.lock();
            match slots.get_mut(&agent_id) {
                // present slot = agent is leased
                Some(slot) => {
                    let (grant, granted) = oneshot::channel();
                    slot.waiting.push(Waiter { contender, grant });
                    Some(granted)
                }
                None => {
                    slots.insert(agent_id.clone(), Slot::default());
                    None
                }
            }
        };

        if let Some(granted) = pending {
            debug!(agent_id = %agent_id, "Step waiting for busy agent");
            // senders are only dropped after a successful send
            if granted.await.is_err() {
                debug!(agent_id = %agent_id, "Lease handed over without a grant");
            }
        }

        AgentLease {
            leases: Arc::clone(self),
            agent_id,
        }
    }

    /// Hands the agent to the waiter the resolver picks, or frees it
    fn release(&self, agent_id: &str) {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(agent_id) else {
            return;
        };

        while !slot.waiting.is_empty() {
            let contenders: Vec<Contender> = slot.waiting.iter().map(|w| w.contender.clone()).collect();
            let index = self
                .resolver
                .resolve(&contenders)
                .and_then(|winner| contenders.iter().position(|c| std::ptr::eq(c, winner)))
                .unwrap_or(0);
            let waiter = slot.waiting.remove(index);
            if waiter.grant.send(()).is_ok() {
                return;
            }
        }
        slots.remove(agent_id);
    }

    #[cfg(test)]
    pub(crate) fn waiting(&self, agent_id: &str) -> usize {
        self.lock().get(agent_id).map_or(0, |slot| slot.waiting.len())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
