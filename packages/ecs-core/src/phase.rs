//! Phase system: named execution windows gating mutation (§4.9).
//!
//! Grounded on `in-mem-db-runtime::tick_phases::TickPhaseProcessor` and
//! `runtime::Runtime`'s phase dispatch, repurposed from the reference
//! engine's fixed Api/Procedures/Persistence three-stage split into a
//! configurable named-phase graph with a permission enum instead of a
//! staged budget split.

use crate::error::{EcsError, Result};
use std::collections::{HashMap, HashSet};

/// Write-permission granted to mutating calls while a phase is active (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ReadOnly,
    ReadWriteAll,
    OwnedOnly,
    UnownedOnly,
}

/// Declares the phase graph: valid transitions and per-phase permission.
#[derive(Debug, Clone)]
pub struct PhaseConfig {
    pub valid_transitions: HashMap<String, HashSet<String>>,
    pub permissions: HashMap<String, Permission>,
}

impl PhaseConfig {
    /// The reference engine's `Relaxed` config: every phase allows every
    /// transition, `ReadWriteAll` everywhere.
    pub fn relaxed(phase_names: &[&str]) -> Self {
        let all: HashSet<String> = phase_names.iter().map(|s| s.to_string()).collect();
        let mut valid_transitions = HashMap::new();
        let mut permissions = HashMap::new();
        for name in phase_names {
            valid_transitions.insert(name.to_string(), all.clone());
            permissions.insert(name.to_string(), Permission::ReadWriteAll);
        }
        Self {
            valid_transitions,
            permissions,
        }
    }

    /// The reference engine's `Default` config: a fixed simulation loop with
    /// client/server replication-appropriate permissions (§4.9).
    pub fn default_sim_loop() -> Self {
        let order = [
            "Init",
            "NetworkReceive",
            "Simulation",
            "NetworkSend",
            "Presentation",
        ];
        let mut valid_transitions = HashMap::new();
        for (i, name) in order.iter().enumerate() {
            let next = order[(i + 1) % order.len()];
            let mut set = HashSet::new();
            set.insert(next.to_string());
            valid_transitions.insert(name.to_string(), set);
        }
        let mut permissions = HashMap::new();
        permissions.insert("Init".to_string(), Permission::ReadWriteAll);
        permissions.insert("NetworkReceive".to_string(), Permission::UnownedOnly);
        permissions.insert("Simulation".to_string(), Permission::OwnedOnly);
        permissions.insert("NetworkSend".to_string(), Permission::ReadOnly);
        permissions.insert("Presentation".to_string(), Permission::ReadOnly);
        Self {
            valid_transitions,
            permissions,
        }
    }
}

/// Runtime phase state: the active configuration plus a cached
/// `(current_id, current_permission)` pair checked on every mutating call
/// (§4.9's "hot-path single-compare enforcement").
pub struct PhaseState {
    config: PhaseConfig,
    name_to_id: HashMap<String, u32>,
    id_to_name: Vec<String>,
    current_id: u32,
    current_permission: Permission,
}

impl PhaseState {
    pub fn new(config: PhaseConfig, initial_phase: &str) -> Result<Self> {
        let mut name_to_id = HashMap::new();
        let mut id_to_name = Vec::new();
        for name in config.permissions.keys() {
            if !name_to_id.contains_key(name) {
                let id = id_to_name.len() as u32;
                id_to_name.push(name.clone());
                name_to_id.insert(name.clone(), id);
            }
        }
        let &current_id = name_to_id
            .get(initial_phase)
            .ok_or_else(|| EcsError::InvalidTransitionTarget(initial_phase.to_string()))?;
        let current_permission = *config
            .permissions
            .get(initial_phase)
            .ok_or_else(|| EcsError::InvalidTransitionTarget(initial_phase.to_string()))?;
        Ok(Self {
            config,
            name_to_id,
            id_to_name,
            current_id,
            current_permission,
        })
    }

    pub fn current_name(&self) -> &str {
        &self.id_to_name[self.current_id as usize]
    }

    pub fn current_permission(&self) -> Permission {
        self.current_permission
    }

    /// Transitions to `to`, validating against the configured graph.
    /// O(1) once validated: updates the cached `(id, permission)` pair.
    pub fn transition(&mut self, to: &str) -> Result<()> {
        let from = self.current_name().to_string();
        let allowed = self
            .config
            .valid_transitions
            .get(&from)
            .map(|set| set.contains(to))
            .unwrap_or(false);
        if !allowed {
            if !self.name_to_id.contains_key(to) {
                return Err(EcsError::InvalidTransitionTarget(to.to_string()));
            }
            return Err(EcsError::WrongPhaseTransition {
                from,
                to: to.to_string(),
            });
        }
        let &id = self.name_to_id.get(to).unwrap();
        self.current_id = id;
        self.current_permission = *self.config.permissions.get(to).unwrap();
        Ok(())
    }

    /// Checks whether a mutating call against a component with authority
    /// bit `owns_component` is permitted under the current phase (§4.9).
    pub fn check_write(&self, owns_component: bool) -> Result<()> {
        let ok = match self.current_permission {
            Permission::ReadWriteAll => true,
            Permission::ReadOnly => false,
            Permission::OwnedOnly => owns_component,
            Permission::UnownedOnly => !owns_component,
        };
        if ok {
            Ok(())
        } else {
            Err(EcsError::WrongPhase {
                permission: format!("{:?}", self.current_permission),
            })
        }
    }
}
