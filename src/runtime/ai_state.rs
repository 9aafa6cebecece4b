use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::runtime::alert::{AlertKind, Alerts};
use crate::runtime::world::{AlertPost, EntityRef, Order};

/// Number of coordinate pairs `SetXY`/`GetXY` can remember.
pub const STORED_XY_SLOTS: usize = 16;

/// Capacity of the waypoint queue. `AddWaypoint` fails once it is full.
pub const MAX_WAYPOINTS: usize = 8;

/// Position of the VM for one entity within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VmState {
    #[default]
    Idle,
    Running,
    /// Instruction ceiling hit; the next tick restarts at the top.
    Suspended,
    /// An explicit `End`/`Stop` ended the tick early.
    Terminated,
}

/// The writable temporaries (`tmpx`, `tmpy`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ScriptVars {
    pub x: i32,
    pub y: i32,
    pub distance: i32,
    pub turn: i32,
    pub argument: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: i32,
    pub y: i32,
}

/// Per-entity runtime state. Owned by exactly one live entity and mutated
/// only by that entity's script run and by alert delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiState {
    pub entity: EntityRef,

    pub program_counter: usize,
    pub vm_state: VmState,
    /// Accumulator of the expression being evaluated; keeps the last result.
    pub working_value: i32,
    /// Last operand folded into the accumulator.
    pub indexed_operand: i32,
    pub vars: ScriptVars,
    /// Result of the most recent predicate.
    pub last_condition: bool,

    pub alerts: Alerts,
    /// Alerts the script set during its current run.
    #[serde(skip)]
    pub raised: Alerts,
    /// Tick at which `IfTimeOut` becomes true.
    pub timer: Option<u32>,
    pub state: i32,
    pub content: i32,
    /// Damage kind applied by `DamageTarget`.
    pub damage_kind: i32,

    pub target: Option<EntityRef>,
    pub old_target: Option<EntityRef>,
    pub owner: Option<EntityRef>,
    pub child: Option<EntityRef>,
    pub attacker: Option<EntityRef>,
    pub bumper: Option<EntityRef>,
    pub helper: Option<EntityRef>,
    pub order: Order,

    pub waypoints: VecDeque<Waypoint>,
    pub stored_xy: [(i32, i32); STORED_XY_SLOTS],
}

impl AiState {
    pub fn new(entity: EntityRef) -> Self {
        Self {
            entity,
            program_counter: 0,
            vm_state: VmState::Idle,
            working_value: 0,
            indexed_operand: 0,
            vars: ScriptVars::default(),
            last_condition: false,
            alerts: Alerts::empty(),
            raised: Alerts::empty(),
            timer: None,
            state: 0,
            content: 0,
            damage_kind: 0,
            target: None,
            old_target: None,
            owner: None,
            child: None,
            attacker: None,
            bumper: None,
            helper: None,
            order: Order { value: 0, rank: 0 },
            waypoints: VecDeque::new(),
            stored_xy: [(0, 0); STORED_XY_SLOTS],
        }
    }

    /// State of a freshly spawned entity: `Spawned` pending, targeting itself.
    pub fn spawned(entity: EntityRef) -> Self {
        let mut ai = AiState::new(entity);
        ai.alerts.raise(AlertKind::Spawned);
        ai.target = Some(entity);
        ai
    }

    pub fn set_target(&mut self, target: EntityRef) {
        if self.target != Some(target) {
            self.old_target = self.target;
        }
        self.target = Some(target);
    }

    pub fn timed_out(&self, clock: u32) -> bool {
        self.timer.is_some_and(|deadline| clock >= deadline)
    }

    pub fn next_waypoint(&self) -> Option<Waypoint> {
        self.waypoints.front().copied()
    }

    /// Drops the reached waypoint. Raises `AtLastWaypoint` once the queue
    /// runs dry.
    pub fn advance_waypoint(&mut self) {
        self.waypoints.pop_front();
        if self.waypoints.is_empty() {
            self.alerts.raise(AlertKind::AtLastWaypoint);
        }
    }

    /// Sets an alert from inside the script. It stays pending past the
    /// end-of-run clearing even if it was already pending before.
    pub fn raise_alert(&mut self, kind: AlertKind) {
        self.alerts.raise(kind);
        self.raised.raise(kind);
    }

    /// Alerts that were pending at the start of a run and were not set
    /// again by the script.
    pub fn consumed_alerts(&self, observed: Alerts) -> Alerts {
        observed.difference(self.raised)
    }

    /// Applies an alert that was posted during an earlier tick.
    pub fn deliver(&mut self, post: AlertPost) {
        self.alerts.raise(post.alert);
        match post.alert {
            AlertKind::Attacked => self.attacker = post.source.or(self.attacker),
            AlertKind::Bumped => self.bumper = post.source.or(self.bumper),
            AlertKind::CalledForHelp => self.helper = post.source.or(self.helper),
            AlertKind::Ordered => {
                if let Some(order) = post.order {
                    self.order = order;
                }
            }
            AlertKind::AtWaypoint => self.advance_waypoint(),
            _ => {}
        }
    }
}
