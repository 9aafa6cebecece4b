//! Per-tick driver: runs every live entity's script once, in spawn order.
//!
//! Alerts one entity posts to another are never applied immediately. They go
//! into a mailbox that is emptied at the start of the next tick, so no script
//! ever observes a change another script made to it within the same tick.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::bytecode::ir::CompiledScript;
use crate::lang::idsz::Idsz;
use crate::runtime::ai_state::AiState;
use crate::runtime::alert::Alerts;
use crate::runtime::vm::{TickOutcome, Vm, VmConfig};
use crate::runtime::world::{
    AlertPost, Attribute, Criteria, EntityRef, IdszSlot, Movement, Resource, WorldAccess,
};

#[derive(Debug, Clone)]
pub struct Actor {
    pub ai: AiState,
    pub script: Arc<CompiledScript>,
}

impl Actor {
    pub fn entity(&self) -> EntityRef {
        self.ai.entity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub completed: usize,
    pub halted: usize,
    pub suspended: usize,
    /// Alerts delivered from the mailbox at the start of the tick.
    pub delivered: usize,
    /// Actors dropped because the world no longer has their entity.
    pub removed: usize,
}

impl TickReport {
    pub fn ran(&self) -> usize {
        self.completed + self.halted + self.suspended
    }

    fn count(&mut self, outcome: TickOutcome) {
        match outcome {
            TickOutcome::Completed => self.completed += 1,
            TickOutcome::Halted => self.halted += 1,
            TickOutcome::Suspended => self.suspended += 1,
        }
    }
}

pub struct Director {
    vm: Vm,
    actors: Vec<Actor>,
    mailbox: Vec<(EntityRef, AlertPost)>,
}

impl Default for Director {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}

impl Director {
    pub fn new(config: VmConfig) -> Self {
        Self::with_vm(Vm::with_config(config))
    }

    pub fn with_vm(vm: Vm) -> Self {
        Self {
            vm,
            actors: Vec::new(),
            mailbox: Vec::new(),
        }
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }

    /// Starts running `script` for `entity`. The new state has `Spawned`
    /// pending and targets the entity itself. Respawning an entity replaces
    /// its state.
    pub fn spawn(&mut self, entity: EntityRef, script: Arc<CompiledScript>) -> &mut AiState {
        let actor = Actor {
            ai: AiState::spawned(entity),
            script,
        };
        let index = match self.position(entity) {
            Some(index) => {
                self.actors[index] = actor;
                index
            }
            None => {
                self.actors.push(actor);
                self.actors.len() - 1
            }
        };
        &mut self.actors[index].ai
    }

    /// Discards the entity's state and any mail still addressed to it.
    pub fn despawn(&mut self, entity: EntityRef) -> bool {
        self.mailbox.retain(|(target, _)| *target != entity);
        match self.position(entity) {
            Some(index) => {
                self.actors.remove(index);
                true
            }
            None => false,
        }
    }

    /// Queues an alert for delivery at the start of the next tick.
    pub fn post_alert(&mut self, target: EntityRef, post: AlertPost) {
        self.mailbox.push((target, post));
    }

    pub fn pending_alerts(&self) -> usize {
        self.mailbox.len()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn ai(&self, entity: EntityRef) -> Option<&AiState> {
        self.position(entity).map(|index| &self.actors[index].ai)
    }

    pub fn ai_mut(&mut self, entity: EntityRef) -> Option<&mut AiState> {
        self.position(entity).map(|index| &mut self.actors[index].ai)
    }

    fn position(&self, entity: EntityRef) -> Option<usize> {
        self.actors.iter().position(|actor| actor.entity() == entity)
    }

    pub fn tick(&mut self, world: &mut dyn WorldAccess) -> TickReport {
        let mut report = TickReport::default();

        for (target, post) in std::mem::take(&mut self.mailbox) {
            match self.ai_mut(target) {
                Some(ai) => {
                    ai.deliver(post);
                    report.delivered += 1;
                }
                None => trace!(%target, alert = %post.alert, "dropping alert for unknown entity"),
            }
        }

        let before = self.actors.len();
        self.actors.retain(|actor| world.exists(actor.entity()));
        report.removed += before - self.actors.len();

        let mut outbox = Vec::new();
        for actor in &mut self.actors {
            // removed earlier in this tick by another script
            if !world.exists(actor.entity()) {
                continue;
            }

            let observed = actor.ai.alerts;
            actor.ai.raised = Alerts::empty();
            let mut relay = Relay {
                world: &mut *world,
                outbox: &mut outbox,
            };
            let outcome = self.vm.run(&actor.script, &mut actor.ai, &mut relay);
            let consumed = actor.ai.consumed_alerts(observed);
            actor.ai.alerts.remove(consumed);
            report.count(outcome);
        }

        let before = self.actors.len();
        self.actors.retain(|actor| world.exists(actor.entity()));
        report.removed += before - self.actors.len();

        self.mailbox.append(&mut outbox);

        debug!(
            clock = world.clock(),
            ran = report.ran(),
            halted = report.halted,
            suspended = report.suspended,
            removed = report.removed,
            "tick"
        );
        report
    }
}

/// Passes everything through to the real world except alert posts, which
/// are held back for the next tick.
struct Relay<'a, W: WorldAccess + ?Sized> {
    world: &'a mut W,
    outbox: &'a mut Vec<(EntityRef, AlertPost)>,
}

impl<W: WorldAccess + ?Sized> WorldAccess for Relay<'_, W> {
    fn clock(&self) -> u32 {
        self.world.clock()
    }

    fn exists(&self, entity: EntityRef) -> bool {
        self.world.exists(entity)
    }

    fn random(&mut self) -> i32 {
        self.world.random()
    }

    fn find_nearest_entity(&self, origin: EntityRef, criteria: &Criteria) -> Option<EntityRef> {
        self.world.find_nearest_entity(origin, criteria)
    }

    fn attribute(&self, entity: EntityRef, key: Attribute) -> Option<i32> {
        self.world.attribute(entity, key)
    }

    fn has_idsz(&self, entity: EntityRef, idsz: Idsz, slot: IdszSlot) -> bool {
        self.world.has_idsz(entity, idsz, slot)
    }

    fn team_members(&self, team: i32) -> Vec<EntityRef> {
        self.world.team_members(team)
    }

    fn apply_damage(&mut self, target: EntityRef, amount: i32, kind: i32, source: EntityRef) -> bool {
        self.world.apply_damage(target, amount, kind, source)
    }

    fn heal(&mut self, target: EntityRef, amount: i32, source: EntityRef) -> bool {
        self.world.heal(target, amount, source)
    }

    fn kill(&mut self, target: EntityRef, source: EntityRef) -> bool {
        self.world.kill(target, source)
    }

    fn teleport(&mut self, entity: EntityRef, x: i32, y: i32) -> bool {
        self.world.teleport(entity, x, y)
    }

    fn spawn(&mut self, spawner: EntityRef, x: i32, y: i32, turn: i32) -> Option<EntityRef> {
        self.world.spawn(spawner, x, y, turn)
    }

    fn remove(&mut self, entity: EntityRef) -> bool {
        self.world.remove(entity)
    }

    fn post_alert(&mut self, target: EntityRef, post: AlertPost) {
        self.outbox.push((target, post));
    }

    fn send_message(&mut self, from: EntityRef, message: i32, nearby_only: bool) {
        self.world.send_message(from, message, nearby_only)
    }

    fn play_sound(&mut self, from: EntityRef, sound: i32) {
        self.world.play_sound(from, sound)
    }

    fn spawn_particle(&mut self, from: EntityRef, particle: i32, x: i32, y: i32) -> bool {
        self.world.spawn_particle(from, particle, x, y)
    }

    fn set_movement(&mut self, entity: EntityRef, movement: Movement) -> bool {
        self.world.set_movement(entity, movement)
    }

    fn do_action(&mut self, entity: EntityRef, action: i32) -> bool {
        self.world.do_action(entity, action)
    }

    fn give(&mut self, target: EntityRef, resource: Resource, amount: i32, source: EntityRef) -> bool {
        self.world.give(target, resource, amount, source)
    }

    fn join_team(&mut self, entity: EntityRef, team: i32) -> bool {
        self.world.join_team(entity, team)
    }
}
