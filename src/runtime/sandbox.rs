//! A small deterministic world for the CLI runner and for tests.
//!
//! Entities live in a `Vec` indexed by their [`EntityRef`]; removed entities
//! leave a hole so handles are never reused. Every mutating call is recorded
//! as a [`WorldEvent`] so a run can be replayed and compared.

use crate::lang::idsz::Idsz;
use crate::runtime::world::{
    AlertPost, Attribute, Criteria, EntityRef, IdszSlot, Movement, Relation, Resource, WorldAccess,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxEntity {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub turn: i32,
    pub life: i32,
    pub max_life: i32,
    pub mana: i32,
    pub team: i32,
    pub money: i32,
    pub level: i32,
    pub experience: i32,
    pub player: bool,
    pub idsz: Vec<Idsz>,
    pub inventory: Vec<Idsz>,
    pub movement: Option<Movement>,
}

impl SandboxEntity {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            z: 0,
            turn: 0,
            life: 100,
            max_life: 100,
            mana: 0,
            team: 13,
            money: 0,
            level: 1,
            experience: 0,
            player: false,
            idsz: Vec::new(),
            inventory: Vec::new(),
            movement: None,
        }
    }

    pub fn on_team(mut self, team: i32) -> Self {
        self.team = team;
        self
    }

    pub fn with_life(mut self, life: i32) -> Self {
        self.life = life;
        self.max_life = self.max_life.max(life);
        self
    }

    pub fn with_idsz(mut self, idsz: Idsz) -> Self {
        self.idsz.push(idsz);
        self
    }

    pub fn carrying(mut self, idsz: Idsz) -> Self {
        self.inventory.push(idsz);
        self
    }

    pub fn as_player(mut self) -> Self {
        self.player = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    Damage { target: EntityRef, amount: i32, kind: i32, source: EntityRef },
    Heal { target: EntityRef, amount: i32 },
    Kill { target: EntityRef, source: EntityRef },
    Teleport { entity: EntityRef, x: i32, y: i32 },
    Spawn { spawner: EntityRef, child: EntityRef },
    Remove { entity: EntityRef },
    Message { from: EntityRef, message: i32, nearby_only: bool },
    Sound { from: EntityRef, sound: i32 },
    Particle { from: EntityRef, particle: i32, x: i32, y: i32 },
    Move { entity: EntityRef, movement: Movement },
    Action { entity: EntityRef, action: i32 },
    Give { target: EntityRef, resource: Resource, amount: i32 },
    JoinTeam { entity: EntityRef, team: i32 },
}

#[derive(Debug, Clone)]
pub struct SandboxWorld {
    entities: Vec<Option<SandboxEntity>>,
    clock: u32,
    seed: u32,
    events: Vec<WorldEvent>,
    posted: Vec<(EntityRef, AlertPost)>,
}

impl Default for SandboxWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxWorld {
    pub fn new() -> Self {
        Self::with_seed(0x2545_F491)
    }

    pub fn with_seed(seed: u32) -> Self {
        Self {
            entities: Vec::new(),
            clock: 0,
            seed,
            events: Vec::new(),
            posted: Vec::new(),
        }
    }

    pub fn add(&mut self, entity: SandboxEntity) -> EntityRef {
        self.entities.push(Some(entity));
        EntityRef((self.entities.len() - 1) as u32)
    }

    pub fn entity(&self, entity: EntityRef) -> Option<&SandboxEntity> {
        self.entities.get(entity.0 as usize).and_then(Option::as_ref)
    }

    pub fn entity_mut(&mut self, entity: EntityRef) -> Option<&mut SandboxEntity> {
        self.entities
            .get_mut(entity.0 as usize)
            .and_then(Option::as_mut)
    }

    pub fn live_entities(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.entities
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| EntityRef(index as u32))
    }

    pub fn set_clock(&mut self, clock: u32) {
        self.clock = clock;
    }

    pub fn advance_clock(&mut self) {
        self.clock = self.clock.wrapping_add(1);
    }

    pub fn events(&self) -> &[WorldEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    /// Alerts scripts posted directly to the world (outside a director).
    pub fn take_posted(&mut self) -> Vec<(EntityRef, AlertPost)> {
        std::mem::take(&mut self.posted)
    }

    fn distance(a: &SandboxEntity, b: &SandboxEntity) -> i32 {
        let dx = (a.x as i64 - b.x as i64).abs();
        let dy = (a.y as i64 - b.y as i64).abs();
        (dx + dy).min(i32::MAX as i64) as i32
    }

    fn matches(origin: &SandboxEntity, candidate: &SandboxEntity, criteria: &Criteria) -> bool {
        let relation = match criteria.relation {
            Relation::Enemy => candidate.team != origin.team,
            Relation::Friend => candidate.team == origin.team,
            Relation::Any => true,
        };
        let distance = Self::distance(origin, candidate);
        relation
            && (!criteria.alive_only || candidate.life > 0)
            && criteria.max_distance.is_none_or(|max| distance <= max)
            && criteria.min_distance.is_none_or(|min| distance >= min)
            && criteria
                .idsz
                .is_none_or(|idsz| candidate.idsz.contains(&idsz) || candidate.inventory.contains(&idsz))
    }
}

impl WorldAccess for SandboxWorld {
    fn clock(&self) -> u32 {
        self.clock
    }

    fn exists(&self, entity: EntityRef) -> bool {
        self.entity(entity).is_some()
    }

    /// xorshift32, so runs with the same seed repeat exactly.
    fn random(&mut self) -> i32 {
        let mut x = self.seed;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.seed = x;
        (x & 0xFFFF) as i32
    }

    fn find_nearest_entity(&self, origin: EntityRef, criteria: &Criteria) -> Option<EntityRef> {
        let me = self.entity(origin)?;
        self.entities
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != origin.0 as usize)
            .filter_map(|(index, slot)| slot.as_ref().map(|entity| (index, entity)))
            .filter(|(_, entity)| Self::matches(me, entity, criteria))
            .min_by_key(|(index, entity)| (Self::distance(me, entity), *index))
            .map(|(index, _)| EntityRef(index as u32))
    }

    fn attribute(&self, entity: EntityRef, key: Attribute) -> Option<i32> {
        let e = self.entity(entity)?;
        Some(match key {
            Attribute::X => e.x,
            Attribute::Y => e.y,
            Attribute::Z => e.z,
            Attribute::Turn => e.turn,
            Attribute::Life => e.life,
            Attribute::MaxLife => e.max_life,
            Attribute::Mana => e.mana,
            Attribute::Team => e.team,
            Attribute::Money => e.money,
            Attribute::Level => e.level,
            Attribute::Experience => e.experience,
            Attribute::Strength | Attribute::Dexterity | Attribute::Intelligence | Attribute::Wisdom => 10,
            Attribute::IsPlayer => i32::from(e.player),
        })
    }

    fn has_idsz(&self, entity: EntityRef, idsz: Idsz, slot: IdszSlot) -> bool {
        self.entity(entity).is_some_and(|e| match slot {
            IdszSlot::Any => e.idsz.contains(&idsz),
            IdszSlot::Inventory => e.inventory.contains(&idsz),
        })
    }

    fn team_members(&self, team: i32) -> Vec<EntityRef> {
        self.entities
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.as_ref().is_some_and(|e| e.team == team))
            .map(|(index, _)| EntityRef(index as u32))
            .collect()
    }

    fn apply_damage(&mut self, target: EntityRef, amount: i32, kind: i32, source: EntityRef) -> bool {
        let Some(e) = self.entity_mut(target) else {
            return false;
        };
        e.life = e.life.saturating_sub(amount.max(0));
        self.events.push(WorldEvent::Damage {
            target,
            amount,
            kind,
            source,
        });
        true
    }

    fn heal(&mut self, target: EntityRef, amount: i32, _source: EntityRef) -> bool {
        let Some(e) = self.entity_mut(target) else {
            return false;
        };
        e.life = e.life.saturating_add(amount.max(0)).min(e.max_life);
        self.events.push(WorldEvent::Heal { target, amount });
        true
    }

    fn kill(&mut self, target: EntityRef, source: EntityRef) -> bool {
        let Some(e) = self.entity_mut(target) else {
            return false;
        };
        e.life = 0;
        self.events.push(WorldEvent::Kill { target, source });
        true
    }

    fn teleport(&mut self, entity: EntityRef, x: i32, y: i32) -> bool {
        let Some(e) = self.entity_mut(entity) else {
            return false;
        };
        e.x = x;
        e.y = y;
        self.events.push(WorldEvent::Teleport { entity, x, y });
        true
    }

    fn spawn(&mut self, spawner: EntityRef, x: i32, y: i32, turn: i32) -> Option<EntityRef> {
        let team = self.entity(spawner)?.team;
        let mut child = SandboxEntity::new(x, y).on_team(team);
        child.turn = turn;
        let child = self.add(child);
        self.events.push(WorldEvent::Spawn { spawner, child });
        Some(child)
    }

    fn remove(&mut self, entity: EntityRef) -> bool {
        match self.entities.get_mut(entity.0 as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                self.events.push(WorldEvent::Remove { entity });
                true
            }
            _ => false,
        }
    }

    fn post_alert(&mut self, target: EntityRef, post: AlertPost) {
        self.posted.push((target, post));
    }

    fn send_message(&mut self, from: EntityRef, message: i32, nearby_only: bool) {
        self.events.push(WorldEvent::Message {
            from,
            message,
            nearby_only,
        });
    }

    fn play_sound(&mut self, from: EntityRef, sound: i32) {
        self.events.push(WorldEvent::Sound { from, sound });
    }

    fn spawn_particle(&mut self, from: EntityRef, particle: i32, x: i32, y: i32) -> bool {
        if !self.exists(from) {
            return false;
        }
        self.events.push(WorldEvent::Particle { from, particle, x, y });
        true
    }

    fn set_movement(&mut self, entity: EntityRef, movement: Movement) -> bool {
        let Some(e) = self.entity_mut(entity) else {
            return false;
        };
        e.movement = Some(movement);
        self.events.push(WorldEvent::Move { entity, movement });
        true
    }

    fn do_action(&mut self, entity: EntityRef, action: i32) -> bool {
        if !self.exists(entity) {
            return false;
        }
        self.events.push(WorldEvent::Action { entity, action });
        true
    }

    fn give(&mut self, target: EntityRef, resource: Resource, amount: i32, _source: EntityRef) -> bool {
        let Some(e) = self.entity_mut(target) else {
            return false;
        };
        match resource {
            Resource::Money => e.money = e.money.saturating_add(amount),
            Resource::Experience => e.experience = e.experience.saturating_add(amount),
        }
        self.events.push(WorldEvent::Give {
            target,
            resource,
            amount,
        });
        true
    }

    fn join_team(&mut self, entity: EntityRef, team: i32) -> bool {
        let Some(e) = self.entity_mut(entity) else {
            return false;
        };
        e.team = team;
        self.events.push(WorldEvent::JoinTeam { entity, team });
        true
    }
}
