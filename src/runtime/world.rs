//! The narrow calling contract between the interpreter and the game world.
//!
//! The VM never stores entities, runs spatial queries or draws anything. Every
//! built-in that reaches beyond the current entity's [`AiState`] goes through
//! [`WorldAccess`], and every entity it hands back is revalidated with
//! [`WorldAccess::exists`] before use on a later instruction or tick.
//!
//! [`AiState`]: crate::runtime::ai_state::AiState

use serde::{Deserialize, Serialize};

use crate::lang::idsz::Idsz;
use crate::runtime::alert::AlertKind;

/// Opaque handle of a world entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef(pub u32);

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Numeric properties a script can read from any entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    X,
    Y,
    Z,
    Turn,
    Life,
    MaxLife,
    Mana,
    Team,
    Money,
    Level,
    Experience,
    Strength,
    Dexterity,
    Intelligence,
    Wisdom,
    IsPlayer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Enemy,
    Friend,
    Any,
}

/// Filter for [`WorldAccess::find_nearest_entity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criteria {
    pub relation: Relation,
    pub max_distance: Option<i32>,
    pub min_distance: Option<i32>,
    pub idsz: Option<Idsz>,
    pub alive_only: bool,
}

impl Criteria {
    pub fn new(relation: Relation) -> Self {
        Self {
            relation,
            max_distance: None,
            min_distance: None,
            idsz: None,
            alive_only: true,
        }
    }

    pub fn within(mut self, distance: i32) -> Self {
        self.max_distance = Some(distance);
        self
    }

    pub fn beyond(mut self, distance: i32) -> Self {
        self.min_distance = Some(distance);
        self
    }

    pub fn with_idsz(mut self, idsz: Idsz) -> Self {
        self.idsz = Some(idsz);
        self
    }
}

/// Where to look for an IDSZ on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdszSlot {
    /// Parent, type, skill or special IDSZ of the entity itself.
    Any,
    /// Anything carried in the inventory or hands.
    Inventory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Movement {
    Run,
    Walk,
    Sneak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Money,
    Experience,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Order {
    pub value: i32,
    /// Position of the receiver among everyone given the same order.
    pub rank: i32,
}

/// An alert addressed to another entity. Delivery is deferred to the start of
/// the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertPost {
    pub alert: AlertKind,
    pub source: Option<EntityRef>,
    pub order: Option<Order>,
}

impl AlertPost {
    pub fn new(alert: AlertKind) -> Self {
        Self {
            alert,
            source: None,
            order: None,
        }
    }

    pub fn from(mut self, source: EntityRef) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }
}

/// Services the built-in operations consume. Implemented by the game, never
/// by this crate except for the in-memory [`SandboxWorld`].
///
/// Methods returning `bool` report whether the effect happened; `false`
/// typically means the entity no longer exists.
///
/// [`SandboxWorld`]: crate::runtime::sandbox::SandboxWorld
pub trait WorldAccess {
    /// Current logic tick.
    fn clock(&self) -> u32;

    fn exists(&self, entity: EntityRef) -> bool;

    /// Deterministic pseudo random value in `0..=0xFFFF`.
    fn random(&mut self) -> i32;

    fn find_nearest_entity(&self, origin: EntityRef, criteria: &Criteria) -> Option<EntityRef>;

    fn attribute(&self, entity: EntityRef, key: Attribute) -> Option<i32>;

    fn has_idsz(&self, entity: EntityRef, idsz: Idsz, slot: IdszSlot) -> bool;

    /// Entities on `team`, in a stable order.
    fn team_members(&self, team: i32) -> Vec<EntityRef>;

    fn apply_damage(&mut self, target: EntityRef, amount: i32, kind: i32, source: EntityRef) -> bool;

    fn heal(&mut self, target: EntityRef, amount: i32, source: EntityRef) -> bool;

    fn kill(&mut self, target: EntityRef, source: EntityRef) -> bool;

    fn teleport(&mut self, entity: EntityRef, x: i32, y: i32) -> bool;

    fn spawn(&mut self, spawner: EntityRef, x: i32, y: i32, turn: i32) -> Option<EntityRef>;

    fn remove(&mut self, entity: EntityRef) -> bool;

    fn post_alert(&mut self, target: EntityRef, post: AlertPost);

    fn send_message(&mut self, from: EntityRef, message: i32, nearby_only: bool);

    fn play_sound(&mut self, from: EntityRef, sound: i32);

    fn spawn_particle(&mut self, from: EntityRef, particle: i32, x: i32, y: i32) -> bool;

    fn set_movement(&mut self, entity: EntityRef, movement: Movement) -> bool;

    fn do_action(&mut self, entity: EntityRef, action: i32) -> bool;

    fn give(&mut self, target: EntityRef, resource: Resource, amount: i32, source: EntityRef) -> bool;

    fn join_team(&mut self, entity: EntityRef, team: i32) -> bool;
}
