//! The built-in operation table.
//!
//! Every verb and predicate a script can name lives in one dense array built
//! by [`builtin_table!`]. The macro emits the [`Builtin`] enum and the
//! descriptor array from the same list, so an operation's index can never
//! drift from its handler. Operations are appended at the end only: the index
//! is baked into compiled bytecode.

use tracing::info;

use crate::lang::idsz::Idsz;
use crate::runtime::ai_state::{AiState, MAX_WAYPOINTS, STORED_XY_SLOTS, Waypoint};
use crate::runtime::alert::{AlertKind, Alerts};
use crate::runtime::world::{
    AlertPost, Attribute, Criteria, EntityRef, IdszSlot, Movement, Order, Relation, Resource,
    WorldAccess,
};

/// Search radius of the `Nearby` target finders.
pub const NEARBY_RANGE: i32 = 384;
/// Search radius of the `Wide` target finders.
pub const WIDE_RANGE: i32 = 768;

/// What the VM does after a built-in returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VmSignal {
    Continue,
    /// The call failed or the predicate was false: skip the attached block.
    Skip,
    /// End this entity's run for the current tick.
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinClass {
    Predicate,
    Verb,
    /// Handled by the compiler and VM directly (`Else`).
    Flow,
}

pub type BuiltinFn = fn(&mut AiState, &mut dyn WorldAccess) -> VmSignal;

pub struct BuiltinDef {
    pub name: &'static str,
    pub class: BuiltinClass,
    pub handler: BuiltinFn,
}

impl std::fmt::Debug for BuiltinDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinDef")
            .field("name", &self.name)
            .field("class", &self.class)
            .finish()
    }
}

macro_rules! builtin_table {
    ($($variant:ident => $class:ident, $handler:path;)*) => {
        /// Dense operation ids. `Builtin::X as u16` is the bytecode index.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum Builtin {
            $($variant,)*
        }

        impl Builtin {
            pub const ALL: &'static [Builtin] = &[$(Builtin::$variant,)*];
        }

        static BUILTINS: &[BuiltinDef] = &[
            $(BuiltinDef {
                name: stringify!($variant),
                class: BuiltinClass::$class,
                handler: $handler,
            },)*
        ];
    };
}

builtin_table! {
    // Flow
    Else => Flow, do_nothing;
    End => Verb, halt;
    Stop => Verb, halt;
    DoNothing => Verb, do_nothing;

    // Alert bits
    SetAlertBit => Verb, set_alert_bit;
    ClearAlertBit => Verb, clear_alert_bit;
    TestAlertBit => Predicate, test_alert_bit;
    SetAlert => Verb, set_alert;
    ClearAlert => Verb, clear_alert;
    TestAlert => Predicate, test_alert;

    // Bit helpers
    SetBit => Verb, set_bit;
    ClearBit => Verb, clear_bit;
    TestBit => Predicate, test_bit;
    SetBits => Verb, set_bits;
    ClearBits => Verb, clear_bits;
    TestBits => Predicate, test_bits;

    // Alert predicates
    IfSpawned => Predicate, if_spawned;
    IfAttacked => Predicate, if_attacked;
    IfBumped => Predicate, if_bumped;
    IfOrdered => Predicate, if_ordered;
    IfCalledForHelp => Predicate, if_called_for_help;
    IfKilled => Predicate, if_killed;
    IfTargetKilled => Predicate, if_target_killed;
    IfAtWaypoint => Predicate, if_at_waypoint;
    IfAtLastWaypoint => Predicate, if_at_last_waypoint;
    IfHealed => Predicate, if_healed;
    IfGrabbed => Predicate, if_grabbed;
    IfDropped => Predicate, if_dropped;
    IfUsed => Predicate, if_used;
    IfScoredAHit => Predicate, if_scored_a_hit;
    IfBored => Predicate, if_bored;
    IfBlocked => Predicate, if_blocked;
    IfHitGround => Predicate, if_hit_ground;
    IfLevelUp => Predicate, if_level_up;
    IfInWater => Predicate, if_in_water;
    IfCrushed => Predicate, if_crushed;
    IfLeaderKilled => Predicate, if_leader_killed;
    IfChanged => Predicate, if_changed;

    // Timer, state and content
    SetTime => Verb, set_time;
    IfTimeOut => Predicate, if_time_out;
    SetState => Verb, set_state;
    GetState => Verb, get_state;
    IfStateIs => Predicate, if_state_is;
    IfStateIsNot => Predicate, if_state_is_not;
    IfStateIsOdd => Predicate, if_state_is_odd;
    IfStateIs0 => Predicate, if_state_is_0;
    IfStateIs1 => Predicate, if_state_is_1;
    IfStateIs2 => Predicate, if_state_is_2;
    IfStateIs3 => Predicate, if_state_is_3;
    SetContent => Verb, set_content;
    GetContent => Verb, get_content;
    IfContentIs => Predicate, if_content_is;

    // Comparison
    IfXIsLessThanY => Predicate, if_x_is_less_than_y;
    IfYIsLessThanX => Predicate, if_y_is_less_than_x;
    IfXIsEqualToY => Predicate, if_x_is_equal_to_y;
    IfXIsMoreThanY => Predicate, if_x_is_more_than_y;

    // Stored coordinates
    SetXY => Verb, set_xy;
    GetXY => Verb, get_xy;
    AddXY => Verb, add_xy;

    // Waypoints
    ClearWaypoints => Verb, clear_waypoints;
    AddWaypoint => Verb, add_waypoint;

    // Targeting
    SetTargetToNearbyEnemy => Verb, set_target_to_nearby_enemy;
    SetTargetToNearestEnemy => Verb, set_target_to_nearest_enemy;
    SetTargetToNearestFriend => Verb, set_target_to_nearest_friend;
    SetTargetToNearestLifeform => Verb, set_target_to_nearest_lifeform;
    SetTargetToWideEnemy => Verb, set_target_to_wide_enemy;
    SetTargetToWhoeverAttacked => Verb, set_target_to_whoever_attacked;
    SetTargetToWhoeverBumped => Verb, set_target_to_whoever_bumped;
    SetTargetToWhoeverCalledForHelp => Verb, set_target_to_whoever_called_for_help;
    SetTargetToOldTarget => Verb, set_target_to_old_target;
    SetOldTarget => Verb, set_old_target;
    SetTargetToSelf => Verb, set_target_to_self;
    SetTargetToOwner => Verb, set_target_to_owner;
    SetOwnerToTarget => Verb, set_owner_to_target;
    SetTargetToChild => Verb, set_target_to_child;
    SetTargetToNearestBlahID => Verb, set_target_to_nearest_blah_id;

    // Target predicates
    IfTargetIsSelf => Predicate, if_target_is_self;
    IfTargetIsOldTarget => Predicate, if_target_is_old_target;
    IfTargetIsAlive => Predicate, if_target_is_alive;
    IfTargetIsOnOtherTeam => Predicate, if_target_is_on_other_team;
    IfTargetIsOnSameTeam => Predicate, if_target_is_on_same_team;
    IfTargetHasID => Predicate, if_target_has_id;
    IfTargetHasItemID => Predicate, if_target_has_item_id;
    IfTargetIsHurt => Predicate, if_target_is_hurt;
    IfTargetIsAPlayer => Predicate, if_target_is_a_player;
    IfDistanceIsMoreThanTurn => Predicate, if_distance_is_more_than_turn;

    // World verbs
    SetDamageType => Verb, set_damage_type;
    DamageTarget => Verb, damage_target;
    HealTarget => Verb, heal_target;
    HealSelf => Verb, heal_self;
    KillTarget => Verb, kill_target;
    Teleport => Verb, teleport;
    TeleportTarget => Verb, teleport_target;
    SpawnCharacter => Verb, spawn_character;
    SpawnParticle => Verb, spawn_particle;
    PlaySound => Verb, play_sound;
    SendMessage => Verb, send_message;
    SendMessageNear => Verb, send_message_near;
    CallForHelp => Verb, call_for_help;
    IssueOrder => Verb, issue_order;
    OrderTarget => Verb, order_target;
    GiveMoneyToTarget => Verb, give_money_to_target;
    GiveExperienceToTarget => Verb, give_experience_to_target;
    JoinTargetTeam => Verb, join_target_team;
    GoPoof => Verb, go_poof;
    PoofTarget => Verb, poof_target;
    Run => Verb, run;
    Walk => Verb, walk;
    Sneak => Verb, sneak;
    DoAction => Verb, do_action;
    DebugMessage => Verb, debug_message;
}

impl Builtin {
    pub fn index(self) -> u16 {
        self as u16
    }

    pub fn from_index(index: u16) -> Option<Builtin> {
        Builtin::ALL.get(index as usize).copied()
    }

    pub fn def(self) -> &'static BuiltinDef {
        &BUILTINS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.def().name
    }
}

/// Read-only view of the operation table, passed to the compiler and VM.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinTable {
    defs: &'static [BuiltinDef],
}

impl BuiltinTable {
    pub fn standard() -> Self {
        Self { defs: BUILTINS }
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'static BuiltinDef> {
        self.defs.get(index)
    }

    pub fn find(&self, name: &str) -> Option<(u16, &'static BuiltinDef)> {
        self.defs
            .iter()
            .position(|def| def.name == name)
            .map(|index| (index as u16, &self.defs[index]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &'static BuiltinDef)> {
        self.defs
            .iter()
            .enumerate()
            .map(|(index, def)| (index as u16, def))
    }
}

impl Default for BuiltinTable {
    fn default() -> Self {
        Self::standard()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn check(ai: &mut AiState, condition: bool) -> VmSignal {
    ai.last_condition = condition;
    if condition {
        VmSignal::Continue
    } else {
        VmSignal::Skip
    }
}

fn done(ok: bool) -> VmSignal {
    if ok {
        VmSignal::Continue
    } else {
        VmSignal::Skip
    }
}

/// Current target if the world still knows it.
fn live_target(ai: &AiState, world: &dyn WorldAccess) -> Option<EntityRef> {
    ai.target.filter(|target| world.exists(*target))
}

fn retarget(ai: &mut AiState, candidate: Option<EntityRef>, world: &dyn WorldAccess) -> VmSignal {
    match candidate.filter(|entity| world.exists(*entity)) {
        Some(entity) => {
            ai.set_target(entity);
            VmSignal::Continue
        }
        None => VmSignal::Skip,
    }
}

fn find_target(ai: &mut AiState, world: &mut dyn WorldAccess, criteria: Criteria) -> VmSignal {
    let found = world.find_nearest_entity(ai.entity, &criteria);
    retarget(ai, found, world)
}

fn team_of(world: &dyn WorldAccess, entity: EntityRef) -> Option<i32> {
    world.attribute(entity, Attribute::Team)
}

fn bit(shift: i32) -> i32 {
    1i32.wrapping_shl(shift as u32)
}

fn xy_slot(ai: &AiState) -> usize {
    (ai.vars.argument as usize) & (STORED_XY_SLOTS - 1)
}

// =============================================================================
// Flow
// =============================================================================

fn do_nothing(_: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    VmSignal::Continue
}

fn halt(_: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    VmSignal::Halt
}

// =============================================================================
// Alert bits
// =============================================================================

fn set_alert_bit(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    match AlertKind::from_bit(ai.vars.argument) {
        Some(kind) => {
            ai.raise_alert(kind);
            VmSignal::Continue
        }
        None => VmSignal::Skip,
    }
}

fn clear_alert_bit(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    match AlertKind::from_bit(ai.vars.argument) {
        Some(kind) => {
            ai.alerts.lower(kind);
            VmSignal::Continue
        }
        None => VmSignal::Skip,
    }
}

fn test_alert_bit(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let hit = AlertKind::from_bit(ai.vars.argument).is_some_and(|kind| ai.alerts.has(kind));
    check(ai, hit)
}

fn set_alert(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    ai.alerts |= Alerts::from_bits_retain(ai.vars.argument as u32);
    VmSignal::Continue
}

fn clear_alert(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    ai.alerts.remove(Alerts::from_bits_retain(ai.vars.argument as u32));
    VmSignal::Continue
}

fn test_alert(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let mask = Alerts::from_bits_retain(ai.vars.argument as u32);
    let hit = !mask.is_empty() && ai.alerts.contains(mask);
    check(ai, hit)
}

// =============================================================================
// Bit helpers on tmpx / tmpy
// =============================================================================

fn set_bit(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    ai.vars.x |= bit(ai.vars.y);
    VmSignal::Continue
}

fn clear_bit(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    ai.vars.x &= !bit(ai.vars.y);
    VmSignal::Continue
}

fn test_bit(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let hit = ai.vars.x & bit(ai.vars.y) != 0;
    check(ai, hit)
}

fn set_bits(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    ai.vars.x |= ai.vars.y;
    VmSignal::Continue
}

fn clear_bits(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    ai.vars.x &= !ai.vars.y;
    VmSignal::Continue
}

fn test_bits(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let hit = ai.vars.x & ai.vars.y == ai.vars.y;
    check(ai, hit)
}

// =============================================================================
// Alert predicates
// =============================================================================

macro_rules! alert_predicates {
    ($($name:ident => $kind:ident;)*) => {
        $(
            fn $name(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
                let hit = ai.alerts.has(AlertKind::$kind);
                check(ai, hit)
            }
        )*
    };
}

alert_predicates! {
    if_spawned => Spawned;
    if_attacked => Attacked;
    if_bumped => Bumped;
    if_ordered => Ordered;
    if_called_for_help => CalledForHelp;
    if_killed => Killed;
    if_target_killed => TargetKilled;
    if_at_waypoint => AtWaypoint;
    if_at_last_waypoint => AtLastWaypoint;
    if_healed => Healed;
    if_grabbed => Grabbed;
    if_dropped => Dropped;
    if_used => Used;
    if_scored_a_hit => ScoredAHit;
    if_bored => Bored;
    if_blocked => Blocked;
    if_hit_ground => HitGround;
    if_level_up => LevelUp;
    if_in_water => InWater;
    if_crushed => Crushed;
    if_leader_killed => LeaderKilled;
    if_changed => Changed;
}

// =============================================================================
// Timer, state and content
// =============================================================================

fn set_time(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    ai.timer = u32::try_from(ai.vars.argument)
        .ok()
        .map(|delay| world.clock().saturating_add(delay));
    VmSignal::Continue
}

fn if_time_out(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let hit = ai.timed_out(world.clock());
    check(ai, hit)
}

fn set_state(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    ai.state = ai.vars.argument;
    VmSignal::Continue
}

fn get_state(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    ai.vars.argument = ai.state;
    VmSignal::Continue
}

fn if_state_is(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let hit = ai.state == ai.vars.argument;
    check(ai, hit)
}

fn if_state_is_not(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let hit = ai.state != ai.vars.argument;
    check(ai, hit)
}

fn if_state_is_odd(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let hit = ai.state & 1 == 1;
    check(ai, hit)
}

macro_rules! state_predicates {
    ($($name:ident => $value:literal;)*) => {
        $(
            fn $name(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
                let hit = ai.state == $value;
                check(ai, hit)
            }
        )*
    };
}

state_predicates! {
    if_state_is_0 => 0;
    if_state_is_1 => 1;
    if_state_is_2 => 2;
    if_state_is_3 => 3;
}

fn set_content(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    ai.content = ai.vars.argument;
    VmSignal::Continue
}

fn get_content(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    ai.vars.argument = ai.content;
    VmSignal::Continue
}

fn if_content_is(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let hit = ai.content == ai.vars.argument;
    check(ai, hit)
}

// =============================================================================
// Comparison
// =============================================================================

fn if_x_is_less_than_y(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let hit = ai.vars.x < ai.vars.y;
    check(ai, hit)
}

fn if_y_is_less_than_x(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let hit = ai.vars.y < ai.vars.x;
    check(ai, hit)
}

fn if_x_is_equal_to_y(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let hit = ai.vars.x == ai.vars.y;
    check(ai, hit)
}

fn if_x_is_more_than_y(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let hit = ai.vars.x > ai.vars.y;
    check(ai, hit)
}

// =============================================================================
// Stored coordinates and waypoints
// =============================================================================

fn set_xy(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let slot = xy_slot(ai);
    ai.stored_xy[slot] = (ai.vars.x, ai.vars.y);
    VmSignal::Continue
}

fn get_xy(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let (x, y) = ai.stored_xy[xy_slot(ai)];
    ai.vars.x = x;
    ai.vars.y = y;
    VmSignal::Continue
}

fn add_xy(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let slot = xy_slot(ai);
    let (x, y) = ai.stored_xy[slot];
    ai.stored_xy[slot] = (x.wrapping_add(ai.vars.x), y.wrapping_add(ai.vars.y));
    VmSignal::Continue
}

fn clear_waypoints(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    ai.waypoints.clear();
    VmSignal::Continue
}

fn add_waypoint(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    if ai.waypoints.len() >= MAX_WAYPOINTS {
        return VmSignal::Skip;
    }
    ai.waypoints.push_back(Waypoint {
        x: ai.vars.x,
        y: ai.vars.y,
    });
    VmSignal::Continue
}

// =============================================================================
// Targeting
// =============================================================================

fn set_target_to_nearby_enemy(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    find_target(ai, world, Criteria::new(Relation::Enemy).within(NEARBY_RANGE))
}

fn set_target_to_nearest_enemy(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    find_target(ai, world, Criteria::new(Relation::Enemy))
}

fn set_target_to_nearest_friend(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    find_target(ai, world, Criteria::new(Relation::Friend))
}

fn set_target_to_nearest_lifeform(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    find_target(ai, world, Criteria::new(Relation::Any))
}

fn set_target_to_wide_enemy(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    find_target(ai, world, Criteria::new(Relation::Enemy).within(WIDE_RANGE))
}

fn set_target_to_nearest_blah_id(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let idsz = Idsz(ai.vars.argument as u32);
    find_target(ai, world, Criteria::new(Relation::Any).with_idsz(idsz))
}

fn set_target_to_whoever_attacked(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let candidate = ai.attacker;
    retarget(ai, candidate, world)
}

fn set_target_to_whoever_bumped(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let candidate = ai.bumper;
    retarget(ai, candidate, world)
}

fn set_target_to_whoever_called_for_help(
    ai: &mut AiState,
    world: &mut dyn WorldAccess,
) -> VmSignal {
    let candidate = ai.helper;
    retarget(ai, candidate, world)
}

fn set_target_to_old_target(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let candidate = ai.old_target;
    retarget(ai, candidate, world)
}

fn set_old_target(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    ai.old_target = ai.target;
    VmSignal::Continue
}

fn set_target_to_self(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let me = ai.entity;
    ai.set_target(me);
    VmSignal::Continue
}

fn set_target_to_owner(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let candidate = ai.owner;
    retarget(ai, candidate, world)
}

fn set_owner_to_target(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    match live_target(ai, world) {
        Some(target) => {
            ai.owner = Some(target);
            VmSignal::Continue
        }
        None => VmSignal::Skip,
    }
}

fn set_target_to_child(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let candidate = ai.child;
    retarget(ai, candidate, world)
}

// =============================================================================
// Target predicates
// =============================================================================

fn if_target_is_self(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let hit = ai.target == Some(ai.entity);
    check(ai, hit)
}

fn if_target_is_old_target(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let hit = ai.target.is_some() && ai.target == ai.old_target;
    check(ai, hit)
}

fn if_target_is_alive(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let hit = live_target(ai, world)
        .and_then(|target| world.attribute(target, Attribute::Life))
        .is_some_and(|life| life > 0);
    check(ai, hit)
}

fn if_target_is_on_other_team(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let hit = match (live_target(ai, world), team_of(world, ai.entity)) {
        (Some(target), Some(mine)) => team_of(world, target).is_some_and(|theirs| theirs != mine),
        _ => false,
    };
    check(ai, hit)
}

fn if_target_is_on_same_team(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let hit = match (live_target(ai, world), team_of(world, ai.entity)) {
        (Some(target), Some(mine)) => team_of(world, target) == Some(mine),
        _ => false,
    };
    check(ai, hit)
}

fn if_target_has_id(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let idsz = Idsz(ai.vars.argument as u32);
    let hit = live_target(ai, world)
        .is_some_and(|target| world.has_idsz(target, idsz, IdszSlot::Any));
    check(ai, hit)
}

fn if_target_has_item_id(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let idsz = Idsz(ai.vars.argument as u32);
    let hit = live_target(ai, world)
        .is_some_and(|target| world.has_idsz(target, idsz, IdszSlot::Inventory));
    check(ai, hit)
}

fn if_target_is_hurt(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let hit = live_target(ai, world).is_some_and(|target| {
        match (
            world.attribute(target, Attribute::Life),
            world.attribute(target, Attribute::MaxLife),
        ) {
            (Some(life), Some(max)) => life > 0 && life < max,
            _ => false,
        }
    });
    check(ai, hit)
}

fn if_target_is_a_player(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let hit = live_target(ai, world)
        .and_then(|target| world.attribute(target, Attribute::IsPlayer))
        .is_some_and(|flag| flag != 0);
    check(ai, hit)
}

fn if_distance_is_more_than_turn(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    let hit = ai.vars.distance > ai.vars.turn;
    check(ai, hit)
}

// =============================================================================
// World verbs
// =============================================================================

fn set_damage_type(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    ai.damage_kind = ai.vars.argument;
    VmSignal::Continue
}

fn damage_target(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    match live_target(ai, world) {
        Some(target) => done(world.apply_damage(target, ai.vars.argument, ai.damage_kind, ai.entity)),
        None => VmSignal::Skip,
    }
}

fn heal_target(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    match live_target(ai, world) {
        Some(target) => done(world.heal(target, ai.vars.argument, ai.entity)),
        None => VmSignal::Skip,
    }
}

fn heal_self(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    done(world.heal(ai.entity, ai.vars.argument, ai.entity))
}

fn kill_target(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    match live_target(ai, world) {
        Some(target) => done(world.kill(target, ai.entity)),
        None => VmSignal::Skip,
    }
}

fn teleport(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    done(world.teleport(ai.entity, ai.vars.x, ai.vars.y))
}

fn teleport_target(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    match live_target(ai, world) {
        Some(target) => done(world.teleport(target, ai.vars.x, ai.vars.y)),
        None => VmSignal::Skip,
    }
}

fn spawn_character(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    match world.spawn(ai.entity, ai.vars.x, ai.vars.y, ai.vars.turn) {
        Some(child) => {
            ai.child = Some(child);
            VmSignal::Continue
        }
        None => VmSignal::Skip,
    }
}

fn spawn_particle(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    done(world.spawn_particle(ai.entity, ai.vars.argument, ai.vars.x, ai.vars.y))
}

fn play_sound(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    world.play_sound(ai.entity, ai.vars.argument);
    VmSignal::Continue
}

fn send_message(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    world.send_message(ai.entity, ai.vars.argument, false);
    VmSignal::Continue
}

fn send_message_near(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    world.send_message(ai.entity, ai.vars.argument, true);
    VmSignal::Continue
}

fn call_for_help(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let Some(team) = team_of(world, ai.entity) else {
        return VmSignal::Skip;
    };
    for member in world.team_members(team) {
        if member != ai.entity {
            world.post_alert(member, AlertPost::new(AlertKind::CalledForHelp).from(ai.entity));
        }
    }
    VmSignal::Continue
}

fn issue_order(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let Some(team) = team_of(world, ai.entity) else {
        return VmSignal::Skip;
    };
    let members: Vec<EntityRef> = world
        .team_members(team)
        .into_iter()
        .filter(|member| *member != ai.entity)
        .collect();
    for (rank, member) in members.into_iter().enumerate() {
        let order = Order {
            value: ai.vars.argument,
            rank: rank as i32,
        };
        world.post_alert(
            member,
            AlertPost::new(AlertKind::Ordered)
                .from(ai.entity)
                .with_order(order),
        );
    }
    VmSignal::Continue
}

fn order_target(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let Some(target) = live_target(ai, world) else {
        return VmSignal::Skip;
    };
    let order = Order {
        value: ai.vars.argument,
        rank: 0,
    };
    world.post_alert(
        target,
        AlertPost::new(AlertKind::Ordered)
            .from(ai.entity)
            .with_order(order),
    );
    VmSignal::Continue
}

fn give_money_to_target(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    match live_target(ai, world) {
        Some(target) => done(world.give(target, Resource::Money, ai.vars.argument, ai.entity)),
        None => VmSignal::Skip,
    }
}

fn give_experience_to_target(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    match live_target(ai, world) {
        Some(target) => done(world.give(target, Resource::Experience, ai.vars.argument, ai.entity)),
        None => VmSignal::Skip,
    }
}

fn join_target_team(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    match live_target(ai, world).and_then(|target| team_of(world, target)) {
        Some(team) => done(world.join_team(ai.entity, team)),
        None => VmSignal::Skip,
    }
}

/// The entity is gone afterwards, so nothing more may run on it this tick.
fn go_poof(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    world.remove(ai.entity);
    VmSignal::Halt
}

fn poof_target(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    let Some(target) = live_target(ai, world) else {
        return VmSignal::Skip;
    };
    world.remove(target);
    if target == ai.entity {
        VmSignal::Halt
    } else {
        VmSignal::Continue
    }
}

fn run(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    done(world.set_movement(ai.entity, Movement::Run))
}

fn walk(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    done(world.set_movement(ai.entity, Movement::Walk))
}

fn sneak(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    done(world.set_movement(ai.entity, Movement::Sneak))
}

fn do_action(ai: &mut AiState, world: &mut dyn WorldAccess) -> VmSignal {
    done(world.do_action(ai.entity, ai.vars.argument))
}

fn debug_message(ai: &mut AiState, _: &mut dyn WorldAccess) -> VmSignal {
    info!(
        entity = %ai.entity,
        state = ai.state,
        content = ai.content,
        argument = ai.vars.argument,
        x = ai.vars.x,
        y = ai.vars.y,
        "script debug message"
    );
    VmSignal::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::sandbox::{SandboxEntity, SandboxWorld, WorldEvent};

    fn call(builtin: Builtin, ai: &mut AiState, world: &mut SandboxWorld) -> VmSignal {
        (builtin.def().handler)(ai, world)
    }

    #[test]
    fn test_table_is_dense_and_named() {
        let table = BuiltinTable::standard();
        assert_eq!(table.len(), Builtin::ALL.len());
        for (index, builtin) in Builtin::ALL.iter().enumerate() {
            assert_eq!(builtin.index() as usize, index);
            assert_eq!(table.get(index).map(|def| def.name), Some(builtin.name()));
        }
        assert!(table.get(table.len()).is_none());
    }

    #[test]
    fn test_names_are_unique() {
        let table = BuiltinTable::standard();
        for (index, def) in table.iter() {
            assert_eq!(table.find(def.name).map(|(i, _)| i), Some(index));
        }
    }

    #[test]
    fn test_if_prefix_means_predicate() {
        for (_, def) in BuiltinTable::standard().iter() {
            if def.name.starts_with("If") {
                assert_eq!(def.class, BuiltinClass::Predicate, "{}", def.name);
            }
        }
        assert_eq!(Builtin::Else.def().class, BuiltinClass::Flow);
    }

    #[test]
    fn test_alert_bit_verbs() {
        let mut world = SandboxWorld::new();
        let me = world.add(SandboxEntity::new(0, 0));
        let mut ai = AiState::new(me);

        ai.vars.argument = AlertKind::Bumped.bit() as i32;
        assert_eq!(call(Builtin::SetAlertBit, &mut ai, &mut world), VmSignal::Continue);
        assert!(ai.alerts.has(AlertKind::Bumped));
        assert_eq!(call(Builtin::TestAlertBit, &mut ai, &mut world), VmSignal::Continue);
        assert!(ai.last_condition);

        call(Builtin::ClearAlertBit, &mut ai, &mut world);
        assert_eq!(call(Builtin::TestAlertBit, &mut ai, &mut world), VmSignal::Skip);
        assert!(!ai.last_condition);

        ai.vars.argument = 99;
        assert_eq!(call(Builtin::SetAlertBit, &mut ai, &mut world), VmSignal::Skip);
    }

    #[test]
    fn test_bit_helpers() {
        let mut world = SandboxWorld::new();
        let mut ai = AiState::new(EntityRef(0));
        ai.vars.x = 0;
        ai.vars.y = 3;
        call(Builtin::SetBit, &mut ai, &mut world);
        assert_eq!(ai.vars.x, 8);
        assert_eq!(call(Builtin::TestBit, &mut ai, &mut world), VmSignal::Continue);
        call(Builtin::ClearBit, &mut ai, &mut world);
        assert_eq!(ai.vars.x, 0);

        ai.vars.x = 0b1110;
        ai.vars.y = 0b0110;
        assert_eq!(call(Builtin::TestBits, &mut ai, &mut world), VmSignal::Continue);
        call(Builtin::ClearBits, &mut ai, &mut world);
        assert_eq!(ai.vars.x, 0b1000);
        assert_eq!(call(Builtin::TestBits, &mut ai, &mut world), VmSignal::Skip);
    }

    #[test]
    fn test_timer_round_trip() {
        let mut world = SandboxWorld::new();
        let mut ai = AiState::new(EntityRef(0));
        world.set_clock(10);
        ai.vars.argument = 5;
        call(Builtin::SetTime, &mut ai, &mut world);
        assert_eq!(ai.timer, Some(15));

        world.set_clock(14);
        assert_eq!(call(Builtin::IfTimeOut, &mut ai, &mut world), VmSignal::Skip);
        world.set_clock(15);
        assert_eq!(call(Builtin::IfTimeOut, &mut ai, &mut world), VmSignal::Continue);

        ai.vars.argument = -1;
        call(Builtin::SetTime, &mut ai, &mut world);
        assert_eq!(ai.timer, None);
    }

    #[test]
    fn test_state_and_content() {
        let mut world = SandboxWorld::new();
        let mut ai = AiState::new(EntityRef(0));
        ai.vars.argument = 2;
        call(Builtin::SetState, &mut ai, &mut world);
        assert_eq!(call(Builtin::IfStateIs2, &mut ai, &mut world), VmSignal::Continue);
        assert_eq!(call(Builtin::IfStateIsOdd, &mut ai, &mut world), VmSignal::Skip);

        ai.vars.argument = 0;
        call(Builtin::GetState, &mut ai, &mut world);
        assert_eq!(ai.vars.argument, 2);

        ai.vars.argument = 77;
        call(Builtin::SetContent, &mut ai, &mut world);
        ai.vars.argument = 0;
        call(Builtin::GetContent, &mut ai, &mut world);
        assert_eq!(ai.vars.argument, 77);
    }

    #[test]
    fn test_stored_xy_slots_wrap() {
        let mut world = SandboxWorld::new();
        let mut ai = AiState::new(EntityRef(0));
        ai.vars.argument = 17;
        ai.vars.x = 4;
        ai.vars.y = 5;
        call(Builtin::SetXY, &mut ai, &mut world);
        assert_eq!(ai.stored_xy[1], (4, 5));
        call(Builtin::AddXY, &mut ai, &mut world);
        ai.vars.x = 0;
        ai.vars.y = 0;
        call(Builtin::GetXY, &mut ai, &mut world);
        assert_eq!((ai.vars.x, ai.vars.y), (8, 10));
    }

    #[test]
    fn test_waypoint_queue_is_bounded() {
        let mut world = SandboxWorld::new();
        let mut ai = AiState::new(EntityRef(0));
        for i in 0..MAX_WAYPOINTS as i32 {
            ai.vars.x = i;
            assert_eq!(call(Builtin::AddWaypoint, &mut ai, &mut world), VmSignal::Continue);
        }
        ai.vars.x = 99;
        assert_eq!(call(Builtin::AddWaypoint, &mut ai, &mut world), VmSignal::Skip);
        assert_eq!(ai.waypoints.len(), MAX_WAYPOINTS);
        assert!(ai.waypoints.iter().all(|waypoint| waypoint.x != 99));

        call(Builtin::ClearWaypoints, &mut ai, &mut world);
        assert_eq!(call(Builtin::AddWaypoint, &mut ai, &mut world), VmSignal::Continue);
        assert_eq!(ai.next_waypoint(), Some(Waypoint { x: 99, y: 0 }));
    }

    #[test]
    fn test_find_enemy_sets_target() {
        let mut world = SandboxWorld::new();
        let me = world.add(SandboxEntity::new(0, 0).on_team(6));
        let foe = world.add(SandboxEntity::new(100, 0).on_team(4));
        let mut ai = AiState::spawned(me);

        assert_eq!(
            call(Builtin::SetTargetToNearbyEnemy, &mut ai, &mut world),
            VmSignal::Continue
        );
        assert_eq!(ai.target, Some(foe));
        assert_eq!(ai.old_target, Some(me));
        assert_eq!(
            call(Builtin::IfTargetIsOnOtherTeam, &mut ai, &mut world),
            VmSignal::Continue
        );
    }

    #[test]
    fn test_find_enemy_out_of_range_skips() {
        let mut world = SandboxWorld::new();
        let me = world.add(SandboxEntity::new(0, 0).on_team(6));
        world.add(SandboxEntity::new(5000, 0).on_team(4));
        let mut ai = AiState::spawned(me);

        assert_eq!(
            call(Builtin::SetTargetToNearbyEnemy, &mut ai, &mut world),
            VmSignal::Skip
        );
        assert_eq!(ai.target, Some(me));
    }

    #[test]
    fn test_vanished_target_predicates_false_verbs_noop() {
        let mut world = SandboxWorld::new();
        let me = world.add(SandboxEntity::new(0, 0));
        let other = world.add(SandboxEntity::new(10, 0));
        let mut ai = AiState::spawned(me);
        ai.set_target(other);
        world.remove(other);

        assert_eq!(call(Builtin::IfTargetIsAlive, &mut ai, &mut world), VmSignal::Skip);
        ai.vars.argument = 10;
        assert_eq!(call(Builtin::DamageTarget, &mut ai, &mut world), VmSignal::Skip);
        assert!(
            !world
                .events()
                .iter()
                .any(|event| matches!(event, WorldEvent::Damage { .. }))
        );
    }

    #[test]
    fn test_damage_uses_damage_type() {
        let mut world = SandboxWorld::new();
        let me = world.add(SandboxEntity::new(0, 0));
        let other = world.add(SandboxEntity::new(10, 0).with_life(50));
        let mut ai = AiState::spawned(me);
        ai.set_target(other);

        ai.vars.argument = 3;
        call(Builtin::SetDamageType, &mut ai, &mut world);
        ai.vars.argument = 20;
        assert_eq!(call(Builtin::DamageTarget, &mut ai, &mut world), VmSignal::Continue);
        assert_eq!(world.entity(other).map(|e| e.life), Some(30));
        assert_eq!(call(Builtin::IfTargetIsHurt, &mut ai, &mut world), VmSignal::Continue);
    }

    #[test]
    fn test_issue_order_ranks_teammates() {
        let mut world = SandboxWorld::new();
        let me = world.add(SandboxEntity::new(0, 0).on_team(6));
        let a = world.add(SandboxEntity::new(0, 0).on_team(6));
        let b = world.add(SandboxEntity::new(0, 0).on_team(6));
        world.add(SandboxEntity::new(0, 0).on_team(4));
        let mut ai = AiState::new(me);
        ai.vars.argument = 12;

        call(Builtin::IssueOrder, &mut ai, &mut world);
        let posted = world.take_posted();
        assert_eq!(posted.len(), 2);
        assert_eq!(posted[0].0, a);
        assert_eq!(posted[1].0, b);
        assert_eq!(posted[1].1.order, Some(Order { value: 12, rank: 1 }));
    }

    #[test]
    fn test_go_poof_halts() {
        let mut world = SandboxWorld::new();
        let me = world.add(SandboxEntity::new(0, 0));
        let mut ai = AiState::new(me);
        assert_eq!(call(Builtin::GoPoof, &mut ai, &mut world), VmSignal::Halt);
        assert!(!world.exists(me));
    }
}
