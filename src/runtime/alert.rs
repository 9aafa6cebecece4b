use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Closed set of events a world can raise on an entity. The discriminant is
/// the bit index inside [`Alerts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AlertKind {
    Spawned = 0,
    HitVulnerable,
    AtWaypoint,
    AtLastWaypoint,
    Attacked,
    Bumped,
    Ordered,
    CalledForHelp,
    Killed,
    TargetKilled,
    Dropped,
    Grabbed,
    Reaffirmed,
    LeaderKilled,
    Used,
    CleanedUp,
    ScoredAHit,
    Healed,
    Disaffirmed,
    Changed,
    InWater,
    Bored,
    TooMuchBaggage,
    LevelUp,
    Confused,
    HitGround,
    NotDropped,
    Blocked,
    Thrown,
    Crushed,
    NotPutAway,
    TakenOut,
}

impl AlertKind {
    pub const ALL: [AlertKind; 32] = [
        AlertKind::Spawned,
        AlertKind::HitVulnerable,
        AlertKind::AtWaypoint,
        AlertKind::AtLastWaypoint,
        AlertKind::Attacked,
        AlertKind::Bumped,
        AlertKind::Ordered,
        AlertKind::CalledForHelp,
        AlertKind::Killed,
        AlertKind::TargetKilled,
        AlertKind::Dropped,
        AlertKind::Grabbed,
        AlertKind::Reaffirmed,
        AlertKind::LeaderKilled,
        AlertKind::Used,
        AlertKind::CleanedUp,
        AlertKind::ScoredAHit,
        AlertKind::Healed,
        AlertKind::Disaffirmed,
        AlertKind::Changed,
        AlertKind::InWater,
        AlertKind::Bored,
        AlertKind::TooMuchBaggage,
        AlertKind::LevelUp,
        AlertKind::Confused,
        AlertKind::HitGround,
        AlertKind::NotDropped,
        AlertKind::Blocked,
        AlertKind::Thrown,
        AlertKind::Crushed,
        AlertKind::NotPutAway,
        AlertKind::TakenOut,
    ];

    pub fn bit(self) -> u32 {
        self as u32
    }

    pub fn from_bit(bit: i32) -> Option<AlertKind> {
        usize::try_from(bit)
            .ok()
            .and_then(|index| AlertKind::ALL.get(index).copied())
    }

    pub fn flag(self) -> Alerts {
        Alerts::from_bits_retain(1 << self.bit())
    }

    /// Name used by `@Name` references in script source.
    pub fn name(self) -> &'static str {
        match self {
            AlertKind::Spawned => "Spawned",
            AlertKind::HitVulnerable => "HitVulnerable",
            AlertKind::AtWaypoint => "AtWaypoint",
            AlertKind::AtLastWaypoint => "AtLastWaypoint",
            AlertKind::Attacked => "Attacked",
            AlertKind::Bumped => "Bumped",
            AlertKind::Ordered => "Ordered",
            AlertKind::CalledForHelp => "CalledForHelp",
            AlertKind::Killed => "Killed",
            AlertKind::TargetKilled => "TargetKilled",
            AlertKind::Dropped => "Dropped",
            AlertKind::Grabbed => "Grabbed",
            AlertKind::Reaffirmed => "Reaffirmed",
            AlertKind::LeaderKilled => "LeaderKilled",
            AlertKind::Used => "Used",
            AlertKind::CleanedUp => "CleanedUp",
            AlertKind::ScoredAHit => "ScoredAHit",
            AlertKind::Healed => "Healed",
            AlertKind::Disaffirmed => "Disaffirmed",
            AlertKind::Changed => "Changed",
            AlertKind::InWater => "InWater",
            AlertKind::Bored => "Bored",
            AlertKind::TooMuchBaggage => "TooMuchBaggage",
            AlertKind::LevelUp => "LevelUp",
            AlertKind::Confused => "Confused",
            AlertKind::HitGround => "HitGround",
            AlertKind::NotDropped => "NotDropped",
            AlertKind::Blocked => "Blocked",
            AlertKind::Thrown => "Thrown",
            AlertKind::Crushed => "Crushed",
            AlertKind::NotPutAway => "NotPutAway",
            AlertKind::TakenOut => "TakenOut",
        }
    }

    pub fn from_name(name: &str) -> Option<AlertKind> {
        AlertKind::ALL.iter().copied().find(|kind| kind.name() == name)
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Pending alerts of one entity.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Alerts: u32 {
        const SPAWNED = 1 << 0;
        const HIT_VULNERABLE = 1 << 1;
        const AT_WAYPOINT = 1 << 2;
        const AT_LAST_WAYPOINT = 1 << 3;
        const ATTACKED = 1 << 4;
        const BUMPED = 1 << 5;
        const ORDERED = 1 << 6;
        const CALLED_FOR_HELP = 1 << 7;
        const KILLED = 1 << 8;
        const TARGET_KILLED = 1 << 9;
        const DROPPED = 1 << 10;
        const GRABBED = 1 << 11;
        const REAFFIRMED = 1 << 12;
        const LEADER_KILLED = 1 << 13;
        const USED = 1 << 14;
        const CLEANED_UP = 1 << 15;
        const SCORED_A_HIT = 1 << 16;
        const HEALED = 1 << 17;
        const DISAFFIRMED = 1 << 18;
        const CHANGED = 1 << 19;
        const IN_WATER = 1 << 20;
        const BORED = 1 << 21;
        const TOO_MUCH_BAGGAGE = 1 << 22;
        const LEVEL_UP = 1 << 23;
        const CONFUSED = 1 << 24;
        const HIT_GROUND = 1 << 25;
        const NOT_DROPPED = 1 << 26;
        const BLOCKED = 1 << 27;
        const THROWN = 1 << 28;
        const CRUSHED = 1 << 29;
        const NOT_PUT_AWAY = 1 << 30;
        const TAKEN_OUT = 1 << 31;
    }
}

impl Alerts {
    pub fn has(self, kind: AlertKind) -> bool {
        self.contains(kind.flag())
    }

    pub fn raise(&mut self, kind: AlertKind) {
        self.insert(kind.flag());
    }

    pub fn lower(&mut self, kind: AlertKind) {
        self.remove(kind.flag());
    }

    pub fn kinds(self) -> impl Iterator<Item = AlertKind> {
        AlertKind::ALL.into_iter().filter(move |kind| self.has(*kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_match_kinds() {
        assert_eq!(AlertKind::Spawned.flag(), Alerts::SPAWNED);
        assert_eq!(AlertKind::Attacked.flag(), Alerts::ATTACKED);
        assert_eq!(AlertKind::TakenOut.flag(), Alerts::TAKEN_OUT);
        assert_eq!(AlertKind::ALL.len(), 32);
        for (index, kind) in AlertKind::ALL.iter().enumerate() {
            assert_eq!(kind.bit() as usize, index);
        }
    }

    #[test]
    fn test_raise_and_lower() {
        let mut alerts = Alerts::empty();
        alerts.raise(AlertKind::Bumped);
        alerts.raise(AlertKind::Killed);
        assert!(alerts.has(AlertKind::Bumped));
        alerts.lower(AlertKind::Bumped);
        assert!(!alerts.has(AlertKind::Bumped));
        assert_eq!(alerts.kinds().collect::<Vec<_>>(), vec![AlertKind::Killed]);
    }

    #[test]
    fn test_from_bit_bounds() {
        assert_eq!(AlertKind::from_bit(4), Some(AlertKind::Attacked));
        assert_eq!(AlertKind::from_bit(32), None);
        assert_eq!(AlertKind::from_bit(-1), None);
    }

    #[test]
    fn test_names_round_trip() {
        for kind in AlertKind::ALL {
            assert_eq!(AlertKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(AlertKind::from_name("attacked"), None);
    }
}
