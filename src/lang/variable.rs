/// Built-in script variables. The discriminant is the slot index baked into
/// bytecode, so new variables are only ever appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Variable {
    // Writable temporaries
    TmpX = 0,
    TmpY,
    TmpDistance,
    TmpTurn,
    TmpArgument,

    Rand,

    SelfX,
    SelfY,
    SelfZ,
    SelfTurn,
    SelfCounter,
    SelfOrder,
    SelfLife,
    SelfMana,
    SelfState,
    SelfContent,
    SelfMoney,
    SelfLevel,
    SelfIndex,
    SelfTeam,

    TargetX,
    TargetY,
    TargetZ,
    TargetTurn,
    TargetDistance,
    TargetLife,
    TargetMaxLife,
    TargetMana,
    TargetTeam,
    TargetLevel,
    TargetMoney,
    TargetExp,
    TargetStr,
    TargetDex,
    TargetInt,
    TargetWis,

    GotoX,
    GotoY,
    GotoDistance,

    OwnerX,
    OwnerY,
    OwnerDistance,

    XyDistance,
    Timer,
}

/// Source names in registration order. Aliases share a slot.
pub const VARIABLE_NAMES: &[(&str, Variable)] = &[
    ("tmpx", Variable::TmpX),
    ("tmpy", Variable::TmpY),
    ("tmpdist", Variable::TmpDistance),
    ("tmpdistance", Variable::TmpDistance),
    ("tmpturn", Variable::TmpTurn),
    ("tmpargument", Variable::TmpArgument),
    ("rand", Variable::Rand),
    ("selfx", Variable::SelfX),
    ("selfy", Variable::SelfY),
    ("selfz", Variable::SelfZ),
    ("selfturn", Variable::SelfTurn),
    ("selfcounter", Variable::SelfCounter),
    ("selforder", Variable::SelfOrder),
    ("selflife", Variable::SelfLife),
    ("selfmana", Variable::SelfMana),
    ("selfstate", Variable::SelfState),
    ("selfcontent", Variable::SelfContent),
    ("selfmoney", Variable::SelfMoney),
    ("selflevel", Variable::SelfLevel),
    ("selfindex", Variable::SelfIndex),
    ("selfteam", Variable::SelfTeam),
    ("targetx", Variable::TargetX),
    ("targety", Variable::TargetY),
    ("targetz", Variable::TargetZ),
    ("targetturn", Variable::TargetTurn),
    ("targetdistance", Variable::TargetDistance),
    ("targetlife", Variable::TargetLife),
    ("targetmaxlife", Variable::TargetMaxLife),
    ("targetmana", Variable::TargetMana),
    ("targetteam", Variable::TargetTeam),
    ("targetlevel", Variable::TargetLevel),
    ("targetmoney", Variable::TargetMoney),
    ("targetexp", Variable::TargetExp),
    ("targetstr", Variable::TargetStr),
    ("targetdex", Variable::TargetDex),
    ("targetint", Variable::TargetInt),
    ("targetwis", Variable::TargetWis),
    ("gotox", Variable::GotoX),
    ("gotoy", Variable::GotoY),
    ("gotodistance", Variable::GotoDistance),
    ("ownerx", Variable::OwnerX),
    ("ownery", Variable::OwnerY),
    ("ownerdistance", Variable::OwnerDistance),
    ("xydistance", Variable::XyDistance),
    ("timer", Variable::Timer),
];

impl Variable {
    pub const COUNT: usize = Variable::Timer as usize + 1;

    pub fn slot(self) -> u8 {
        self as u8
    }

    pub fn from_slot(slot: u8) -> Option<Variable> {
        VARIABLE_NAMES
            .iter()
            .map(|(_, var)| *var)
            .find(|var| var.slot() == slot)
    }

    /// Canonical source name (the first registered alias).
    pub fn name(self) -> &'static str {
        VARIABLE_NAMES
            .iter()
            .find(|(_, var)| *var == self)
            .map(|(name, _)| *name)
            .unwrap_or("?")
    }

    /// Only the temporaries may appear on the left of `=`.
    pub fn is_writable(self) -> bool {
        matches!(
            self,
            Variable::TmpX
                | Variable::TmpY
                | Variable::TmpDistance
                | Variable::TmpTurn
                | Variable::TmpArgument
        )
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
