use std::collections::HashSet;

use tracing::{trace, warn};

use crate::bytecode::ir::CompiledScript;
use crate::bytecode::op::{Op, Operator};
use crate::lang::variable::Variable;
use crate::runtime::ai_state::{AiState, VmState};
use crate::runtime::builtins::{BuiltinTable, VmSignal};
use crate::runtime::runtime_error::RuntimeDefect;
use crate::runtime::world::{Attribute, EntityRef, WorldAccess};

#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Words one entity may execute per tick before it is suspended.
    pub instruction_ceiling: usize,
    /// Keep a trace of every dispatched built-in.
    pub record_calls: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            instruction_ceiling: 4096,
            record_calls: false,
        }
    }
}

/// How one entity's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickOutcome {
    /// Ran off the end of the script.
    Completed,
    /// A built-in (`End`, `Stop`, `GoPoof`) ended the run.
    Halted,
    /// Hit the instruction ceiling.
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub entity: EntityRef,
    pub builtin: u16,
    pub name: &'static str,
    pub signal: VmSignal,
}

/// Interpreter for compiled scripts. Holds no per-entity state: everything a
/// run mutates lives in the [`AiState`] passed in.
pub struct Vm {
    config: VmConfig,
    table: BuiltinTable,
    calls: Vec<CallRecord>,
    // (script, offset) pairs already reported
    reported: HashSet<(String, usize)>,
    defects: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self::with_table(config, BuiltinTable::standard())
    }

    pub fn with_table(config: VmConfig, table: BuiltinTable) -> Self {
        Self {
            config,
            table,
            calls: Vec::new(),
            reported: HashSet::new(),
            defects: 0,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn table(&self) -> &BuiltinTable {
        &self.table
    }

    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<CallRecord> {
        std::mem::take(&mut self.calls)
    }

    /// Distinct defective instructions seen so far.
    pub fn defect_count(&self) -> usize {
        self.defects
    }

    /// Runs `script` for one tick on behalf of `ai.entity`, always starting at
    /// the first word.
    pub fn run(
        &mut self,
        script: &CompiledScript,
        ai: &mut AiState,
        world: &mut dyn WorldAccess,
    ) -> TickOutcome {
        ai.program_counter = 0;
        ai.vm_state = VmState::Running;

        let mut executed = 0usize;
        loop {
            let pc = ai.program_counter;
            let Some(&word) = script.words.get(pc) else {
                return self.finish(ai, VmState::Idle, TickOutcome::Completed);
            };
            if executed >= self.config.instruction_ceiling {
                trace!(script = %script.name, entity = %ai.entity, executed, "instruction ceiling hit");
                return self.finish(ai, VmState::Suspended, TickOutcome::Suspended);
            }
            executed += 1;

            let op = match Op::decode(word) {
                Ok(op) => op,
                Err(e) => {
                    self.defect(script, pc, e.into());
                    ai.program_counter = pc + 1;
                    continue;
                }
            };

            match op {
                Op::Call { builtin, label } => {
                    let Some(def) = self.table.get(builtin as usize) else {
                        self.defect(script, pc, RuntimeDefect::UnknownBuiltin(builtin));
                        ai.program_counter = pc + 1;
                        continue;
                    };

                    let signal = (def.handler)(ai, world);
                    trace!(entity = %ai.entity, name = def.name, ?signal, "builtin");
                    if self.config.record_calls {
                        self.calls.push(CallRecord {
                            entity: ai.entity,
                            builtin,
                            name: def.name,
                            signal,
                        });
                    }

                    match signal {
                        VmSignal::Continue => ai.program_counter = pc + 1,
                        VmSignal::Skip => {
                            ai.program_counter = match label {
                                Some(label) => self.jump_target(script, pc, label),
                                None => pc + 1,
                            }
                        }
                        VmSignal::Halt => {
                            return self.finish(ai, VmState::Terminated, TickOutcome::Halted);
                        }
                    }
                }
                Op::Jump { label } => ai.program_counter = self.jump_target(script, pc, label),
                Op::SetVar { slot, operands } => {
                    ai.program_counter = self.assign(script, pc, slot, operands, ai, world);
                }
                Op::OperandVar { .. } | Op::OperandConst { .. } => {
                    self.defect(script, pc, RuntimeDefect::StrayOperand);
                    ai.program_counter = pc + 1;
                }
            }
        }
    }

    fn finish(&mut self, ai: &mut AiState, state: VmState, outcome: TickOutcome) -> TickOutcome {
        ai.vm_state = state;
        ai.program_counter = 0;
        outcome
    }

    fn jump_target(&mut self, script: &CompiledScript, pc: usize, label: u32) -> usize {
        match script.label_offset(label) {
            Some(offset) => offset,
            None => {
                self.defect(script, pc, RuntimeDefect::UndefinedLabel(label));
                pc + 1
            }
        }
    }

    /// Folds the operand words after `pc` into the working value and stores
    /// it. Returns the offset of the next instruction.
    fn assign(
        &mut self,
        script: &CompiledScript,
        pc: usize,
        slot: u8,
        operands: u8,
        ai: &mut AiState,
        world: &mut dyn WorldAccess,
    ) -> usize {
        let mut next = pc + 1;
        ai.working_value = 0;

        for found in 0..operands {
            let operand = script.words.get(next).map(|word| Op::decode(*word));
            let (operator, value) = match operand {
                Some(Ok(Op::OperandConst { operator, value })) => (operator, value),
                Some(Ok(Op::OperandVar { operator, slot })) => match Variable::from_slot(slot) {
                    Some(var) => (operator, self.read(var, ai, world)),
                    None => {
                        self.defect(script, next, RuntimeDefect::UnknownVariable(slot));
                        (Operator::Add, 0)
                    }
                },
                _ => {
                    self.defect(
                        script,
                        pc,
                        RuntimeDefect::TruncatedExpression {
                            expected: operands,
                            found,
                        },
                    );
                    return next;
                }
            };
            ai.indexed_operand = value;
            ai.working_value = operator.apply(ai.working_value, value);
            next += 1;
        }

        let value = ai.working_value;
        match Variable::from_slot(slot) {
            Some(var) if var.is_writable() => write(var, ai, value),
            Some(var) => self.defect(script, pc, RuntimeDefect::ReadOnlyVariable(var.name())),
            None => self.defect(script, pc, RuntimeDefect::UnknownVariable(slot)),
        }
        next
    }

    fn read(&self, var: Variable, ai: &AiState, world: &mut dyn WorldAccess) -> i32 {
        if var == Variable::Rand {
            return world.random();
        }

        let world: &dyn WorldAccess = world;
        let me = Some(ai.entity);
        let target = ai.target.filter(|target| world.exists(*target));
        let owner = ai.owner.filter(|owner| world.exists(*owner));
        let attr = |entity: Option<EntityRef>, key: Attribute| {
            entity
                .and_then(|entity| world.attribute(entity, key))
                .unwrap_or(0)
        };
        let position = |entity: Option<EntityRef>| (attr(entity, Attribute::X), attr(entity, Attribute::Y));

        match var {
            Variable::TmpX => ai.vars.x,
            Variable::TmpY => ai.vars.y,
            Variable::TmpDistance => ai.vars.distance,
            Variable::TmpTurn => ai.vars.turn,
            Variable::TmpArgument => ai.vars.argument,

            // read above, needs the world mutably
            Variable::Rand => 0,

            Variable::SelfX => attr(me, Attribute::X),
            Variable::SelfY => attr(me, Attribute::Y),
            Variable::SelfZ => attr(me, Attribute::Z),
            Variable::SelfTurn => attr(me, Attribute::Turn),
            Variable::SelfCounter => ai.order.rank,
            Variable::SelfOrder => ai.order.value,
            Variable::SelfLife => attr(me, Attribute::Life),
            Variable::SelfMana => attr(me, Attribute::Mana),
            Variable::SelfState => ai.state,
            Variable::SelfContent => ai.content,
            Variable::SelfMoney => attr(me, Attribute::Money),
            Variable::SelfLevel => attr(me, Attribute::Level),
            Variable::SelfIndex => ai.entity.0 as i32,
            Variable::SelfTeam => attr(me, Attribute::Team),

            Variable::TargetX => attr(target, Attribute::X),
            Variable::TargetY => attr(target, Attribute::Y),
            Variable::TargetZ => attr(target, Attribute::Z),
            Variable::TargetTurn => attr(target, Attribute::Turn),
            Variable::TargetDistance => match target {
                Some(_) => distance(position(me), position(target)),
                None => 0,
            },
            Variable::TargetLife => attr(target, Attribute::Life),
            Variable::TargetMaxLife => attr(target, Attribute::MaxLife),
            Variable::TargetMana => attr(target, Attribute::Mana),
            Variable::TargetTeam => attr(target, Attribute::Team),
            Variable::TargetLevel => attr(target, Attribute::Level),
            Variable::TargetMoney => attr(target, Attribute::Money),
            Variable::TargetExp => attr(target, Attribute::Experience),
            Variable::TargetStr => attr(target, Attribute::Strength),
            Variable::TargetDex => attr(target, Attribute::Dexterity),
            Variable::TargetInt => attr(target, Attribute::Intelligence),
            Variable::TargetWis => attr(target, Attribute::Wisdom),

            Variable::GotoX => ai
                .next_waypoint()
                .map_or_else(|| attr(me, Attribute::X), |w| w.x),
            Variable::GotoY => ai
                .next_waypoint()
                .map_or_else(|| attr(me, Attribute::Y), |w| w.y),
            Variable::GotoDistance => match ai.next_waypoint() {
                Some(w) => distance(position(me), (w.x, w.y)),
                None => 0,
            },

            Variable::OwnerX => attr(owner, Attribute::X),
            Variable::OwnerY => attr(owner, Attribute::Y),
            Variable::OwnerDistance => match owner {
                Some(_) => distance(position(me), position(owner)),
                None => 0,
            },

            Variable::XyDistance => distance((0, 0), (ai.vars.x, ai.vars.y)),
            Variable::Timer => ai.timer.map_or(0, |deadline| {
                deadline.saturating_sub(world.clock()).min(i32::MAX as u32) as i32
            }),
        }
    }

    fn defect(&mut self, script: &CompiledScript, offset: usize, defect: RuntimeDefect) {
        if self.reported.insert((script.name.clone(), offset)) {
            self.defects += 1;
            warn!(script = %script.name, offset, %defect, "skipping defective instruction");
        }
    }
}

fn write(var: Variable, ai: &mut AiState, value: i32) {
    match var {
        Variable::TmpX => ai.vars.x = value,
        Variable::TmpY => ai.vars.y = value,
        Variable::TmpDistance => ai.vars.distance = value,
        Variable::TmpTurn => ai.vars.turn = value,
        Variable::TmpArgument => ai.vars.argument = value,
        _ => {}
    }
}

/// Euclidean distance with an integer square root.
pub fn distance(a: (i32, i32), b: (i32, i32)) -> i32 {
    let dx = (a.0 as i64 - b.0 as i64).unsigned_abs();
    let dy = (a.1 as i64 - b.1 as i64).unsigned_abs();
    let squared = dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy));
    squared.isqrt().min(i32::MAX as u64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::alert::AlertKind;
    use crate::runtime::builtins::Builtin;
    use crate::runtime::sandbox::{SandboxEntity, SandboxWorld};

    // ============================================================
    // Test Helpers
    // ============================================================

    fn script_from_ops(ops: &[Op], labels: Vec<u32>) -> CompiledScript {
        let mut script = CompiledScript::new("test");
        script.words = ops.iter().map(|op| op.encode()).collect();
        script.labels = labels;
        script
    }

    fn call(builtin: Builtin) -> Op {
        Op::Call {
            builtin: builtin.index(),
            label: None,
        }
    }

    fn call_block(builtin: Builtin, label: u32) -> Op {
        Op::Call {
            builtin: builtin.index(),
            label: Some(label),
        }
    }

    fn set(var: Variable, operands: u8) -> Op {
        Op::SetVar {
            slot: var.slot(),
            operands,
        }
    }

    fn constant(operator: Operator, value: i32) -> Op {
        Op::OperandConst { operator, value }
    }

    fn variable(operator: Operator, var: Variable) -> Op {
        Op::OperandVar {
            operator,
            slot: var.slot(),
        }
    }

    fn recording_vm() -> Vm {
        Vm::with_config(VmConfig {
            record_calls: true,
            ..VmConfig::default()
        })
    }

    fn world_with_self() -> (SandboxWorld, AiState) {
        let mut world = SandboxWorld::new();
        let me = world.add(SandboxEntity::new(0, 0).on_team(6));
        (world, AiState::spawned(me))
    }

    fn names(vm: &Vm) -> Vec<&'static str> {
        vm.calls().iter().map(|call| call.name).collect()
    }

    // ============================================================
    // Control flow
    // ============================================================

    #[test]
    fn test_predicate_true_runs_block() {
        let script = script_from_ops(
            &[
                call_block(Builtin::IfTimeOut, 0),
                call(Builtin::SetAlertBit),
                call(Builtin::End),
            ],
            vec![2],
        );
        let (mut world, mut ai) = world_with_self();
        ai.alerts = Default::default();
        ai.timer = Some(5);
        world.set_clock(5);
        ai.vars.argument = AlertKind::Bored.bit() as i32;

        let mut vm = recording_vm();
        assert_eq!(vm.run(&script, &mut ai, &mut world), TickOutcome::Halted);
        assert_eq!(names(&vm), vec!["IfTimeOut", "SetAlertBit", "End"]);
        assert!(ai.alerts.has(AlertKind::Bored));
        assert_eq!(ai.vm_state, VmState::Terminated);
    }

    #[test]
    fn test_predicate_false_skips_block() {
        let script = script_from_ops(
            &[
                call_block(Builtin::IfTimeOut, 0),
                call(Builtin::SetAlertBit),
                call(Builtin::End),
            ],
            vec![2],
        );
        let (mut world, mut ai) = world_with_self();
        ai.timer = Some(5);
        world.set_clock(4);

        let mut vm = recording_vm();
        vm.run(&script, &mut ai, &mut world);
        assert_eq!(names(&vm), vec!["IfTimeOut", "End"]);
    }

    #[test]
    fn test_else_branch() {
        // IfStateIs0 / SetAlertBit / Else / ClearAlertBit / End
        let script = script_from_ops(
            &[
                call_block(Builtin::IfStateIs0, 0),
                call(Builtin::SetState),
                Op::Jump { label: 1 },
                call(Builtin::GetState),
                call(Builtin::End),
            ],
            vec![3, 4],
        );
        let (mut world, mut ai) = world_with_self();

        let mut vm = recording_vm();
        vm.run(&script, &mut ai, &mut world);
        assert_eq!(names(&vm), vec!["IfStateIs0", "SetState", "End"]);

        ai.state = 1;
        let mut vm = recording_vm();
        vm.run(&script, &mut ai, &mut world);
        assert_eq!(names(&vm), vec!["IfStateIs0", "GetState", "End"]);
    }

    #[test]
    fn test_natural_end_completes() {
        let script = script_from_ops(&[call(Builtin::DoNothing)], vec![]);
        let (mut world, mut ai) = world_with_self();
        let mut vm = Vm::new();
        assert_eq!(vm.run(&script, &mut ai, &mut world), TickOutcome::Completed);
        assert_eq!(ai.vm_state, VmState::Idle);
        assert_eq!(ai.program_counter, 0);
    }

    #[test]
    fn test_empty_script_completes() {
        let script = CompiledScript::noop("noop");
        let (mut world, mut ai) = world_with_self();
        assert_eq!(Vm::new().run(&script, &mut ai, &mut world), TickOutcome::Completed);
    }

    #[test]
    fn test_backward_jump_suspends_at_ceiling() {
        let script = script_from_ops(&[call(Builtin::DoNothing), Op::Jump { label: 0 }], vec![0]);
        let (mut world, mut ai) = world_with_self();
        let before = ai.clone();

        let mut vm = Vm::with_config(VmConfig {
            instruction_ceiling: 64,
            record_calls: true,
        });
        assert_eq!(vm.run(&script, &mut ai, &mut world), TickOutcome::Suspended);
        assert_eq!(vm.calls().len(), 32);
        assert_eq!(ai.vm_state, VmState::Suspended);
        assert_eq!(ai.program_counter, 0);

        // nothing else changed
        let mut expected = before;
        expected.vm_state = VmState::Suspended;
        assert_eq!(ai, expected);

        assert_eq!(vm.run(&script, &mut ai, &mut world), TickOutcome::Suspended);
        assert_eq!(vm.calls().len(), 64);
    }

    // ============================================================
    // Arithmetic
    // ============================================================

    #[test]
    fn test_assignment_folds_left_to_right() {
        // tmpx = 3 + 4 * 2
        let script = script_from_ops(
            &[
                set(Variable::TmpX, 3),
                constant(Operator::Add, 3),
                constant(Operator::Add, 4),
                constant(Operator::Mul, 2),
            ],
            vec![],
        );
        let (mut world, mut ai) = world_with_self();
        Vm::new().run(&script, &mut ai, &mut world);
        assert_eq!(ai.vars.x, 14);
        assert_eq!(ai.working_value, 14);
        assert_eq!(ai.indexed_operand, 2);
    }

    #[test]
    fn test_assignment_reads_variables() {
        // tmpy = tmpx - 1 ; tmpargument = selfindex
        let script = script_from_ops(
            &[
                set(Variable::TmpY, 2),
                variable(Operator::Add, Variable::TmpX),
                constant(Operator::Sub, 1),
                set(Variable::TmpArgument, 1),
                variable(Operator::Add, Variable::SelfIndex),
            ],
            vec![],
        );
        let (mut world, mut ai) = world_with_self();
        ai.vars.x = 10;
        Vm::new().run(&script, &mut ai, &mut world);
        assert_eq!(ai.vars.y, 9);
        assert_eq!(ai.vars.argument, ai.entity.0 as i32);
    }

    #[test]
    fn test_division_by_zero_keeps_value() {
        let script = script_from_ops(
            &[
                set(Variable::TmpX, 2),
                constant(Operator::Add, 7),
                constant(Operator::Div, 0),
            ],
            vec![],
        );
        let (mut world, mut ai) = world_with_self();
        Vm::new().run(&script, &mut ai, &mut world);
        assert_eq!(ai.vars.x, 7);
    }

    #[test]
    fn test_wrapping_overflow() {
        let script = script_from_ops(
            &[
                set(Variable::TmpX, 2),
                variable(Operator::Add, Variable::TmpX),
                constant(Operator::Add, 1),
            ],
            vec![],
        );
        let (mut world, mut ai) = world_with_self();
        ai.vars.x = i32::MAX;
        Vm::new().run(&script, &mut ai, &mut world);
        assert_eq!(ai.vars.x, i32::MIN);
    }

    #[test]
    fn test_target_distance_uses_integer_sqrt() {
        let mut world = SandboxWorld::new();
        let me = world.add(SandboxEntity::new(0, 0));
        let other = world.add(SandboxEntity::new(3, 4));
        let mut ai = AiState::spawned(me);
        ai.set_target(other);

        let script = script_from_ops(
            &[
                set(Variable::TmpDistance, 1),
                variable(Operator::Add, Variable::TargetDistance),
            ],
            vec![],
        );
        Vm::new().run(&script, &mut ai, &mut world);
        assert_eq!(ai.vars.distance, 5);
    }

    #[test]
    fn test_vanished_target_reads_zero() {
        let mut world = SandboxWorld::new();
        let me = world.add(SandboxEntity::new(0, 0));
        let other = world.add(SandboxEntity::new(3, 4).with_life(80));
        let mut ai = AiState::spawned(me);
        ai.set_target(other);
        world.remove(other);

        let script = script_from_ops(
            &[
                set(Variable::TmpX, 1),
                variable(Operator::Add, Variable::TargetLife),
            ],
            vec![],
        );
        ai.vars.x = 99;
        Vm::new().run(&script, &mut ai, &mut world);
        assert_eq!(ai.vars.x, 0);
    }

    #[test]
    fn test_distance_helper() {
        assert_eq!(distance((0, 0), (0, 0)), 0);
        assert_eq!(distance((1, 1), (4, 5)), 5);
        assert_eq!(distance((0, 0), (2, 2)), 2);
        assert!(distance((i32::MIN, i32::MIN), (i32::MAX, i32::MAX)) > 0);
    }

    // ============================================================
    // Defects
    // ============================================================

    #[test]
    fn test_corrupt_word_skipped_and_reported_once() {
        let mut script = script_from_ops(&[call(Builtin::DoNothing), call(Builtin::SetState)], vec![]);
        script.words.insert(1, 0xF000_0000);
        let (mut world, mut ai) = world_with_self();
        ai.vars.argument = 3;

        let mut vm = recording_vm();
        assert_eq!(vm.run(&script, &mut ai, &mut world), TickOutcome::Completed);
        assert_eq!(vm.run(&script, &mut ai, &mut world), TickOutcome::Completed);
        assert_eq!(vm.defect_count(), 1);
        assert_eq!(ai.state, 3);
        assert_eq!(vm.calls().len(), 4);
    }

    #[test]
    fn test_unknown_builtin_and_label_skipped() {
        let script = script_from_ops(
            &[
                Op::Call {
                    builtin: 0x0FFF,
                    label: None,
                },
                Op::Jump { label: 9 },
                call(Builtin::SetState),
            ],
            vec![],
        );
        let (mut world, mut ai) = world_with_self();
        ai.vars.argument = 2;

        let mut vm = Vm::new();
        assert_eq!(vm.run(&script, &mut ai, &mut world), TickOutcome::Completed);
        assert_eq!(vm.defect_count(), 2);
        assert_eq!(ai.state, 2);
    }

    #[test]
    fn test_stray_operand_and_read_only_target() {
        let script = script_from_ops(
            &[
                constant(Operator::Add, 1),
                set(Variable::SelfLife, 1),
                constant(Operator::Add, 5),
                set(Variable::TmpX, 1),
                constant(Operator::Add, 5),
            ],
            vec![],
        );
        let (mut world, mut ai) = world_with_self();
        let mut vm = Vm::new();
        vm.run(&script, &mut ai, &mut world);
        assert_eq!(vm.defect_count(), 2);
        assert_eq!(ai.vars.x, 5);
        assert_eq!(world.entity(ai.entity).map(|e| e.life), Some(100));
    }

    #[test]
    fn test_truncated_expression() {
        let script = script_from_ops(&[set(Variable::TmpX, 3), constant(Operator::Add, 5)], vec![]);
        let (mut world, mut ai) = world_with_self();
        let mut vm = Vm::new();
        assert_eq!(vm.run(&script, &mut ai, &mut world), TickOutcome::Completed);
        assert_eq!(vm.defect_count(), 1);
        assert_eq!(ai.vars.x, 0);
    }

    // ============================================================
    // Isolation
    // ============================================================

    #[test]
    fn test_shared_script_independent_state() {
        let script = script_from_ops(
            &[
                set(Variable::TmpX, 2),
                variable(Operator::Add, Variable::TmpX),
                constant(Operator::Add, 1),
            ],
            vec![],
        );
        let mut world = SandboxWorld::new();
        let a = world.add(SandboxEntity::new(0, 0));
        let b = world.add(SandboxEntity::new(0, 0));
        let mut ai_a = AiState::spawned(a);
        let mut ai_b = AiState::spawned(b);

        let mut vm = Vm::new();
        vm.run(&script, &mut ai_a, &mut world);
        vm.run(&script, &mut ai_a, &mut world);
        assert_eq!(ai_a.working_value, 2);
        assert_eq!(ai_b.working_value, 0);

        vm.run(&script, &mut ai_b, &mut world);
        assert_eq!(ai_a.vars.x, 2);
        assert_eq!(ai_b.vars.x, 1);
    }
}
