use std::sync::Arc;

use aiscript::bytecode::compile::Compiler;
use aiscript::bytecode::compile_error::{CompileErrorKind, Diagnostics};
use aiscript::bytecode::ir::CompiledScript;
use aiscript::bytecode::op::{Op, Operator};
use aiscript::frontend::lexer::Lexer;
use aiscript::frontend::token::{SourceLocation, TokenKind};
use aiscript::lang::symbol::SymbolTable;
use aiscript::runtime::ai_state::{AiState, VmState};
use aiscript::runtime::builtins::{Builtin, BuiltinTable};
use aiscript::runtime::director::Director;
use aiscript::runtime::sandbox::{SandboxEntity, SandboxWorld};
use aiscript::runtime::vm::{TickOutcome, Vm, VmConfig};

fn compile(source: &str) -> Result<CompiledScript, Diagnostics> {
    let table = BuiltinTable::standard();
    let symbols = SymbolTable::standard(&table);
    Compiler::new(&table).compile_source("scenario.txt", source, &symbols)
}

fn recording_vm() -> Vm {
    Vm::with_config(VmConfig {
        record_calls: true,
        ..VmConfig::default()
    })
}

fn call_names(vm: &Vm) -> Vec<&'static str> {
    vm.calls().iter().map(|call| call.name).collect()
}

#[test]
fn timer_gates_alert_bit() {
    let script = compile("IfTimeOut\n  SetAlertBit\nEnd").unwrap();
    assert_eq!(script.words.len(), 3);

    let mut world = SandboxWorld::new();
    let me = world.add(SandboxEntity::new(0, 0));
    world.set_clock(20);

    let mut elapsed = AiState::new(me);
    elapsed.timer = Some(10);
    let mut vm = recording_vm();
    assert_eq!(vm.run(&script, &mut elapsed, &mut world), TickOutcome::Halted);
    assert_eq!(call_names(&vm), vec!["IfTimeOut", "SetAlertBit", "End"]);

    let mut pending = AiState::new(me);
    pending.timer = Some(30);
    let mut vm = recording_vm();
    vm.run(&script, &mut pending, &mut world);
    assert_eq!(call_names(&vm), vec!["IfTimeOut", "End"]);
}

#[test]
fn unknown_identifier_rejects_script() {
    let diagnostics = compile("IfSpawned\n  DoNothing\nFooBarBaz\nEnd").unwrap_err();
    assert_eq!(diagnostics.len(), 1);
    let error = diagnostics.first().unwrap();
    assert_eq!(
        error.kind,
        CompileErrorKind::UnknownIdentifier {
            name: "FooBarBaz".to_string()
        }
    );
    assert_eq!(error.location, SourceLocation::new(3, 1));
    assert_eq!(diagnostics.entries()[0].0, 3);
}

#[test]
fn runaway_script_is_suspended_and_restarts() {
    let mut script = CompiledScript::new("loop");
    script.words = vec![
        Op::SetVar { slot: 0, operands: 1 }.encode(),
        Op::OperandConst {
            operator: Operator::Add,
            value: 1,
        }
        .encode(),
        Op::Jump { label: 0 }.encode(),
    ];
    script.labels = vec![0];

    let mut world = SandboxWorld::new();
    let me = world.add(SandboxEntity::new(0, 0));
    let mut ai = AiState::new(me);
    let mut vm = Vm::with_config(VmConfig {
        instruction_ceiling: 30,
        record_calls: false,
    });

    assert_eq!(vm.run(&script, &mut ai, &mut world), TickOutcome::Suspended);
    assert_eq!(ai.vm_state, VmState::Suspended);
    assert_eq!(ai.program_counter, 0);
    assert_eq!(ai.vars.x, 1);
    let before = ai.clone();

    assert_eq!(vm.run(&script, &mut ai, &mut world), TickOutcome::Suspended);
    assert_eq!(ai, before);
}

#[test]
fn shared_script_keeps_state_apart() {
    let script = Arc::new(compile("tmpx = selfx + 5\nEnd").unwrap());

    let mut world = SandboxWorld::new();
    let a = world.add(SandboxEntity::new(100, 0));
    let b = world.add(SandboxEntity::new(300, 0));
    let mut director = Director::default();
    director.spawn(a, Arc::clone(&script));
    director.spawn(b, Arc::clone(&script));

    let report = director.tick(&mut world);
    assert_eq!(report.halted, 2);

    let ai_a = director.ai(a).unwrap();
    let ai_b = director.ai(b).unwrap();
    assert_eq!(ai_a.working_value, 105);
    assert_eq!(ai_b.working_value, 305);
    assert_eq!(ai_a.vars.x, 105);
    assert_eq!(ai_b.vars.x, 305);
    assert_eq!(Arc::strong_count(&script), 3);
}

#[test]
fn runs_are_deterministic() {
    let source = "\
tmpargument = rand & 3
IfSpawned
  SetState
IfStateIs2
  DoNothing
Else
  tmpargument = 2
  SetState
End
";
    let script = Arc::new(compile(source).unwrap());

    let trace = || {
        let mut world = SandboxWorld::with_seed(7);
        let mut director = Director::new(VmConfig {
            record_calls: true,
            ..VmConfig::default()
        });
        for i in 0..3 {
            let entity = world.add(SandboxEntity::new(i * 64, 0));
            director.spawn(entity, Arc::clone(&script));
        }
        for _ in 0..4 {
            director.tick(&mut world);
            world.advance_clock();
        }
        director
            .vm_mut()
            .take_calls()
            .into_iter()
            .map(|call| (call.entity, call.name, call.signal))
            .collect::<Vec<_>>()
    };

    let first = trace();
    assert!(!first.is_empty());
    assert_eq!(first, trace());
}

#[test]
fn compiling_twice_is_bit_identical() {
    let source = "IfAttacked\n  tmpx = [HUMA] + 3 * selfx\n  SetTime\nElse\n  Stop\nEnd";
    let first = compile(source).unwrap();
    let second = compile(source).unwrap();
    assert_eq!(first.words, second.words);
    assert_eq!(first.labels, second.labels);
    assert_eq!(first.to_bytes().unwrap(), second.to_bytes().unwrap());
}

#[test]
fn lone_else_is_unbalanced() {
    let diagnostics = compile("Else").unwrap_err();
    assert!(diagnostics
        .errors()
        .iter()
        .all(|error| matches!(error.kind, CompileErrorKind::UnbalancedBlock { .. })));
    assert!(!diagnostics.is_empty());
}

#[test]
fn idsz_must_be_four_characters() {
    for source in ["tmpargument = [ABC]", "tmpargument = [ABCDE]"] {
        let diagnostics = compile(source).unwrap_err();
        assert!(matches!(
            diagnostics.first().unwrap().kind,
            CompileErrorKind::MalformedIdsz { .. }
        ));
    }
    assert!(compile("tmpargument = [ABCD]\nEnd").is_ok());
}

#[test]
fn lexemes_reproduce_their_tokens() {
    let table = BuiltinTable::standard();
    let symbols = SymbolTable::standard(&table);
    let source = "IfSpawned\n  tmpx = [HUMA] + 2.5 - TEAM_GOOD << 2\n  SetAlertBit\nEnd";

    for token in Lexer::new(source, &symbols) {
        let again: Vec<_> = Lexer::new(&token.lexeme, &symbols).collect();
        assert_eq!(again.len(), 1, "{}", token.lexeme);
        assert_eq!(again[0].kind, token.kind);
        assert_eq!(again[0].value, token.value);
        if token.kind == TokenKind::Function {
            assert!(table.get(token.value as usize).is_some());
        }
    }
}

#[test]
fn persisted_script_runs_the_same() {
    let script = compile("IfSpawned\n  tmpargument = 1\n  SetState\nEnd").unwrap();
    let bytes = script.to_bytes().unwrap();
    let loaded = CompiledScript::from_bytes(&bytes, &BuiltinTable::standard()).unwrap();
    assert_eq!(loaded, script);

    let mut world = SandboxWorld::new();
    let me = world.add(SandboxEntity::new(0, 0));
    let mut ai = AiState::spawned(me);
    let mut vm = recording_vm();
    vm.run(&loaded, &mut ai, &mut world);
    assert_eq!(ai.state, 1);
    assert_eq!(
        vm.calls().iter().map(|call| call.builtin).collect::<Vec<_>>(),
        vec![
            Builtin::IfSpawned.index(),
            Builtin::SetState.index(),
            Builtin::End.index()
        ]
    );
}
