use std::collections::BTreeMap;
use std::fmt::{self, Write};

use crate::bytecode::ir::{CompiledScript, ScriptFlags};
use crate::bytecode::op::Op;
use crate::lang::idsz::Idsz;
use crate::lang::variable::Variable;
use crate::runtime::builtins::BuiltinTable;

/// Print disassembly of a compiled script
pub fn print_script(script: &CompiledScript, table: &BuiltinTable) {
    print!("{}", Listing { script, table });
}

pub fn disassemble(script: &CompiledScript, table: &BuiltinTable) -> String {
    Listing { script, table }.to_string()
}

struct Listing<'a> {
    script: &'a CompiledScript,
    table: &'a BuiltinTable,
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_listing(f, self.script, self.table)
    }
}

pub fn write_listing<W: Write>(
    out: &mut W,
    script: &CompiledScript,
    table: &BuiltinTable,
) -> fmt::Result {
    writeln!(out, "════════════════════════════════════════")?;
    writeln!(out, " {}", script.name)?;
    writeln!(
        out,
        " {} words, {} labels, {} built-ins",
        script.words.len(),
        script.labels.len(),
        script.builtins_used
    )?;
    if !script.flags.is_empty() {
        writeln!(out, " flags: {}", flag_names(script.flags))?;
    }
    writeln!(out, "════════════════════════════════════════")?;

    let targets = collect_label_targets(script);
    for (offset, op) in script.ops() {
        if let Some(labels) = targets.get(&offset) {
            writeln!(out, "      ┌────────────────────────────── {}", label_list(labels))?;
        }
        let marker = if targets.contains_key(&offset) { "► " } else { "  " };
        write!(out, "{:04} {}", offset, marker)?;

        match op {
            Ok(op) => writeln!(out, "{}", format_op(op, script, table))?,
            Err(error) => writeln!(
                out,
                "??          {:#010x} ; {}",
                script.words[offset], error
            )?,
        }
    }

    // Labels may point one past the last word.
    if let Some(labels) = targets.get(&script.words.len()) {
        writeln!(out, "      └────────────────────────────── {} (end)", label_list(labels))?;
    }
    Ok(())
}

fn collect_label_targets(script: &CompiledScript) -> BTreeMap<usize, Vec<u32>> {
    let mut targets: BTreeMap<usize, Vec<u32>> = BTreeMap::new();
    for (label, offset) in script.labels.iter().enumerate() {
        targets.entry(*offset as usize).or_default().push(label as u32);
    }
    targets
}

fn label_list(labels: &[u32]) -> String {
    labels
        .iter()
        .map(|label| format!("L{}", label))
        .collect::<Vec<_>>()
        .join(" ")
}

fn flag_names(flags: ScriptFlags) -> String {
    flags
        .iter_names()
        .map(|(name, _)| name)
        .collect::<Vec<_>>()
        .join(" | ")
}

fn label_target(script: &CompiledScript, label: u32) -> String {
    match script.label_offset(label) {
        Some(offset) => format!("L{} (→ {:04})", label, offset),
        None => format!("L{} (undefined)", label),
    }
}

fn variable_name(slot: u8) -> String {
    Variable::from_slot(slot)
        .map(|var| var.name().to_string())
        .unwrap_or_else(|| format!("<slot {}>", slot))
}

fn format_op(op: Op, script: &CompiledScript, table: &BuiltinTable) -> String {
    match op {
        Op::Call { builtin, label } => {
            let name = table
                .get(builtin as usize)
                .map(|def| def.name.to_string())
                .unwrap_or_else(|| format!("<builtin {}>", builtin));
            match label {
                Some(label) => format!("CALL        {:<20} ; else {}", name, label_target(script, label)),
                None => format!("CALL        {}", name),
            }
        }
        Op::Jump { label } => format!("JUMP        {}", label_target(script, label)),
        Op::SetVar { slot, operands } => {
            format!("SET         {:<20} ; {} operands", variable_name(slot), operands)
        }
        Op::OperandVar { operator, slot } => {
            format!("  {:<2}        {}", operator.symbol(), variable_name(slot))
        }
        Op::OperandConst { operator, value } => {
            // Values in this range are most likely IDSZ tags.
            let idsz = if (1 << 15..1 << 20).contains(&value) {
                format!(" ; {}", Idsz(value as u32))
            } else {
                String::new()
            };
            format!("  {:<2}        {}{}", operator.symbol(), value, idsz)
        }
    }
}
