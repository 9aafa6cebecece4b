use thiserror::Error;

use crate::bytecode::ir::CompiledScript;
use crate::bytecode::op::{DecodeError, Op};
use crate::lang::variable::Variable;
use crate::runtime::builtins::BuiltinTable;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("word {offset}: {cause}")]
    Corrupt { offset: usize, cause: DecodeError },
    #[error("word {offset}: built-in index {index} out of range")]
    UnknownBuiltin { offset: usize, index: u16 },
    #[error("word {offset}: label {label} is not defined")]
    UndefinedLabel { offset: usize, label: u32 },
    #[error("label {label} points past the end of the script ({target})")]
    LabelOutOfRange { label: u32, target: u32 },
    #[error("word {offset}: no variable in slot {slot}")]
    UnknownVariable { offset: usize, slot: u8 },
    #[error("word {offset}: variable '{name}' is read-only")]
    ReadOnlyVariable { offset: usize, name: &'static str },
    #[error("word {offset}: expression expects {expected} operands, found {found}")]
    TruncatedExpression {
        offset: usize,
        expected: u8,
        found: u8,
    },
    #[error("word {offset}: operand outside an expression")]
    StrayOperand { offset: usize },
    #[error("label {label} points into an expression (word {target})")]
    LabelInsideExpression { label: u32, target: u32 },
}

/// Checks that every word decodes, every index and label resolves to an
/// instruction start and every expression carries exactly its operands. Compiled output always passes;
/// this guards scripts read back from disk.
pub fn verify(script: &CompiledScript, table: &BuiltinTable) -> Result<(), VerifyError> {
    let len = script.words.len() as u32;
    for (label, target) in script.labels.iter().enumerate() {
        if *target > len {
            return Err(VerifyError::LabelOutOfRange {
                label: label as u32,
                target: *target,
            });
        }
    }

    let check_label = |offset: usize, label: u32| {
        if script.label_offset(label).is_none() {
            return Err(VerifyError::UndefinedLabel { offset, label });
        }
        Ok(())
    };

    let check_slot = |offset: usize, slot: u8| {
        Variable::from_slot(slot).ok_or(VerifyError::UnknownVariable { offset, slot })
    };

    let mut starts = vec![false; script.words.len() + 1];
    starts[script.words.len()] = true;

    let mut offset = 0;
    while offset < script.words.len() {
        starts[offset] = true;
        let op = decode_at(script, offset)?;
        match op {
            Op::Call { builtin, label } => {
                if table.get(builtin as usize).is_none() {
                    return Err(VerifyError::UnknownBuiltin {
                        offset,
                        index: builtin,
                    });
                }
                if let Some(label) = label {
                    check_label(offset, label)?;
                }
            }
            Op::Jump { label } => check_label(offset, label)?,
            Op::SetVar { slot, operands } => {
                let var = check_slot(offset, slot)?;
                if !var.is_writable() {
                    return Err(VerifyError::ReadOnlyVariable {
                        offset,
                        name: var.name(),
                    });
                }
                for found in 0..operands {
                    let at = offset + 1 + found as usize;
                    let operand = match script.words.get(at) {
                        Some(_) => decode_at(script, at)?,
                        None => {
                            return Err(VerifyError::TruncatedExpression {
                                offset,
                                expected: operands,
                                found,
                            });
                        }
                    };
                    match operand {
                        Op::OperandVar { slot, .. } => {
                            check_slot(at, slot)?;
                        }
                        Op::OperandConst { .. } => {}
                        _ => {
                            return Err(VerifyError::TruncatedExpression {
                                offset,
                                expected: operands,
                                found,
                            });
                        }
                    }
                }
                offset += operands as usize;
            }
            Op::OperandVar { .. } | Op::OperandConst { .. } => {
                return Err(VerifyError::StrayOperand { offset });
            }
        }
        offset += 1;
    }

    for (label, target) in script.labels.iter().enumerate() {
        if !starts[*target as usize] {
            return Err(VerifyError::LabelInsideExpression {
                label: label as u32,
                target: *target,
            });
        }
    }

    Ok(())
}

fn decode_at(script: &CompiledScript, offset: usize) -> Result<Op, VerifyError> {
    Op::decode(script.words[offset]).map_err(|cause| VerifyError::Corrupt { offset, cause })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ir::PersistError;
    use crate::bytecode::op::Operator;
    use crate::runtime::builtins::Builtin;

    fn script_from_ops(ops: &[Op], labels: Vec<u32>) -> CompiledScript {
        let mut script = CompiledScript::new("verify");
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

    fn check(ops: &[Op], labels: Vec<u32>) -> Result<(), VerifyError> {
        verify(&script_from_ops(ops, labels), &BuiltinTable::standard())
    }

    #[test]
    fn test_empty_script_ok() {
        assert!(check(&[], vec![]).is_ok());
    }

    #[test]
    fn test_assignment_ok() {
        let ops = [
            Op::SetVar {
                slot: Variable::TmpArgument.slot(),
                operands: 2,
            },
            Op::OperandConst {
                operator: Operator::Add,
                value: 3,
            },
            Op::OperandVar {
                operator: Operator::Mul,
                slot: Variable::TmpX.slot(),
            },
            call(Builtin::End),
        ];
        assert!(check(&ops, vec![]).is_ok());
    }

    #[test]
    fn test_truncated_expression() {
        let ops = [
            Op::SetVar {
                slot: Variable::TmpX.slot(),
                operands: 2,
            },
            Op::OperandConst {
                operator: Operator::Add,
                value: 3,
            },
        ];
        assert_eq!(
            check(&ops, vec![]),
            Err(VerifyError::TruncatedExpression {
                offset: 0,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_stray_operand() {
        let ops = [Op::OperandConst {
            operator: Operator::Add,
            value: 3,
        }];
        assert_eq!(check(&ops, vec![]), Err(VerifyError::StrayOperand { offset: 0 }));
    }

    #[test]
    fn test_write_to_read_only_variable() {
        let ops = [Op::SetVar {
            slot: Variable::SelfLife.slot(),
            operands: 0,
        }];
        assert!(matches!(
            check(&ops, vec![]),
            Err(VerifyError::ReadOnlyVariable { offset: 0, .. })
        ));
    }

    #[test]
    fn test_undefined_and_out_of_range_labels() {
        let ops = [Op::Jump { label: 1 }];
        assert_eq!(
            check(&ops, vec![0]),
            Err(VerifyError::UndefinedLabel {
                offset: 0,
                label: 1
            })
        );
        assert_eq!(
            check(&[call(Builtin::End)], vec![5]),
            Err(VerifyError::LabelOutOfRange {
                label: 0,
                target: 5
            })
        );
    }

    #[test]
    fn test_label_into_operand_rejected() {
        let ops = [
            Op::SetVar {
                slot: Variable::TmpX.slot(),
                operands: 1,
            },
            Op::OperandConst {
                operator: Operator::Add,
                value: 1,
            },
            Op::Call {
                builtin: Builtin::IfSpawned.index(),
                label: Some(0),
            },
        ];
        assert_eq!(
            check(&ops, vec![1]),
            Err(VerifyError::LabelInsideExpression {
                label: 0,
                target: 1
            })
        );
        assert!(check(&ops, vec![2]).is_ok());
        assert!(check(&ops, vec![3]).is_ok());

        let bytes = script_from_ops(&ops, vec![1]).to_bytes().unwrap();
        assert!(matches!(
            CompiledScript::from_bytes(&bytes, &BuiltinTable::standard()),
            Err(PersistError::Verify(VerifyError::LabelInsideExpression { .. }))
        ));
    }

    #[test]
    fn test_builtin_index_out_of_range() {
        let index = BuiltinTable::standard().len() as u16;
        let ops = [Op::Call {
            builtin: index,
            label: None,
        }];
        assert_eq!(
            check(&ops, vec![]),
            Err(VerifyError::UnknownBuiltin { offset: 0, index })
        );
    }
}
