use thiserror::Error;

use crate::frontend::token::TokenKind;

// =============================================================================
// Word layout
// =============================================================================
//
//  31..28  tag
//  Call          index 0..11, block label + 1 in 12..27 (0 = no block)
//  Jump          label id in 0..27
//  SetVar        slot in 0..7, operand count in 8..15
//  OperandVar    operator in 24..27, slot in 0..7
//  OperandConst  operator in 24..27, signed value in 0..23

const TAG_SHIFT: u32 = 28;
const TAG_CALL: u32 = 0x1;
const TAG_JUMP: u32 = 0x2;
const TAG_SET_VAR: u32 = 0x3;
const TAG_OPERAND_VAR: u32 = 0x4;
const TAG_OPERAND_CONST: u32 = 0x5;

const OPERATOR_SHIFT: u32 = 24;
const LABEL_SHIFT: u32 = 12;

/// Highest built-in index a `Call` word can carry.
pub const MAX_BUILTIN_INDEX: u16 = 0x0FFF;
/// Highest label a `Call` word can carry.
pub const MAX_CALL_LABEL: u32 = 0xFFFE;
/// Highest label a `Jump` word can carry.
pub const MAX_JUMP_LABEL: u32 = 0x0FFF_FFFF;
pub const MIN_CONSTANT: i32 = -(1 << 23);
pub const MAX_CONSTANT: i32 = (1 << 23) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown tag {tag:#x} in word {word:#010x}")]
    UnknownTag { word: u32, tag: u32 },
    #[error("unknown operator {code} in word {word:#010x}")]
    UnknownOperator { word: u32, code: u32 },
}

/// Binary operators an operand word folds into the working value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operator {
    Add = 0,
    Sub,
    And,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
}

impl Operator {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Operator> {
        Some(match code {
            0 => Operator::Add,
            1 => Operator::Sub,
            2 => Operator::And,
            3 => Operator::Mul,
            4 => Operator::Div,
            5 => Operator::Mod,
            6 => Operator::Shl,
            7 => Operator::Shr,
            _ => return None,
        })
    }

    /// `Assign` is not a folding operator and yields `None`.
    pub fn from_token(kind: TokenKind) -> Option<Operator> {
        Some(match kind {
            TokenKind::Plus => Operator::Add,
            TokenKind::Minus => Operator::Sub,
            TokenKind::And => Operator::And,
            TokenKind::Multiply => Operator::Mul,
            TokenKind::Divide => Operator::Div,
            TokenKind::Modulus => Operator::Mod,
            TokenKind::ShiftLeft => Operator::Shl,
            TokenKind::ShiftRight => Operator::Shr,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::And => "&",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Shl => "<<",
            Operator::Shr => ">>",
        }
    }

    /// Wrapping integer arithmetic. A zero divisor leaves `acc` unchanged and
    /// shift amounts are taken modulo 32.
    pub fn apply(self, acc: i32, operand: i32) -> i32 {
        match self {
            Operator::Add => acc.wrapping_add(operand),
            Operator::Sub => acc.wrapping_sub(operand),
            Operator::And => acc & operand,
            Operator::Mul => acc.wrapping_mul(operand),
            Operator::Div if operand == 0 => acc,
            Operator::Div => acc.wrapping_div(operand),
            Operator::Mod if operand == 0 => acc,
            Operator::Mod => acc.wrapping_rem(operand),
            Operator::Shl => acc.wrapping_shl(operand as u32),
            Operator::Shr => acc.wrapping_shr(operand as u32),
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

// =============================================================================
// OP - one decoded instruction word
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Dispatch a built-in. On `Skip` jump to `label`, if any.
    Call { builtin: u16, label: Option<u32> },
    /// Unconditional jump through the label table.
    Jump { label: u32 },
    /// Evaluate the next `operands` words from zero and store into `slot`.
    SetVar { slot: u8, operands: u8 },
    OperandVar { operator: Operator, slot: u8 },
    OperandConst { operator: Operator, value: i32 },
}

impl Op {
    /// Packs the instruction. Fields are masked to their width; the compiler
    /// checks ranges before emitting.
    pub fn encode(self) -> u32 {
        match self {
            Op::Call { builtin, label } => {
                let label = label.map_or(0, |label| (label + 1) & 0xFFFF);
                (TAG_CALL << TAG_SHIFT)
                    | (label << LABEL_SHIFT)
                    | (builtin as u32 & MAX_BUILTIN_INDEX as u32)
            }
            Op::Jump { label } => (TAG_JUMP << TAG_SHIFT) | (label & MAX_JUMP_LABEL),
            Op::SetVar { slot, operands } => {
                (TAG_SET_VAR << TAG_SHIFT) | ((operands as u32) << 8) | slot as u32
            }
            Op::OperandVar { operator, slot } => {
                (TAG_OPERAND_VAR << TAG_SHIFT) | (operator.code() << OPERATOR_SHIFT) | slot as u32
            }
            Op::OperandConst { operator, value } => {
                (TAG_OPERAND_CONST << TAG_SHIFT)
                    | (operator.code() << OPERATOR_SHIFT)
                    | (value as u32 & 0x00FF_FFFF)
            }
        }
    }

    pub fn decode(word: u32) -> Result<Op, DecodeError> {
        let tag = word >> TAG_SHIFT;
        let operator = || {
            let code = (word >> OPERATOR_SHIFT) & 0xF;
            Operator::from_code(code).ok_or(DecodeError::UnknownOperator { word, code })
        };

        match tag {
            TAG_CALL => {
                let label = (word >> LABEL_SHIFT) & 0xFFFF;
                Ok(Op::Call {
                    builtin: (word & MAX_BUILTIN_INDEX as u32) as u16,
                    label: label.checked_sub(1),
                })
            }
            TAG_JUMP => Ok(Op::Jump {
                label: word & MAX_JUMP_LABEL,
            }),
            TAG_SET_VAR => Ok(Op::SetVar {
                slot: (word & 0xFF) as u8,
                operands: ((word >> 8) & 0xFF) as u8,
            }),
            TAG_OPERAND_VAR => Ok(Op::OperandVar {
                operator: operator()?,
                slot: (word & 0xFF) as u8,
            }),
            TAG_OPERAND_CONST => {
                // sign-extend the low 24 bits
                let value = ((word << 8) as i32) >> 8;
                Ok(Op::OperandConst {
                    operator: operator()?,
                    value,
                })
            }
            _ => Err(DecodeError::UnknownTag { word, tag }),
        }
    }

    pub fn is_operand(&self) -> bool {
        matches!(self, Op::OperandVar { .. } | Op::OperandConst { .. })
    }
}
