//! Token stream to bytecode.
//!
//! A script is a list of lines. Nesting is expressed by indentation alone: a
//! call followed by a line indented one level deeper owns that block, and
//! the block's end becomes the call's skip label. `Else` compiles to a jump
//! over its own block and moves the preceding block's label past the jump.
//!
//! Errors never stop compilation early. Every faulty line is reported and
//! the script is rejected as a whole if anything was found.

use std::collections::BTreeSet;

use tracing::debug;

use crate::bytecode::compile_error::{CompileErrorKind, Diagnostics};
use crate::bytecode::ir::{CompiledScript, ScriptFlags};
use crate::bytecode::op::{MAX_CALL_LABEL, MAX_CONSTANT, MIN_CONSTANT, Op, Operator};
use crate::frontend::lexer::Lexer;
use crate::frontend::token::{LexErrorKind, SourceLocation, Token, TokenKind};
use crate::lang::symbol::SymbolTable;
use crate::lang::variable::Variable;
use crate::runtime::builtins::{Builtin, BuiltinClass, BuiltinTable};

pub struct Compiler<'t> {
    table: &'t BuiltinTable,
}

impl<'t> Compiler<'t> {
    pub fn new(table: &'t BuiltinTable) -> Self {
        Self { table }
    }

    /// Lexes `source` against `symbols` and compiles the result.
    pub fn compile_source(
        &self,
        name: &str,
        source: &str,
        symbols: &SymbolTable,
    ) -> Result<CompiledScript, Diagnostics> {
        self.compile(name, Lexer::new(source, symbols))
    }

    pub fn compile(
        &self,
        name: &str,
        tokens: impl IntoIterator<Item = Token>,
    ) -> Result<CompiledScript, Diagnostics> {
        let mut emitter = Emitter::new(self.table, name);
        for line in split_lines(tokens) {
            emitter.line(&line);
        }
        emitter.finish()
    }
}

struct Line {
    indent: u8,
    tokens: Vec<Token>,
}

fn split_lines(tokens: impl IntoIterator<Item = Token>) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();
    let mut current_line = 0;
    for token in tokens {
        match lines.last_mut() {
            Some(line) if token.location.line == current_line => line.tokens.push(token),
            _ => {
                current_line = token.location.line;
                lines.push(Line {
                    indent: token.indent,
                    tokens: vec![token],
                });
            }
        }
    }
    lines
}

#[derive(Debug, Clone, Copy)]
struct Block {
    label: u32,
    is_else: bool,
}

/// The most recent line, if it may own the block that follows it.
#[derive(Debug)]
struct Opener {
    indent: u8,
    location: SourceLocation,
    name: String,
    /// Offset and built-in of the call word to patch. `None` for lines that
    /// produced no code.
    call: Option<(usize, u16)>,
    requires_block: bool,
    else_label: Option<u32>,
}

struct Emitter<'t> {
    table: &'t BuiltinTable,
    script: CompiledScript,
    diagnostics: Diagnostics,
    blocks: Vec<Block>,
    opener: Option<Opener>,
    used: BTreeSet<u16>,
    ends_with_end: bool,
}

impl<'t> Emitter<'t> {
    fn new(table: &'t BuiltinTable, name: &str) -> Self {
        Self {
            table,
            script: CompiledScript::new(name),
            diagnostics: Diagnostics::new(name),
            blocks: Vec::new(),
            opener: None,
            used: BTreeSet::new(),
            ends_with_end: false,
        }
    }

    fn error(&mut self, kind: CompileErrorKind, location: SourceLocation) {
        self.diagnostics.push(kind, location);
    }

    fn line(&mut self, line: &Line) {
        let Some(first) = line.tokens.first() else {
            return;
        };

        if let Some(opener) = self.opener.take() {
            if line.indent == opener.indent.saturating_add(1) {
                self.open_block(opener);
            } else if opener.requires_block {
                self.missing_block(&opener);
            }
        }

        if line.indent as usize > self.blocks.len() {
            self.error(
                CompileErrorKind::unbalanced(format!(
                    "unexpected indentation (level {}, expected at most {})",
                    line.indent,
                    self.blocks.len()
                )),
                first.location,
            );
            return;
        }

        let closed = self.close_blocks(line.indent as usize);
        self.statement(line.indent, &line.tokens, closed);
    }

    fn finish(mut self) -> Result<CompiledScript, Diagnostics> {
        if let Some(opener) = self.opener.take() {
            if opener.requires_block {
                self.missing_block(&opener);
            }
        }
        self.close_blocks(0);

        if !self.diagnostics.is_empty() {
            debug!(
                script = %self.script.name,
                errors = self.diagnostics.len(),
                "script rejected"
            );
            return Err(self.diagnostics);
        }

        if !self.ends_with_end {
            self.script.flags |= ScriptFlags::MISSING_END;
        }
        self.script.builtins_used = self.used.len() as u16;

        debug!(
            script = %self.script.name,
            words = self.script.words.len(),
            labels = self.script.labels.len(),
            builtins = self.script.builtins_used,
            "compiled script"
        );
        Ok(self.script)
    }

    fn missing_block(&mut self, opener: &Opener) {
        self.error(
            CompileErrorKind::unbalanced(format!(
                "'{}' must be followed by an indented block",
                opener.name
            )),
            opener.location,
        );
    }

    fn reserve_label(&mut self, location: SourceLocation) -> u32 {
        let label = self.script.labels.len() as u32;
        if label == MAX_CALL_LABEL + 1 {
            self.error(
                CompileErrorKind::ScriptTooLarge {
                    what: "too many blocks",
                },
                location,
            );
        }
        self.script.labels.push(0);
        label
    }

    fn open_block(&mut self, opener: Opener) {
        let label = match opener.else_label {
            Some(label) => label,
            None => self.reserve_label(opener.location),
        };
        if let Some((offset, builtin)) = opener.call {
            self.script.words[offset] = Op::Call {
                builtin,
                label: Some(label),
            }
            .encode();
        }
        self.blocks.push(Block {
            label,
            is_else: opener.else_label.is_some(),
        });
    }

    /// Closes blocks deeper than `depth`, pointing their labels at the next
    /// word. Returns the outermost block closed.
    fn close_blocks(&mut self, depth: usize) -> Option<Block> {
        let mut closed = None;
        while self.blocks.len() > depth {
            if let Some(block) = self.blocks.pop() {
                self.set_label(block.label, self.script.words.len());
                closed = Some(block);
            }
        }
        closed
    }

    fn set_label(&mut self, label: u32, offset: usize) {
        if let Some(slot) = self.script.labels.get_mut(label as usize) {
            *slot = offset as u32;
        }
    }

    fn emit(&mut self, op: Op) -> usize {
        let offset = self.script.words.len();
        self.script.words.push(op.encode());
        offset
    }

    /// Placeholder opener for a rejected line, so its block does not raise a
    /// second error.
    fn tolerate_block(&mut self, indent: u8, token: &Token) {
        self.opener = Some(Opener {
            indent,
            location: token.location,
            name: token.lexeme.clone(),
            call: None,
            requires_block: false,
            else_label: None,
        });
    }

    fn statement(&mut self, indent: u8, tokens: &[Token], closed: Option<Block>) {
        let first = &tokens[0];

        let mut rejected = false;
        for token in tokens {
            match token.kind {
                TokenKind::Unknown => {
                    rejected = true;
                    let cause = token.error.unwrap_or(LexErrorKind::UnexpectedCharacter);
                    let lexeme = token.lexeme.clone();
                    let kind = match cause {
                        LexErrorKind::MalformedIdsz | LexErrorKind::UnterminatedIdsz => {
                            CompileErrorKind::MalformedIdsz { lexeme, cause }
                        }
                        _ => CompileErrorKind::InvalidToken { lexeme, cause },
                    };
                    self.error(kind, token.location);
                }
                TokenKind::Name => {
                    rejected = true;
                    self.error(
                        CompileErrorKind::UnknownIdentifier {
                            name: token.lexeme.clone(),
                        },
                        token.location,
                    );
                }
                _ => {}
            }
        }

        if rejected {
            if first.is_one_of(TokenKind::Function, TokenKind::Name) {
                self.tolerate_block(indent, first);
            }
            return;
        }

        if indent == 0 {
            self.ends_with_end = false;
        }

        match first.kind {
            TokenKind::Function => self.call(indent, tokens, closed),
            TokenKind::Variable => self.assignment(tokens),
            _ => self.error(
                CompileErrorKind::MalformedStatement {
                    lexeme: first.lexeme.clone(),
                },
                first.location,
            ),
        }
    }

    fn call(&mut self, indent: u8, tokens: &[Token], closed: Option<Block>) {
        let first = &tokens[0];
        let def = u16::try_from(first.value)
            .ok()
            .and_then(|index| Some((index, self.table.get(index as usize)?)));
        let Some((index, def)) = def else {
            self.error(
                CompileErrorKind::UnknownIdentifier {
                    name: first.lexeme.clone(),
                },
                first.location,
            );
            return;
        };

        if tokens.len() > 1 {
            self.error(
                CompileErrorKind::OperandCountMismatch {
                    name: def.name.to_string(),
                    expected: 0,
                    found: tokens.len() - 1,
                },
                tokens[1].location,
            );
            self.tolerate_block(indent, first);
            return;
        }

        if def.class == BuiltinClass::Flow {
            self.else_branch(indent, first, closed);
            return;
        }

        let offset = self.emit(Op::Call {
            builtin: index,
            label: None,
        });
        self.used.insert(index);
        if indent == 0 && index == Builtin::End.index() {
            self.ends_with_end = true;
        }

        self.opener = Some(Opener {
            indent,
            location: first.location,
            name: def.name.to_string(),
            call: Some((offset, index)),
            requires_block: def.class == BuiltinClass::Predicate,
            else_label: None,
        });
    }

    fn else_branch(&mut self, indent: u8, token: &Token, closed: Option<Block>) {
        let Some(previous) = closed.filter(|block| !block.is_else) else {
            let reason = match closed {
                Some(_) => "'Else' cannot follow another 'Else' block",
                None => "'Else' must directly follow the end of an indented block",
            };
            self.error(CompileErrorKind::unbalanced(reason), token.location);
            self.tolerate_block(indent, token);
            return;
        };

        let label = self.reserve_label(token.location);
        self.emit(Op::Jump { label });
        self.set_label(previous.label, self.script.words.len());

        self.opener = Some(Opener {
            indent,
            location: token.location,
            name: token.lexeme.clone(),
            call: None,
            requires_block: true,
            else_label: Some(label),
        });
    }

    fn assignment(&mut self, tokens: &[Token]) {
        let target = &tokens[0];
        let Some(var) = u8::try_from(target.value).ok().and_then(Variable::from_slot) else {
            self.error(
                CompileErrorKind::UnknownIdentifier {
                    name: target.lexeme.clone(),
                },
                target.location,
            );
            return;
        };

        let assign = match tokens.get(1) {
            Some(token) if token.is_assign_operator() => token,
            _ => {
                self.error(
                    CompileErrorKind::MalformedStatement {
                        lexeme: target.lexeme.clone(),
                    },
                    target.location,
                );
                return;
            }
        };

        if !var.is_writable() {
            self.error(
                CompileErrorKind::ReadOnlyVariable {
                    name: target.lexeme.clone(),
                },
                target.location,
            );
            return;
        }

        let Some(operands) = self.expression(assign, &tokens[2..]) else {
            return;
        };
        let Ok(count) = u8::try_from(operands.len()) else {
            self.error(
                CompileErrorKind::ScriptTooLarge {
                    what: "expression has more than 255 operands",
                },
                assign.location,
            );
            return;
        };

        self.emit(Op::SetVar {
            slot: var.slot(),
            operands: count,
        });
        for operand in operands {
            self.emit(operand);
        }
    }

    /// `[op] operand (op operand)*`. The first operand folds into zero with
    /// `+` unless an operator precedes it.
    fn expression(&mut self, assign: &Token, tokens: &[Token]) -> Option<Vec<Op>> {
        if tokens.is_empty() {
            self.error(
                CompileErrorKind::malformed_expression("missing value after '='"),
                assign.location,
            );
            return None;
        }

        let mut operands = Vec::new();
        let mut ok = true;
        let mut rest = tokens;
        while let Some(token) = rest.first() {
            let (operator, after) = if token.is_operator() {
                let Some(operator) = Operator::from_token(token.kind) else {
                    self.error(
                        CompileErrorKind::malformed_expression("'=' inside an expression"),
                        token.location,
                    );
                    return None;
                };
                (operator, &rest[1..])
            } else if operands.is_empty() {
                (Operator::Add, rest)
            } else {
                self.error(
                    CompileErrorKind::malformed_expression(format!(
                        "expected an operator before '{}'",
                        token.lexeme
                    )),
                    token.location,
                );
                return None;
            };

            let Some(operand) = after.first() else {
                self.error(
                    CompileErrorKind::malformed_expression(format!(
                        "expected an operand after '{}'",
                        operator
                    )),
                    token.location,
                );
                return None;
            };

            match operand.kind {
                TokenKind::Variable => match u8::try_from(operand.value) {
                    Ok(slot) => operands.push(Op::OperandVar { operator, slot }),
                    Err(_) => {
                        ok = false;
                        self.error(
                            CompileErrorKind::UnknownIdentifier {
                                name: operand.lexeme.clone(),
                            },
                            operand.location,
                        );
                    }
                },
                kind if kind.is_operand() => {
                    if (MIN_CONSTANT..=MAX_CONSTANT).contains(&operand.value) {
                        operands.push(Op::OperandConst {
                            operator,
                            value: operand.value,
                        });
                    } else {
                        ok = false;
                        self.error(
                            CompileErrorKind::ConstantOutOfRange {
                                value: operand.value,
                            },
                            operand.location,
                        );
                    }
                }
                _ => {
                    self.error(
                        CompileErrorKind::malformed_expression(format!(
                            "'{}' cannot be used as an operand",
                            operand.lexeme
                        )),
                        operand.location,
                    );
                    return None;
                }
            }
            rest = &after[1..];
        }

        ok.then_some(operands)
    }
}
