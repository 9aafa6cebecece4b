use std::fmt::Write;

use crate::frontend::token::{Token, TokenKind};

pub struct TokenDumper {
    pub color: bool,
    pub show_debug_repr: bool, // if false, prints lexeme and value only
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            show_debug_repr: true,
        }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const RED: &'static str = "\x1b[31m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.show_debug_repr = false;
        self
    }

    pub fn dump(&self, tokens: &[Token]) {
        print!("{}", self.render(tokens));
    }

    pub fn render(&self, tokens: &[Token]) -> String {
        let mut out = String::new();
        for token in tokens {
            self.render_one(&mut out, token);
        }
        out
    }

    fn render_one(&self, out: &mut String, token: &Token) {
        let line = token.location.line;
        let col = token.location.column;

        let kind = self.kind(token.kind);
        let colr = if self.color { self.color(token.kind) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };

        let _ = if self.show_debug_repr {
            writeln!(
                out,
                "[{:02}:{:02}] {}{:<8} {:?}{}",
                line, col, colr, kind, token, reset
            )
        } else {
            match (token.kind, token.error) {
                (_, Some(error)) => writeln!(
                    out,
                    "[{:02}:{:02}] {}{:<8} {:<16} ({}){}",
                    line, col, colr, kind, token.lexeme, error, reset
                ),
                (k, None) if k.is_operator() => writeln!(
                    out,
                    "[{:02}:{:02}] {}{:<8} {}{}",
                    line, col, colr, kind, token.lexeme, reset
                ),
                _ => writeln!(
                    out,
                    "[{:02}:{:02}] {}{:<8} {:<16} = {} (indent {}){}",
                    line, col, colr, kind, token.lexeme, token.value, token.indent, reset
                ),
            }
        };
    }

    fn kind(&self, kind: TokenKind) -> &'static str {
        match kind {
            TokenKind::Function => "FUNC",
            TokenKind::Variable => "VAR",
            TokenKind::Constant => "CONST",
            TokenKind::Name => "NAME",
            TokenKind::Idsz => "IDSZ",
            TokenKind::NumericLiteral => "NUM",
            TokenKind::Reference => "REF",
            TokenKind::Unknown => "UNKNOWN",
            k if k.is_operator() => "OP",
            _ => "OTHER",
        }
    }

    fn color(&self, kind: TokenKind) -> &'static str {
        match kind {
            TokenKind::Function => Self::YEL,
            TokenKind::Idsz | TokenKind::Reference => Self::GRN,
            TokenKind::NumericLiteral | TokenKind::Constant => Self::CYN,
            TokenKind::Unknown | TokenKind::Name => Self::RED,
            k if k.is_operator() => Self::MAG,
            _ => Self::RESET,
        }
    }
}
