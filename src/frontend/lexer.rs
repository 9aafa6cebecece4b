use crate::frontend::token::{LexErrorKind, SourceLocation, Token, TokenKind};
use crate::lang::idsz::Idsz;
use crate::lang::symbol::{ResolvedSymbol, SymbolTable};
use crate::runtime::alert::AlertKind;

/// Lazy tokenizer for one script source.
///
/// Tokens come out one per [`Iterator::next`]; there is no token for line
/// breaks, instead every token records its line and the indentation level of
/// that line. A bad lexeme becomes a single `Unknown` token and lexing goes
/// on from the next character.
pub struct Lexer<'s> {
    source: Vec<char>,
    symbols: &'s SymbolTable,
    pos: usize,
    line: usize,
    col: usize,
    indent: u8,
    at_line_start: bool,
}

impl<'s> Lexer<'s> {
    pub fn new(source: &str, symbols: &'s SymbolTable) -> Self {
        Lexer {
            source: source.chars().collect(),
            symbols,
            pos: 0,
            line: 1,
            col: 1,
            indent: 0,
            at_line_start: true,
        }
    }

    /// Starts over on a new source, keeping the symbol table.
    pub fn reset(&mut self, source: &str) {
        self.source = source.chars().collect();
        self.pos = 0;
        self.line = 1;
        self.col = 1;
        self.indent = 0;
        self.at_line_start = true;
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
            self.at_line_start = true;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.col)
    }

    fn token(&self, kind: TokenKind, location: SourceLocation, lexeme: impl Into<String>) -> Token {
        Token::new(kind, location, lexeme).with_indent(self.indent)
    }

    fn unknown(&self, location: SourceLocation, lexeme: impl Into<String>, error: LexErrorKind) -> Token {
        Token::unknown(location, lexeme, error).with_indent(self.indent)
    }

    /// Measures the leading whitespace of a fresh line: a space is one
    /// column, a tab or `~` two, and every two columns is one level.
    fn read_indent(&mut self) {
        let mut columns = 0usize;
        while let Some(ch) = self.current() {
            match ch {
                ' ' => columns += 1,
                '\t' | '~' => columns += 2,
                _ => break,
            }
            self.advance();
        }
        self.indent = (columns / 2).min(u8::MAX as usize) as u8;
        self.at_line_start = false;
    }

    fn skip_trivia(&mut self) {
        loop {
            if self.at_line_start {
                self.read_indent();
            }
            match self.current() {
                Some(' ' | '\t' | '\r' | '~' | '\n') => {
                    self.advance();
                }
                Some('/') if self.peek() == Some('/') => {
                    while let Some(ch) = self.current() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    pub fn next_token(&mut self) -> Option<Token> {
        self.skip_trivia();
        let ch = self.current()?;
        let location = self.location();

        let token = match ch {
            '[' => self.read_idsz(location, ']'),
            '\'' => self.read_idsz(location, '\''),
            '@' => self.read_reference(location),
            c if c.is_ascii_digit() => self.read_number(location),
            c if c.is_ascii_alphabetic() || c == '_' => self.read_identifier(location),
            _ => self.read_operator(location),
        };
        Some(token)
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        word
    }

    fn read_identifier(&mut self, location: SourceLocation) -> Token {
        let word = self.read_word();
        let (kind, value) = match self.symbols.resolve(&word) {
            Some(ResolvedSymbol::Builtin(index)) => (TokenKind::Function, index as i32),
            Some(ResolvedSymbol::Variable(var)) => (TokenKind::Variable, var.slot() as i32),
            Some(ResolvedSymbol::Constant(value)) => (TokenKind::Constant, value),
            None => (TokenKind::Name, 0),
        };
        self.token(kind, location, word).with_value(value)
    }

    /// `@Name` names an alert kind. Unknown names stay `Name` tokens so the
    /// compiler reports them like any other unknown identifier.
    fn read_reference(&mut self, location: SourceLocation) -> Token {
        self.advance();
        let word = self.read_word();
        if word.is_empty() {
            return self.unknown(location, "@", LexErrorKind::EmptyReference);
        }
        let lexeme = format!("@{}", word);
        match AlertKind::from_name(&word) {
            Some(kind) => self
                .token(TokenKind::Reference, location, lexeme)
                .with_value(kind.bit() as i32),
            None => self.token(TokenKind::Name, location, lexeme),
        }
    }

    fn read_idsz(&mut self, location: SourceLocation, close: char) -> Token {
        let open = self.current().unwrap_or(close);
        self.advance();

        let mut body = String::new();
        loop {
            match self.current() {
                Some(ch) if ch == close => {
                    self.advance();
                    break;
                }
                Some('\n') | None => {
                    let lexeme = format!("{}{}", open, body);
                    return self.unknown(location, lexeme, LexErrorKind::UnterminatedIdsz);
                }
                Some(ch) => {
                    body.push(ch);
                    self.advance();
                }
            }
        }

        let lexeme = format!("{}{}{}", open, body, close);
        match Idsz::parse(&body) {
            Some(idsz) => self
                .token(TokenKind::Idsz, location, lexeme)
                .with_value(idsz.value()),
            None => self.unknown(location, lexeme, LexErrorKind::MalformedIdsz),
        }
    }

    /// Integer, or 8.8 fixed point when a fraction is present. Integer math
    /// only.
    fn read_number(&mut self, location: SourceLocation) -> Token {
        let mut lexeme = String::new();
        let mut whole: i64 = 0;
        let mut overflow = false;
        while let Some(ch) = self.current() {
            let Some(digit) = ch.to_digit(10) else {
                break;
            };
            whole = whole * 10 + digit as i64;
            overflow |= whole > i32::MAX as i64;
            if overflow {
                whole = i32::MAX as i64 + 1;
            }
            lexeme.push(ch);
            self.advance();
        }

        let is_fixed = self.current() == Some('.') && self.peek().is_some_and(|c| c.is_ascii_digit());
        if !is_fixed {
            if overflow {
                return self.unknown(location, lexeme, LexErrorKind::NumberOverflow);
            }
            return self
                .token(TokenKind::NumericLiteral, location, lexeme)
                .with_value(whole as i32);
        }

        lexeme.push('.');
        self.advance();
        let mut numerator: i64 = 0;
        let mut denominator: i64 = 1;
        while let Some(ch) = self.current() {
            let Some(digit) = ch.to_digit(10) else {
                break;
            };
            // digits past the ninth cannot change the 1/256 result
            if denominator < 1_000_000_000 {
                numerator = numerator * 10 + digit as i64;
                denominator *= 10;
            }
            lexeme.push(ch);
            self.advance();
        }

        if overflow || whole > (i32::MAX >> 8) as i64 {
            return self.unknown(location, lexeme, LexErrorKind::NumberOverflow);
        }
        let value = (whole << 8) | (numerator * 256 / denominator);
        self.token(TokenKind::NumericLiteral, location, lexeme)
            .with_value(value as i32)
    }

    fn read_operator(&mut self, location: SourceLocation) -> Token {
        let ch = self.current().unwrap_or('\0');
        self.advance();

        let doubled = |lexer: &mut Self, kind: TokenKind| {
            if lexer.current() == Some(ch) {
                lexer.advance();
                lexer.token(kind, location, format!("{}{}", ch, ch))
            } else {
                lexer.token(kind, location, ch.to_string())
            }
        };

        match ch {
            '=' => self.token(TokenKind::Assign, location, "="),
            '+' => self.token(TokenKind::Plus, location, "+"),
            '-' => self.token(TokenKind::Minus, location, "-"),
            '&' => self.token(TokenKind::And, location, "&"),
            '*' => self.token(TokenKind::Multiply, location, "*"),
            '/' => self.token(TokenKind::Divide, location, "/"),
            '%' => self.token(TokenKind::Modulus, location, "%"),
            '<' => doubled(self, TokenKind::ShiftLeft),
            '>' => doubled(self, TokenKind::ShiftRight),
            other => self.unknown(location, other.to_string(), LexErrorKind::UnexpectedCharacter),
        }
    }

    pub fn tokenize(self) -> Vec<Token> {
        self.collect()
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}
