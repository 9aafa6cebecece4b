use thiserror::Error;

/// Classification of a single lexeme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Constant,
    /// Reference to a built-in operation; the value is its dense table index.
    Function,
    /// Built-in variable; the value is its slot index.
    Variable,
    /// Identifier the symbol table does not know.
    Name,
    Idsz,
    NumericLiteral,
    /// `@Name` reference to an alert kind; the value is the alert bit index.
    Reference,

    // Operators
    Assign,
    Plus,
    Minus,
    And,
    Multiply,
    Divide,
    Modulus,
    ShiftLeft,
    ShiftRight,

    Unknown,
}

impl TokenKind {
    pub fn is_operator(self) -> bool {
        matches!(
            self,
            TokenKind::Assign
                | TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::And
                | TokenKind::Multiply
                | TokenKind::Divide
                | TokenKind::Modulus
                | TokenKind::ShiftLeft
                | TokenKind::ShiftRight
        )
    }

    /// Kinds that may stand as an operand on the right side of an assignment.
    pub fn is_operand(self) -> bool {
        matches!(
            self,
            TokenKind::Constant
                | TokenKind::Variable
                | TokenKind::NumericLiteral
                | TokenKind::Idsz
                | TokenKind::Reference
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Constant => "constant",
            TokenKind::Function => "function",
            TokenKind::Variable => "variable",
            TokenKind::Name => "name",
            TokenKind::Idsz => "idsz",
            TokenKind::NumericLiteral => "numeric literal",
            TokenKind::Reference => "reference",
            TokenKind::Assign => "assign",
            TokenKind::Plus => "plus",
            TokenKind::Minus => "minus",
            TokenKind::And => "and",
            TokenKind::Multiply => "multiply",
            TokenKind::Divide => "divide",
            TokenKind::Modulus => "modulus",
            TokenKind::ShiftLeft => "shift left",
            TokenKind::ShiftRight => "shift right",
            TokenKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 1-based position of the first character of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Why the lexer produced an `Unknown` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("unexpected character")]
    UnexpectedCharacter,
    #[error("IDSZ literal must be exactly 4 characters")]
    MalformedIdsz,
    #[error("unterminated IDSZ literal")]
    UnterminatedIdsz,
    #[error("numeric literal does not fit in 32 bits")]
    NumberOverflow,
    #[error("reference is missing a name after '@'")]
    EmptyReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
    /// Indentation level of the line this token sits on.
    pub indent: u8,
    pub lexeme: String,
    /// Pre-resolved payload: literal value, IDSZ bits, variable slot,
    /// built-in index or constant value depending on `kind`.
    pub value: i32,
    pub error: Option<LexErrorKind>,
}

impl Token {
    pub fn new(kind: TokenKind, location: SourceLocation, lexeme: impl Into<String>) -> Self {
        Self {
            kind,
            location,
            indent: 0,
            lexeme: lexeme.into(),
            value: 0,
            error: None,
        }
    }

    pub fn with_value(mut self, value: i32) -> Self {
        self.value = value;
        self
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    pub fn unknown(location: SourceLocation, lexeme: impl Into<String>, error: LexErrorKind) -> Self {
        let mut token = Token::new(TokenKind::Unknown, location, lexeme);
        token.error = Some(error);
        token
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn is_one_of(&self, first: TokenKind, second: TokenKind) -> bool {
        self.is(first) || self.is(second)
    }

    pub fn is_operator(&self) -> bool {
        self.kind.is_operator()
    }

    pub fn is_assign_operator(&self) -> bool {
        self.is(TokenKind::Assign)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.lexeme)
    }
}
