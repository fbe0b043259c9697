//! # Document parser
//!
//! Hand-written lexer and recursive-descent parser for the subset of the
//! GraphQL query language the forum schema needs: operations with optional
//! names and variable definitions, aliased fields with arguments, and nested
//! selection sets. Fragments, directives and subscriptions are refused.

use thiserror::Error;

/// Selection sets and values nested deeper than this are rejected.
const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("syntax error at {line}:{column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    pub fn root_type(self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub variables: Vec<VariableDefinition>,
    pub selection_set: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    /// Declared type as written, e.g. `ID!` or `[String]`.
    pub ty: String,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(String, Value)>,
    pub selection_set: Vec<Field>,
}

impl Field {
    /// Key under which this field's result appears in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Variable(String),
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
    Enum(String),
    List(Vec<Value>),
    Object(Vec<(String, Value)>),
}

impl Document {
    /// Picks the operation to run. A document holding several operations
    /// needs `operation_name` to disambiguate.
    pub fn select(&self, operation_name: Option<&str>) -> Result<&Operation, String> {
        match operation_name {
            Some(wanted) => self
                .operations
                .iter()
                .find(|op| op.name.as_deref() == Some(wanted))
                .ok_or_else(|| format!("unknown operation named `{wanted}`")),
            None => match self.operations.as_slice() {
                [only] => Ok(only),
                _ => Err("operationName is required when the document has several operations".into()),
            },
        }
    }
}

pub fn parse(source: &str) -> Result<Document, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser { tokens, pos: 0, depth: 0 }.document()
}

// ── Lexer ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Punct(char),
    Spread,
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
    column: usize,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self { chars: source.chars().peekable(), line: 1, column: 1 }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError { message: message.into(), line: self.line, column: self.column }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut out = Vec::new();
        loop {
            self.skip_ignored();
            let (line, column) = (self.line, self.column);
            let Some(&c) = self.chars.peek() else {
                out.push(Token { tok: Tok::Eof, line, column });
                return Ok(out);
            };

            let tok = match c {
                '{' | '}' | '(' | ')' | '[' | ']' | ':' | '$' | '=' | '!' | '@' => {
                    self.bump();
                    Tok::Punct(c)
                }
                '.' => {
                    for _ in 0..3 {
                        if self.bump() != Some('.') {
                            return Err(self.error("expected `...`"));
                        }
                    }
                    Tok::Spread
                }
                '"' => self.string()?,
                '-' | '0'..='9' => self.number()?,
                c if c == '_' || c.is_ascii_alphabetic() => {
                    let mut name = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if c == '_' || c.is_ascii_alphanumeric() {
                            name.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    Tok::Name(name)
                }
                other => return Err(self.error(format!("unexpected character `{other}`"))),
            };
            out.push(Token { tok, line, column });
        }
    }

    fn skip_ignored(&mut self) {
        while let Some(&c) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\n' | '\r' | ',' | '\u{feff}' => {
                    self.bump();
                }
                '#' => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn number(&mut self) -> Result<Tok, ParseError> {
        let mut text = String::new();
        let mut is_float = false;
        if self.chars.peek() == Some(&'-') {
            text.push('-');
            self.bump();
        }
        self.digits(&mut text)?;
        if self.chars.peek() == Some(&'.') {
            is_float = true;
            text.push('.');
            self.bump();
            self.digits(&mut text)?;
        }
        if matches!(self.chars.peek(), Some('e') | Some('E')) {
            is_float = true;
            text.push('e');
            self.bump();
            if let Some(&sign) = self.chars.peek() {
                if sign == '+' || sign == '-' {
                    text.push(sign);
                    self.bump();
                }
            }
            self.digits(&mut text)?;
        }
        if matches!(self.chars.peek(), Some(c) if c.is_ascii_alphabetic() || *c == '_' || *c == '.') {
            return Err(self.error(format!("invalid number `{text}`")));
        }

        if is_float {
            text.parse()
                .map(Tok::Float)
                .map_err(|_| self.error(format!("invalid float `{text}`")))
        } else {
            text.parse()
                .map(Tok::Int)
                .map_err(|_| self.error(format!("integer `{text}` out of range")))
        }
    }

    fn digits(&mut self, into: &mut String) -> Result<(), ParseError> {
        let start = into.len();
        while let Some(&c) = self.chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            into.push(c);
            self.bump();
        }
        if into.len() == start {
            return Err(self.error("expected digit"));
        }
        Ok(())
    }

    fn string(&mut self) -> Result<Tok, ParseError> {
        self.bump();
        if self.chars.peek() == Some(&'"') {
            self.bump();
            if self.chars.peek() == Some(&'"') {
                self.bump();
                return self.block_string();
            }
            return Ok(Tok::Str(String::new()));
        }

        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') | Some('\r') => return Err(self.error("unterminated string")),
                Some('"') => return Ok(Tok::Str(out)),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('/') => '/',
                        Some('b') => '\u{8}',
                        Some('f') => '\u{c}',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some('u') => self.unicode_escape()?,
                        _ => return Err(self.error("invalid escape sequence")),
                    };
                    out.push(escaped);
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn unicode_escape(&mut self) -> Result<char, ParseError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("invalid unicode escape"))?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| self.error("invalid unicode escape"))
    }

    /// `"""` strings are taken verbatim apart from the `\"""` escape.
    fn block_string(&mut self) -> Result<Tok, ParseError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated block string")),
                Some('"') if out.ends_with("\"\"") => {
                    out.truncate(out.len() - 2);
                    return Ok(Tok::Str(out));
                }
                Some('\\') if self.chars.peek() == Some(&'"') => {
                    let mut quotes = 0;
                    while quotes < 3 && self.chars.peek() == Some(&'"') {
                        self.bump();
                        quotes += 1;
                    }
                    if quotes < 3 {
                        out.push('\\');
                    }
                    out.extend(std::iter::repeat('"').take(quotes));
                }
                Some(c) => out.push(c),
            }
        }
    }
}

// ── Parser ──────────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].tok
    }

    fn next(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let token = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        ParseError { message: message.into(), line: token.line, column: token.column }
    }

    fn expect(&mut self, punct: char) -> Result<(), ParseError> {
        match self.peek() {
            Tok::Punct(c) if *c == punct => {
                self.next();
                Ok(())
            }
            other => Err(self.error(format!("expected `{punct}`, found {}", describe(other)))),
        }
    }

    fn eat(&mut self, punct: char) -> bool {
        if *self.peek() == Tok::Punct(punct) {
            self.next();
            true
        } else {
            false
        }
    }

    fn name(&mut self) -> Result<String, ParseError> {
        if let Tok::Name(n) = self.peek() {
            let n = n.clone();
            self.next();
            return Ok(n);
        }
        Err(self.error(format!("expected a name, found {}", describe(self.peek()))))
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("document is nested too deeply"));
        }
        Ok(())
    }

    fn document(mut self) -> Result<Document, ParseError> {
        let mut operations = Vec::new();
        while *self.peek() != Tok::Eof {
            operations.push(self.operation()?);
        }
        if operations.is_empty() {
            return Err(self.error("document contains no operation"));
        }
        Ok(Document { operations })
    }

    fn operation(&mut self) -> Result<Operation, ParseError> {
        if *self.peek() == Tok::Punct('{') {
            return Ok(Operation {
                kind: OperationKind::Query,
                name: None,
                variables: Vec::new(),
                selection_set: self.selection_set()?,
            });
        }

        let kind = match self.peek() {
            Tok::Name(n) if n == "query" => OperationKind::Query,
            Tok::Name(n) if n == "mutation" => OperationKind::Mutation,
            Tok::Name(n) if n == "subscription" => {
                return Err(self.error("subscriptions are not supported"));
            }
            Tok::Name(n) if n == "fragment" => {
                return Err(self.error("fragments are not supported"));
            }
            other => {
                return Err(self.error(format!("expected an operation, found {}", describe(other))));
            }
        };
        self.next();

        let name = match self.peek() {
            Tok::Name(_) => Some(self.name()?),
            _ => None,
        };
        let variables = if *self.peek() == Tok::Punct('(') {
            self.variable_definitions()?
        } else {
            Vec::new()
        };
        self.reject_directives()?;

        Ok(Operation { kind, name, variables, selection_set: self.selection_set()? })
    }

    fn variable_definitions(&mut self) -> Result<Vec<VariableDefinition>, ParseError> {
        self.expect('(')?;
        let mut defs = Vec::new();
        while !self.eat(')') {
            self.expect('$')?;
            let name = self.name()?;
            self.expect(':')?;
            let ty = self.type_ref()?;
            let default = if self.eat('=') { Some(self.value(true)?) } else { None };
            self.reject_directives()?;
            defs.push(VariableDefinition { name, ty, default });
        }
        if defs.is_empty() {
            return Err(self.error("empty variable definition list"));
        }
        Ok(defs)
    }

    fn type_ref(&mut self) -> Result<String, ParseError> {
        let mut ty = if self.eat('[') {
            self.enter()?;
            let inner = self.type_ref()?;
            self.expect(']')?;
            self.depth -= 1;
            format!("[{inner}]")
        } else {
            self.name()?
        };
        if self.eat('!') {
            ty.push('!');
        }
        Ok(ty)
    }

    fn selection_set(&mut self) -> Result<Vec<Field>, ParseError> {
        self.expect('{')?;
        self.enter()?;
        let mut fields = Vec::new();
        while !self.eat('}') {
            if *self.peek() == Tok::Spread {
                return Err(self.error("fragments are not supported"));
            }
            fields.push(self.field()?);
        }
        self.depth -= 1;
        if fields.is_empty() {
            return Err(self.error("selection set must not be empty"));
        }
        Ok(fields)
    }

    fn field(&mut self) -> Result<Field, ParseError> {
        let first = self.name()?;
        let (alias, name) = if self.eat(':') { (Some(first), self.name()?) } else { (None, first) };

        let mut arguments = Vec::new();
        if self.eat('(') {
            while !self.eat(')') {
                let arg = self.name()?;
                self.expect(':')?;
                if arguments.iter().any(|(existing, _)| *existing == arg) {
                    return Err(self.error(format!("argument `{arg}` given twice")));
                }
                arguments.push((arg, self.value(false)?));
            }
            if arguments.is_empty() {
                return Err(self.error("empty argument list"));
            }
        }
        self.reject_directives()?;

        let selection_set = if *self.peek() == Tok::Punct('{') {
            self.selection_set()?
        } else {
            Vec::new()
        };
        Ok(Field { alias, name, arguments, selection_set })
    }

    fn reject_directives(&self) -> Result<(), ParseError> {
        if *self.peek() == Tok::Punct('@') {
            return Err(self.error("directives are not supported"));
        }
        Ok(())
    }

    fn value(&mut self, constant: bool) -> Result<Value, ParseError> {
        let value = match self.next() {
            Tok::Punct('$') if !constant => Value::Variable(self.name()?),
            Tok::Int(i) => Value::Int(i),
            Tok::Float(f) => Value::Float(f),
            Tok::Str(s) => Value::String(s),
            Tok::Name(n) => match n.as_str() {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                "null" => Value::Null,
                _ => Value::Enum(n),
            },
            Tok::Punct('[') => {
                self.enter()?;
                let mut items = Vec::new();
                while !self.eat(']') {
                    items.push(self.value(constant)?);
                }
                self.depth -= 1;
                Value::List(items)
            }
            Tok::Punct('{') => {
                self.enter()?;
                let mut fields: Vec<(String, Value)> = Vec::new();
                while !self.eat('}') {
                    let key = self.name()?;
                    self.expect(':')?;
                    if fields.iter().any(|(existing, _)| *existing == key) {
                        return Err(self.error(format!("input field `{key}` given twice")));
                    }
                    fields.push((key, self.value(constant)?));
                }
                self.depth -= 1;
                Value::Object(fields)
            }
            other => {
                self.pos = self.pos.saturating_sub(1);
                return Err(self.error(format!("expected a value, found {}", describe(&other))));
            }
        };
        Ok(value)
    }
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Punct(c) => format!("`{c}`"),
        Tok::Spread => "`...`".into(),
        Tok::Name(n) => format!("`{n}`"),
        Tok::Int(i) => format!("`{i}`"),
        Tok::Float(f) => format!("`{f}`"),
        Tok::Str(_) => "a string".into(),
        Tok::Eof => "end of document".into(),
    }
}
