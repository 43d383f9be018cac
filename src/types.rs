//! C type vocabulary and declaration parsing.
//!
//! The parser covers the subset of C needed to describe JNI prototypes:
//! - `typedef` declarations over builtin, tagged or previously declared types
//! - `struct`/`union`/`enum` forward declarations
//! - function declarations with named or unnamed parameters and `...`
//! - pointers and `const`/`volatile` qualifiers
//!
//! Preprocessor lines and comments are skipped. Bodies, arrays and function
//! pointers are not supported.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;

use crate::host::{DeclarationResolver, TypeVocabulary};

/// Errors raised while parsing headers or declarations.
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum ParseError {
    #[error("unexpected token: expected {expected}, got {got}")]
    UnexpectedToken { expected: String, got: String },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("invalid character {ch:?} at position {pos}")]
    InvalidCharacter { ch: char, pos: usize },
}

pub(crate) type ParseResult<T> = Result<T, ParseError>;

const BUILTIN_WORDS: &[&str] = &[
    "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned", "_Bool",
];

const TAG_KEYWORDS: &[&str] = &["struct", "union", "enum"];

fn is_builtin_word(word: &str) -> bool {
    BUILTIN_WORDS.contains(&word)
}

/// A C type reference: base name, pointer depth and base qualifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CType {
    pub(crate) base: String,
    pub(crate) pointer_depth: usize,
    pub(crate) is_const: bool,
}

impl CType {
    pub(crate) fn named(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            pointer_depth: 0,
            is_const: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn pointer_to(mut self) -> Self {
        self.pointer_depth += 1;
        self
    }

    fn is_builtin(&self) -> bool {
        self.base.split(' ').all(is_builtin_word)
    }

    fn is_tagged(&self) -> bool {
        self.base
            .split_once(' ')
            .is_some_and(|(keyword, _)| TAG_KEYWORDS.contains(&keyword))
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const {
            write!(f, "const ")?;
        }
        write!(f, "{}", self.base)?;
        if self.pointer_depth > 0 {
            write!(f, " {}", "*".repeat(self.pointer_depth))?;
        }
        Ok(())
    }
}

/// A function parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Param {
    pub(crate) ty: CType,
    pub(crate) name: Option<String>,
}

/// A resolved function prototype.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Prototype {
    pub(crate) name: String,
    pub(crate) return_type: CType,
    pub(crate) params: Vec<Param>,
    pub(crate) variadic: bool,
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.return_type)?;
        if self.return_type.pointer_depth == 0 {
            write!(f, " ")?;
        }
        write!(f, "{}(", self.name)?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param.ty)?;
            if let Some(name) = &param.name {
                if param.ty.pointer_depth == 0 {
                    write!(f, " ")?;
                }
                write!(f, "{name}")?;
            }
        }
        if self.variadic {
            if !self.params.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        } else if self.params.is_empty() {
            write!(f, "void")?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Typedef,
    Const,
    Volatile,
    Ident(String),
    Star,
    Comma,
    OpenParen,
    CloseParen,
    Semicolon,
    Ellipsis,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Typedef => write!(f, "typedef"),
            Token::Const => write!(f, "const"),
            Token::Volatile => write!(f, "volatile"),
            Token::Ident(name) => write!(f, "{name}"),
            Token::Star => write!(f, "*"),
            Token::Comma => write!(f, ","),
            Token::OpenParen => write!(f, "("),
            Token::CloseParen => write!(f, ")"),
            Token::Semicolon => write!(f, ";"),
            Token::Ellipsis => write!(f, "..."),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

fn tokenize(input: &str) -> ParseResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    let mut line_start = true;

    while let Some(&(pos, ch)) = chars.peek() {
        if ch == '\n' {
            line_start = true;
            chars.next();
            continue;
        }
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        if ch == '#' && line_start {
            while chars.next_if(|&(_, c)| c != '\n').is_some() {}
            continue;
        }
        line_start = false;

        let rest = &input[pos..];
        if rest.starts_with("//") {
            while chars.next_if(|&(_, c)| c != '\n').is_some() {}
            continue;
        }
        if rest.starts_with("/*") {
            let close = rest[2..].find("*/").ok_or(ParseError::UnexpectedEof)?;
            let end = pos + 2 + close + 2;
            while chars.next_if(|&(p, _)| p < end).is_some() {}
            continue;
        }
        if rest.starts_with("...") {
            chars.nth(2);
            tokens.push(Token::Ellipsis);
            continue;
        }

        let token = match ch {
            '*' => Token::Star,
            ',' => Token::Comma,
            '(' => Token::OpenParen,
            ')' => Token::CloseParen,
            ';' => Token::Semicolon,
            c if c == '_' || c.is_ascii_alphabetic() => {
                let mut word = String::new();
                while let Some((_, c)) = chars.next_if(|&(_, c)| c == '_' || c.is_ascii_alphanumeric())
                {
                    word.push(c);
                }
                tokens.push(match word.as_str() {
                    "typedef" => Token::Typedef,
                    "const" => Token::Const,
                    "volatile" => Token::Volatile,
                    _ => Token::Ident(word),
                });
                continue;
            }
            other => return Err(ParseError::InvalidCharacter { ch: other, pos }),
        };
        chars.next();
        tokens.push(token);
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

/// A top-level header statement.
#[derive(Debug, PartialEq)]
enum Statement {
    Typedef { name: String, ty: CType },
    Tag(String),
    Function(Prototype),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> ParseResult<Self> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
        })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        *self.peek() == Token::Eof
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Token::Eof => ParseError::UnexpectedEof,
            got => ParseError::UnexpectedToken {
                expected: expected.to_string(),
                got: got.to_string(),
            },
        }
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    fn parse_statement(&mut self) -> ParseResult<Option<Statement>> {
        loop {
            match self.peek() {
                Token::Eof => return Ok(None),
                Token::Semicolon => {
                    self.advance();
                }
                Token::Typedef => {
                    self.advance();
                    let base = self.parse_type()?;
                    let (ty, name) = self.parse_declarator(base);
                    let name = name.ok_or_else(|| self.unexpected("typedef name"))?;
                    self.expect(Token::Semicolon)?;
                    return Ok(Some(Statement::Typedef { name, ty }));
                }
                Token::Ident(keyword)
                    if TAG_KEYWORDS.contains(&keyword.as_str())
                        && self.peek_at(2) == Some(&Token::Semicolon) =>
                {
                    let keyword = keyword.clone();
                    self.advance();
                    let tag = match self.advance() {
                        Token::Ident(tag) => tag,
                        other => {
                            return Err(ParseError::UnexpectedToken {
                                expected: "tag name".to_string(),
                                got: other.to_string(),
                            });
                        }
                    };
                    self.advance();
                    return Ok(Some(Statement::Tag(format!("{keyword} {tag}"))));
                }
                _ => {
                    let prototype = self.parse_function()?;
                    self.expect(Token::Semicolon)?;
                    return Ok(Some(Statement::Function(prototype)));
                }
            }
        }
    }

    fn skip_qualifiers(&mut self) -> bool {
        let mut is_const = false;
        loop {
            match self.peek() {
                Token::Const => is_const = true,
                Token::Volatile => {}
                _ => return is_const,
            }
            self.advance();
        }
    }

    fn parse_type(&mut self) -> ParseResult<CType> {
        let mut is_const = self.skip_qualifiers();

        let base = match self.peek().clone() {
            Token::Ident(keyword) if TAG_KEYWORDS.contains(&keyword.as_str()) => {
                self.advance();
                match self.advance() {
                    Token::Ident(tag) => format!("{keyword} {tag}"),
                    Token::Eof => return Err(ParseError::UnexpectedEof),
                    other => {
                        return Err(ParseError::UnexpectedToken {
                            expected: "tag name".to_string(),
                            got: other.to_string(),
                        });
                    }
                }
            }
            Token::Ident(word) if is_builtin_word(&word) => {
                let mut words = Vec::new();
                while let Token::Ident(word) = self.peek() {
                    if !is_builtin_word(word) {
                        break;
                    }
                    words.push(word.clone());
                    self.advance();
                }
                words.join(" ")
            }
            Token::Ident(name) => {
                self.advance();
                name
            }
            _ => return Err(self.unexpected("type name")),
        };

        is_const |= self.skip_qualifiers();
        Ok(CType {
            base,
            pointer_depth: 0,
            is_const,
        })
    }

    fn parse_declarator(&mut self, base: CType) -> (CType, Option<String>) {
        let mut ty = base;
        while *self.peek() == Token::Star {
            self.advance();
            ty.pointer_depth += 1;
            self.skip_qualifiers();
        }
        let name = match self.peek() {
            Token::Ident(name) => Some(name.clone()),
            _ => None,
        };
        if name.is_some() {
            self.advance();
        }
        (ty, name)
    }

    fn parse_function(&mut self) -> ParseResult<Prototype> {
        let base = self.parse_type()?;
        let (return_type, name) = self.parse_declarator(base);
        let name = name.ok_or_else(|| self.unexpected("function name"))?;
        self.expect(Token::OpenParen)?;
        let (params, variadic) = self.parse_parameter_list()?;
        Ok(Prototype {
            name,
            return_type,
            params,
            variadic,
        })
    }

    fn parse_parameter_list(&mut self) -> ParseResult<(Vec<Param>, bool)> {
        let mut params = Vec::new();
        if *self.peek() == Token::CloseParen {
            self.advance();
            return Ok((params, false));
        }
        if matches!(self.peek(), Token::Ident(word) if word == "void")
            && self.peek_at(1) == Some(&Token::CloseParen)
        {
            self.advance();
            self.advance();
            return Ok((params, false));
        }

        loop {
            if *self.peek() == Token::Ellipsis {
                self.advance();
                self.expect(Token::CloseParen)?;
                return Ok((params, true));
            }
            let base = self.parse_type()?;
            let (ty, name) = self.parse_declarator(base);
            params.push(Param { ty, name });
            match self.peek() {
                Token::Comma => {
                    self.advance();
                }
                Token::CloseParen => {
                    self.advance();
                    return Ok((params, false));
                }
                _ => return Err(self.unexpected("',' or ')'")),
            }
        }
    }
}

/// Named types and prototypes known to the current session.
#[derive(Debug, Clone, Default)]
pub(crate) struct TypeDatabase {
    typedefs: BTreeMap<String, CType>,
    tags: BTreeSet<String>,
    functions: BTreeMap<String, Prototype>,
}

impl TypeDatabase {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn typedef(&self, name: &str) -> Option<&CType> {
        self.typedefs.get(name)
    }

    /// Register every declaration in a header, returning the number of new typedefs.
    pub(crate) fn parse_header(&mut self, source: &str) -> ParseResult<usize> {
        let mut parser = Parser::new(source)?;
        let mut added = 0;
        while let Some(statement) = parser.parse_statement()? {
            match statement {
                Statement::Typedef { name, ty } => {
                    self.check_type(&ty)?;
                    if self.typedefs.insert(name, ty).is_none() {
                        added += 1;
                    }
                }
                Statement::Tag(tag) => {
                    self.tags.insert(tag);
                }
                Statement::Function(prototype) => {
                    self.check_prototype(&prototype)?;
                    self.functions.insert(prototype.name.clone(), prototype);
                }
            }
        }
        Ok(added)
    }

    /// Parse a single function declaration against the known vocabulary.
    pub(crate) fn parse_declaration(&self, declaration: &str) -> ParseResult<Prototype> {
        let mut parser = Parser::new(declaration)?;
        let prototype = parser.parse_function()?;
        if *parser.peek() == Token::Semicolon {
            parser.advance();
        }
        if !parser.at_eof() {
            return Err(parser.unexpected("end of declaration"));
        }
        self.check_prototype(&prototype)?;
        Ok(prototype)
    }

    fn check_type(&self, ty: &CType) -> ParseResult<()> {
        if ty.is_builtin() || ty.is_tagged() || self.typedefs.contains_key(&ty.base) {
            Ok(())
        } else {
            Err(ParseError::UnknownType(ty.base.clone()))
        }
    }

    fn check_prototype(&self, prototype: &Prototype) -> ParseResult<()> {
        self.check_type(&prototype.return_type)?;
        for param in &prototype.params {
            self.check_type(&param.ty)?;
        }
        Ok(())
    }
}

impl DeclarationResolver for TypeDatabase {
    fn resolve(&self, declaration: &str) -> ParseResult<Prototype> {
        self.parse_declaration(declaration)
    }
}

impl TypeVocabulary for TypeDatabase {
    fn has_type(&self, name: &str) -> bool {
        self.typedef(name).is_some() || CType::named(name).is_builtin()
    }

    fn load_header(&mut self, source: &str) -> ParseResult<usize> {
        self.parse_header(source)
    }
}
