//! A small C-like lexer with the directive vocabulary of combined stage shader files.
//!
//! The lexer only needs to recognize enough structure to find directives
//! and reassemble valid GLSL, so tokens borrow their text from the source.
use std::{fmt, sync::LazyLock};

use bimap::BiBTreeMap;

/// Reserved words recognized by the [Tokenizer].
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub enum Keyword {
    // Stage markers and directives.
    Vertex,
    Fragment,
    Compute,
    Layout,
    Version,
    Buffer,
    End,
    In,
    Out,
    Location,
    Material,
    // C-like types and control flow.
    Bool,
    Int,
    Uint,
    Float,
    Double,
    Void,
    If,
    Else,
    For,
    While,
    Break,
    Continue,
    Return,
    Struct,
    True,
    False,
    Const,
    Define,
    Include,
}

static KEYWORDS: LazyLock<BiBTreeMap<&'static str, Keyword>> = LazyLock::new(|| {
    [
        ("vertex", Keyword::Vertex),
        ("fragment", Keyword::Fragment),
        ("compute", Keyword::Compute),
        ("layout", Keyword::Layout),
        ("version", Keyword::Version),
        ("buffer", Keyword::Buffer),
        ("end", Keyword::End),
        ("in", Keyword::In),
        ("out", Keyword::Out),
        ("location", Keyword::Location),
        ("material", Keyword::Material),
        ("bool", Keyword::Bool),
        ("int", Keyword::Int),
        ("uint", Keyword::Uint),
        ("float", Keyword::Float),
        ("double", Keyword::Double),
        ("void", Keyword::Void),
        ("if", Keyword::If),
        ("else", Keyword::Else),
        ("for", Keyword::For),
        ("while", Keyword::While),
        ("break", Keyword::Break),
        ("continue", Keyword::Continue),
        ("return", Keyword::Return),
        ("struct", Keyword::Struct),
        ("true", Keyword::True),
        ("false", Keyword::False),
        ("const", Keyword::Const),
        ("define", Keyword::Define),
        ("include", Keyword::Include),
    ]
    .into_iter()
    .collect()
});

// Longest operators first so "<<=" isn't split into "<<" and "=".
const OPERATORS: &[&str] = &[
    "<<=", ">>=", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<", ">>", "<=",
    ">=", "==", "!=", "&&", "||", "^^", "+", "-", "*", "/", "%", "<", ">", "=", "!", "&", "|",
    "^",
];

impl Keyword {
    pub fn from_spelling(text: &str) -> Option<Self> {
        KEYWORDS.get_by_left(text).copied()
    }

    pub fn as_str(&self) -> &'static str {
        KEYWORDS.get_by_right(self).copied().unwrap_or_default()
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TokenKind {
    Identifier,
    Keyword(Keyword),
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    /// The quoted or angle bracketed path following `#include`.
    MacroString,
    Hash,
    Period,
    Comma,
    LParen,
    RParen,
    Semicolon,
    /// Any other operator or bracket like `{`, `+=`, or `&&`.
    Punctuation,
    /// The end of a preprocessor directive line.
    Newline,
    Eof,
    /// An unrecognized character or unterminated literal or comment.
    Invalid,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// The 1-based line where the token starts.
    pub line: usize,
}

impl Token<'_> {
    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Directive {
    None,
    /// The token after `#`.
    Name,
    /// The token after `#include`.
    Include,
    Body,
}

/// Converts shader source into [Token]s on demand.
///
/// Tokenizing never fails. Unrecognized input produces [TokenKind::Invalid]
/// and the caller decides if that is fatal.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    source: &'a str,
    position: usize,
    line: usize,
    directive: Directive,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            position: 0,
            line: 1,
            directive: Directive::None,
        }
    }

    /// Consume and return the next token.
    /// Returns [TokenKind::Eof] repeatedly once the source is exhausted.
    pub fn next_token(&mut self) -> Token<'a> {
        let token = self.lex();
        self.directive = match (self.directive, token.kind) {
            (_, TokenKind::Newline | TokenKind::Eof) => Directive::None,
            (Directive::None, TokenKind::Hash) => Directive::Name,
            (Directive::Name, TokenKind::Keyword(Keyword::Include)) => Directive::Include,
            (Directive::Name | Directive::Include, _) => Directive::Body,
            (state, _) => state,
        };
        token
    }

    /// Return the next token without consuming it.
    pub fn peek_token(&self) -> Token<'a> {
        self.clone().next_token()
    }

    fn lex(&mut self) -> Token<'a> {
        if let Some(token) = self.skip_trivia() {
            return token;
        }

        let start = self.position;
        let line = self.line;
        let source = self.source;
        let bytes = source.as_bytes();
        let Some(&c) = bytes.get(start) else {
            return self.token(TokenKind::Eof, start, line);
        };

        let kind = match c {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                self.position = self.scan_while(start, |b| b.is_ascii_alphanumeric() || b == b'_');
                match Keyword::from_spelling(&self.source[start..self.position]) {
                    Some(keyword) => TokenKind::Keyword(keyword),
                    None => TokenKind::Identifier,
                }
            }
            b'0'..=b'9' => self.number(),
            b'.' if bytes.get(start + 1).is_some_and(u8::is_ascii_digit) => self.number(),
            b'"' => self.string(),
            b'<' if self.directive == Directive::Include => self.angle_path(),
            b'#' => self.single(TokenKind::Hash),
            b'.' => self.single(TokenKind::Period),
            b',' => self.single(TokenKind::Comma),
            b'(' => self.single(TokenKind::LParen),
            b')' => self.single(TokenKind::RParen),
            b';' => self.single(TokenKind::Semicolon),
            b'{' | b'}' | b'[' | b']' | b'?' | b':' | b'~' => self.single(TokenKind::Punctuation),
            _ => match OPERATORS
                .iter()
                .find(|op| self.source[start..].starts_with(*op))
            {
                Some(op) => {
                    self.position += op.len();
                    TokenKind::Punctuation
                }
                None => {
                    // Consume the whole character to keep slices on UTF-8 boundaries.
                    let len = self.source[start..].chars().next().map_or(1, char::len_utf8);
                    self.position += len;
                    TokenKind::Invalid
                }
            },
        };

        self.token(kind, start, line)
    }

    fn token(&self, kind: TokenKind, start: usize, line: usize) -> Token<'a> {
        Token {
            kind,
            text: &self.source[start..self.position],
            line,
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.position += 1;
        kind
    }

    fn scan_while(&self, start: usize, f: impl Fn(u8) -> bool) -> usize {
        let source = self.source;
        let bytes = source.as_bytes();
        let mut end = start;
        while end < bytes.len() && f(bytes[end]) {
            end += 1;
        }
        end
    }

    /// Skip whitespace and comments.
    /// Returns a newline token if a newline ends the current directive.
    fn skip_trivia(&mut self) -> Option<Token<'a>> {
        let source = self.source;
        let bytes = source.as_bytes();
        loop {
            match &bytes[self.position..] {
                [b'\n', ..] => {
                    let start = self.position;
                    let line = self.line;
                    self.position += 1;
                    self.line += 1;
                    if self.directive != Directive::None {
                        return Some(self.token(TokenKind::Newline, start, line));
                    }
                }
                [b'\\', b'\n', ..] => {
                    self.position += 2;
                    self.line += 1;
                }
                [b'\\', b'\r', b'\n', ..] => {
                    self.position += 3;
                    self.line += 1;
                }
                [b' ' | b'\t' | b'\r' | 0x0b | 0x0c, ..] => self.position += 1,
                [b'/', b'/', ..] => {
                    self.position = self.scan_while(self.position, |b| b != b'\n');
                }
                [b'/', b'*', ..] => {
                    let start = self.position;
                    let line = self.line;
                    match self.source[start + 2..].find("*/") {
                        Some(end) => {
                            let comment = &self.source[start..start + 2 + end + 2];
                            self.line += comment.matches('\n').count();
                            self.position += comment.len();
                        }
                        None => {
                            self.position = bytes.len();
                            return Some(self.token(TokenKind::Invalid, start, line));
                        }
                    }
                }
                _ => return None,
            }
        }
    }

    fn number(&mut self) -> TokenKind {
        let source = self.source;
        let bytes = source.as_bytes();
        let start = self.position;

        if bytes[start] == b'0' && matches!(bytes.get(start + 1), Some(b'x' | b'X')) {
            self.position = self.scan_while(start + 2, |b| b.is_ascii_hexdigit());
            self.position = self.scan_while(self.position, |b| b == b'u' || b == b'U');
            return TokenKind::IntLiteral;
        }

        let mut is_float = false;
        self.position = self.scan_while(start, |b| b.is_ascii_digit());
        if bytes.get(self.position) == Some(&b'.') {
            is_float = true;
            self.position = self.scan_while(self.position + 1, |b| b.is_ascii_digit());
        }
        if matches!(bytes.get(self.position), Some(b'e' | b'E')) {
            let mut exponent = self.position + 1;
            if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
                exponent += 1;
            }
            if bytes.get(exponent).is_some_and(u8::is_ascii_digit) {
                is_float = true;
                self.position = self.scan_while(exponent, |b| b.is_ascii_digit());
            }
        }

        let rest = &self.source[self.position..];
        if rest.starts_with("lf") || rest.starts_with("LF") {
            self.position += 2;
            TokenKind::FloatLiteral
        } else if rest.starts_with(['f', 'F']) {
            self.position += 1;
            TokenKind::FloatLiteral
        } else if rest.starts_with(['u', 'U']) && !is_float {
            self.position += 1;
            TokenKind::IntLiteral
        } else if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntLiteral
        }
    }

    fn string(&mut self) -> TokenKind {
        let source = self.source;
        let bytes = source.as_bytes();
        let end = self.scan_while(self.position + 1, |b| b != b'"' && b != b'\n');
        if bytes.get(end) == Some(&b'"') {
            self.position = end + 1;
            if self.directive == Directive::Include {
                TokenKind::MacroString
            } else {
                TokenKind::StringLiteral
            }
        } else {
            self.position = end;
            TokenKind::Invalid
        }
    }

    fn angle_path(&mut self) -> TokenKind {
        let source = self.source;
        let bytes = source.as_bytes();
        let end = self.scan_while(self.position + 1, |b| b != b'>' && b != b'\n');
        if bytes.get(end) == Some(&b'>') {
            self.position = end + 1;
            TokenKind::MacroString
        } else {
            self.position += 1;
            TokenKind::Punctuation
        }
    }
}

/// A collected list of tokens that ends with a single [TokenKind::Eof].
#[derive(Debug, Clone)]
pub struct TokenStream<'a> {
    tokens: Vec<Token<'a>>,
    position: usize,
}

impl<'a> TokenStream<'a> {
    pub fn new(mut tokens: Vec<Token<'a>>) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let line = tokens.last().map(|t| t.line).unwrap_or(1);
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: "",
                line,
            });
        }
        Self {
            tokens,
            position: 0,
        }
    }

    /// Consume the next token.
    /// Returns the final [TokenKind::Eof] token repeatedly at the end of the stream.
    pub fn next_token(&mut self) -> Token<'a> {
        let token = self.peek_token();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    pub fn peek_token(&self) -> Token<'a> {
        self.tokens[self.position]
    }
}
