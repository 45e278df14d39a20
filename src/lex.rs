use std::sync::LazyLock;

use regex::Regex;

/// #Notes
/// `-` could be a binary operator or the start of a negative number. This
///  lexer does not attempt to distinguish: it always becomes a Minus token and
///  the parser decides from context.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    String,
    Identifier,
    /// `{Some Field}`, the token text is the inner name
    FieldReference,
    ParenLeft,
    ParenRight,
    BracketLeft,
    BracketRight,
    Comma,
    Plus,
    Minus,
    Asterisk,
    ForwardSlash,
    Ampersand, // & is string concatenation
    Equals,
    NotEquals, // != or <>
    LT,
    GT,
    LTE,
    GTE,
    And,
    Or,
    Not,
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text of the token. String literals keep their quotes and
    ///  escapes; field references hold the unescaped inner name.
    pub text: String,
    /// Byte index into the source
    pub start: usize,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TokenKind::FieldReference => write!(f, "{{{}}}", self.text)?,
            _ => write!(f, "'{}'", self.text)?,
        }
        write!(f, " at {}", self.start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Unexpected character {character:?} at {position}")]
    UnexpectedCharacter { position: usize, character: char },
    #[error("Unterminated string literal starting at {0}")]
    UnterminatedStringLiteral(usize),
    #[error("Unterminated field reference starting at {0}")]
    UnterminatedFieldReference(usize),
    #[error("Empty field reference at {0}")]
    EmptyFieldReference(usize),
}

impl Error {
    pub fn position(&self) -> usize {
        match self {
            Self::UnexpectedCharacter { position, .. } => *position,
            Self::UnterminatedStringLiteral(p)
            | Self::UnterminatedFieldReference(p)
            | Self::EmptyFieldReference(p) => *p,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Pattern {
    Skip,
    Emit(TokenKind),
    Mismatch,
}

/// Token patterns in priority order; the first one matching at the current
///  offset wins. Two-character operators must come before their one-character
///  prefixes and a decimal number before a bare integer.
static PATTERNS: LazyLock<Vec<(Pattern, Regex)>> = LazyLock::new(|| {
    use TokenKind::*;
    [
        (Pattern::Skip, r"[ \t\r\n]+"),
        (Pattern::Emit(Number), r"[0-9]+\.[0-9]+\b"),
        (Pattern::Emit(Number), r"[0-9]+\b"),
        (Pattern::Emit(ParenLeft), r"\("),
        (Pattern::Emit(ParenRight), r"\)"),
        (Pattern::Emit(BracketLeft), r"\["),
        (Pattern::Emit(BracketRight), r"\]"),
        (Pattern::Emit(Comma), r","),
        (Pattern::Emit(Asterisk), r"\*"),
        (Pattern::Emit(ForwardSlash), r"/"),
        (Pattern::Emit(Plus), r"\+"),
        (Pattern::Emit(Minus), r"-"),
        (Pattern::Emit(LTE), r"<="),
        (Pattern::Emit(GTE), r">="),
        (Pattern::Emit(NotEquals), r"!=|<>"),
        (Pattern::Emit(LT), r"<"),
        (Pattern::Emit(GT), r">"),
        (Pattern::Emit(Equals), r"="),
        (Pattern::Emit(Ampersand), r"&"),
        (Pattern::Emit(Identifier), r"[A-Za-z_][A-Za-z0-9_]*"),
        (Pattern::Emit(String), r#"(?s)"(?:\\.|[^"\\])*""#),
        (Pattern::Mismatch, r"(?s)."),
    ]
    .into_iter()
    .map(|(pattern, re)| {
        let re = Regex::new(&format!(r"\A(?:{re})")).expect("static token pattern");
        (pattern, re)
    })
    .collect()
});

/// Keywords are whole identifiers, matched without regard to case.
fn keyword(ident: &str) -> Option<TokenKind> {
    match ident.to_ascii_uppercase().as_str() {
        "AND" => Some(TokenKind::And),
        "OR" => Some(TokenKind::Or),
        "NOT" => Some(TokenKind::Not),
        "NULL" => Some(TokenKind::Null),
        _ => None,
    }
}

/// Holds a reference to the source and an offset, so it's cheap to clone for
///  lookahead.
#[derive(Clone)]
pub struct Lexer<'input> {
    source: &'input str,
    current: usize,
}

impl<'input> Lexer<'input> {
    pub fn new(source: &'input str) -> Self {
        Self { source, current: 0 }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.current >= self.source.len()
    }

    #[inline]
    pub fn remaining(&self) -> &'input str {
        &self.source[self.current..]
    }

    /// Consumes `{...}` up to the first unescaped closing brace. A backslash
    ///  escapes the following character, which is kept verbatim.
    fn field_reference(&mut self, start: usize) -> Result<Token, Error> {
        let mut name = String::new();
        let mut escaped = false;
        // skip the opening brace
        for (offset, c) in self.remaining().char_indices().skip(1) {
            if escaped {
                name.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '}' {
                if name.is_empty() {
                    return Err(Error::EmptyFieldReference(start));
                }
                self.current += offset + 1;
                return Ok(Token {
                    kind: TokenKind::FieldReference,
                    text: name,
                    start,
                });
            } else {
                name.push(c);
            }
        }
        Err(Error::UnterminatedFieldReference(start))
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, Error> {
        loop {
            if self.is_empty() {
                return Ok(None);
            }
            let start = self.current;
            let remaining = self.remaining();

            if remaining.starts_with('{') {
                return self.field_reference(start).map(Some);
            }

            let Some((pattern, len)) = PATTERNS
                .iter()
                .find_map(|(pattern, re)| re.find(remaining).map(|m| (*pattern, m.end())))
            else {
                return Err(self.unexpected_character(start));
            };

            match pattern {
                Pattern::Skip => self.current += len,
                Pattern::Emit(kind) => {
                    self.current += len;
                    let text = &remaining[..len];
                    let kind = match kind {
                        TokenKind::Identifier => keyword(text).unwrap_or(kind),
                        _ => kind,
                    };
                    return Ok(Some(Token {
                        kind,
                        text: text.to_string(),
                        start,
                    }));
                }
                Pattern::Mismatch if remaining.starts_with('"') => {
                    return Err(Error::UnterminatedStringLiteral(start));
                }
                Pattern::Mismatch => return Err(self.unexpected_character(start)),
            }
        }
    }

    fn unexpected_character(&self, position: usize) -> Error {
        Error::UnexpectedCharacter {
            position,
            character: self.source[position..].chars().next().unwrap_or('\0'),
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_token() {
            Ok(tok) => tok.map(Ok),
            Err(e) => {
                // Not restartable: the first error ends the stream
                self.current = self.source.len();
                Some(Err(e))
            }
        }
    }
}

/// Lexes the whole source into a token sequence, failing on the first
///  character that can't be classified.
pub fn lex(source: &str) -> Result<Vec<Token>, Error> {
    Lexer::new(source).collect()
}
