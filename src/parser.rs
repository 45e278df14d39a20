use crate::ast::{BinaryOp, Expression, UnaryOp};
use crate::lex::{self, Error as LexerError, Token, TokenKind};

impl TryFrom<&Token> for BinaryOp {
    type Error = Error;
    fn try_from(value: &Token) -> Result<Self, Self::Error> {
        match value.kind {
            TokenKind::Plus => Ok(BinaryOp::Add),
            TokenKind::Minus => Ok(BinaryOp::Sub),
            TokenKind::Asterisk => Ok(BinaryOp::Mul),
            TokenKind::ForwardSlash => Ok(BinaryOp::Div),
            TokenKind::Ampersand => Ok(BinaryOp::Concat),
            TokenKind::Equals => Ok(BinaryOp::Eq),
            TokenKind::NotEquals => Ok(BinaryOp::Ne),
            TokenKind::LT => Ok(BinaryOp::Lt),
            TokenKind::LTE => Ok(BinaryOp::Le),
            TokenKind::GT => Ok(BinaryOp::Gt),
            TokenKind::GTE => Ok(BinaryOp::Ge),
            TokenKind::And => Ok(BinaryOp::And),
            TokenKind::Or => Ok(BinaryOp::Or),
            _ => Err(Error::UnexpectedToken {
                found: value.clone(),
                expected: "an operator",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Lexical error: {0}")]
    Lexical(#[from] LexerError),
    #[error("Unexpected token {found}, expected {expected}")]
    UnexpectedToken {
        found: Token,
        expected: &'static str,
    },
    #[error("Unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: &'static str },
    #[error("Formula nests deeper than {limit} levels at {found}")]
    NestingTooDeep { found: Token, limit: usize },
}

/// The deepest tree the parser will build. Brackets, calls and negations
///  count towards it while parsing, and every operator adds a level to the
///  finished tree, so a chain of more than this many `+` is rejected as well.
pub const MAX_DEPTH: usize = 256;

// NOTE precedence is the binding strength of an infix operator: higher binds
//  more tightly. Anything that isn't an infix operator gets 0, which is never
//  above the floor, so it ends the current expression.
const fn infix_precedence(kind: TokenKind) -> u8 {
    match kind {
        TokenKind::Asterisk | TokenKind::ForwardSlash => 20,
        TokenKind::Plus | TokenKind::Minus | TokenKind::Ampersand => 10,
        TokenKind::Equals
        | TokenKind::NotEquals
        | TokenKind::LT
        | TokenKind::LTE
        | TokenKind::GT
        | TokenKind::GTE => 7,
        TokenKind::And | TokenKind::Or => 5,
        _ => 0,
    }
}

/// A subtree and its depth, a leaf being 1 deep.
type Parsed = (Expression, usize);

fn too_deep(found: &Token) -> Error {
    Error::NestingTooDeep {
        found: found.clone(),
        limit: MAX_DEPTH,
    }
}

fn checked_depth(depth: usize, at: &Token) -> Result<usize, Error> {
    if depth > MAX_DEPTH {
        Err(too_deep(at))
    } else {
        Ok(depth)
    }
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    /// Brackets, calls and negations currently open
    nesting: usize,
}

impl<'t> Parser<'t> {
    #[inline]
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    #[inline]
    fn peek_kind_at(&self, offset: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| t.kind)
    }

    fn next(&mut self, expected: &'static str) -> Result<&'t Token, Error> {
        let tok = self
            .tokens
            .get(self.pos)
            .ok_or(Error::UnexpectedEof { expected })?;
        self.pos += 1;
        Ok(tok)
    }

    /// If the current token is [kind], consume it and return true.
    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind_at(0) == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<(), Error> {
        let tok = self.next(expected)?;
        if tok.kind == kind {
            Ok(())
        } else {
            Err(Error::UnexpectedToken {
                found: tok.clone(),
                expected,
            })
        }
    }

    fn enter(&mut self, opening: &Token) -> Result<(), Error> {
        if self.nesting >= MAX_DEPTH {
            return Err(too_deep(opening));
        }
        self.nesting += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    /// Parses a primary, then folds in operators binding more tightly than
    ///  [min_precedence].
    fn parse_binary_op(&mut self, min_precedence: u8) -> Result<Parsed, Error> {
        let (mut lhs, mut depth) = self.parse_primary()?;

        while let Some(op_tok) = self.peek() {
            let precedence = infix_precedence(op_tok.kind);
            if precedence <= min_precedence {
                break;
            }
            let op = BinaryOp::try_from(op_tok)?;
            self.pos += 1;

            let (rhs, rhs_depth) = self.parse_binary_op(precedence)?;
            depth = checked_depth(depth.max(rhs_depth) + 1, op_tok)?;
            lhs = Expression::binary(lhs, op, rhs);
        }

        Ok((lhs, depth))
    }

    fn parse_primary(&mut self) -> Result<Parsed, Error> {
        let tok = self.next("an expression")?;
        match tok.kind {
            // Too many digits overflow to infinity, which has no literal form
            TokenKind::Number => tok
                .text
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(|n| (Expression::number(n), 1))
                .ok_or_else(|| Error::UnexpectedToken {
                    found: tok.clone(),
                    expected: "a finite number",
                }),

            // AND(...), OR(...) and NOT(...) are function calls even though
            //  the words lex as keywords
            TokenKind::Identifier | TokenKind::And | TokenKind::Or | TokenKind::Not
                if self.peek_kind_at(0) == Some(TokenKind::ParenLeft) =>
            {
                self.parse_fn_call(tok)
            }
            TokenKind::Identifier => Ok((Expression::VariableRef(tok.text.clone()), 1)),
            TokenKind::FieldReference => Ok((Expression::VariableRef(tok.text.clone()), 1)),

            TokenKind::String => Ok((Expression::StringLiteral(string_contents(&tok.text)), 1)),
            TokenKind::Null => Ok((Expression::NumberLiteral(None), 1)),

            // Grouping only, no node of its own
            TokenKind::ParenLeft => {
                self.enter(tok)?;
                let inner = self.parse_binary_op(0)?;
                self.expect(TokenKind::ParenRight, "')'")?;
                self.leave();
                Ok(inner)
            }

            // Prefix '-' applies to the next primary only
            TokenKind::Minus => {
                self.enter(tok)?;
                let (operand, depth) = self.parse_primary()?;
                self.leave();
                Ok((
                    Expression::UnaryOperator(UnaryOp::Neg, Box::new(operand)),
                    checked_depth(depth + 1, tok)?,
                ))
            }

            TokenKind::BracketLeft => {
                self.enter(tok)?;
                let (items, depth) = self.parse_list(TokenKind::BracketRight, "',' or ']'")?;
                self.leave();
                Ok((Expression::ArrayLiteral(items), checked_depth(depth + 1, tok)?))
            }

            _ => Err(Error::UnexpectedToken {
                found: tok.clone(),
                expected: "an expression",
            }),
        }
    }

    fn parse_fn_call(&mut self, name_token: &Token) -> Result<Parsed, Error> {
        self.enter(name_token)?;
        // We've already popped the function name, and peeked the ParenLeft
        self.expect(TokenKind::ParenLeft, "'('")?;
        let (args, depth) = self.parse_list(TokenKind::ParenRight, "',' or ')'")?;
        self.leave();
        Ok((
            Expression::FunctionCall {
                name: name_token.text.clone(),
                args,
            },
            checked_depth(depth + 1, name_token)?,
        ))
    }

    /// Zero or more comma separated expressions up to [close], along with the
    ///  depth of the deepest one. A trailing comma before [close] is allowed.
    fn parse_list(
        &mut self,
        close: TokenKind,
        expected: &'static str,
    ) -> Result<(Vec<Expression>, usize), Error> {
        let mut items = Vec::new();
        let mut deepest = 0;
        loop {
            if self.consume(close) {
                break;
            }
            if !items.is_empty() {
                self.expect(TokenKind::Comma, expected)?;
                if self.consume(close) {
                    break;
                }
            }
            let (item, depth) = self.parse_binary_op(0)?;
            deepest = deepest.max(depth);
            items.push(item);
        }
        Ok((items, deepest))
    }
}

/// Strips the quotes off a string literal token and resolves its escapes.
fn string_contents(text: &str) -> String {
    let inner = text
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(text);

    let mut res = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            res.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => res.push('\n'),
            Some('t') => res.push('\t'),
            Some('r') => res.push('\r'),
            Some(other) => res.push(other),
            None => res.push('\\'),
        }
    }
    res
}

/// Builds a tree from a token sequence. An empty sequence has no tree and is
///  not an error. The whole sequence must be consumed by one expression.
///
/// Trees deeper than [MAX_DEPTH] are rejected with [Error::NestingTooDeep],
///  which keeps every pass over the tree well inside the stack.
pub fn parse(tokens: &[Token]) -> Result<Option<Expression>, Error> {
    if tokens.is_empty() {
        return Ok(None);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        nesting: 0,
    };
    let (root, _) = parser.parse_binary_op(0)?;

    // Make sure we've completely parsed the input
    if let Some(tok) = parser.peek() {
        Err(Error::UnexpectedToken {
            found: tok.clone(),
            expected: "end of input",
        })
    } else {
        Ok(Some(root))
    }
}

/// Lexes and parses in one go.
pub fn parse_str(source: &str) -> Result<Option<Expression>, Error> {
    let tokens = lex::lex(source)?;
    parse(&tokens)
}
