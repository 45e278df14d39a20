/// Functions the evaluator and transpiler know about. Names are matched
///  without regard to case; anything else is an unknown function, which the
///  evaluator rejects and the transpiler passes through to SQL verbatim.
#[derive(
    strum_macros::Display, strum_macros::EnumString, Debug, Clone, Copy, PartialEq, Eq,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Builtin {
    Add,
    And,
    Concatenate,
    DatetimeDiff,
    Div,
    False,
    Find,
    If,
    IsBefore,
    IsBlank,
    Len,
    Mul,
    Not,
    Or,
    Sub,
    Substitute,
    Today,
    True,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        name.parse().ok()
    }

    /// Accepted argument counts as (minimum, maximum), `None` is unbounded.
    pub fn arity(&self) -> (usize, Option<usize>) {
        use Builtin::*;
        match self {
            True | False | Today => (0, Some(0)),
            Not | Len | IsBlank => (1, Some(1)),
            Find | DatetimeDiff | IsBefore => (2, Some(2)),
            Substitute => (3, Some(3)),
            If => (2, Some(3)),
            Concatenate => (2, None),
            Add => (0, None),
            And | Or | Sub | Mul | Div => (1, None),
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        let (min, max) = self.arity();
        count >= min && max.is_none_or(|max| count <= max)
    }

    /// Human readable form of [arity] for error messages
    pub fn expected_args(&self) -> String {
        match self.arity() {
            (min, Some(max)) if min == max => min.to_string(),
            (min, Some(max)) => format!("{min} to {max}"),
            (min, None) => format!("at least {min}"),
        }
    }
}
