use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    /// `&`, string concatenation
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// The formula-language spelling of the operator
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Concat => "&",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

/// A parsed formula. Every node owns its children; passes never mutate a tree
///  in place, they either read it or build a new one.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `None` is the `NULL` keyword
    NumberLiteral(Option<f64>),
    StringLiteral(String),
    /// Both `name` and `{Some Name}` end up here
    VariableRef(String),
    UnaryOperator(UnaryOp, Box<Expression>),
    BinaryOperator(Box<Expression>, BinaryOp, Box<Expression>),
    FunctionCall {
        name: String,
        args: Vec<Expression>,
    },
    ArrayLiteral(Vec<Expression>),
}

impl Expression {
    pub fn number(n: f64) -> Self {
        Expression::NumberLiteral(Some(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expression::StringLiteral(s.into())
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Expression::VariableRef(name.into())
    }

    pub fn binary(l: Expression, op: BinaryOp, r: Expression) -> Self {
        Expression::BinaryOperator(Box::new(l), op, Box::new(r))
    }

    pub fn neg(operand: Expression) -> Self {
        Expression::UnaryOperator(UnaryOp::Neg, Box::new(operand))
    }

    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::FunctionCall {
            name: name.into(),
            args,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expression::NumberLiteral(Some(_)) | Expression::StringLiteral(_)
        )
    }
}

fn write_list(f: &mut Formatter<'_>, items: &[Expression]) -> std::fmt::Result {
    let mut first = true;
    for item in items {
        if first {
            first = false;
        } else {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_escaped(f: &mut Formatter<'_>, s: &str, specials: &[char]) -> std::fmt::Result {
    for c in s.chars() {
        if c == '\\' || specials.contains(&c) {
            write!(f, "\\")?;
        }
        write!(f, "{c}")?;
    }
    Ok(())
}

/// Prints formula syntax, fully parenthesized. Parsing the output gives back
///  an equivalent tree (negative number literals come back as a negation).
impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::NumberLiteral(None) => write!(f, "NULL"),
            Expression::NumberLiteral(Some(n)) => write!(f, "{n}"),
            Expression::StringLiteral(s) => {
                write!(f, "\"")?;
                write_escaped(f, s, &['"'])?;
                write!(f, "\"")
            }
            Expression::VariableRef(name) => {
                write!(f, "{{")?;
                write_escaped(f, name, &['}'])?;
                write!(f, "}}")
            }
            Expression::UnaryOperator(UnaryOp::Neg, operand) => write!(f, "(-{operand})"),
            Expression::BinaryOperator(l, op, r) => write!(f, "({l} {} {r})", op.symbol()),
            Expression::FunctionCall { name, args } => {
                write!(f, "{name}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expression::ArrayLiteral(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
        }
    }
}

/// Indented dump of a tree, one node per line with children four spaces
///  deeper than their parent.
pub struct TreePrinter<'a>(pub &'a Expression);

impl TreePrinter<'_> {
    fn print(e: &Expression, depth: usize, f: &mut Formatter<'_>) -> std::fmt::Result {
        let pad = " ".repeat(depth * 4);
        match e {
            Expression::NumberLiteral(None) => writeln!(f, "{pad}Number(NULL)"),
            Expression::NumberLiteral(Some(n)) => writeln!(f, "{pad}Number({n})"),
            Expression::StringLiteral(s) => writeln!(f, "{pad}String({s:?})"),
            Expression::VariableRef(name) => writeln!(f, "{pad}Variable({name:?})"),
            Expression::UnaryOperator(UnaryOp::Neg, operand) => {
                writeln!(f, "{pad}UnaryOp(-")?;
                Self::print(operand, depth + 1, f)?;
                writeln!(f, "{pad})")
            }
            Expression::BinaryOperator(l, op, r) => {
                writeln!(f, "{pad}BinaryOp({}", op.symbol())?;
                Self::print(l, depth + 1, f)?;
                Self::print(r, depth + 1, f)?;
                writeln!(f, "{pad})")
            }
            Expression::FunctionCall { name, args } => {
                writeln!(f, "{pad}FunctionCall({name:?}")?;
                for arg in args {
                    Self::print(arg, depth + 1, f)?;
                }
                writeln!(f, "{pad})")
            }
            Expression::ArrayLiteral(items) => {
                writeln!(f, "{pad}Array(")?;
                for item in items {
                    Self::print(item, depth + 1, f)?;
                }
                writeln!(f, "{pad})")
            }
        }
    }
}

impl Display for TreePrinter<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Self::print(self.0, 0, f)
    }
}
