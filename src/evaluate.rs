use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::ast::{BinaryOp, Expression, UnaryOp};
use crate::functions::Builtin;

/// Booleans don't have their own kind: they are the numbers 1 and 0.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Str(String),
    Null,
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Null => "null",
        }
    }

    /// Non-zero numbers and non-empty strings are true, NULL is false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Null => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Number(if b { 1.0 } else { 0.0 })
    }
}
impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Null => write!(f, "NULL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Field '{0}' not found in row")]
    UnboundVariable(String),
    #[error("Operator '{op}' can't be applied to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("Function {function}: argument {index} must be {expected}, got {found}")]
    ArgumentType {
        function: Builtin,
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Function {function} called with {found} arguments, expected {expected}")]
    ArgumentCount {
        function: Builtin,
        expected: String,
        found: usize,
    },
    #[error("Unsupported function: {0}")]
    UnknownFunction(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Invalid date: {0:?}")]
    InvalidDate(String),
    #[error("{0}")]
    Unsupported(&'static str),
}

pub type RowGetter<'a> = &'a dyn Fn(&str) -> Option<Value>;

impl Expression {
    pub fn evaluate(&self, get: RowGetter) -> Result<Value, Error> {
        match self {
            Expression::NumberLiteral(Some(n)) => Ok(Value::Number(*n)),
            Expression::NumberLiteral(None) => Ok(Value::Null),
            Expression::StringLiteral(s) => Ok(Value::Str(s.clone())),

            Expression::VariableRef(name) => {
                get(name).ok_or_else(|| Error::UnboundVariable(name.clone()))
            }

            Expression::UnaryOperator(UnaryOp::Neg, operand) => match operand.evaluate(get)? {
                Value::Number(n) => Ok(Value::Number(-n)),
                v => Err(Error::TypeMismatch {
                    op: "-",
                    left: "nothing",
                    right: v.kind(),
                }),
            },

            // Both sides are always evaluated, there's no short circuit
            Expression::BinaryOperator(lhs, op, rhs) => {
                let left = lhs.evaluate(get)?;
                let right = rhs.evaluate(get)?;
                eval_binary_op(*op, left, right)
            }

            Expression::FunctionCall { name, args } => {
                let function =
                    Builtin::lookup(name).ok_or_else(|| Error::UnknownFunction(name.clone()))?;
                if !function.accepts(args.len()) {
                    return Err(Error::ArgumentCount {
                        function,
                        expected: function.expected_args(),
                        found: args.len(),
                    });
                }

                // IF only evaluates the branch it takes
                if function == Builtin::If {
                    return if args[0].evaluate(get)?.is_truthy() {
                        args[1].evaluate(get)
                    } else {
                        args.get(2).map_or(Ok(Value::Null), |e| e.evaluate(get))
                    };
                }

                let args = args
                    .iter()
                    .map(|arg| arg.evaluate(get))
                    .collect::<Result<Vec<_>, _>>()?;
                call_builtin(function, args)
            }

            Expression::ArrayLiteral(_) => Err(Error::Unsupported("An array is not a scalar value")),
        }
    }
}

/// Evaluates against a closure that looks up field values by name.
pub fn evaluate(expr: &Expression, get: RowGetter) -> Result<Value, Error> {
    expr.evaluate(get)
}

/// Evaluates against a row of named values.
pub fn evaluate_row(expr: &Expression, row: &HashMap<String, Value>) -> Result<Value, Error> {
    expr.evaluate(&|name: &str| row.get(name).cloned())
}

fn ordered<T: PartialOrd + ?Sized>(op: BinaryOp, a: &T, b: &T) -> bool {
    match op {
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::Ge => a >= b,
        _ => false,
    }
}

fn eval_binary_op(op: BinaryOp, left: Value, right: Value) -> Result<Value, Error> {
    use Value::*;
    let mismatch = |left: &Value, right: &Value| Error::TypeMismatch {
        op: op.symbol(),
        left: left.kind(),
        right: right.kind(),
    };
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => match (&left, &right) {
            (Number(a), Number(b)) => arithmetic(op, *a, *b).map(Number),
            _ => Err(mismatch(&left, &right)),
        },
        BinaryOp::Concat => match (left, right) {
            (Str(a), Str(b)) => Ok(Str(a + &b)),
            (left, right) => Err(mismatch(&left, &right)),
        },
        BinaryOp::Eq => Ok(Value::from(left == right)),
        BinaryOp::Ne => Ok(Value::from(left != right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => match (&left, &right) {
            (Number(a), Number(b)) => Ok(Value::from(ordered(op, a, b))),
            (Str(a), Str(b)) => Ok(Value::from(ordered(op, a.as_str(), b.as_str()))),
            _ => Err(mismatch(&left, &right)),
        },
        BinaryOp::And => Ok(Value::from(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => Ok(Value::from(left.is_truthy() || right.is_truthy())),
    }
}

fn arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<f64, Error> {
    match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Sub => Ok(a - b),
        BinaryOp::Mul => Ok(a * b),
        BinaryOp::Div if b == 0.0 => Err(Error::DivisionByZero),
        BinaryOp::Div => Ok(a / b),
        _ => Err(Error::Unsupported("Not an arithmetic operator")),
    }
}

/// Dates are strings in `YYYY-MM-DD` form, optionally with a time part.
fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
                .ok()
                .map(|dt| dt.date())
        })
}

fn call_builtin(function: Builtin, args: Vec<Value>) -> Result<Value, Error> {
    use Value::*;
    let wrong_type = |index: usize, expected: &'static str| Error::ArgumentType {
        function,
        index,
        expected,
        found: args[index].kind(),
    };
    let number = |index: usize| match &args[index] {
        Number(n) => Ok(*n),
        _ => Err(wrong_type(index, "a number")),
    };
    let string = |index: usize| match &args[index] {
        Str(s) => Ok(s.as_str()),
        _ => Err(wrong_type(index, "a string")),
    };
    let date = |index: usize| {
        let s = string(index)?;
        parse_date(s).ok_or_else(|| Error::InvalidDate(s.to_string()))
    };

    match function {
        Builtin::True => Ok(Number(1.0)),
        Builtin::False => Ok(Number(0.0)),

        Builtin::Add => (0..args.len())
            .try_fold(0.0, |acc, i| Ok::<_, Error>(acc + number(i)?))
            .map(Number),
        Builtin::Sub | Builtin::Mul | Builtin::Div => {
            let op = match function {
                Builtin::Sub => BinaryOp::Sub,
                Builtin::Mul => BinaryOp::Mul,
                _ => BinaryOp::Div,
            };
            (1..args.len())
                .try_fold(number(0)?, |acc, i| -> Result<f64, Error> {
                    arithmetic(op, acc, number(i)?)
                })
                .map(Number)
        }

        Builtin::And => Ok(Value::from(args.iter().all(|a| *a == Number(1.0)))),
        Builtin::Or => Ok(Value::from(args.iter().any(|a| *a == Number(1.0)))),
        Builtin::Not => Ok(Value::from(!args[0].is_truthy())),

        Builtin::Len => match &args[0] {
            Null => Ok(Null),
            _ => Ok(Number(string(0)?.chars().count() as f64)),
        },

        // 1-based character position, 0 when absent
        Builtin::Find => {
            let (needle, haystack) = (string(0)?, string(1)?);
            Ok(Number(haystack.find(needle).map_or(0.0, |byte| {
                (haystack[..byte].chars().count() + 1) as f64
            })))
        }

        Builtin::Concatenate => {
            let mut res = String::new();
            for arg in &args {
                match arg {
                    Str(s) => res.push_str(s),
                    Number(n) => res.push_str(&n.to_string()),
                    Null => return Ok(Null),
                }
            }
            Ok(Str(res))
        }

        Builtin::Substitute => {
            let (s, old, new) = (string(0)?, string(1)?, string(2)?);
            if old.is_empty() {
                Ok(Str(s.to_string()))
            } else {
                Ok(Str(s.replace(old, new)))
            }
        }

        Builtin::IsBlank => Ok(Value::from(match &args[0] {
            Null => true,
            Str(s) => s.is_empty(),
            Number(_) => false,
        })),

        Builtin::Today => Ok(Str(chrono::Local::now()
            .date_naive()
            .format("%Y-%m-%d")
            .to_string())),

        Builtin::DatetimeDiff => Ok(Number((date(0)? - date(1)?).num_days() as f64)),

        Builtin::IsBefore => match (&args[0], &args[1]) {
            (Str(a), Str(b)) => match (parse_date(a), parse_date(b)) {
                (Some(a), Some(b)) => Ok(Value::from(a < b)),
                _ => Ok(Value::from(a < b)),
            },
            (Number(a), Number(b)) => Ok(Value::from(a < b)),
            (a, b) => Err(Error::TypeMismatch {
                op: "<",
                left: a.kind(),
                right: b.kind(),
            }),
        },

        Builtin::If => Err(Error::Unsupported("IF is evaluated lazily")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;

    fn row() -> HashMap<String, Value> {
        HashMap::from([
            ("A".to_string(), Value::Number(1.0)),
            ("B".to_string(), Value::Number(0.0)),
            ("Sale Price".to_string(), Value::Number(9.5)),
            ("Name".to_string(), Value::from("Smith")),
            ("Empty".to_string(), Value::from("")),
            ("Nothing".to_string(), Value::Null),
            ("Shipped".to_string(), Value::from("2024-08-01")),
        ])
    }

    fn eval(source: &str) -> Result<Value, Error> {
        let tree = parse_str(source)
            .expect("a valid parse")
            .expect("a non-empty formula");
        evaluate_row(&tree, &row())
    }

    fn num(n: f64) -> Result<Value, Error> {
        Ok(Value::Number(n))
    }

    #[test]
    fn precedence() {
        assert_eq!(eval("2 + 3 * 4"), num(14.0));
        assert_eq!(eval("(2 + 3) * 4"), num(20.0));
        assert_eq!(eval("10 - 4 - 3"), num(3.0));
        assert_eq!(eval("-2 * 3"), num(-6.0));
    }

    #[test]
    fn type_enforcement() {
        assert_eq!(
            eval(r#""a" + 1"#),
            Err(Error::TypeMismatch {
                op: "+",
                left: "string",
                right: "number"
            })
        );
        assert_eq!(eval(r#""a" & "b""#), Ok(Value::from("ab")));
        assert!(matches!(eval("1 & 2"), Err(Error::TypeMismatch { op: "&", .. })));
        assert!(matches!(eval(r#"-"a""#), Err(Error::TypeMismatch { op: "-", .. })));
        assert!(matches!(eval(r#"1 < "a""#), Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn variables() {
        assert_eq!(eval("{Sale Price} * 2"), num(19.0));
        assert_eq!(eval("Name & \"!\""), Ok(Value::from("Smith!")));
        assert_eq!(
            eval("{Missing} + 1"),
            Err(Error::UnboundVariable("Missing".into()))
        );
    }

    #[test]
    fn closure_lookup() {
        let tree = parse_str("x * 2").unwrap().unwrap();
        let get = |name: &str| (name == "x").then_some(Value::Number(21.0));
        assert_eq!(evaluate(&tree, &get), num(42.0));
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval("1 < 2"), num(1.0));
        assert_eq!(eval("2 <= 1"), num(0.0));
        assert_eq!(eval(r#""abc" < "abd""#), num(1.0));
        assert_eq!(eval(r#"1 = "1""#), num(0.0));
        assert_eq!(eval("NULL = Nothing"), num(1.0));
        assert_eq!(eval("A != B"), num(1.0));
    }

    #[test]
    fn logical_operators_are_strict_boolean() {
        assert_eq!(eval("5 AND \"x\""), num(1.0));
        assert_eq!(eval("5 AND Empty"), num(0.0));
        assert_eq!(eval("Nothing OR 0"), num(0.0));
        assert_eq!(eval("Nothing OR Name"), num(1.0));
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(eval("1 / B"), Err(Error::DivisionByZero));
        assert_eq!(eval("DIV(1, 0)"), Err(Error::DivisionByZero));
    }

    #[test]
    fn builtin_table() {
        assert_eq!(eval("TRUE()"), num(1.0));
        assert_eq!(eval("FALSE()"), num(0.0));
        assert_eq!(eval("ADD(1, 2, 3)"), num(6.0));
        assert_eq!(eval("ADD()"), num(0.0));
        assert_eq!(eval("SUB(10, 2, 3)"), num(5.0));
        assert_eq!(eval("MUL(2, 3, 4)"), num(24.0));
        assert_eq!(eval("DIV(24, 2, 3)"), num(4.0));
        assert_eq!(eval("AND(1, A, TRUE())"), num(1.0));
        assert_eq!(eval("AND(1, 2)"), num(0.0));
        assert_eq!(eval("OR(0, B, 1)"), num(1.0));
        assert_eq!(eval("OR(0, 2)"), num(0.0));
        assert_eq!(eval("not(B)"), num(1.0));
    }

    #[test]
    fn string_functions() {
        assert_eq!(eval("LEN(Name)"), num(5.0));
        assert_eq!(eval("LEN(Nothing)"), Ok(Value::Null));
        assert_eq!(eval(r#"FIND("it", Name)"#), num(3.0));
        assert_eq!(eval(r#"FIND("zz", Name)"#), num(0.0));
        assert_eq!(eval(r#"CONCATENATE("a", 1, "b")"#), Ok(Value::from("a1b")));
        assert_eq!(eval(r#"CONCATENATE("a", Nothing)"#), Ok(Value::Null));
        assert_eq!(
            eval(r#"SUBSTITUTE("a-b-c", "-", "+")"#),
            Ok(Value::from("a+b+c"))
        );
        assert_eq!(eval("IS_BLANK(Empty)"), num(1.0));
        assert_eq!(eval("IS_BLANK(Nothing)"), num(1.0));
        assert_eq!(eval("IS_BLANK(Name)"), num(0.0));
        assert!(matches!(
            eval("LEN(1)"),
            Err(Error::ArgumentType {
                function: Builtin::Len,
                index: 0,
                ..
            })
        ));
    }

    #[test]
    fn date_functions() {
        assert_eq!(eval(r#"DATETIME_DIFF("2024-03-01", "2024-02-01")"#), num(29.0));
        assert_eq!(
            eval(r#"DATETIME_DIFF("2024-03-01 12:00:00", Shipped)"#),
            num(-153.0)
        );
        assert_eq!(eval(r#"IS_BEFORE(Shipped, "2024-12-25")"#), num(1.0));
        assert_eq!(eval("IS_BEFORE(2, 1)"), num(0.0));
        assert_eq!(
            eval(r#"DATETIME_DIFF("soon", Shipped)"#),
            Err(Error::InvalidDate("soon".into()))
        );

        let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
        assert_eq!(eval("TODAY()"), Ok(Value::Str(today)));
    }

    #[test]
    fn if_only_evaluates_taken_branch() {
        assert_eq!(eval("IF(A > 0, 1, {Missing})"), num(1.0));
        assert_eq!(eval("IF(B, {Missing}, 2)"), num(2.0));
        assert_eq!(eval("IF(B, 1)"), Ok(Value::Null));
        assert_eq!(eval("IF(A > 0, 1, IF(A < 0, -1, 0))"), num(1.0));
    }

    #[test]
    fn function_errors() {
        assert_eq!(
            eval("ROUND(1.5)"),
            Err(Error::UnknownFunction("ROUND".into()))
        );
        assert_eq!(
            eval("IF(1)"),
            Err(Error::ArgumentCount {
                function: Builtin::If,
                expected: "2 to 3".into(),
                found: 1
            })
        );
        assert!(matches!(eval("SUB()"), Err(Error::ArgumentCount { .. })));
    }

    #[test]
    fn null_and_arrays() {
        assert_eq!(eval("NULL"), Ok(Value::Null));
        assert!(matches!(eval("[1, 2]"), Err(Error::Unsupported(_))));
        assert!(matches!(eval("NULL + 1"), Err(Error::TypeMismatch { .. })));
    }
}
