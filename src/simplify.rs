use crate::ast::{BinaryOp, Expression, UnaryOp};

/// Folding an operator whose operands are all literals went wrong. The
///  subtree is kept as written so evaluation can report the problem instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FoldError {
    #[error("Folding '{op}' produced a non-finite result")]
    NonFinite { op: &'static str },
}

#[derive(Debug, Clone, Copy)]
enum Literal<'a> {
    Number(f64),
    Str(&'a str),
}

impl Literal<'_> {
    fn of(expr: &Expression) -> Option<Literal<'_>> {
        match expr {
            Expression::NumberLiteral(Some(n)) => Some(Literal::Number(*n)),
            Expression::StringLiteral(s) => Some(Literal::Str(s)),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Literal::Number(n) => Some(*n),
            Literal::Str(s) => s.trim().parse().ok(),
        }
    }
}

fn finite(op: BinaryOp, n: f64) -> Result<Option<Expression>, FoldError> {
    if n.is_finite() {
        Ok(Some(Expression::number(n)))
    } else {
        Err(FoldError::NonFinite { op: op.symbol() })
    }
}

fn boolean(b: bool) -> Result<Option<Expression>, FoldError> {
    Ok(Some(Expression::number(if b { 1.0 } else { 0.0 })))
}

/// `Ok(None)` means the node isn't foldable and should stay as it is.
fn fold_binary(
    l: &Expression,
    op: BinaryOp,
    r: &Expression,
) -> Result<Option<Expression>, FoldError> {
    let (Some(left), Some(right)) = (Literal::of(l), Literal::of(r)) else {
        return Ok(None);
    };

    match (op, left, right) {
        (BinaryOp::Add, Literal::Number(a), Literal::Number(b)) => finite(op, a + b),
        (BinaryOp::Concat, Literal::Str(a), Literal::Str(b)) => {
            Ok(Some(Expression::StringLiteral(format!("{a}{b}"))))
        }
        // Adding strings or concatenating numbers is left for the evaluator
        //  to reject
        (BinaryOp::Add | BinaryOp::Concat, ..) => Ok(None),

        // Everything else works on numbers, coercing numeric strings
        _ => {
            let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
                return Ok(None);
            };
            match op {
                BinaryOp::Sub => finite(op, a - b),
                BinaryOp::Mul => finite(op, a * b),
                BinaryOp::Div => finite(op, a / b),
                BinaryOp::Eq => boolean(a == b),
                BinaryOp::Ne => boolean(a != b),
                BinaryOp::Lt => boolean(a < b),
                BinaryOp::Le => boolean(a <= b),
                BinaryOp::Gt => boolean(a > b),
                BinaryOp::Ge => boolean(a >= b),
                BinaryOp::And => boolean(a != 0.0 && b != 0.0),
                BinaryOp::Or => boolean(a != 0.0 || b != 0.0),
                BinaryOp::Add | BinaryOp::Concat => Ok(None),
            }
        }
    }
}

fn fold_unary(op: UnaryOp, operand: &Expression) -> Result<Option<Expression>, FoldError> {
    match (op, Literal::of(operand)) {
        (UnaryOp::Neg, Some(Literal::Number(n))) => Ok(Some(Expression::number(-n))),
        _ => Ok(None),
    }
}

fn settle(original: Expression, folded: Result<Option<Expression>, FoldError>) -> Expression {
    match folded {
        Ok(Some(literal)) => {
            tracing::trace!(from = %original, to = %literal, "folded constant");
            literal
        }
        Ok(None) => original,
        Err(e) => {
            tracing::debug!(expr = %original, "not folding: {e}");
            original
        }
    }
}

/// Returns a new tree with constant subexpressions folded into literals.
///  Children are simplified first, so folding cascades upwards, but nothing is
///  folded through a variable or a function call. Never fails: anything that
///  can't be folded is kept as is. Running it on its own output changes
///  nothing.
pub fn simplify(expr: &Expression) -> Expression {
    match expr {
        Expression::UnaryOperator(op, operand) => {
            let operand = simplify(operand);
            let folded = fold_unary(*op, &operand);
            settle(Expression::UnaryOperator(*op, Box::new(operand)), folded)
        }
        Expression::BinaryOperator(l, op, r) => {
            let (l, r) = (simplify(l), simplify(r));
            let folded = fold_binary(&l, *op, &r);
            settle(Expression::binary(l, *op, r), folded)
        }
        Expression::FunctionCall { name, args } => Expression::FunctionCall {
            name: name.clone(),
            args: args.iter().map(simplify).collect(),
        },
        Expression::ArrayLiteral(items) => {
            Expression::ArrayLiteral(items.iter().map(simplify).collect())
        }
        Expression::NumberLiteral(_) | Expression::StringLiteral(_) | Expression::VariableRef(_) => {
            expr.clone()
        }
    }
}
