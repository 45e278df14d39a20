//! Formula to SQL translation.
//!
//! The function catalog is fixed:
//!
//! | Formula                     | SQL                          |
//! |-----------------------------|------------------------------|
//! | `IF(c, t, e)`               | `CASE WHEN c THEN t ELSE e END` |
//! | `AND(a, b, ...)`, `OR(...)` | `(a AND (b AND ...))`        |
//! | `NOT(x)`                    | `(x = 0)`                    |
//! | `TRUE()`, `FALSE()`         | `1`, `0`                     |
//! | `LEN(s)`                    | `LENGTH(s)`                  |
//! | `FIND(needle, haystack)`    | `INSTR(haystack, needle)`    |
//! | `CONCATENATE(a, b, ...)`    | `CONCAT(a, b, ...)`          |
//! | `SUBSTITUTE(s, old, new)`   | `REPLACE(s, old, new)`       |
//! | `DATETIME_DIFF(a, b)`       | `DATEDIFF(a, b)`             |
//! | `TODAY()`                   | `CURRENT_DATE`               |
//! | `IS_BEFORE(a, b)`           | `(a < b)`                    |
//! | `IS_BLANK(a)`               | `(COALESCE(a, '') = '')`     |
//!
//! Any other function is emitted as written, so SQL functions can be called
//!  straight from a formula. `a & b` becomes `CONCAT(a, b)`.

use crate::{
    ast::{BinaryOp, Expression, UnaryOp},
    functions::Builtin,
    simplify::simplify,
};

#[derive(Debug, Clone, PartialEq)]
pub struct TranspileConfig {
    /// Lay `CASE` blocks out over several indented lines
    pub pretty: bool,
    pub indent: String,
    /// Fold constants before rendering
    pub simplify: bool,
}

impl Default for TranspileConfig {
    fn default() -> Self {
        Self {
            pretty: true,
            indent: "  ".into(),
            simplify: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("{function} expects {expected} argument(s), got {found}")]
    ArgumentCount {
        function: Builtin,
        expected: String,
        found: usize,
    },
    #[error("{0} has no SQL representation")]
    NonFiniteNumber(f64),
}

/// Scoped flags for one render call. Children get a fresh value unless the
///  position they occupy says otherwise.
#[derive(Debug, Clone, Copy, Default)]
struct RenderContext {
    /// A bare field here is a truth test
    logical: bool,
    /// The enclosing `IF` already opened a `CASE` this one should join
    open_case: bool,
}

impl RenderContext {
    const PLAIN: Self = Self {
        logical: false,
        open_case: false,
    };
    const LOGICAL: Self = Self {
        logical: true,
        open_case: false,
    };
    const CHAINED_CASE: Self = Self {
        logical: false,
        open_case: true,
    };
}

/// Makes a name usable as a bare SQL identifier.
pub fn identifier(name: &str) -> String {
    name.replace(' ', "_")
}

fn number(n: f64) -> Result<String, Error> {
    if !n.is_finite() {
        return Err(Error::NonFiniteNumber(n));
    }
    // f64's Display already drops a zero fraction; only -0 needs help
    if n == 0.0 {
        Ok("0".into())
    } else {
        Ok(n.to_string())
    }
}

fn string(s: &str) -> String {
    let mut res = String::with_capacity(s.len() + 2);
    res.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            res.push('\\');
        }
        res.push(c);
    }
    res.push('"');
    res
}

fn check_args(function: Builtin, args: &[Expression]) -> Result<(), Error> {
    if function.accepts(args.len()) {
        Ok(())
    } else {
        Err(Error::ArgumentCount {
            function,
            expected: function.expected_args(),
            found: args.len(),
        })
    }
}

fn is_if(e: &Expression) -> bool {
    matches!(e, Expression::FunctionCall { name, .. } if Builtin::lookup(name) == Some(Builtin::If))
}

struct Transpiler<'c> {
    out: String,
    depth: usize,
    config: &'c TranspileConfig,
}

impl<'c> Transpiler<'c> {
    fn new(config: &'c TranspileConfig) -> Self {
        Self {
            out: String::new(),
            depth: 0,
            config,
        }
    }

    fn write(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn newline(&mut self) {
        if self.config.pretty {
            self.out.push('\n');
            for _ in 0..self.depth {
                self.out.push_str(&self.config.indent);
            }
        } else {
            self.out.push(' ');
        }
    }

    fn list(&mut self, items: &[Expression]) -> Result<(), Error> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.expr(item, RenderContext::PLAIN)?;
        }
        Ok(())
    }

    fn wrapped(&mut self, before: &str, items: &[Expression], after: &str) -> Result<(), Error> {
        self.write(before);
        self.list(items)?;
        self.write(after);
        Ok(())
    }

    fn expr(&mut self, e: &Expression, ctx: RenderContext) -> Result<(), Error> {
        match e {
            Expression::NumberLiteral(None) => self.write("NULL"),
            Expression::NumberLiteral(Some(n)) => self.write(&number(*n)?),
            Expression::StringLiteral(s) => self.write(&string(s)),
            Expression::VariableRef(name) if ctx.logical => {
                self.write(&format!("({} IS NOT NULL)", identifier(name)))
            }
            Expression::VariableRef(name) => self.write(&identifier(name)),
            Expression::UnaryOperator(UnaryOp::Neg, operand) => {
                self.write("-");
                let mark = self.out.len();
                self.expr(operand, RenderContext::PLAIN)?;
                // "--" would start a SQL comment
                if self.out[mark..].starts_with('-') {
                    self.out.insert(mark, '(');
                    self.write(")");
                }
            }
            Expression::BinaryOperator(l, BinaryOp::Concat, r) => {
                self.write("CONCAT(");
                self.expr(l, RenderContext::PLAIN)?;
                self.write(", ");
                self.expr(r, RenderContext::PLAIN)?;
                self.write(")");
            }
            Expression::BinaryOperator(l, op, r) => {
                let operand_ctx = if op.is_logical() {
                    RenderContext::LOGICAL
                } else {
                    RenderContext::PLAIN
                };
                self.write("(");
                self.expr(l, operand_ctx)?;
                self.write(&format!(" {} ", op.symbol()));
                self.expr(r, operand_ctx)?;
                self.write(")");
            }
            Expression::FunctionCall { name, args } => self.call(name, args, ctx)?,
            Expression::ArrayLiteral(items) => self.wrapped("(", items, ")")?,
        }
        Ok(())
    }

    fn call(&mut self, name: &str, args: &[Expression], ctx: RenderContext) -> Result<(), Error> {
        let Some(function) = Builtin::lookup(name) else {
            return self.wrapped(&format!("{name}("), args, ")");
        };

        match function {
            // Arithmetic helpers have no dedicated rendering
            Builtin::Add | Builtin::Sub | Builtin::Mul | Builtin::Div => {
                return self.wrapped(&format!("{name}("), args, ")");
            }
            _ => check_args(function, args)?,
        }

        match function {
            Builtin::If => self.case(args, ctx.open_case)?,
            Builtin::And => self.logical_chain(BinaryOp::And, args)?,
            Builtin::Or => self.logical_chain(BinaryOp::Or, args)?,
            Builtin::Not => self.wrapped("(", args, " = 0)")?,
            Builtin::True => self.write("1"),
            Builtin::False => self.write("0"),
            Builtin::Today => self.write("CURRENT_DATE"),
            Builtin::Len => self.wrapped("LENGTH(", args, ")")?,
            Builtin::Find => {
                self.write("INSTR(");
                self.expr(&args[1], RenderContext::PLAIN)?;
                self.write(", ");
                self.expr(&args[0], RenderContext::PLAIN)?;
                self.write(")");
            }
            Builtin::Concatenate => self.wrapped("CONCAT(", args, ")")?,
            Builtin::Substitute => self.wrapped("REPLACE(", args, ")")?,
            Builtin::DatetimeDiff => self.wrapped("DATEDIFF(", args, ")")?,
            Builtin::IsBefore => {
                self.write("(");
                self.expr(&args[0], RenderContext::PLAIN)?;
                self.write(" < ");
                self.expr(&args[1], RenderContext::PLAIN)?;
                self.write(")");
            }
            // NULL and the empty string are both blank
            Builtin::IsBlank => self.wrapped("(COALESCE(", args, ", '') = '')")?,
            Builtin::Add | Builtin::Sub | Builtin::Mul | Builtin::Div => {}
        }
        Ok(())
    }

    /// NOTE: an `IF` in the else position of another `IF` adds its `WHEN` to
    ///  the already open `CASE` and takes over writing the `ELSE`, so a chain of
    ///  them becomes one flat block with a single `END`.
    fn case(&mut self, args: &[Expression], open_case: bool) -> Result<(), Error> {
        if !open_case {
            self.write("CASE");
            self.depth += 1;
        }

        self.newline();
        self.write("WHEN ");
        self.expr(&args[0], RenderContext::LOGICAL)?;
        self.write(" THEN ");
        self.expr(&args[1], RenderContext::PLAIN)?;

        match args.get(2) {
            Some(otherwise) if is_if(otherwise) => {
                self.expr(otherwise, RenderContext::CHAINED_CASE)?;
            }
            Some(otherwise) => {
                self.newline();
                self.write("ELSE ");
                self.expr(otherwise, RenderContext::PLAIN)?;
            }
            None => {
                self.newline();
                self.write("ELSE NULL");
            }
        }

        if !open_case {
            self.depth -= 1;
            self.newline();
            self.write("END");
        }
        Ok(())
    }

    /// `AND(a, b, c)` renders as `a AND (b AND c)`
    fn logical_chain(&mut self, op: BinaryOp, args: &[Expression]) -> Result<(), Error> {
        match args {
            [] => Ok(()),
            [last] => self.expr(last, RenderContext::LOGICAL),
            [first, rest @ ..] => {
                self.write("(");
                self.expr(first, RenderContext::LOGICAL)?;
                self.write(&format!(" {} ", op.symbol()));
                self.logical_chain(op, rest)?;
                self.write(")");
                Ok(())
            }
        }
    }
}

/// Renders a full `SELECT <expr> AS <alias> FROM <table>;` statement.
pub fn transpile(ast: &Expression, table: &str, alias: &str) -> Result<String, Error> {
    transpile_with(ast, table, alias, &TranspileConfig::default())
}

pub fn transpile_with(
    ast: &Expression,
    table: &str,
    alias: &str,
    config: &TranspileConfig,
) -> Result<String, Error> {
    let folded;
    let ast = if config.simplify {
        folded = simplify(ast);
        &folded
    } else {
        ast
    };

    let mut t = Transpiler::new(config);
    t.write("SELECT");
    t.depth += 1;
    t.newline();
    t.expr(ast, RenderContext::PLAIN)?;
    t.write(&format!(" AS {}", identifier(alias)));
    t.depth -= 1;
    t.newline();
    t.write(&format!("FROM {};", identifier(table)));

    tracing::debug!(sql = %t.out, "transpiled statement");
    Ok(t.out)
}

/// Renders just the expression, on one line.
pub fn transpile_expression(ast: &Expression) -> Result<String, Error> {
    transpile_expression_with(
        ast,
        &TranspileConfig {
            pretty: false,
            ..Default::default()
        },
    )
}

pub fn transpile_expression_with(
    ast: &Expression,
    config: &TranspileConfig,
) -> Result<String, Error> {
    let folded;
    let ast = if config.simplify {
        folded = simplify(ast);
        &folded
    } else {
        ast
    };

    let mut t = Transpiler::new(config);
    t.expr(ast, RenderContext::PLAIN)?;
    tracing::debug!(sql = %t.out, "transpiled expression");
    Ok(t.out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;

    fn sql(source: &str) -> String {
        let tree = parse_str(source).unwrap().unwrap();
        transpile_expression(&tree).unwrap()
    }

    macro_rules! assert_sql {
        ($source:expr, $expected:expr) => {
            assert_eq!(sql($source), $expected, "translating {}", $source)
        };
    }

    #[test]
    fn simple_case() {
        assert_sql!("IF({A} > 0, 1, 0)", "CASE WHEN (A > 0) THEN 1 ELSE 0 END");
    }

    #[test]
    fn missing_else_is_null() {
        assert_sql!(r#"IF({A} = 1, "one")"#, r#"CASE WHEN (A = 1) THEN "one" ELSE NULL END"#);
    }

    #[test]
    fn null_safe_truth_tests() {
        assert_sql!(
            "IF(AND({A}, {B}), 1, 2)",
            "CASE WHEN ((A IS NOT NULL) AND (B IS NOT NULL)) THEN 1 ELSE 2 END"
        );
        assert_sql!("IF({A}, 1, 0)", "CASE WHEN (A IS NOT NULL) THEN 1 ELSE 0 END");
        assert_sql!("{A} OR {B} > 1", "((A IS NOT NULL) OR (B > 1))");
        assert_sql!(
            "OR({A}, {B}, {C})",
            "((A IS NOT NULL) OR ((B IS NOT NULL) OR (C IS NOT NULL)))"
        );
    }

    #[test]
    fn logical_flag_does_not_leak() {
        // only the condition is a truth test, not the branches
        assert_sql!("IF({A}, {B}, {C})", "CASE WHEN (A IS NOT NULL) THEN B ELSE C END");
        // nor the arguments of calls inside a condition
        assert_sql!(
            "IF(AND(LEN({A}), {B} = {C}), 1, 0)",
            "CASE WHEN (LENGTH(A) AND (B = C)) THEN 1 ELSE 0 END"
        );
        assert_sql!("NOT({A})", "(A = 0)");
    }

    #[test]
    fn nested_if_flattens() {
        assert_sql!(
            "IF({A}>0, 1, IF({A}<0, -1, 0))",
            "CASE WHEN (A > 0) THEN 1 WHEN (A < 0) THEN -1 ELSE 0 END"
        );
        assert_sql!(
            "IF({A}>1, 1, IF({A}>0, 2, IF({A}<0, 3)))",
            "CASE WHEN (A > 1) THEN 1 WHEN (A > 0) THEN 2 WHEN (A < 0) THEN 3 ELSE NULL END"
        );
    }

    #[test]
    fn if_in_then_branch_nests() {
        assert_sql!(
            "IF({A}, IF({B}, 1, 2), 3)",
            "CASE WHEN (A IS NOT NULL) THEN CASE WHEN (B IS NOT NULL) THEN 1 ELSE 2 END ELSE 3 END"
        );
    }

    #[test]
    fn pretty_statement() {
        let tree = parse_str("IF({A}>0, 1, IF({A}<0, -1, 0))").unwrap().unwrap();
        let expected = "SELECT
  CASE
    WHEN (A > 0) THEN 1
    WHEN (A < 0) THEN -1
    ELSE 0
  END AS result
FROM orders;";
        assert_eq!(transpile(&tree, "orders", "result").unwrap(), expected);
    }

    #[test]
    fn compact_statement() {
        let tree = parse_str("{Sale Price} * 2").unwrap().unwrap();
        let config = TranspileConfig {
            pretty: false,
            ..Default::default()
        };
        assert_eq!(
            transpile_with(&tree, "order lines", "doubled price", &config).unwrap(),
            "SELECT (Sale_Price * 2) AS doubled_price FROM order_lines;"
        );
    }

    #[test]
    fn custom_indent() {
        let tree = parse_str("IF({A}, 1, 0)").unwrap().unwrap();
        let config = TranspileConfig {
            indent: "\t".into(),
            ..Default::default()
        };
        assert_eq!(
            transpile_with(&tree, "t", "r", &config).unwrap(),
            "SELECT\n\tCASE\n\t\tWHEN (A IS NOT NULL) THEN 1\n\t\tELSE 0\n\tEND AS r\nFROM t;"
        );
    }

    #[test]
    fn simplify_first() {
        let tree = parse_str("{A} * (2 + 3 * 4)").unwrap().unwrap();
        let config = TranspileConfig {
            pretty: false,
            simplify: true,
            ..Default::default()
        };
        assert_eq!(transpile_expression_with(&tree, &config).unwrap(), "(A * 14)");
        assert_eq!(transpile_expression(&tree).unwrap(), "(A * (2 + (3 * 4)))");
    }

    #[test]
    fn catalog() {
        assert_sql!(r#"LEN({Name}) & "x""#, r#"CONCAT(LENGTH(Name), "x")"#);
        assert_sql!(r#"FIND("a", {Name})"#, r#"INSTR(Name, "a")"#);
        assert_sql!(r#"CONCATENATE({A}, "-", {B})"#, r#"CONCAT(A, "-", B)"#);
        assert_sql!(r#"SUBSTITUTE({A}, "x", "y")"#, r#"REPLACE(A, "x", "y")"#);
        assert_sql!("DATETIME_DIFF({Due}, TODAY())", "DATEDIFF(Due, CURRENT_DATE)");
        assert_sql!("IS_BEFORE({Due}, TODAY())", "(Due < CURRENT_DATE)");
        assert_sql!("IS_BLANK({Notes})", "(COALESCE(Notes, '') = '')");
        assert_sql!(
            r#"IS_BLANK(SUBSTITUTE({A}, " ", ""))"#,
            r#"(COALESCE(REPLACE(A, " ", ""), '') = '')"#
        );
        assert_sql!("TRUE() + FALSE()", "(1 + 0)");
        assert_sql!("not(1)", "(1 = 0)");
    }

    #[test]
    fn pass_through_functions() {
        assert_sql!("ROUND({Price}, 2)", "ROUND(Price, 2)");
        assert_sql!("COALESCE({A}, {B}, 0)", "COALESCE(A, B, 0)");
        assert_sql!("ADD(1, 2)", "ADD(1, 2)");
        assert_sql!("NOW()", "NOW()");
    }

    #[test]
    fn wrong_argument_count() {
        let tree = parse_str("LEN(1, 2)").unwrap().unwrap();
        assert_eq!(
            transpile_expression(&tree),
            Err(Error::ArgumentCount {
                function: Builtin::Len,
                expected: "1".into(),
                found: 2
            })
        );
        let tree = parse_str("IF(1)").unwrap().unwrap();
        assert!(matches!(
            transpile_expression(&tree),
            Err(Error::ArgumentCount {
                function: Builtin::If,
                ..
            })
        ));
        // nested IF is checked too
        let tree = parse_str("IF(1, 2, IF(3))").unwrap().unwrap();
        assert!(transpile_expression(&tree).is_err());
    }

    #[test]
    fn literals() {
        assert_sql!("2.50 + 3", "(2.5 + 3)");
        assert_sql!("1000000", "1000000");
        assert_sql!(r#""say \"hi\"""#, r#""say \"hi\"""#);
        assert_sql!("NULL", "NULL");
        assert_sql!("[1, 2, {A}]", "(1, 2, A)");
        assert_eq!(
            transpile_expression(&Expression::number(f64::INFINITY)),
            Err(Error::NonFiniteNumber(f64::INFINITY))
        );
        assert_eq!(transpile_expression(&Expression::number(-0.0)).unwrap(), "0");
    }

    #[test]
    fn negation() {
        assert_sql!("-{A}", "-A");
        assert_sql!("-(1 + {A})", "-(1 + A)");
        assert_sql!("--{A}", "-(-A)");
        assert_eq!(
            transpile_expression(&Expression::neg(Expression::number(-5.0))).unwrap(),
            "-(-5)"
        );
    }

    #[test]
    fn field_names() {
        assert_sql!("{Sale Price}", "Sale_Price");
        assert_sql!("{Unit Cost} * {Qty}", "(Unit_Cost * Qty)");
        assert_eq!(identifier("a b  c"), "a_b__c");
    }
}
