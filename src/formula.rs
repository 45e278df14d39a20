use std::collections::HashMap;

use crate::{
    ast::{Expression, TreePrinter},
    evaluate::{self, RowGetter, Value},
    lex, parser,
    simplify::simplify,
    translate::{self, TranspileConfig},
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Formula did not parse: {0}")]
    NotParsed(parser::Error),
    #[error("Formula is empty")]
    Empty,
    #[error(transparent)]
    Parse(#[from] parser::Error),
    #[error(transparent)]
    Evaluate(#[from] evaluate::Error),
    #[error(transparent)]
    Translate(#[from] translate::Error),
}

/// A formula's source text together with the outcome of parsing it. A formula
///  that failed to parse can still be held on to, but every operation on it
///  reports the parse error.
#[derive(Debug, Clone)]
pub struct Formula {
    text: String,
    root: Result<Option<Expression>, parser::Error>,
}

fn build(text: &str) -> Result<Option<Expression>, parser::Error> {
    let tokens = lex::lex(text)?;
    tracing::trace!(formula = text, ?tokens, "lexed formula");
    let root = parser::parse(&tokens)?;
    if let Some(root) = &root {
        tracing::debug!(formula = text, ast = %root, "parsed formula");
    }
    Ok(root)
}

impl Formula {
    /// Lexes and parses `text`. Failure is logged and kept for later
    ///  operations to report.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let root = build(&text);
        if let Err(e) = &root {
            tracing::warn!(formula = %text, "formula did not parse: {e}");
        }
        Self { text, root }
    }

    /// Like [Formula::new] but fails straight away if the text doesn't parse.
    pub fn parse(text: impl Into<String>) -> Result<Self, Error> {
        let text = text.into();
        let root = build(&text)?;
        Ok(Self {
            text,
            root: Ok(root),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn ast(&self) -> Result<&Expression, Error> {
        match &self.root {
            Ok(Some(root)) => Ok(root),
            Ok(None) => Err(Error::Empty),
            Err(e) => Err(Error::NotParsed(e.clone())),
        }
    }

    pub fn evaluate(&self, get: RowGetter) -> Result<Value, Error> {
        Ok(self.ast()?.evaluate(get)?)
    }

    pub fn evaluate_row(&self, row: &HashMap<String, Value>) -> Result<Value, Error> {
        Ok(evaluate::evaluate_row(self.ast()?, row)?)
    }

    pub fn simplified(&self) -> Result<Expression, Error> {
        Ok(simplify(self.ast()?))
    }

    pub fn to_sql(&self, table: &str, alias: &str) -> Result<String, Error> {
        Ok(translate::transpile(self.ast()?, table, alias)?)
    }

    pub fn to_sql_with(
        &self,
        table: &str,
        alias: &str,
        config: &TranspileConfig,
    ) -> Result<String, Error> {
        Ok(translate::transpile_with(self.ast()?, table, alias, config)?)
    }

    pub fn to_sql_expression(&self) -> Result<String, Error> {
        Ok(translate::transpile_expression(self.ast()?)?)
    }

    /// The indented node dump, see [TreePrinter].
    pub fn tree(&self) -> Result<String, Error> {
        Ok(TreePrinter(self.ast()?).to_string())
    }
}

impl std::str::FromStr for Formula {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Formula::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::{Token, TokenKind};

    #[test]
    fn failed_parse_is_reported_everywhere() {
        let f = Formula::new("1 2");
        let expected = Error::NotParsed(parser::Error::UnexpectedToken {
            found: Token {
                kind: TokenKind::Number,
                text: "2".into(),
                start: 2,
            },
            expected: "end of input",
        });
        assert_eq!(f.ast(), Err(expected.clone()));
        assert_eq!(f.evaluate(&|_| None), Err(expected.clone()));
        assert_eq!(f.simplified(), Err(expected.clone()));
        assert_eq!(f.to_sql("t", "result"), Err(expected.clone()));
        assert_eq!(f.to_sql_expression(), Err(expected.clone()));
        assert_eq!(f.tree(), Err(expected));
        assert_eq!(f.text(), "1 2");
    }

    #[test]
    fn strict_constructor() {
        assert!(matches!(
            Formula::parse("1 +"),
            Err(Error::Parse(parser::Error::UnexpectedEof { .. }))
        ));
        assert!(matches!(
            "1 $ 2".parse::<Formula>(),
            Err(Error::Parse(parser::Error::Lexical(_)))
        ));
        assert!(Formula::parse("1 + 2").is_ok());
    }

    #[test]
    fn empty_formula() {
        let f = Formula::new("   ");
        assert_eq!(f.ast(), Err(Error::Empty));
        assert_eq!(f.to_sql_expression(), Err(Error::Empty));
    }

    #[test]
    fn operations() {
        let f = Formula::new("{Qty} * (2 + 3)");
        let row = HashMap::from([("Qty".to_string(), Value::Number(4.0))]);
        assert_eq!(f.evaluate_row(&row), Ok(Value::Number(20.0)));
        assert_eq!(f.simplified().unwrap().to_string(), "({Qty} * 5)");
        assert_eq!(f.to_sql_expression().unwrap(), "(Qty * (2 + 3))");
        assert_eq!(
            f.to_sql("line items", "total").unwrap(),
            "SELECT\n  (Qty * (2 + 3)) AS total\nFROM line_items;"
        );
        assert_eq!(
            f.to_sql_with(
                "t",
                "total",
                &TranspileConfig {
                    pretty: false,
                    simplify: true,
                    ..Default::default()
                }
            )
            .unwrap(),
            "SELECT (Qty * 5) AS total FROM t;"
        );
    }

    #[test]
    fn errors_convert() {
        let f = Formula::new(r#""a" + 1"#);
        assert!(matches!(
            f.evaluate(&|_| None),
            Err(Error::Evaluate(evaluate::Error::TypeMismatch { op: "+", .. }))
        ));
        let f = Formula::new("LEN()");
        assert!(matches!(
            f.to_sql_expression(),
            Err(Error::Translate(translate::Error::ArgumentCount { .. }))
        ));
    }
}
