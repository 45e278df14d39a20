use crate::{
    evaluate::Value,
    formula::Formula,
    simplify::simplify,
    translate::{self, TranspileConfig},
};

// Simple value lookup for evaluation
fn value_lookup(field_name: &str) -> Option<Value> {
    match field_name.to_uppercase().as_str() {
        "A" => Some(Value::Number(1.0)),
        "B" => Some(Value::Number(2.0)),
        "C" => Some(Value::Number(0.0)),
        "NAME" => Some(Value::Str("John Smith".into())),
        "SALE PRICE" => Some(Value::Number(19.99)),
        "SHIP_DATE" => Some(Value::Str("2024-08-01".into())),
        "NOTES" => Some(Value::Null),
        _ => None,
    }
}

/// Runs a formula through every pass, ignoring ordinary failures. Panics only
///  on broken invariants.
pub fn run_formula(text: &str) {
    let formula = Formula::new(text);
    let Ok(tree) = formula.ast() else {
        return;
    };

    let simplified = simplify(tree);
    assert_eq!(
        simplify(&simplified),
        simplified,
        "simplifying twice changed {text:?}"
    );

    // Evaluate, ignore errors
    let _ = tree.evaluate(&value_lookup);
    let _ = simplified.evaluate(&value_lookup);

    let _ = translate::transpile(tree, "fuzz", "result");
    let _ = translate::transpile_expression(&simplified);
    let _ = translate::transpile_with(
        tree,
        "fuzz",
        "result",
        &TranspileConfig {
            pretty: false,
            simplify: true,
            ..Default::default()
        },
    );
}
