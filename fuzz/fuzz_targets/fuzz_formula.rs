#![no_main]
use libfuzzer_sys::fuzz_target;

use arbitrary::Arbitrary;

#[derive(Debug)]
pub struct FormulaInput {
    pub text: String,
}

impl<'a> Arbitrary<'a> for FormulaInput {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let text = random_formula_string(u)?;
        Ok(FormulaInput { text })
    }
}

const MAX_FORMULA_LENGTH: usize = 10000;

fn random_formula_string(u: &mut arbitrary::Unstructured) -> arbitrary::Result<String> {
    let s: String = u.arbitrary()?;
    Ok(s.chars().take(MAX_FORMULA_LENGTH).collect())
}

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = arbitrary::Unstructured::new(data).arbitrary::<FormulaInput>() {
        formula_sql::fuzz_helper::run_formula(&input.text);
    }
});
