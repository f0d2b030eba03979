use std::fs;
use std::path::Path;

use markloom_core::markdown_to_html;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Case {
    name: String,
    markdown: String,
    html: String,
}

#[test]
fn case_table() -> Result<(), Box<dyn std::error::Error>> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let cases_json = fs::read_to_string(root.join("tests/fixtures/cases.json"))?;
    let cases: Vec<Case> = serde_json::from_str(&cases_json)?;

    let mut failures = Vec::new();
    for case in &cases {
        let actual = markdown_to_html(&case.markdown);
        if actual != case.html {
            failures.push(format!(
                "{}\n  markdown: {:?}\n  expected: {:?}\n  actual:   {:?}",
                case.name, case.markdown, case.html, actual
            ));
        }
    }

    assert!(
        failures.is_empty(),
        "{} of {} cases failed:\n{}",
        failures.len(),
        cases.len(),
        failures.join("\n")
    );
    Ok(())
}
