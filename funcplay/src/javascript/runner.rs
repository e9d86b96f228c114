//! Test harness: a script run after the submission that locates the
//! function under test, calls it once per case and reports every outcome as
//! JSON text.

use serde::Deserialize;
use serde_json::Value as Json;

use crate::output::OutputCollector;
use crate::platform::TestCase;
use crate::structural::json_equal;

/// What the harness script returns.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HarnessReport {
    pub entry_point: Option<String>,
    #[serde(default)]
    pub results: Vec<CaseOutcome>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CaseOutcome {
    pub ok: bool,
    /// `JSON.stringify` of the returned value; absent for `undefined`.
    #[serde(default)]
    pub json: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Build the harness. `candidates` must already be validated identifiers:
/// they are spliced into the script as bare names.
pub(crate) fn harness_script(
    candidates: &[String],
    cases: &[TestCase],
) -> Result<String, serde_json::Error> {
    let mut lookups = Vec::with_capacity(candidates.len());
    for name in candidates {
        lookups.push(format!(
            "[{}, typeof {} === \"function\" ? {} : undefined]",
            serde_json::to_string(name)?,
            name,
            name
        ));
    }
    let inputs: Vec<&Vec<Json>> = cases.iter().map(|case| &case.input).collect();
    Ok(format!(
        r#"(() => {{
    const found = [{lookups}].find((entry) => typeof entry[1] === "function");
    if (!found) {{
        return JSON.stringify({{ entryPoint: null, results: [] }});
    }}
    const [entryPoint, fn] = found;
    const results = {inputs}.map((args) => {{
        try {{
            return {{ ok: true, json: JSON.stringify(fn(...args)) }};
        }} catch (e) {{
            const message = e !== null && typeof e === "object" && typeof e.message === "string"
                ? e.message
                : "" + e;
            return {{ ok: false, error: message }};
        }}
    }});
    return JSON.stringify({{ entryPoint, results }});
}})()"#,
        lookups = lookups.join(", "),
        inputs = serde_json::to_string(&inputs)?,
    ))
}

/// Turn the harness report into one output line per case; returns whether
/// every case passed.
pub(crate) fn report_cases(
    cases: &[TestCase],
    outcomes: &[CaseOutcome],
    collector: &mut OutputCollector,
) -> bool {
    let mut all_passed = outcomes.len() == cases.len();
    for (index, (case, outcome)) in cases.iter().zip(outcomes).enumerate() {
        let number = index + 1;
        if !outcome.ok {
            all_passed = false;
            let message = outcome.error.as_deref().unwrap_or("unknown error");
            tracing::debug!(case = number, error = message, "test case threw");
            collector.error(format!(
                "❌ Test {}: {} - error\n  {}",
                number, case.description, message
            ));
            continue;
        }

        let actual = outcome
            .json
            .as_deref()
            .and_then(|text| serde_json::from_str::<Json>(text).ok());
        let passed = actual
            .as_ref()
            .is_some_and(|value| json_equal(value, &case.expected));
        tracing::debug!(case = number, passed, "test case finished");
        if passed {
            collector.test_result(format!("✅ Test {}: {} - passed", number, case.description));
        } else {
            all_passed = false;
            collector.error(format!(
                "❌ Test {}: {} - failed\n  input: {}\n  expected: {}\n  actual: {}",
                number,
                case.description,
                Json::Array(case.input.clone()),
                case.expected,
                actual.map_or_else(|| "undefined".to_string(), |value| value.to_string())
            ));
        }
    }
    all_passed
}
