// interpretation of `opa eval --format json` output

use serde_json::Value;

/// the rule every policy package is expected to define
pub const DEFAULT_RULE: &str = "violation";

const GENERIC_MESSAGE: &str = "Violation detected";

/// a single reported violation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violation {
    pub message: String,
    pub details: Option<String>,
    pub resolution: Option<String>,
}

impl Violation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// read `message`, `details` and `resolution` from an object carrying at least a message
    fn from_object(value: &Value) -> Option<Self> {
        let message = value.get("message").filter(|message| !message.is_null())?;
        Some(Self {
            message: render(message),
            details: optional_field(value, "details"),
            resolution: optional_field(value, "resolution"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Passed,
    Failed {
        count: usize,
        violations: Vec<Violation>,
    },
}

impl RuleOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// decide whether one rule's evaluation output reports violations
pub fn interpret_eval_output(output: &Value) -> RuleOutcome {
    let Some(results) = output.get("result").and_then(Value::as_array) else {
        return RuleOutcome::Passed;
    };

    let mut failed = false;
    let mut count = 0;
    let mut violations = Vec::new();

    for entry in results {
        let values = violation_values(entry);
        if values.is_empty() {
            continue;
        }

        failed = true;
        count += values.iter().map(|value| collection_len(value)).sum::<usize>().max(1);
        violations.extend(describe_entry(entry, &values));
    }

    if failed {
        RuleOutcome::Failed { count, violations }
    } else {
        RuleOutcome::Passed
    }
}

/// rule names defined by a package, read from the value of `data.<package>`
///
/// falls back to the default rule when the output holds no usable names.
pub fn discover_rules(output: &Value) -> Vec<String> {
    let rules: Vec<String> = output
        .get("result")
        .and_then(|result| result.get(0))
        .and_then(|entry| entry.get("expressions"))
        .and_then(|expressions| expressions.get(0))
        .and_then(|expression| expression.get("value"))
        .and_then(Value::as_object)
        .map(|value| {
            value
                .keys()
                .filter(|name| name.as_str() != "debug_info" && !name.starts_with("__"))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    if rules.is_empty() {
        vec![DEFAULT_RULE.to_string()]
    } else {
        rules
    }
}

/// only `violation` and rules ending in it are evaluated
pub fn is_violation_rule(name: &str) -> bool {
    name.ends_with(DEFAULT_RULE)
}

/// the name a rule is reported under
pub fn display_rule_name(name: &str) -> &str {
    if name == DEFAULT_RULE { "main" } else { name }
}

fn violation_values(entry: &Value) -> Vec<&Value> {
    if let Some(expressions) = entry.get("expressions").and_then(Value::as_array) {
        return expressions
            .iter()
            .filter_map(|expression| expression.get("value"))
            .filter(|value| collection_len(value) > 0)
            .collect();
    }

    entry
        .get("value")
        .filter(|value| value.as_object().is_some_and(|map| !map.is_empty()))
        .into_iter()
        .collect()
}

fn collection_len(value: &Value) -> usize {
    match value {
        Value::Object(map) => map.len(),
        Value::Array(items) => items.len(),
        _ => 0,
    }
}

fn describe_entry(entry: &Value, values: &[&Value]) -> Vec<Violation> {
    if let Some(violation) = Violation::from_object(entry) {
        return vec![violation];
    }

    values.iter().flat_map(|value| describe_value(value)).collect()
}

fn describe_value(value: &Value) -> Vec<Violation> {
    match value {
        // set-valued rules come back as objects keyed by the json-encoded element
        Value::Object(map) => map
            .keys()
            .map(|key| {
                serde_json::from_str::<Value>(key)
                    .ok()
                    .and_then(|decoded| Violation::from_object(&decoded))
                    .unwrap_or_else(|| Violation::new(key.clone()))
            })
            .collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(message) => Violation::new(message.clone()),
                other => Violation::from_object(other).unwrap_or_else(|| Violation::new(GENERIC_MESSAGE)),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn optional_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .filter(|field| !field.is_null())
        .map(render)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
