// coverage summaries shared by the go and rego test runners

use serde::Serialize;

/// one measured unit: a go coverage group or a rego test path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleCoverage {
    pub name: String,
    pub coverage: f64,
    pub statements: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModuleCoverage {
    pub fn new(name: impl Into<String>, coverage: f64, statements: usize) -> Self {
        Self {
            name: name.into(),
            coverage,
            statements,
            error: None,
        }
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// the `{modules, total, errors}` document printed by `--coverage-json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageSummary {
    pub modules: Vec<ModuleCoverage>,
    pub total: f64,
    pub errors: usize,
}

impl CoverageSummary {
    /// total weighted by statement count: Σ(stmts·cov/100) / Σstmts · 100
    pub fn weighted(modules: Vec<ModuleCoverage>, errors: usize) -> Self {
        let statements: usize = modules.iter().map(|module| module.statements).sum();
        let covered: f64 = modules
            .iter()
            .map(|module| module.statements as f64 * module.coverage / 100.0)
            .sum();

        let total = percentage(covered, statements);
        Self { modules, total, errors }
    }

    pub fn total_statements(&self) -> usize {
        self.modules.iter().map(|module| module.statements).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// the module / coverage / statements table, failed rows marked
    pub fn render_table(&self) -> String {
        let rule = format!("{:<40} {:<10} {:<10}", "-".repeat(40), "-".repeat(10), "-".repeat(10));
        let mut lines = vec![
            format!("{:<40} {:<10} {:<10}", "Module", "Coverage", "Statements"),
            rule.clone(),
        ];

        for module in &self.modules {
            let marker = if module.error.is_some() { "❌ " } else { "  " };
            lines.push(format!(
                "{marker}{:<38} {:>9.1}% {:>10}",
                module.name, module.coverage, module.statements
            ));
        }

        lines.push(rule);
        lines.push(format!(
            "{:<40} {:>9.1}% {:>10}",
            "Total",
            self.total,
            self.total_statements()
        ));
        lines.join("\n")
    }
}

/// covered over total as a percentage, zero when there is nothing to cover
pub fn percentage(covered: f64, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_total() {
        let summary = CoverageSummary::weighted(
            vec![
                ModuleCoverage::new("scripts", 50.0, 100),
                ModuleCoverage::new("tools", 100.0, 300),
            ],
            0,
        );
        assert!((summary.total - 87.5).abs() < 1e-9);
        assert_eq!(summary.total_statements(), 400);
    }

    #[test]
    fn test_empty_summary_is_zero() {
        let summary = CoverageSummary::weighted(Vec::new(), 0);
        assert_eq!(summary.total, 0.0);
    }

    #[test]
    fn test_json_omits_missing_errors() {
        let summary = CoverageSummary::weighted(
            vec![
                ModuleCoverage::new("ok", 80.0, 10),
                ModuleCoverage::new("broken", 0.0, 0).failed("Error running tests: exit status 1"),
            ],
            1,
        );
        let value: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert!(value["modules"][0].get("error").is_none());
        assert_eq!(value["modules"][1]["error"], "Error running tests: exit status 1");
        assert_eq!(value["errors"], 1);
        assert!((value["total"].as_f64().unwrap() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_table_rows() {
        let summary = CoverageSummary::weighted(
            vec![
                ModuleCoverage::new("scripts", 75.0, 8),
                ModuleCoverage::new("broken", 0.0, 1).failed("boom"),
            ],
            1,
        );
        let table = summary.render_table();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("Module"));
        assert_eq!(lines[2], format!("  {:<38} {:>9.1}% {:>10}", "scripts", 75.0, 8));
        assert!(lines[3].starts_with("❌ broken"));
        assert!(lines[5].starts_with("Total"));
        assert!(lines[5].contains("66.7%"));
    }
}
