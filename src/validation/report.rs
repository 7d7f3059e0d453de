// =============================================================================
// validation/report.rs — REPORT RENDERING
// =============================================================================
//
// Five output formats for a `ValidationReport`: JSON and CSV for
// machine consumption, Markdown and console text for a human reading a
// CI log, and a single-page HTML summary. None of this participates in
// the pass/fail decision — it only renders what `mod.rs` already
// computed.
// =============================================================================

use serde::Serialize;

use crate::validation::CityReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Markdown,
    Html,
    Csv,
    Console,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformRollup {
    pub spider_type: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub mode: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub platform_rollups: Vec<PlatformRollup>,
    pub cities: Vec<CityReport>,
}

impl ValidationReport {
    pub fn render(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Json => self.render_json(),
            ReportFormat::Markdown => self.render_markdown(),
            ReportFormat::Html => self.render_html(),
            ReportFormat::Csv => self.render_csv(),
            ReportFormat::Console => self.render_console(),
        }
    }

    fn render_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    fn render_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Validation report ({})\n\n", self.mode));
        out.push_str(&format!("{}/{} cities passed ({} failed)\n\n", self.passed, self.total, self.failed));
        out.push_str("| Platform | Total | Passed | Failed |\n|---|---|---|---|\n");
        for rollup in &self.platform_rollups {
            out.push_str(&format!("| {} | {} | {} | {} |\n", rollup.spider_type, rollup.total, rollup.passed, rollup.failed));
        }
        let failures: Vec<&CityReport> = self.cities.iter().filter(|c| !c.passed).collect();
        if !failures.is_empty() {
            out.push_str("\n## Failures\n\n");
            for city in failures {
                out.push_str(&format!("- **{}**: {}\n", city.spider_id, city.all_failures().join("; ")));
            }
        }
        out
    }

    fn render_html(&self) -> String {
        let mut rows = String::new();
        for city in &self.cities {
            let status = if city.passed { "pass" } else { "fail" };
            rows.push_str(&format!(
                "<tr class=\"{status}\"><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                html_escape(&city.spider_id),
                status,
                html_escape(&city.all_failures().join("; ")),
            ));
        }
        format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Validation report</title></head><body>\n\
             <h1>Validation report ({})</h1>\n\
             <p>{}/{} cities passed ({} failed)</p>\n\
             <table border=\"1\"><thead><tr><th>City</th><th>Status</th><th>Failures</th></tr></thead><tbody>\n{}</tbody></table>\n\
             </body></html>",
            self.mode, self.passed, self.total, self.failed, rows
        )
    }

    fn render_csv(&self) -> String {
        let mut out = String::from("spider_id,passed,failures\n");
        for city in &self.cities {
            out.push_str(&format!(
                "{},{},\"{}\"\n",
                city.spider_id,
                city.passed,
                city.all_failures().join("; ").replace('"', "'"),
            ));
        }
        out
    }

    fn render_console(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("validation ({}): {}/{} passed, {} failed\n", self.mode, self.passed, self.total, self.failed));
        for rollup in &self.platform_rollups {
            out.push_str(&format!("  {:<24} {}/{}\n", rollup.spider_type, rollup.passed, rollup.total));
        }
        for city in self.cities.iter().filter(|c| !c.passed) {
            out.push_str(&format!("  FAIL {}: {}\n", city.spider_id, city.all_failures().join("; ")));
        }
        out
    }
}

fn html_escape(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::CategoryReport;

    fn report() -> ValidationReport {
        ValidationReport {
            mode: "sample".to_string(),
            total: 2,
            passed: 1,
            failed: 1,
            platform_rollups: vec![PlatformRollup { spider_type: "dosp".to_string(), total: 2, passed: 1, failed: 1 }],
            cities: vec![
                CityReport {
                    spider_id: "city-ok".to_string(),
                    passed: true,
                    structural: CategoryReport::default(),
                    content: CategoryReport::default(),
                    performance: CategoryReport::default(),
                },
                CityReport {
                    spider_id: "city-bad".to_string(),
                    passed: false,
                    structural: CategoryReport { failures: vec!["bad territory".to_string()], warnings: vec![] },
                    content: CategoryReport::default(),
                    performance: CategoryReport::default(),
                },
            ],
        }
    }

    #[test]
    fn json_round_trips_through_serde() {
        let rendered = report().render(ReportFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["total"], 2);
    }

    #[test]
    fn markdown_lists_failures() {
        let rendered = report().render(ReportFormat::Markdown);
        assert!(rendered.contains("city-bad"));
        assert!(rendered.contains("bad territory"));
    }

    #[test]
    fn csv_has_a_header_and_one_row_per_city() {
        let rendered = report().render(ReportFormat::Csv);
        assert_eq!(rendered.lines().count(), 3);
    }

    #[test]
    fn html_escapes_and_marks_failing_rows() {
        let rendered = report().render(ReportFormat::Html);
        assert!(rendered.contains("class=\"fail\""));
    }

    #[test]
    fn console_summarizes_platform_rollups() {
        let rendered = report().render(ReportFormat::Console);
        assert!(rendered.contains("1/2 passed"));
    }
}
