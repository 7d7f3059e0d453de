// =============================================================================
// analyzer/plugins/ai.rs — EXTERNAL MODEL INTEGRATION PLUG POINT
// =============================================================================
//
// Reserves the AI analyzer's slot in the pipeline without wiring an actual
// model call: the keyword/entity/concurso stages cover pattern-matchable
// structure, and an eventual model-backed analyzer would sit here — same
// trait, same timeout and failure-isolation treatment, contributing
// findings/categories/keywords alongside everything else. Returning an
// empty output keeps the pipeline order stable for when that call lands.
// =============================================================================

use async_trait::async_trait;

use crate::analyzer::orchestrator::{AnalyzerPlugin, PluginOutput};
use crate::errors::AnalyzerError;
use crate::models::{ConcursoFinding, OcrResult};

pub struct AiAnalyzer;

#[async_trait]
impl AnalyzerPlugin for AiAnalyzer {
    fn name(&self) -> &'static str {
        "ai"
    }

    async fn analyze(
        &self,
        _ocr: &OcrResult,
        _findings_so_far: &[ConcursoFinding],
    ) -> Result<PluginOutput, AnalyzerError> {
        Ok(PluginOutput::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn contributes_nothing_without_a_backing_model() {
        let ocr = OcrResult {
            job_id: "job-1".to_string(),
            territory_id: "2927408".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            spider_id: "sp-1".to_string(),
            edition_number: None,
            is_extra_edition: None,
            text: "qualquer texto".to_string(),
        };
        let out = AiAnalyzer.analyze(&ocr, &[]).await.unwrap();
        assert!(out.findings.is_empty());
        assert!(out.categories.is_empty());
        assert!(out.keywords.is_empty());
    }
}
