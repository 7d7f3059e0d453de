// =============================================================================
// analyzer/plugins/concurso.rs — THE CONCURSO CLASSIFIER
// =============================================================================
//
// The primary analyzer: runs the full proximity+regex+exclusion pipeline
// and attaches extracted `ConcursoData` to every
// finding that clears the classification threshold.
// =============================================================================

use async_trait::async_trait;

use crate::analyzer::classify::{compute_type_findings, CLASSIFICATION_THRESHOLD};
use crate::analyzer::extraction::extract_concurso_data;
use crate::analyzer::orchestrator::{AnalyzerPlugin, PluginOutput};
use crate::errors::AnalyzerError;
use crate::models::{ConcursoFinding, OcrResult};

pub struct ConcursoAnalyzer;

#[async_trait]
impl AnalyzerPlugin for ConcursoAnalyzer {
    fn name(&self) -> &'static str {
        "concurso"
    }

    async fn analyze(
        &self,
        ocr: &OcrResult,
        _findings_so_far: &[ConcursoFinding],
    ) -> Result<PluginOutput, AnalyzerError> {
        if ocr.text.trim().is_empty() {
            return Ok(PluginOutput::default());
        }

        let mut findings = compute_type_findings(&ocr.text);
        let data = extract_concurso_data(&ocr.text);
        let has_any_field = data.edital_number.is_some()
            || data.vacancies.is_some()
            || data.position.is_some()
            || data.salary.is_some()
            || data.organizing_institution.is_some()
            || !data.cities.is_empty();

        if has_any_field {
            for finding in findings.iter_mut().filter(|f| f.confidence >= CLASSIFICATION_THRESHOLD) {
                finding.data = Some(data.clone());
            }
        }

        Ok(PluginOutput { findings, categories: Vec::new(), keywords: Vec::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_ocr(text: &str) -> OcrResult {
        OcrResult {
            job_id: "job-1".to_string(),
            territory_id: "2927408".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            spider_id: "sp-1".to_string(),
            edition_number: None,
            is_extra_edition: None,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn attaches_extracted_data_to_confident_findings() {
        let text = "EDITAL DE ABERTURA\n\nEdital nº 010/2026 torna pública a abertura do concurso público \
                     para provimento de cargos, com 50 vagas e inscrições abertas.";
        let analyzer = ConcursoAnalyzer;
        let out = analyzer.analyze(&sample_ocr(text), &[]).await.unwrap();
        let confident = out.findings.iter().find(|f| f.confidence >= CLASSIFICATION_THRESHOLD);
        assert!(confident.is_some());
        assert!(confident.unwrap().data.is_some());
    }

    #[tokio::test]
    async fn empty_text_produces_no_findings() {
        let analyzer = ConcursoAnalyzer;
        let out = analyzer.analyze(&sample_ocr(""), &[]).await.unwrap();
        assert!(out.findings.is_empty());
    }
}
