// =============================================================================
// analyzer/plugins/entity.rs — ORGANIZING-ENTITY EXTRACTION
// =============================================================================
//
// Runs the organizing-institution/issuing-agency/city extraction families
// independently of document-type classification, so a gazette that
// mentions an organizing institution or a city list gets that entity
// data on record even when the concurso classifier itself stays below
// the reporting threshold.
// =============================================================================

use async_trait::async_trait;

use crate::analyzer::extraction::extract_concurso_data;
use crate::analyzer::orchestrator::{AnalyzerPlugin, PluginOutput};
use crate::errors::AnalyzerError;
use crate::models::{ConcursoFinding, DocumentType, OcrResult};

/// Fixed confidence for a bare entity-presence signal: lower than any
/// classified document type, high enough to be worth recording.
const ENTITY_PRESENCE_CONFIDENCE: f64 = 0.55;

pub struct EntityAnalyzer;

#[async_trait]
impl AnalyzerPlugin for EntityAnalyzer {
    fn name(&self) -> &'static str {
        "entity"
    }

    async fn analyze(
        &self,
        ocr: &OcrResult,
        _findings_so_far: &[ConcursoFinding],
    ) -> Result<PluginOutput, AnalyzerError> {
        if ocr.text.trim().is_empty() {
            return Ok(PluginOutput::default());
        }

        let data = extract_concurso_data(&ocr.text);
        let has_entity = data.organizing_institution.is_some() || data.issuing_agency.is_some() || !data.cities.is_empty();
        if !has_entity {
            return Ok(PluginOutput::default());
        }

        let entity_only = crate::models::ConcursoData {
            organizing_institution: data.organizing_institution,
            issuing_agency: data.issuing_agency,
            cities: data.cities,
            ..Default::default()
        };

        Ok(PluginOutput {
            findings: vec![ConcursoFinding {
                document_type: DocumentType::NaoClassificado,
                confidence: ENTITY_PRESENCE_CONFIDENCE,
                data: Some(entity_only),
                location: None,
                context: None,
            }],
            categories: Vec::new(),
            keywords: Vec::new(),
        })
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
    async fn emits_entity_finding_when_institution_present() {
        let analyzer = EntityAnalyzer;
        let out = analyzer
            .analyze(&sample_ocr("O concurso é organizado pela Fundação Getúlio Vargas."), &[])
            .await
            .unwrap();
        assert_eq!(out.findings.len(), 1);
        assert!(out.findings[0].data.as_ref().unwrap().organizing_institution.is_some());
    }

    #[tokio::test]
    async fn no_entity_mentions_yields_no_findings() {
        let analyzer = EntityAnalyzer;
        let out = analyzer.analyze(&sample_ocr("texto qualquer sem entidades"), &[]).await.unwrap();
        assert!(out.findings.is_empty());
    }
}
