// =============================================================================
// analyzer/plugins/category.rs — CATEGORY AND KEYWORD SUMMARY
// =============================================================================
//
// Runs last in pipeline order so it can see every finding the earlier
// stages produced. Derives a coarse `categories` list from the document
// types actually found, and a `keywords` list from which pattern
// keyword sets matched anywhere in the text — independent of whether
// that type ended up surviving classification.
// =============================================================================

use async_trait::async_trait;

use crate::analyzer::orchestrator::{AnalyzerPlugin, PluginOutput};
use crate::analyzer::patterns::DOCUMENT_TYPE_PATTERNS;
use crate::errors::AnalyzerError;
use crate::models::{ConcursoFinding, DocumentType, OcrResult};

pub struct CategoryAnalyzer;

fn category_of(tag: DocumentType) -> &'static str {
    match tag {
        DocumentType::EditalAbertura | DocumentType::EditalRetificacao => "edital",
        DocumentType::Convocacao => "convocacao",
        DocumentType::Homologacao | DocumentType::ResultadoParcial | DocumentType::Gabarito => "resultado",
        DocumentType::Prorrogacao | DocumentType::Cancelamento => "alteracao",
        DocumentType::NaoClassificado => "outro",
    }
}

#[async_trait]
impl AnalyzerPlugin for CategoryAnalyzer {
    fn name(&self) -> &'static str {
        "category"
    }

    async fn analyze(
        &self,
        ocr: &OcrResult,
        findings_so_far: &[ConcursoFinding],
    ) -> Result<PluginOutput, AnalyzerError> {
        let mut categories: Vec<String> = findings_so_far
            .iter()
            .filter(|f| f.document_type != DocumentType::NaoClassificado)
            .map(|f| category_of(f.document_type).to_string())
            .collect();
        categories.sort();
        categories.dedup();

        let lower = ocr.text.to_lowercase();
        let mut keywords = Vec::new();
        for pattern in DOCUMENT_TYPE_PATTERNS.iter() {
            for kw in pattern.keywords {
                if lower.contains(&kw.to_lowercase()) {
                    keywords.push((*kw).to_string());
                }
            }
        }
        keywords.sort();
        keywords.dedup();

        Ok(PluginOutput { findings: Vec::new(), categories, keywords })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use crate::models::{Location, Priority};

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

    fn finding(tag: DocumentType) -> ConcursoFinding {
        ConcursoFinding {
            document_type: tag,
            confidence: 0.9,
            data: None,
            location: Some(Location { page: None, line: Some(1), offset: 0 }),
            context: None,
        }
    }

    #[tokio::test]
    async fn derives_categories_from_prior_findings() {
        let findings = vec![finding(DocumentType::Convocacao), finding(DocumentType::Homologacao)];
        let out = CategoryAnalyzer.analyze(&sample_ocr("texto"), &findings).await.unwrap();
        assert_eq!(out.categories, vec!["convocacao".to_string(), "resultado".to_string()]);
        let _ = Priority::Primary;
    }

    #[tokio::test]
    async fn collects_keywords_present_in_text() {
        let out = CategoryAnalyzer
            .analyze(&sample_ocr("edital de abertura do concurso público com vagas"), &[])
            .await
            .unwrap();
        assert!(out.keywords.contains(&"edital de abertura".to_string()));
        assert!(out.keywords.contains(&"vagas".to_string()));
    }
}
