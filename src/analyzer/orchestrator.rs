// =============================================================================
// analyzer/orchestrator.rs — PLUGGABLE ANALYZER PIPELINE
// =============================================================================
//
// Runs a configurable, priority-ordered set of analyzer plug-ins over one
// OCR result, merges and deduplicates their findings, and computes the
// summary. A single plug-in's failure is isolated — it
// degrades that plug-in's contribution, never the whole analysis; only
// invalid orchestrator input is fatal.
// =============================================================================

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::analyzer::classify::{self, HIGH_CONFIDENCE_THRESHOLD};
use crate::errors::AnalyzerError;
use crate::models::{AnalysisSummary, ConcursoFinding, DocumentType, GazetteAnalysis, OcrResult};

/// What one analyzer plug-in contributes to a single gazette's analysis.
#[derive(Debug, Clone, Default)]
pub struct PluginOutput {
    pub findings: Vec<ConcursoFinding>,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
}

/// A pluggable analysis stage. The orchestrator runs registered plugins
/// in priority order, feeding each the findings accumulated so far so
/// later stages (e.g. the category analyzer) can summarize over
/// everything found before them.
#[async_trait]
pub trait AnalyzerPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(
        &self,
        ocr: &OcrResult,
        findings_so_far: &[ConcursoFinding],
    ) -> Result<PluginOutput, AnalyzerError>;
}

/// Tuning for one orchestrator run.
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Plug-in names to run, in the order they should execute. Absent
    /// names are skipped entirely (not even attempted).
    pub enabled: Vec<String>,
    pub per_analyzer_timeout: Duration,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            enabled: vec![
                "keyword".to_string(),
                "entity".to_string(),
                "concurso".to_string(),
                "ai".to_string(),
                "category".to_string(),
            ],
            per_analyzer_timeout: Duration::from_secs(10),
        }
    }
}

/// The default pipeline, in priority order, covering the five
/// named analyzer kinds: keyword, entity, concurso, AI, category.
pub fn default_pipeline() -> Vec<Box<dyn AnalyzerPlugin>> {
    vec![
        Box::new(super::plugins::keyword::KeywordAnalyzer),
        Box::new(super::plugins::entity::EntityAnalyzer),
        Box::new(super::plugins::concurso::ConcursoAnalyzer),
        Box::new(super::plugins::ai::AiAnalyzer),
        Box::new(super::plugins::category::CategoryAnalyzer),
    ]
}

/// A finding's dedup key: same type + same data + same location counts
/// as a duplicate.
fn dedup_key(f: &ConcursoFinding) -> String {
    format!(
        "{}|{}|{}",
        f.document_type,
        f.data.as_ref().map(|d| serde_json::to_string(d).unwrap_or_default()).unwrap_or_default(),
        f.location.as_ref().map(|l| l.offset).unwrap_or(0),
    )
}

fn dedup_findings(findings: Vec<ConcursoFinding>) -> Vec<ConcursoFinding> {
    let mut seen = HashSet::new();
    findings
        .into_iter()
        .filter(|f| seen.insert(dedup_key(f)))
        .collect()
}

/// §4.E.3: "Per document-type tag, keep the highest-confidence finding."
/// Different plugins routinely produce independent findings for the same
/// type (the keyword plugin's weak density signal, the concurso
/// plugin's proximity-scored one); only the most confident survives.
fn collapse_highest_confidence_per_type(findings: Vec<ConcursoFinding>) -> Vec<ConcursoFinding> {
    let mut best: std::collections::HashMap<DocumentType, ConcursoFinding> = std::collections::HashMap::new();
    for finding in findings {
        match best.entry(finding.document_type) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(finding);
            }
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                if finding.confidence > slot.get().confidence {
                    slot.insert(finding);
                }
            }
        }
    }
    best.into_values().collect()
}

fn compute_summary(findings: &[ConcursoFinding], categories: Vec<String>, keywords: Vec<String>) -> AnalysisSummary {
    let mut findings_by_type = std::collections::HashMap::new();
    for f in findings {
        *findings_by_type.entry(f.document_type.to_string()).or_insert(0) += 1;
    }
    let high_confidence_findings = findings.iter().filter(|f| f.confidence >= HIGH_CONFIDENCE_THRESHOLD).count();

    let mut categories: Vec<String> = categories.into_iter().collect::<HashSet<_>>().into_iter().collect();
    categories.sort();
    let mut keywords: Vec<String> = keywords.into_iter().collect::<HashSet<_>>().into_iter().collect();
    keywords.sort();

    AnalysisSummary {
        total_findings: findings.len(),
        findings_by_type,
        high_confidence_findings,
        categories,
        keywords,
    }
}

/// Run the default pipeline over one OCR result and produce the
/// gazette's full analysis. The orchestrator's own input validation
/// failure is the only thing fatal to the whole analysis;
/// it returns a synthetic, finding-free `GazetteAnalysis` carrying the
/// error.
pub async fn analyze(ocr: &OcrResult, options: &AnalyzerOptions) -> GazetteAnalysis {
    if ocr.job_id.trim().is_empty() || ocr.territory_id.trim().is_empty() {
        let err = AnalyzerError::InvalidInput("ocr result missing job_id or territory_id".to_string());
        warn!(error = %err, "analyzer orchestrator rejected invalid input");
        return GazetteAnalysis {
            ocr_job_id: ocr.job_id.clone(),
            territory_id: ocr.territory_id.clone(),
            text: String::new(),
            findings: Vec::new(),
            primary_type: DocumentType::NaoClassificado,
            primary_confidence: 0.0,
            summary: AnalysisSummary::default(),
            error: Some(err.to_string()),
        };
    }

    let pipeline = default_pipeline();
    let mut findings: Vec<ConcursoFinding> = Vec::new();
    let mut categories = Vec::new();
    let mut keywords = Vec::new();

    for plugin in &pipeline {
        if !options.enabled.iter().any(|n| n == plugin.name()) {
            continue;
        }
        let outcome = tokio::time::timeout(options.per_analyzer_timeout, plugin.analyze(ocr, &findings)).await;
        match outcome {
            Ok(Ok(output)) => {
                debug!(analyzer = plugin.name(), findings = output.findings.len(), "analyzer plugin completed");
                findings.extend(output.findings);
                categories.extend(output.categories);
                keywords.extend(output.keywords);
            }
            Ok(Err(e)) => {
                warn!(analyzer = plugin.name(), error = %e, "analyzer plugin failed, continuing without it");
            }
            Err(_) => {
                warn!(analyzer = plugin.name(), timeout = ?options.per_analyzer_timeout, "analyzer plugin timed out");
            }
        }
    }

    findings = dedup_findings(findings);
    findings = collapse_highest_confidence_per_type(findings);
    findings = classify::suppress_resultado_parcial(findings);
    let (primary_type, primary_confidence) = classify::select_primary(&findings);
    let summary = compute_summary(&findings, categories, keywords);

    GazetteAnalysis {
        ocr_job_id: ocr.job_id.clone(),
        territory_id: ocr.territory_id.clone(),
        text: ocr.text.clone(),
        findings,
        primary_type,
        primary_confidence,
        summary,
        error: None,
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
    async fn orchestrator_rejects_invalid_input() {
        let mut ocr = sample_ocr("anything");
        ocr.job_id = String::new();
        let analysis = analyze(&ocr, &AnalyzerOptions::default()).await;
        assert!(analysis.error.is_some());
        assert!(analysis.findings.is_empty());
    }

    #[tokio::test]
    async fn orchestrator_classifies_a_convocacao_header() {
        let ocr = sample_ocr("17ª CONVOCAÇÃO\n\nO Prefeito convoca os candidatos aprovados para comparecer.");
        let analysis = analyze(&ocr, &AnalyzerOptions::default()).await;
        assert!(analysis.error.is_none());
        assert!(analysis
            .findings
            .iter()
            .any(|f| f.document_type == crate::models::DocumentType::Convocacao && f.confidence >= 0.85));
    }

    #[tokio::test]
    async fn orchestrator_deduplicates_identical_findings_across_plugins() {
        let ocr = sample_ocr("edital de abertura do concurso público, inscrições abertas, 10 vagas");
        let analysis = analyze(&ocr, &AnalyzerOptions::default()).await;
        let keys: HashSet<String> = analysis.findings.iter().map(dedup_key).collect();
        assert_eq!(keys.len(), analysis.findings.len());
    }

    #[tokio::test]
    async fn orchestrator_keeps_only_one_finding_per_document_type() {
        // The keyword plugin's weak density finding and the concurso
        // plugin's proximity-scored finding both target `edital_abertura`
        // here; only the highest-confidence one should survive.
        let ocr = sample_ocr(
            "EDITAL DE ABERTURA\n\nedital de abertura do concurso público para provimento de cargos, \
             inscrições abertas, 10 vagas.",
        );
        let analysis = analyze(&ocr, &AnalyzerOptions::default()).await;
        let edital_abertura_count = analysis
            .findings
            .iter()
            .filter(|f| f.document_type == crate::models::DocumentType::EditalAbertura)
            .count();
        assert_eq!(edital_abertura_count, 1);
    }

    #[tokio::test]
    async fn orchestrator_surfaces_primary_type_from_findings() {
        let ocr = sample_ocr("17ª CONVOCAÇÃO\n\nO Prefeito convoca os candidatos aprovados para comparecer.");
        let analysis = analyze(&ocr, &AnalyzerOptions::default()).await;
        assert_eq!(analysis.primary_type, crate::models::DocumentType::Convocacao);
        assert!(analysis.primary_confidence >= 0.85);
    }

    #[tokio::test]
    async fn orchestrator_falls_back_to_nao_classificado_when_nothing_clears_threshold() {
        let ocr = sample_ocr("ata da reunião ordinária da câmara municipal, sem pauta relevante.");
        let analysis = analyze(&ocr, &AnalyzerOptions::default()).await;
        assert_eq!(analysis.primary_type, crate::models::DocumentType::NaoClassificado);
    }

    #[test]
    fn collapse_highest_confidence_per_type_keeps_only_the_best() {
        fn finding(confidence: f64, offset: usize) -> ConcursoFinding {
            ConcursoFinding {
                document_type: DocumentType::Gabarito,
                confidence,
                data: None,
                location: Some(crate::models::Location { page: None, line: Some(1), offset }),
                context: None,
            }
        }
        let collapsed = collapse_highest_confidence_per_type(vec![finding(0.3, 0), finding(0.9, 10)]);
        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed[0].confidence, 0.9);
    }
}
