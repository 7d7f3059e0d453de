// =============================================================================
// analyzer/plugins/keyword.rs — RAW KEYWORD DENSITY CORROBORATION
// =============================================================================
//
// A lighter-weight pass than the concurso analyzer's proximity pipeline:
// counts raw keyword hits per document type with the same per-type
// Aho-Corasick automatons, ignoring clustering entirely. It exists to
// surface weak supporting-tier signals the proximity gate would reject
// outright (e.g. a single stray mention of "gabarito" in an otherwise
// unrelated document), not to replace the classifier.
// =============================================================================

use async_trait::async_trait;

use crate::analyzer::patterns::{DOCUMENT_TYPE_AUTOMATONS, DOCUMENT_TYPE_PATTERNS};
use crate::analyzer::proximity::location_at;
use crate::analyzer::orchestrator::{AnalyzerPlugin, PluginOutput};
use crate::errors::AnalyzerError;
use crate::models::{ConcursoFinding, OcrResult};

/// Confidence per hit, capped at this many hits worth of credit.
const MAX_CREDITED_HITS: usize = 5;
const CONFIDENCE_PER_HIT: f64 = 0.08;

pub struct KeywordAnalyzer;

#[async_trait]
impl AnalyzerPlugin for KeywordAnalyzer {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn analyze(
        &self,
        ocr: &OcrResult,
        _findings_so_far: &[ConcursoFinding],
    ) -> Result<PluginOutput, AnalyzerError> {
        if ocr.text.trim().is_empty() {
            return Ok(PluginOutput::default());
        }

        let mut findings = Vec::new();
        for (i, pattern) in DOCUMENT_TYPE_PATTERNS.iter().enumerate() {
            let matches: Vec<_> = DOCUMENT_TYPE_AUTOMATONS[i].find_iter(&ocr.text).collect();
            if matches.is_empty() {
                continue;
            }
            let confidence = (matches.len().min(MAX_CREDITED_HITS) as f64 * CONFIDENCE_PER_HIT).min(0.4);
            let first = &matches[0];
            findings.push(ConcursoFinding {
                document_type: pattern.tag,
                confidence,
                data: None,
                location: Some(location_at(&ocr.text, first.start())),
                context: None,
            });
        }

        Ok(PluginOutput { findings, categories: Vec::new(), keywords: Vec::new() })
    }
}
