// =============================================================================
// analyzer/classify.rs — CLASSIFICATION AND TIE-BREAKS
// =============================================================================
//
// Turns the per-type proximity evidence into `ConcursoFinding`s, then
// picks the single primary document type for the whole gazette. The
// `resultado_parcial`-vs-`homologacao` suppression rule is resolved
// here: see DESIGN.md.
// =============================================================================

use crate::analyzer::patterns::{
    DOCUMENT_TYPE_AUTOMATONS, DOCUMENT_TYPE_EXCLUSION_REGEXES, DOCUMENT_TYPE_PATTERNS,
    DOCUMENT_TYPE_REGEXES, TITLE_PATTERNS, TITLE_REGEXES,
};
use crate::analyzer::proximity::{evaluate_type, location_at, title_match_within_lead};
use crate::models::{ConcursoFinding, DocumentType, Priority};

/// Confidence below which a document type is not reported at all: if no
/// tag reaches this bar, the document type is `nao_classificado`.
pub const CLASSIFICATION_THRESHOLD: f64 = 0.5;

/// The fixed "high confidence" tier this crate settles on (see DESIGN.md).
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Evaluate every document-type pattern against `text` and return one
/// `ConcursoFinding` per type with evidence: either the proximity gate
/// passed, or a title-line override matched near the top of the
/// document. The title override stands on its own — a document led by
/// `"17ª CONVOCAÇÃO"` must still raise `convocacao` even when the body
/// never clusters that type's required keywords (§8 property 6).
pub fn compute_type_findings(text: &str) -> Vec<ConcursoFinding> {
    let mut findings = Vec::new();

    for (i, pattern) in DOCUMENT_TYPE_PATTERNS.iter().enumerate() {
        let automaton = &DOCUMENT_TYPE_AUTOMATONS[i];
        let regexes = &DOCUMENT_TYPE_REGEXES[i];
        let exclusions = &DOCUMENT_TYPE_EXCLUSION_REGEXES[i];

        let evidence = evaluate_type(text, pattern, automaton, regexes, exclusions);

        let title_hit = TITLE_PATTERNS
            .iter()
            .enumerate()
            .find(|(_, t)| t.tag == pattern.tag)
            .and_then(|(ti, t)| title_match_within_lead(text, &TITLE_REGEXES[ti]).map(|offset| (t.base_confidence, offset)));

        let (confidence, location_offset, context) = match (evidence, title_hit) {
            (Some(evidence), Some((base_confidence, _))) => {
                (evidence.confidence.max(base_confidence), evidence.location_offset, evidence.context)
            }
            (Some(evidence), None) => (evidence.confidence, evidence.location_offset, evidence.context),
            (None, Some((base_confidence, offset))) => (base_confidence, offset, None),
            (None, None) => continue,
        };

        findings.push(ConcursoFinding {
            document_type: pattern.tag,
            confidence,
            data: None,
            location: Some(location_at(text, location_offset)),
            context,
        });
    }

    findings
}

fn priority_of(tag: DocumentType) -> Priority {
    DOCUMENT_TYPE_PATTERNS
        .iter()
        .find(|p| p.tag == tag)
        .map(|p| p.priority)
        .unwrap_or(Priority::Supporting)
}

/// Suppress `resultado_parcial` when a same-document `homologacao`
/// finding has already cleared the high-confidence bar — the exclusion
/// pattern implies it. This crate resolves the post-classification rule
/// as: drop, don't merely down-rank.
pub fn suppress_resultado_parcial(findings: Vec<ConcursoFinding>) -> Vec<ConcursoFinding> {
    let homologacao_confident = findings
        .iter()
        .any(|f| f.document_type == DocumentType::Homologacao && f.confidence >= HIGH_CONFIDENCE_THRESHOLD);

    if !homologacao_confident {
        return findings;
    }
    findings
        .into_iter()
        .filter(|f| f.document_type != DocumentType::ResultadoParcial)
        .collect()
}

/// Pick the single primary document type for the document as a whole:
/// highest priority, then highest confidence, then lexicographic tag
/// (first alphabetically wins). Falls back to `nao_classificado` with
/// the best observed score if nothing clears `CLASSIFICATION_THRESHOLD`.
pub fn select_primary(findings: &[ConcursoFinding]) -> (DocumentType, f64) {
    let eligible: Vec<&ConcursoFinding> =
        findings.iter().filter(|f| f.confidence >= CLASSIFICATION_THRESHOLD).collect();

    if eligible.is_empty() {
        let best = findings.iter().map(|f| f.confidence).fold(0.0_f64, f64::max);
        return (DocumentType::NaoClassificado, best);
    }

    let winner = eligible
        .into_iter()
        .max_by(|a, b| {
            let pa = priority_of(a.document_type);
            let pb = priority_of(b.document_type);
            pa.cmp(&pb)
                .then(a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal))
                .then(b.document_type.to_string().cmp(&a.document_type.to_string()))
        })
        .expect("eligible is non-empty");

    (winner.document_type, winner.confidence)
}
