// =============================================================================
// analyzer/proximity.rs — KEYWORD PROXIMITY ANALYSIS
// =============================================================================
//
// The confidence engine behind the concurso classifier:
// locate keyword occurrences, find the tightest cluster of distinct
// required keywords, score how close together they sit, fold in regex
// and exclusion evidence, and apply the title-line override as a floor.
// =============================================================================

use std::collections::HashSet;

use aho_corasick::AhoCorasick;

use crate::analyzer::patterns::{DocumentTypePattern, ProximitySpec};
use crate::models::Location;

/// One keyword occurrence, located both by character offset (for
/// `Location`/context) and by word index (for proximity clustering).
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub keyword: String,
    pub char_offset: usize,
    pub word_index: usize,
    pub context: String,
}

/// Map every character offset in `text` to the index of the word it
/// falls within, so keyword hits located by byte offset (from the
/// Aho-Corasick automaton) can be compared by word distance.
struct WordIndex {
    /// `(byte_start, word_index)` for every word boundary, in order.
    starts: Vec<(usize, usize)>,
}

impl WordIndex {
    fn build(text: &str) -> Self {
        let mut starts = Vec::new();
        let mut word_index = 0usize;
        let mut in_word = false;
        for (i, ch) in text.char_indices() {
            if ch.is_whitespace() {
                in_word = false;
            } else if !in_word {
                starts.push((i, word_index));
                word_index += 1;
                in_word = true;
            }
        }
        Self { starts }
    }

    fn word_index_at(&self, offset: usize) -> usize {
        match self.starts.binary_search_by_key(&offset, |(start, _)| *start) {
            Ok(i) => self.starts[i].1,
            Err(0) => 0,
            Err(i) => self.starts[i - 1].1,
        }
    }
}

const CONTEXT_RADIUS: usize = 50;

/// Locate every occurrence of any of a type's keywords in a single
/// Aho-Corasick pass, case-insensitive. `automaton` and `keywords` must
/// be the parallel pair built for the same document-type pattern (see
/// `crate::analyzer::patterns::DOCUMENT_TYPE_AUTOMATONS`).
pub fn locate_keyword_positions(text: &str, automaton: &AhoCorasick, keywords: &[&str]) -> Vec<KeywordHit> {
    let word_index = WordIndex::build(text);
    let mut hits = Vec::new();

    for m in automaton.find_iter(text) {
        let offset = m.start();
        let keyword = keywords[m.pattern().as_usize()];
        let ctx_start = offset.saturating_sub(CONTEXT_RADIUS);
        let ctx_end = (m.end() + CONTEXT_RADIUS).min(text.len());
        let context = safe_slice(text, ctx_start, ctx_end).to_string();
        hits.push(KeywordHit {
            keyword: keyword.to_string(),
            char_offset: offset,
            word_index: word_index.word_index_at(offset),
            context,
        });
    }
    hits.sort_by_key(|h| h.char_offset);
    hits
}

/// Slice `text` at the nearest char boundaries so we never panic on a
/// multi-byte UTF-8 split.
fn safe_slice(text: &str, start: usize, end: usize) -> &str {
    let mut s = start.min(text.len());
    while s > 0 && !text.is_char_boundary(s) {
        s -= 1;
    }
    let mut e = end.min(text.len());
    while e < text.len() && !text.is_char_boundary(e) {
        e += 1;
    }
    &text[s..e]
}

/// The result of searching for the best cluster of required keywords.
#[derive(Debug, Clone, Copy)]
pub struct BestGroup {
    pub distinct_keywords: usize,
    /// Max pairwise word distance within the chosen cluster.
    pub span: usize,
    pub anchor_word_index: usize,
}

/// Search for the cluster maximizing the count of distinct required
/// keywords, subject to every member lying within `max_distance` words
/// of some anchor hit. Returns `None` if `min_keywords_together`
/// distinct keywords can't be found within any such window.
pub fn find_best_group(hits: &[KeywordHit], spec: &ProximitySpec) -> Option<BestGroup> {
    let required: Vec<&KeywordHit> = hits
        .iter()
        .filter(|h| spec.required.iter().any(|r| r.eq_ignore_ascii_case(&h.keyword)))
        .collect();
    if required.is_empty() {
        return None;
    }

    let mut best: Option<BestGroup> = None;
    for anchor in &required {
        let window: Vec<&&KeywordHit> = required
            .iter()
            .filter(|h| h.word_index.abs_diff(anchor.word_index) <= spec.max_distance)
            .collect();
        let distinct: HashSet<String> = window.iter().map(|h| h.keyword.to_lowercase()).collect();
        let count = distinct.len();
        if count < spec.min_keywords_together {
            continue;
        }
        let min_idx = window.iter().map(|h| h.word_index).min().unwrap();
        let max_idx = window.iter().map(|h| h.word_index).max().unwrap();
        let span = max_idx - min_idx;

        let replace = match &best {
            None => true,
            Some(b) => count > b.distinct_keywords || (count == b.distinct_keywords && span < b.span),
        };
        if replace {
            best = Some(BestGroup {
                distinct_keywords: count,
                span,
                anchor_word_index: anchor.word_index,
            });
        }
    }
    best
}

/// The four proximity tiers: `(score, boost factor)`.
fn proximity_tier(span: usize) -> (f64, f64) {
    if span <= 50 {
        (1.0, 1.5)
    } else if span <= 200 {
        (0.8, 1.3)
    } else if span <= 500 {
        (0.6, 1.1)
    } else {
        (0.3, 0.8)
    }
}

/// Count how many of a type's regexes match anywhere in `text`.
fn regex_match_ratio(text: &str, regexes: &[regex::Regex]) -> f64 {
    if regexes.is_empty() {
        return 0.0;
    }
    let matched = regexes.iter().filter(|r| r.is_match(text)).count();
    matched as f64 / regexes.len() as f64
}

fn exclusion_match_count(text: &str, exclusions: &[regex::Regex]) -> usize {
    exclusions.iter().filter(|r| r.is_match(text)).count()
}

/// Full per-type evidence computed by `evaluate_type`, enough for the
/// classifier and extraction stages to build a `ConcursoFinding` from.
pub struct TypeEvidence {
    pub confidence: f64,
    pub best_group: Option<BestGroup>,
    pub location_offset: usize,
    pub context: Option<String>,
}

/// Run the full proximity+regex+exclusion pipeline for one document-type
/// pattern. Returns `None` if the cluster gate fails — not enough
/// required keywords cluster tightly enough to produce any match.
pub fn evaluate_type(
    text: &str,
    pattern: &DocumentTypePattern,
    automaton: &AhoCorasick,
    regexes: &[regex::Regex],
    exclusions: &[regex::Regex],
) -> Option<TypeEvidence> {
    let hits = locate_keyword_positions(text, automaton, pattern.keywords);
    let best_group = find_best_group(&hits, &pattern.proximity)?;

    let (tier_score, boost_factor) = proximity_tier(best_group.span);
    let proximity_multiplier = if pattern.proximity.boost_nearby {
        tier_score * boost_factor
    } else {
        tier_score
    };

    let regex_ratio = regex_match_ratio(text, regexes);
    let keyword_term = (best_group.distinct_keywords.min(2) as f64) / 2.0;

    let mut confidence = pattern.weight * (0.6 * regex_ratio + 0.4 * keyword_term) * proximity_multiplier;

    let exclusion_hits = exclusion_match_count(text, exclusions);
    confidence -= 0.2 * exclusion_hits as f64;
    confidence = confidence.clamp(0.0, 1.0);

    let anchor_hit = hits
        .iter()
        .filter(|h| pattern.proximity.required.iter().any(|r| r.eq_ignore_ascii_case(&h.keyword)))
        .find(|h| h.word_index == best_group.anchor_word_index);

    Some(TypeEvidence {
        confidence,
        best_group: Some(best_group),
        location_offset: anchor_hit.map(|h| h.char_offset).unwrap_or(0),
        context: anchor_hit.map(|h| h.context.clone()),
    })
}

/// Does a title pattern match within the first 20% of the text? Returns
/// the byte offset of the match's start (relative to the full text) when
/// it does, so a title-only finding can still be located without any
/// proximity evidence.
pub fn title_match_within_lead(text: &str, regex: &regex::Regex) -> Option<usize> {
    let lead_len = (text.len() as f64 * 0.2).ceil() as usize;
    let lead = safe_slice(text, 0, lead_len.min(text.len()));
    regex.find(lead).map(|m| m.start())
}

/// Build a `Location` from a character offset, counting preceding
/// newlines as a crude line number (no page numbers are available from
/// plain OCR text).
pub fn location_at(text: &str, offset: usize) -> Location {
    let line = text[..offset.min(text.len())].matches('\n').count() as u32 + 1;
    Location {
        page: None,
        line: Some(line),
        offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::patterns::ProximitySpec;

    fn automaton(keywords: &[&str]) -> AhoCorasick {
        AhoCorasick::builder().ascii_case_insensitive(true).build(keywords).unwrap()
    }

    #[test]
    fn locate_keyword_positions_finds_every_occurrence_case_insensitively() {
        let keywords = ["edital"];
        let auto = automaton(&keywords);
        let hits = locate_keyword_positions("Edital EDITAL edital", &auto, &keywords);
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn find_best_group_requires_minimum_distinct_keywords() {
        let keywords = ["edital de abertura", "concurso público"];
        let auto = automaton(&keywords);
        let hits = locate_keyword_positions("edital de abertura concurso público", &auto, &keywords);
        let spec = ProximitySpec {
            required: &["edital de abertura", "concurso público"],
            max_distance: 150,
            boost_nearby: true,
            min_keywords_together: 2,
        };
        assert!(find_best_group(&hits, &spec).is_some());
    }

    #[test]
    fn find_best_group_fails_when_keywords_too_far_apart() {
        let keywords = ["edital de abertura", "concurso público"];
        let auto = automaton(&keywords);
        let filler = "palavra ".repeat(490);
        let text = format!("edital de abertura {filler} concurso público para provimento");
        let hits = locate_keyword_positions(&text, &auto, &keywords);
        let spec = ProximitySpec {
            required: &["edital de abertura", "concurso público"],
            max_distance: 150,
            boost_nearby: true,
            min_keywords_together: 2,
        };
        assert!(find_best_group(&hits, &spec).is_none());
    }

    #[test]
    fn find_best_group_succeeds_when_keywords_are_close() {
        let keywords = ["edital de abertura", "concurso público"];
        let auto = automaton(&keywords);
        let filler = "palavra ".repeat(80);
        let text = format!("edital de abertura {filler} concurso público");
        let hits = locate_keyword_positions(&text, &auto, &keywords);
        let spec = ProximitySpec {
            required: &["edital de abertura", "concurso público"],
            max_distance: 150,
            boost_nearby: true,
            min_keywords_together: 2,
        };
        assert!(find_best_group(&hits, &spec).is_some());
    }

    #[test]
    fn proximity_tier_boundaries() {
        assert_eq!(proximity_tier(10).0, 1.0);
        assert_eq!(proximity_tier(100).0, 0.8);
        assert_eq!(proximity_tier(300).0, 0.6);
        assert_eq!(proximity_tier(600).0, 0.3);
    }

    #[test]
    fn title_override_only_checks_leading_20_percent() {
        let body = "x ".repeat(1000);
        let text = format!("{body}17ª CONVOCAÇÃO");
        let re = regex::Regex::new(r"(?i)convoca[çc][ãa]o").unwrap();
        assert!(title_match_within_lead(&text, &re).is_none());
    }

    #[test]
    fn title_override_reports_match_offset_within_lead() {
        let text = "17ª CONVOCAÇÃO\n\ncorpo do documento";
        let re = regex::Regex::new(r"(?i)convoca[çc][ãa]o").unwrap();
        let expected = re.find(text).unwrap().start();
        assert_eq!(title_match_within_lead(text, &re), Some(expected));
    }
}
