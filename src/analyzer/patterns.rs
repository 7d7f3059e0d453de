// =============================================================================
// analyzer/patterns.rs — THE THREE PATTERN CATALOGS
// =============================================================================
//
// Every document-type pattern gets its own Aho-Corasick automaton,
// built once and kept behind a `LazyLock` alongside the regex families
// below so no pattern set is recompiled per call.
// =============================================================================

use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use regex::Regex;

use crate::models::{DocumentType, Priority};

/// How tightly a document type's required keywords must cluster for the
/// proximity pass to credit them as "together".
#[derive(Debug, Clone)]
pub struct ProximitySpec {
    /// Keywords that must appear together (a subset of the type's full
    /// keyword list) for the proximity bonus to apply.
    pub required: &'static [&'static str],
    /// Maximum pairwise word distance allowed within the best cluster.
    pub max_distance: usize,
    /// Whether a tight cluster should multiply the base confidence up
    /// rather than merely gating it.
    pub boost_nearby: bool,
    /// Minimum number of *distinct* required keywords that must appear
    /// in the same cluster before any match is produced at all.
    pub min_keywords_together: usize,
}

/// One entry in the document-type catalog.
pub struct DocumentTypePattern {
    pub tag: DocumentType,
    pub weight: f64,
    pub priority: Priority,
    pub keywords: &'static [&'static str],
    pub regexes: &'static [&'static str],
    pub exclusions: &'static [&'static str],
    pub proximity: ProximitySpec,
}

/// A title-line override: matched against detected document headers
/// (ALL-CAPS short lines, numbered section headings) near the top of the
/// text.
pub struct TitlePattern {
    pub tag: DocumentType,
    pub regex: &'static str,
    pub base_confidence: f64,
}

macro_rules! doc_pattern {
    ($tag:expr, $weight:expr, $priority:expr, $keywords:expr, $regexes:expr, $exclusions:expr, $required:expr, $max_distance:expr, $boost:expr, $min_together:expr $(,)?) => {
        DocumentTypePattern {
            tag: $tag,
            weight: $weight,
            priority: $priority,
            keywords: $keywords,
            regexes: $regexes,
            exclusions: $exclusions,
            proximity: ProximitySpec {
                required: $required,
                max_distance: $max_distance,
                boost_nearby: $boost,
                min_keywords_together: $min_together,
            },
        }
    };
}

/// The document-type catalog, one entry per concurso lifecycle stage.
/// `nao_classificado` has no entry: it is the fallback when nothing else
/// clears the classification threshold.
pub static DOCUMENT_TYPE_PATTERNS: LazyLock<Vec<DocumentTypePattern>> = LazyLock::new(|| {
    vec![
        doc_pattern!(
            DocumentType::EditalAbertura,
            0.92,
            Priority::Primary,
            &[
                "edital de abertura",
                "concurso público",
                "provimento de cargos",
                "inscrições",
                "vagas",
            ],
            &[
                r"(?i)edital\s+de\s+abertura",
                r"(?i)edital\s+n[º°o]?\.?\s*\d+",
                r"(?i)torna\s+p[úu]blica\s+a\s+abertura",
            ],
            &[r"(?i)retifica[çc][ãa]o", r"(?i)cancelamento"],
            &["edital de abertura", "concurso público", "inscrições"],
            150,
            true,
            2,
        ),
        doc_pattern!(
            DocumentType::EditalRetificacao,
            0.88,
            Priority::Secondary,
            &["retificação", "retifica", "errata", "edital"],
            &[
                r"(?i)edital\s+de\s+retifica[çc][ãa]o",
                r"(?i)errata\s+ao\s+edital",
                r"(?i)retifica[-\s]se\s+o\s+edital",
            ],
            &[],
            &["retificação", "edital"],
            100,
            true,
            2,
        ),
        doc_pattern!(
            DocumentType::Convocacao,
            0.90,
            Priority::Primary,
            &["convocação", "convoca", "convocamos", "comparecer"],
            &[
                r"(?i)\d+[ªa]\s*convoca[çc][ãa]o",
                r"(?i)edital\s+de\s+convoca[çc][ãa]o",
                r"(?i)convocamos\s+os\s+candidatos",
            ],
            &[],
            &["convocação", "comparecer"],
            120,
            true,
            1,
        ),
        doc_pattern!(
            DocumentType::Homologacao,
            0.93,
            Priority::Primary,
            &["homologação", "homologa", "resultado final"],
            &[
                r"(?i)homologa[çc][ãa]o\s+do\s+resultado",
                r"(?i)homologa\s+o\s+resultado\s+final",
                r"(?i)fica\s+homologado",
            ],
            &[r"(?i)resultado\s+parcial", r"(?i)resultado\s+preliminar"],
            &["homologação", "resultado final"],
            100,
            true,
            2,
        ),
        doc_pattern!(
            DocumentType::Prorrogacao,
            0.87,
            Priority::Secondary,
            &["prorrogação", "prorroga", "prazo prorrogado"],
            &[
                r"(?i)prorroga[çc][ãa]o\s+do\s+prazo",
                r"(?i)prorroga\s+o\s+prazo\s+de\s+inscri[çc][õo]es",
                r"(?i)fica\s+prorrogado",
            ],
            &[],
            &["prorrogação", "prazo prorrogado"],
            100,
            true,
            1,
        ),
        doc_pattern!(
            DocumentType::Cancelamento,
            0.91,
            Priority::Primary,
            &["cancelamento", "cancela", "revogação", "anulação"],
            &[
                r"(?i)cancelamento\s+do\s+concurso",
                r"(?i)revoga\s+o\s+edital",
                r"(?i)fica\s+anulado",
            ],
            &[],
            &["cancelamento", "revogação"],
            150,
            true,
            1,
        ),
        doc_pattern!(
            DocumentType::ResultadoParcial,
            0.85,
            Priority::Secondary,
            &["resultado parcial", "resultado preliminar", "classificação parcial"],
            &[r"(?i)resultado\s+(parcial|preliminar)", r"(?i)classifica[çc][ãa]o\s+parcial"],
            &[r"(?i)resultado\s+final", r"(?i)homologa[çc][ãa]o"],
            &["resultado parcial", "classificação parcial"],
            150,
            true,
            1,
        ),
        doc_pattern!(
            DocumentType::Gabarito,
            0.88,
            Priority::Secondary,
            &["gabarito", "gabarito oficial", "gabarito preliminar"],
            &[r"(?i)gabarito\s+(oficial|preliminar)", r"(?i)divulga[çc][ãa]o\s+do\s+gabarito"],
            &[],
            &["gabarito"],
            100,
            true,
            1,
        ),
    ]
});

/// Per-type keyword automaton, built once and reused across every
/// analysis. Indexed in the same order as `DOCUMENT_TYPE_PATTERNS`.
pub static DOCUMENT_TYPE_AUTOMATONS: LazyLock<Vec<AhoCorasick>> = LazyLock::new(|| {
    DOCUMENT_TYPE_PATTERNS
        .iter()
        .map(|p| {
            AhoCorasick::builder()
                .ascii_case_insensitive(true)
                .build(p.keywords)
                .expect("document-type keyword set must build a valid automaton")
        })
        .collect()
});

/// Compiled title-pattern regexes, parallel-indexed to `TITLE_PATTERNS`,
/// so a title check never recompiles on the hot analysis path.
pub static TITLE_REGEXES: LazyLock<Vec<Regex>> =
    LazyLock::new(|| TITLE_PATTERNS.iter().map(|t| Regex::new(t.regex).expect("valid title regex")).collect());

/// Compiled extraction-family regexes, parallel-indexed to
/// `EXTRACTION_FAMILIES`.
pub static EXTRACTION_REGEXES: LazyLock<Vec<Vec<Regex>>> = LazyLock::new(|| {
    EXTRACTION_FAMILIES
        .iter()
        .map(|f| f.regexes.iter().map(|r| Regex::new(r).expect("valid extraction regex")).collect())
        .collect()
});

/// Compiled regex families per document-type pattern, and their
/// exclusion families, parallel-indexed to `DOCUMENT_TYPE_PATTERNS`.
pub static DOCUMENT_TYPE_REGEXES: LazyLock<Vec<Vec<Regex>>> = LazyLock::new(|| {
    DOCUMENT_TYPE_PATTERNS
        .iter()
        .map(|p| p.regexes.iter().map(|r| Regex::new(r).expect("valid regex")).collect())
        .collect()
});

pub static DOCUMENT_TYPE_EXCLUSION_REGEXES: LazyLock<Vec<Vec<Regex>>> = LazyLock::new(|| {
    DOCUMENT_TYPE_PATTERNS
        .iter()
        .map(|p| p.exclusions.iter().map(|r| Regex::new(r).expect("valid regex")).collect())
        .collect()
});

/// Title-line overrides, tested only against the leading 20% of a
/// document.
pub static TITLE_PATTERNS: LazyLock<Vec<TitlePattern>> = LazyLock::new(|| {
    vec![
        TitlePattern {
            tag: DocumentType::Convocacao,
            regex: r"(?im)^\s*\d+[ªa]\s*CONVOCA[ÇC][ÃA]O",
            base_confidence: 0.90,
        },
        TitlePattern {
            tag: DocumentType::EditalAbertura,
            regex: r"(?im)^\s*EDITAL\s+DE\s+ABERTURA",
            base_confidence: 0.88,
        },
        TitlePattern {
            tag: DocumentType::EditalRetificacao,
            regex: r"(?im)^\s*EDITAL\s+DE\s+RETIFICA[ÇC][ÃA]O",
            base_confidence: 0.87,
        },
        TitlePattern {
            tag: DocumentType::Homologacao,
            regex: r"(?im)^\s*HOMOLOGA[ÇC][ÃA]O\s+DO\s+RESULTADO",
            base_confidence: 0.90,
        },
        TitlePattern {
            tag: DocumentType::Prorrogacao,
            regex: r"(?im)^\s*PRORROGA[ÇC][ÃA]O\s+DE\s+PRAZO",
            base_confidence: 0.86,
        },
        TitlePattern {
            tag: DocumentType::Cancelamento,
            regex: r"(?im)^\s*CANCELAMENTO\s+DO\s+CONCURSO",
            base_confidence: 0.89,
        },
        TitlePattern {
            tag: DocumentType::ResultadoParcial,
            regex: r"(?im)^\s*RESULTADO\s+PARCIAL",
            base_confidence: 0.85,
        },
        TitlePattern {
            tag: DocumentType::Gabarito,
            regex: r"(?im)^\s*GABARITO\s+(OFICIAL|PRELIMINAR)",
            base_confidence: 0.88,
        },
    ]
});

/// One extraction family: every regex is tried in declared order, and
/// the first group-1 capture wins.
pub struct ExtractionFamily {
    pub field: &'static str,
    pub regexes: &'static [&'static str],
}

pub static EXTRACTION_FAMILIES: LazyLock<Vec<ExtractionFamily>> = LazyLock::new(|| {
    vec![
        ExtractionFamily {
            field: "edital_number",
            regexes: &[r"(?i)edital\s+n[º°o]?\.?\s*([\d./-]+)", r"(?i)edital\s+(\d+/\d{4})"],
        },
        ExtractionFamily {
            field: "vacancies",
            regexes: &[r"(?i)(\d{1,4})\s+vagas?", r"(?i)total\s+de\s+(\d{1,4})\s+vagas?"],
        },
        ExtractionFamily {
            field: "position",
            regexes: &[r"(?i)cargo\s+de\s+([A-ZÀ-Ú][\wÀ-ÿ\s]+?)(?:[,.;\n]|$)"],
        },
        ExtractionFamily {
            field: "salary",
            regexes: &[r"(?i)remunera[çc][ãa]o\s+de\s+R\$\s*([\d.,]+)", r"(?i)sal[áa]rio\s+de\s+R\$\s*([\d.,]+)"],
        },
        ExtractionFamily {
            field: "registration_start",
            regexes: &[r"(?i)inscri[çc][õo]es.*?de\s+(\d{2}/\d{2}/\d{4})\s+a\s+\d{2}/\d{2}/\d{4}"],
        },
        ExtractionFamily {
            field: "registration_end",
            regexes: &[r"(?i)inscri[çc][õo]es.*?de\s+\d{2}/\d{2}/\d{4}\s+a\s+(\d{2}/\d{2}/\d{4})"],
        },
        ExtractionFamily {
            field: "exam_date",
            regexes: &[r"(?i)prova.*?dia\s+(\d{2}/\d{2}/\d{4})", r"(?i)data\s+da\s+prova:\s*(\d{2}/\d{2}/\d{4})"],
        },
        ExtractionFamily {
            field: "registration_fee",
            regexes: &[r"(?i)taxa\s+de\s+inscri[çc][ãa]o.*?R\$\s*([\d.,]+)"],
        },
        ExtractionFamily {
            field: "organizing_institution",
            regexes: &[r"(?i)organiza(?:do|ção)\s+pel[ao]\s+([A-ZÀ-Ú][\wÀ-ÿ\s.]+?)(?:[,.\n]|$)"],
        },
        ExtractionFamily {
            field: "cities",
            regexes: &[r"(?i)munic[íi]pios?\s+de\s+([A-ZÀ-Ú][\wÀ-ÿ\s,e]+?)(?:\.|\n|$)"],
        },
        ExtractionFamily {
            field: "issuing_agency",
            regexes: &[r"(?i)prefeitura\s+municipal\s+de\s+([A-ZÀ-Ú][\wÀ-ÿ\s]+)"],
        },
    ]
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_document_type_pattern_builds_a_valid_automaton() {
        assert_eq!(DOCUMENT_TYPE_AUTOMATONS.len(), DOCUMENT_TYPE_PATTERNS.len());
    }

    #[test]
    fn every_regex_family_compiles() {
        assert_eq!(DOCUMENT_TYPE_REGEXES.len(), DOCUMENT_TYPE_PATTERNS.len());
        for family in DOCUMENT_TYPE_REGEXES.iter() {
            assert!(!family.is_empty() || family.is_empty());
        }
    }

    #[test]
    fn title_pattern_matches_convocacao_header() {
        let p = TITLE_PATTERNS.iter().find(|p| p.tag == DocumentType::Convocacao).unwrap();
        let re = Regex::new(p.regex).unwrap();
        assert!(re.is_match("17ª CONVOCAÇÃO\n\nO Prefeito..."));
    }

    #[test]
    fn extraction_family_covers_every_concurso_data_field() {
        let fields: Vec<&str> = EXTRACTION_FAMILIES.iter().map(|f| f.field).collect();
        for expected in [
            "edital_number",
            "vacancies",
            "position",
            "salary",
            "registration_start",
            "registration_end",
            "exam_date",
            "registration_fee",
            "organizing_institution",
            "cities",
            "issuing_agency",
        ] {
            assert!(fields.contains(&expected), "missing extraction family: {expected}");
        }
    }
}
