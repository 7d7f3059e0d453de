// =============================================================================
// analyzer/extraction.rs — STRUCTURED-DATA EXTRACTION
// =============================================================================
//
// Runs the extraction-pattern catalog over a gazette's text to populate
// `ConcursoData`: first group-1 capture wins per family,
// numbers parsed in Brazilian locale, dates in `DD/MM/YYYY`, city lists
// split on commas and "e"/"and".
// =============================================================================

use chrono::NaiveDate;

use crate::analyzer::patterns::{EXTRACTION_FAMILIES, EXTRACTION_REGEXES};
use crate::models::ConcursoData;

/// Parse a Brazilian-locale number: `.` as thousands separator, `,` as
/// the decimal point. `"1.234,56"` -> `1234.56`. A string with no comma
/// is treated as a plain integer with `.` thousands separators removed.
fn parse_brl_number(raw: &str) -> Option<f64> {
    let cleaned = raw.trim();
    if let Some((int_part, frac_part)) = cleaned.rsplit_once(',') {
        let int_part = int_part.replace('.', "");
        format!("{int_part}.{frac_part}").parse().ok()
    } else {
        cleaned.replace('.', "").parse().ok()
    }
}

fn parse_brl_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y").ok()
}

/// Split a free-text city list on commas and the "e"/"and" conjunction,
/// trimming whitespace and dropping empties.
fn split_city_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',')
        .flat_map(|chunk| {
            let trimmed = chunk.trim();
            // Split a trailing " e " or " and " conjunction off the last item.
            if let Some(idx) = trimmed.rfind(" e ") {
                vec![&trimmed[..idx], &trimmed[idx + 3..]]
            } else if let Some(idx) = trimmed.rfind(" and ") {
                vec![&trimmed[..idx], &trimmed[idx + 5..]]
            } else {
                vec![trimmed]
            }
        })
        .map(|s| s.trim().trim_end_matches('.').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Run every extraction family's regexes in declared order against
/// `text` and take the first group-1 capture for each field.
fn first_capture(text: &str, field: &str) -> Option<String> {
    let idx = EXTRACTION_FAMILIES.iter().position(|f| f.field == field)?;
    for re in &EXTRACTION_REGEXES[idx] {
        if let Some(caps) = re.captures(text) {
            if let Some(m) = caps.get(1) {
                return Some(m.as_str().to_string());
            }
        }
    }
    None
}

/// Build a `ConcursoData` by running every extraction family against
/// `text`. Fields with no match stay `None`/empty.
pub fn extract_concurso_data(text: &str) -> ConcursoData {
    ConcursoData {
        edital_number: first_capture(text, "edital_number"),
        vacancies: first_capture(text, "vacancies").and_then(|s| s.parse().ok()),
        position: first_capture(text, "position").map(|s| s.trim().to_string()),
        salary: first_capture(text, "salary").and_then(|s| parse_brl_number(&s)),
        registration_start: first_capture(text, "registration_start").and_then(|s| parse_brl_date(&s)),
        registration_end: first_capture(text, "registration_end").and_then(|s| parse_brl_date(&s)),
        exam_date: first_capture(text, "exam_date").and_then(|s| parse_brl_date(&s)),
        registration_fee: first_capture(text, "registration_fee").and_then(|s| parse_brl_number(&s)),
        organizing_institution: first_capture(text, "organizing_institution").map(|s| s.trim().to_string()),
        cities: first_capture(text, "cities").map(|s| split_city_list(&s)).unwrap_or_default(),
        issuing_agency: first_capture(text, "issuing_agency").map(|s| s.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_brl_number_handles_thousands_and_decimal() {
        assert_eq!(parse_brl_number("1.234,56"), Some(1234.56));
        assert_eq!(parse_brl_number("50"), Some(50.0));
    }

    #[test]
    fn parse_brl_date_reads_ddmmyyyy() {
        assert_eq!(parse_brl_date("05/03/2026"), NaiveDate::from_ymd_opt(2026, 3, 5));
    }

    #[test]
    fn split_city_list_handles_commas_and_conjunction() {
        let cities = split_city_list("Salvador, Feira de Santana e Lauro de Freitas");
        assert_eq!(cities, vec!["Salvador", "Feira de Santana", "Lauro de Freitas"]);
    }

    #[test]
    fn extract_concurso_data_pulls_edital_number_and_vacancies() {
        let text = "EDITAL Nº 001/2026 torna pública a abertura de 42 vagas para o cargo de Analista, \
                     com remuneração de R$ 3.500,00. As inscrições serão de 01/02/2026 a 28/02/2026.";
        let data = extract_concurso_data(text);
        assert_eq!(data.edital_number.as_deref(), Some("001/2026"));
        assert_eq!(data.vacancies, Some(42));
        assert_eq!(data.salary, Some(3500.0));
        assert_eq!(data.registration_start, NaiveDate::from_ymd_opt(2026, 2, 1));
        assert_eq!(data.registration_end, NaiveDate::from_ymd_opt(2026, 2, 28));
    }

    #[test]
    fn extract_concurso_data_leaves_unmatched_fields_empty() {
        let data = extract_concurso_data("texto sem nenhum dado estruturado");
        assert!(data.edital_number.is_none());
        assert!(data.vacancies.is_none());
        assert!(data.cities.is_empty());
    }
}
