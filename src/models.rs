// =============================================================================
// models.rs — THE SHARED DATA STRUCTURES OF THE CRAWL PIPELINE
// =============================================================================
//
// Everything that crosses a queue boundary or survives a single crawl
// invocation lives here. Gazette records and findings are immutable once
// produced; nothing in this module holds shared mutable state.
// =============================================================================

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::SpiderError;

/// Which branch of government published a gazette.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Power {
    Executive,
    Legislative,
    ExecutiveLegislative,
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Power::Executive => write!(f, "executive"),
            Power::Legislative => write!(f, "legislative"),
            Power::ExecutiveLegislative => write!(f, "executive_legislative"),
        }
    }
}

/// The ~20 publishing-platform tags a spider configuration can select.
/// Each maps onto exactly one of the adapter "shapes" in `crate::spiders`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SpiderType {
    Doem,
    Dosp,
    Instar,
    Diof,
    AdiariosV1,
    AdiariosV2,
    Sigpub,
    DomSc,
    #[serde(rename = "amm-mt")]
    AmmMt,
    #[serde(rename = "diario-ba")]
    DiarioBa,
    BarcoDigital,
    Siganet,
    DiarioOficialBr,
    Modernizacao,
    Aplus,
    Dioenet,
    AdministracaoPublica,
    Ptio,
    #[serde(rename = "atende-v2")]
    AtendeV2,
    #[serde(rename = "municipio-online")]
    MunicipioOnline,
}

/// The discovery/algorithm shape shared by a family of platform adapters.
/// See `crate::spiders` for the implementations; this is purely a
/// classification used by the registry factory to pick one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiderShape {
    MonthWalkJson,
    FormPostListing,
    PaginatedHtml,
    TenantSlug,
    DetailFollow,
    BrowserRendered,
}

impl SpiderType {
    /// Which adapter shape implements this platform.
    pub fn shape(&self) -> SpiderShape {
        use SpiderShape::*;
        use SpiderType::*;
        match self {
            BarcoDigital | Sigpub | DiarioOficialBr | Dioenet | DomSc => MonthWalkJson,
            Aplus | DiarioBa | AdministracaoPublica | Ptio => FormPostListing,
            Doem | Diof | Instar | AmmMt | Siganet | Modernizacao | MunicipioOnline => {
                PaginatedHtml
            }
            Dosp | AtendeV2 => TenantSlug,
            AdiariosV1 => DetailFollow,
            AdiariosV2 => BrowserRendered,
        }
    }

    /// Per-host rate limit override, in requests/second. Unlisted
    /// platforms get the generic default of 5.
    pub fn rate_limit_rps(&self) -> u32 {
        match self {
            SpiderType::Doem => 3,
            SpiderType::AdiariosV1 | SpiderType::AdiariosV2 => 3,
            _ => 5,
        }
    }

    /// Per-message deadline: the browser-rendered shape gets a longer
    /// budget than everything else.
    pub fn deadline_secs(&self) -> u64 {
        match self.shape() {
            SpiderShape::BrowserRendered => 120,
            _ => 60,
        }
    }
}

/// Inclusive-inclusive date window. `start <= end` is enforced at
/// construction; there is no way to build an invalid one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if start > end {
            return Err(format!("date range start {start} is after end {end}"));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Default span when no explicit range is given: 30 days ending
    /// today.
    pub fn last_30_days(today: NaiveDate) -> Self {
        Self {
            start: today - chrono::Duration::days(30),
            end: today,
        }
    }

    /// The 2-day span the today/yesterday shortcut forces.
    pub fn today_yesterday(today: NaiveDate) -> Self {
        Self {
            start: today - chrono::Duration::days(1),
            end: today,
        }
    }

    /// Every `(year, month)` touched by this range, for month-walk
    /// enumeration, clamped so the walk never starts earlier than
    /// `floor` (the platform's configured `startDate`).
    pub fn months_from(&self, floor: NaiveDate) -> Vec<(i32, u32)> {
        let effective_start = self.start.max(floor);
        if effective_start > self.end {
            return Vec::new();
        }
        let mut months = Vec::new();
        let (mut y, mut m) = (effective_start.year(), effective_start.month());
        let (end_y, end_m) = (self.end.year(), self.end.month());
        loop {
            months.push((y, m));
            if y == end_y && m == end_m {
                break;
            }
            if m == 12 {
                y += 1;
                m = 1;
            } else {
                m += 1;
            }
        }
        months
    }
}

/// Platform-specific fields for the Calendar/JSON ("month-walk") family:
/// `barco_digital`, `sigpub`, `diario_oficial_br`, `dioenet`, `dom_sc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthWalkJsonConfig {
    pub base_url: String,
    /// e.g. `"{base}/api/diarios/{year}/{month}"`
    pub calendar_path_template: String,
    /// JSON field holding the ISO date of each entry.
    pub date_field: String,
    /// JSON field holding the file URL of each entry.
    pub file_url_field: String,
    /// JSON field used to detect extras: non-1 means extra.
    #[serde(default = "default_extra_edition_field")]
    pub extra_edition_field: String,
    pub tenant_id: Option<String>,
}

fn default_extra_edition_field() -> String {
    "tipo_edicao_id".to_string()
}

/// Platform-specific fields for the form-post listing family: `aplus`,
/// `diario-ba`, `administracao_publica`, `ptio`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormPostListingConfig {
    pub base_url: String,
    pub listing_path: String,
    pub city_slug: String,
    /// CSS selector for the listing's row elements.
    pub row_selector: String,
}

/// Platform-specific fields for the paginated-HTML family: `doem`,
/// `diof`, `instar`, `amm-mt`, `siganet`, `modernizacao`,
/// `municipio-online`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedHtmlConfig {
    pub base_url: String,
    pub index_path: String,
    pub entry_selector: String,
    pub next_page_selector: Option<String>,
    pub max_pages: Option<u32>,
}

/// Platform-specific fields for the API-by-tenant family: `dosp`,
/// `atende-v2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSlugConfig {
    pub base_url: String,
    pub journal: String,
    pub section: String,
    pub tenant_id: String,
}

/// Platform-specific fields for the detail-follow family: `adiarios_v1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailFollowConfig {
    pub base_url: String,
    pub index_path: String,
    pub entry_selector: String,
    pub detail_link_attr: String,
}

/// Platform-specific fields for the browser-rendered family:
/// `adiarios_v2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserRenderedConfig {
    pub base_url: String,
    /// URL of the out-of-process rendering service. `None` means the
    /// adapter must return `SpiderError::Unavailable`.
    pub render_service_url: Option<String>,
}

/// The `config` field of a spider configuration: a tagged union
/// discriminated by `type`. Deserialization rejects unknown variants —
/// there is no catch-all arm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpiderConfigVariant {
    MonthWalkJson(MonthWalkJsonConfig),
    FormPostListing(FormPostListingConfig),
    PaginatedHtml(PaginatedHtmlConfig),
    TenantSlug(TenantSlugConfig),
    DetailFollow(DetailFollowConfig),
    BrowserRendered(BrowserRenderedConfig),
}

impl SpiderConfigVariant {
    pub fn base_url(&self) -> &str {
        match self {
            SpiderConfigVariant::MonthWalkJson(c) => &c.base_url,
            SpiderConfigVariant::FormPostListing(c) => &c.base_url,
            SpiderConfigVariant::PaginatedHtml(c) => &c.base_url,
            SpiderConfigVariant::TenantSlug(c) => &c.base_url,
            SpiderConfigVariant::DetailFollow(c) => &c.base_url,
            SpiderConfigVariant::BrowserRendered(c) => &c.base_url,
        }
    }
}

/// A registry entry: everything needed to instantiate one spider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiderConfig {
    pub id: String,
    pub name: String,
    pub territory_id: String,
    pub spider_type: SpiderType,
    pub start_date: NaiveDate,
    pub config: SpiderConfigVariant,
}

/// `territoryId` must be exactly 7 ASCII digits (an IBGE municipality code).
pub fn is_valid_territory_id(id: &str) -> bool {
    id.len() == 7 && id.bytes().all(|b| b.is_ascii_digit())
}

/// The canonical unit produced by any adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gazette {
    pub territory_id: String,
    pub date: NaiveDate,
    pub file_url: Url,
    pub edition_number: Option<String>,
    pub is_extra_edition: bool,
    pub power: Power,
    pub scraped_at: DateTime<Utc>,
}

impl Gazette {
    /// Deduplication key downstream consumers key on: `(territoryId,
    /// date, fileUrl)`.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}:{}", self.territory_id, self.date, self.file_url)
    }

    /// Check every record invariant against the adapter's own configured
    /// territory, the requested range, and the time the crawl began.
    /// Returns the offending reason on failure so callers can log and
    /// count it without halting the rest of the crawl.
    pub fn validate(
        &self,
        territory_id: &str,
        range: &DateRange,
        execution_start: DateTime<Utc>,
    ) -> Result<(), SpiderError> {
        if self.territory_id != territory_id {
            return Err(SpiderError::ValidationFailure(format!(
                "territoryId {} does not match configured {}",
                self.territory_id, territory_id
            )));
        }
        if !is_valid_territory_id(&self.territory_id) {
            return Err(SpiderError::ValidationFailure(format!(
                "territoryId {} is not exactly 7 digits",
                self.territory_id
            )));
        }
        if !range.contains(self.date) {
            return Err(SpiderError::ValidationFailure(format!(
                "date {} outside requested range {}..={}",
                self.date, range.start, range.end
            )));
        }
        if self.scraped_at <= execution_start {
            return Err(SpiderError::ValidationFailure(
                "scrapedAt does not post-date execution start".to_string(),
            ));
        }
        if self.file_url.scheme() != "http" && self.file_url.scheme() != "https" {
            return Err(SpiderError::ValidationFailure(format!(
                "fileUrl scheme '{}' is not http/https",
                self.file_url.scheme()
            )));
        }
        Ok(())
    }
}

/// Aggregate stats for one crawl invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlStats {
    pub total_found: usize,
    pub date_range: DateRange,
    pub request_count: usize,
    pub execution_time_ms: u64,
}

/// What a crawl executor reports after running one spider to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    pub spider_id: String,
    pub territory_id: String,
    pub gazettes: Vec<Gazette>,
    pub stats: CrawlStats,
    pub error: Option<String>,
}

/// Crawl-queue payload: self-describing, no out-of-band state required.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlQueueMessage {
    pub spider_id: String,
    pub territory_id: String,
    pub spider_type: SpiderType,
    pub config: SpiderConfigVariant,
    pub date_range: DateRange,
}

/// OCR-queue payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrQueueMessage {
    pub gazette: Gazette,
    pub spider_id: String,
}

/// Webhook-queue payload, consumed by the external webhook worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookQueueMessage {
    pub message_id: String,
    pub subscription_id: String,
    pub notification: serde_json::Value,
    pub attempts: Option<u32>,
}

/// OCR result handed to the analyzer: the extracted text plus the
/// metadata needed to attribute findings back to a gazette.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    pub job_id: String,
    pub territory_id: String,
    pub date: NaiveDate,
    pub spider_id: String,
    pub edition_number: Option<String>,
    pub is_extra_edition: Option<bool>,
    pub text: String,
}

/// The nine concurso document-type tags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    EditalAbertura,
    EditalRetificacao,
    Convocacao,
    Homologacao,
    Prorrogacao,
    Cancelamento,
    ResultadoParcial,
    Gabarito,
    NaoClassificado,
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentType::EditalAbertura => "edital_abertura",
            DocumentType::EditalRetificacao => "edital_retificacao",
            DocumentType::Convocacao => "convocacao",
            DocumentType::Homologacao => "homologacao",
            DocumentType::Prorrogacao => "prorrogacao",
            DocumentType::Cancelamento => "cancelamento",
            DocumentType::ResultadoParcial => "resultado_parcial",
            DocumentType::Gabarito => "gabarito",
            DocumentType::NaoClassificado => "nao_classificado",
        };
        write!(f, "{s}")
    }
}

/// A document-type's priority tier, used to break ties when more than
/// one type matches the same passage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Supporting,
    Secondary,
    Primary,
}

/// Where in the document a finding was located.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub page: Option<u32>,
    pub line: Option<u32>,
    pub offset: usize,
}

/// A single classified observation about a passage of text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    #[serde(rename = "type")]
    pub finding_type: String,
    pub confidence: f64,
    pub data: serde_json::Value,
    pub location: Option<Location>,
    pub context: Option<String>,
}

/// Structured data pulled out of a concurso notice by the extraction
/// pattern catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConcursoData {
    pub edital_number: Option<String>,
    pub vacancies: Option<u64>,
    pub position: Option<String>,
    pub salary: Option<f64>,
    pub registration_start: Option<NaiveDate>,
    pub registration_end: Option<NaiveDate>,
    pub exam_date: Option<NaiveDate>,
    pub registration_fee: Option<f64>,
    pub organizing_institution: Option<String>,
    #[serde(default)]
    pub cities: Vec<String>,
    pub issuing_agency: Option<String>,
}

/// A finding specialized for the concurso domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcursoFinding {
    pub document_type: DocumentType,
    pub confidence: f64,
    pub data: Option<ConcursoData>,
    pub location: Option<Location>,
    pub context: Option<String>,
}

/// Aggregated view over a document's findings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub total_findings: usize,
    pub findings_by_type: HashMap<String, usize>,
    pub high_confidence_findings: usize,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
}

/// The analyzer's full output for one OCR'd gazette.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GazetteAnalysis {
    pub ocr_job_id: String,
    pub territory_id: String,
    pub text: String,
    pub findings: Vec<ConcursoFinding>,
    /// The document type selected for the gazette as a whole: highest
    /// priority tier, then highest confidence, then lexicographic tag.
    /// `nao_classificado` when nothing clears the classification threshold.
    pub primary_type: DocumentType,
    pub primary_confidence: f64,
    pub summary: AnalysisSummary,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_range_rejects_inverted_bounds() {
        let start = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(DateRange::new(start, end).is_err());
    }

    #[test]
    fn months_from_walks_inclusive_month_span() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
        )
        .unwrap();
        let months = range.months_from(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(months, vec![(2026, 1), (2026, 2), (2026, 3)]);
    }

    #[test]
    fn months_from_clamps_to_platform_floor() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2020, 2, 28).unwrap(),
        )
        .unwrap();
        let months = range.months_from(NaiveDate::from_ymd_opt(2020, 2, 1).unwrap());
        assert_eq!(months, vec![(2020, 2)]);
    }

    #[test]
    fn gazette_dedup_key_combines_territory_date_url() {
        let g = Gazette {
            territory_id: "2927408".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            file_url: Url::parse("https://example.org/a.pdf").unwrap(),
            edition_number: None,
            is_extra_edition: false,
            power: Power::Executive,
            scraped_at: Utc::now(),
        };
        assert_eq!(
            g.dedup_key(),
            "2927408:2026-01-01:https://example.org/a.pdf"
        );
    }

    #[test]
    fn gazette_validate_rejects_mismatched_territory() {
        let g = Gazette {
            territory_id: "2927408".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            file_url: Url::parse("https://example.org/a.pdf").unwrap(),
            edition_number: None,
            is_extra_edition: false,
            power: Power::Executive,
            scraped_at: Utc::now(),
        };
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        )
        .unwrap();
        let past = Utc::now() - chrono::Duration::hours(1);
        assert!(g.validate("9999999", &range, past).is_err());
        assert!(g.validate("2927408", &range, past).is_ok());
    }

    #[test]
    fn gazette_validate_rejects_territory_id_that_is_not_seven_digits() {
        let g = Gazette {
            territory_id: "29274".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            file_url: Url::parse("https://example.org/a.pdf").unwrap(),
            edition_number: None,
            is_extra_edition: false,
            power: Power::Executive,
            scraped_at: Utc::now(),
        };
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        )
        .unwrap();
        let past = Utc::now() - chrono::Duration::hours(1);
        assert!(g.validate("29274", &range, past).is_err());
    }

    #[test]
    fn is_valid_territory_id_requires_exactly_seven_digits() {
        assert!(is_valid_territory_id("2927408"));
        assert!(!is_valid_territory_id("292740"));
        assert!(!is_valid_territory_id("29274080"));
        assert!(!is_valid_territory_id("292740a"));
    }

    #[test]
    fn spider_type_shape_mapping_is_total() {
        use SpiderType::*;
        let all = [
            Doem,
            Dosp,
            Instar,
            Diof,
            AdiariosV1,
            AdiariosV2,
            Sigpub,
            DomSc,
            AmmMt,
            DiarioBa,
            BarcoDigital,
            Siganet,
            DiarioOficialBr,
            Modernizacao,
            Aplus,
            Dioenet,
            AdministracaoPublica,
            Ptio,
            AtendeV2,
            MunicipioOnline,
        ];
        for t in all {
            let _ = t.shape();
        }
    }

    #[test]
    fn config_variant_rejects_unknown_type_tag() {
        let raw = serde_json::json!({"type": "not_a_real_platform"});
        let result: Result<SpiderConfigVariant, _> = serde_json::from_value(raw);
        assert!(result.is_err());
    }
}
