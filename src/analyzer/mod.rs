// =============================================================================
// analyzer — DOCUMENT TYPE CLASSIFICATION AND DATA EXTRACTION
// =============================================================================
//
// Turns one OCR result into a `GazetteAnalysis`: a proximity-weighted
// classification of which concurso lifecycle document(s) the text
// represents, plus whatever structured data (vacancies, salary, edital
// number, dates, cities) could be pulled out of it.
// =============================================================================

pub mod classify;
pub mod extraction;
pub mod orchestrator;
pub mod patterns;
pub mod plugins;
pub mod proximity;

pub use orchestrator::{analyze, default_pipeline, AnalyzerOptions, AnalyzerPlugin, PluginOutput};
