// =============================================================================
// analyzer/plugins/mod.rs — THE CONFIGURABLE ANALYZER SET
// =============================================================================
//
// Five analyzer kinds run in priority order: keyword, entity, concurso,
// AI, category. `concurso` is the dense one (the full proximity+regex+
// extraction pipeline in the sibling modules); the rest are real but
// intentionally lighter-weight plug points.
// =============================================================================

pub mod ai;
pub mod category;
pub mod concurso;
pub mod entity;
pub mod keyword;
