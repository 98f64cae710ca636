//! Inspection Common Library
//!
//! 同期コアと各アダプタで共有される型・マージ規則・AIレスポンス解析

pub mod types;
pub mod error;
pub mod merge;
pub mod parser;
pub mod prompts;

pub use types::{
    AnalysisResult, ComponentRecord, Condition, ConditionAssessment, ImageRef,
    InspectionDocument, RoomBlock,
};
pub use error::{Error, Result};
pub use merge::{
    apply_component_patch, apply_report_patch, merge_component, new_component,
    resolve_room_mut, ComponentPatch, ComponentUpsert, PatchSummary, ReportPatch,
};
pub use parser::{extract_json, parse_analysis_response};
pub use prompts::build_analysis_prompt;
