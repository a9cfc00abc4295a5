pub mod curriculum;
pub mod markup;
pub mod payload;
pub mod text;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Normalized admissions program: everything the corpus builder consumes.
/// All textual fields are plain text by the time a record leaves this module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramRecord {
    pub key: String,
    pub url: String,
    pub title: String,
    pub description: Description,
    pub admission_info: AdmissionInfo,
    pub career_prospects: String,
    pub partners: Vec<String>,
    pub faq: Vec<FaqEntry>,
    pub admission_requirements: Vec<AdmissionRequirement>,
    pub curriculum_info: Option<CurriculumInfo>,
    pub study_info: Option<StudyInfo>,
    pub cost_info: Option<CostInfo>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub social_links: serde_json::Value,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub achievements: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Description {
    pub lead: String,
    pub full_description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmissionInfo {
    pub directions: Vec<Direction>,
    pub cost: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Direction {
    pub code: String,
    pub title: String,
    pub quotas: Quotas,
    pub disciplines: Vec<Discipline>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Quotas {
    pub budget: Option<u32>,
    pub contract: Option<u32>,
    pub target_reception: Option<u32>,
}

/// Entrance examination subject attached to a direction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Discipline {
    pub title: String,
    pub description: String,
    pub link: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmissionRequirement {
    pub method: String,
    pub description: String,
    pub link: Option<String>,
}

/// Pointer at the curriculum PDF; its text is fetched and cached separately.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurriculumInfo {
    pub link: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudyInfo {
    pub period: String,
    pub label: String,
    pub mode: String,
    pub language: String,
    pub military: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostInfo {
    pub russian: u64,
    pub foreigner: u64,
    pub year: u32,
}

/// Payload-first extraction: pages ship a `__NEXT_DATA__` JSON blob for their
/// own client-side rendering; only pages without it fall back to markup
/// heuristics. A present-but-malformed payload skips the program (logged) so
/// the rest of the ingestion run continues.
pub fn parse_program(key: &str, url: &str, html: &str) -> Option<ProgramRecord> {
    match payload::find_payload(html) {
        Some(raw) => match payload::parse(key, url, &raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Malformed page payload for {}: {}", key, e);
                None
            }
        },
        None => Some(markup::extract(key, url, html)),
    }
}
