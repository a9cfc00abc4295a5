use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use super::text::{clean_markup, normalize_whitespace};
use super::{
    AdmissionInfo, AdmissionRequirement, CostInfo, CurriculumInfo, Description, Direction,
    Discipline, FaqEntry, ProgramRecord, Quotas, StudyInfo,
};

static NEXT_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script[^>]*id="__NEXT_DATA__"[^>]*>(.*?)</script>"#).unwrap()
});

/// Pull the embedded `__NEXT_DATA__` JSON out of a rendered page, if any.
pub fn find_payload(html: &str) -> Option<String> {
    NEXT_DATA_RE
        .captures(html)
        .map(|caps| caps[1].trim().to_string())
}

// ── Raw payload shape (camelCase, as shipped for client-side rendering) ──

#[derive(Deserialize)]
struct NextData {
    props: Props,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Props {
    page_props: PageProps,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageProps {
    api_program: ApiProgram,
}

#[derive(Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ApiProgram {
    title: String,
    lead: String,
    about: String,
    career: String,
    partners: Vec<PartnerItem>,
    faq: Vec<FaqItem>,
    admission_ways: Vec<WayItem>,
    directions: Vec<DirectionItem>,
    education_cost: Option<CostItem>,
    study: Option<StudyItem>,
    academic_plan: String,
    social: serde_json::Value,
    achievements: serde_json::Value,
}

/// Partners appear either as bare names or as objects with a title.
#[derive(Deserialize)]
#[serde(untagged)]
enum PartnerItem {
    Name(String),
    Object {
        #[serde(default)]
        title: String,
        #[serde(default)]
        image: String,
    },
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct FaqItem {
    question: String,
    answer: String,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct WayItem {
    title: String,
    description: String,
    link: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DirectionItem {
    code: String,
    title: String,
    quotas: Option<QuotaItem>,
    disciplines: Vec<DisciplineItem>,
}

#[derive(Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct QuotaItem {
    budget: Option<u32>,
    contract: Option<u32>,
    target_reception: Option<u32>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct DisciplineItem {
    title: String,
    description: String,
    link: String,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct CostItem {
    russian: u64,
    foreigner: u64,
    year: u32,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct StudyItem {
    period: String,
    label: String,
    mode: String,
    language: String,
    military: bool,
}

/// Deserialize the payload and normalize it into a ProgramRecord. Every
/// textual field goes through the markup cleaner on the way out.
pub fn parse(key: &str, url: &str, raw: &str) -> Result<ProgramRecord> {
    let data: NextData =
        serde_json::from_str(raw).context("payload is not the expected structure")?;
    let program = data.props.page_props.api_program;

    let directions = program
        .directions
        .into_iter()
        .map(|d| Direction {
            code: normalize_whitespace(&d.code),
            title: clean_markup(&d.title),
            quotas: d
                .quotas
                .map(|q| Quotas {
                    budget: q.budget,
                    contract: q.contract,
                    target_reception: q.target_reception,
                })
                .unwrap_or_default(),
            disciplines: d
                .disciplines
                .into_iter()
                .map(|s| Discipline {
                    title: clean_markup(&s.title),
                    description: clean_markup(&s.description),
                    link: s.link,
                })
                .collect(),
        })
        .collect();

    let faq = program
        .faq
        .into_iter()
        .map(|f| FaqEntry {
            question: clean_markup(&f.question),
            answer: clean_markup(&f.answer),
        })
        .filter(|f| !f.question.is_empty() && !f.answer.is_empty())
        .collect();

    let admission_requirements = program
        .admission_ways
        .into_iter()
        .map(|w| AdmissionRequirement {
            method: clean_markup(&w.title),
            description: clean_markup(&w.description),
            link: w.link,
        })
        .filter(|w| !w.method.is_empty())
        .collect();

    let partners = program
        .partners
        .into_iter()
        .filter_map(|p| {
            let name = match p {
                PartnerItem::Name(name) => name,
                PartnerItem::Object { title, image } => {
                    if title.is_empty() {
                        // image-only entries: keep the filename stem
                        image.rsplit('/').next().unwrap_or("").split('.').next().unwrap_or("").to_string()
                    } else {
                        title
                    }
                }
            };
            let name = normalize_whitespace(&name);
            (!name.is_empty()).then_some(name)
        })
        .collect();

    let curriculum_info = if program.academic_plan.trim().is_empty() {
        None
    } else {
        Some(CurriculumInfo {
            link: program.academic_plan.trim().to_string(),
            text: "Учебный план".to_string(),
        })
    };

    Ok(ProgramRecord {
        key: key.to_string(),
        url: url.to_string(),
        title: clean_markup(&program.title),
        description: Description {
            lead: clean_markup(&program.lead),
            full_description: clean_markup(&program.about),
        },
        admission_info: AdmissionInfo {
            directions,
            cost: None,
        },
        career_prospects: clean_markup(&program.career),
        partners,
        faq,
        admission_requirements,
        curriculum_info,
        study_info: program.study.map(|s| StudyInfo {
            period: normalize_whitespace(&s.period),
            label: normalize_whitespace(&s.label),
            mode: normalize_whitespace(&s.mode),
            language: normalize_whitespace(&s.language),
            military: s.military,
        }),
        cost_info: program.education_cost.map(|c| CostInfo {
            russian: c.russian,
            foreigner: c.foreigner,
            year: c.year,
        }),
        social_links: program.social,
        achievements: program.achievements,
    })
}
