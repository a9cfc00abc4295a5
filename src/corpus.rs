use serde::{Deserialize, Serialize};

use crate::parser::curriculum::CurriculumTable;
use crate::parser::ProgramRecord;

/// Metadata record carried alongside every corpus document. The `type` tag
/// tells the downstream generator how the document was phrased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMeta {
    pub program: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl DocMeta {
    fn new(record: &ProgramRecord, doc_type: &str) -> Self {
        Self {
            program: record.key.clone(),
            doc_type: doc_type.to_string(),
            title: record.title.clone(),
            code: None,
            method: None,
            category: None,
        }
    }
}

/// Flatten one program into `(document text, metadata)` pairs.
///
/// Deterministic and side-effect-free. Absent or empty fields produce no
/// documents; multi-valued fields (directions, FAQ, admission methods,
/// achievements) produce one document per element.
pub fn build_documents(
    record: &ProgramRecord,
    curriculum: Option<&CurriculumTable>,
) -> Vec<(String, DocMeta)> {
    let mut out = Vec::new();
    let title = &record.title;

    if !record.description.lead.is_empty() {
        out.push((
            format!("Программа {}: {}", title, record.description.lead),
            DocMeta::new(record, "description_lead"),
        ));
    }
    if !record.description.full_description.is_empty() {
        out.push((
            format!("О программе {}: {}", title, record.description.full_description),
            DocMeta::new(record, "description_full"),
        ));
    }
    if !record.career_prospects.is_empty() {
        out.push((
            format!("Карьерные перспективы программы {}: {}", title, record.career_prospects),
            DocMeta::new(record, "career"),
        ));
    }

    if let Some(study) = &record.study_info {
        let mut parts = Vec::new();
        if !study.label.is_empty() {
            parts.push(study.label.clone());
        }
        if !study.period.is_empty() {
            parts.push(format!("срок обучения {}", study.period));
        }
        if !study.mode.is_empty() {
            parts.push(format!("форма обучения {}", study.mode));
        }
        if !study.language.is_empty() {
            parts.push(format!("язык обучения {}", study.language));
        }
        if !parts.is_empty() {
            let military = if study.military {
                "Военный учебный центр есть."
            } else {
                "Военного учебного центра нет."
            };
            out.push((
                format!("Обучение на программе {}: {}. {}", title, parts.join(", "), military),
                DocMeta::new(record, "study_info"),
            ));
        }
    }

    if let Some(cost) = &record.cost_info {
        out.push((
            format!(
                "Стоимость обучения на программе {} в {} году: {} рублей в год для граждан РФ, {} рублей для иностранных граждан.",
                title, cost.year, cost.russian, cost.foreigner
            ),
            DocMeta::new(record, "cost"),
        ));
    } else if let Some(cost_text) = &record.admission_info.cost {
        out.push((
            format!("Стоимость обучения на программе {}: {}", title, cost_text),
            DocMeta::new(record, "cost"),
        ));
    }

    for direction in &record.admission_info.directions {
        let mut text = format!(
            "Направление подготовки {} {} на программе {}.",
            direction.code, direction.title, title
        );
        let mut quota_parts = Vec::new();
        if let Some(budget) = direction.quotas.budget {
            quota_parts.push(format!("бюджетных мест {budget}"));
        }
        if let Some(contract) = direction.quotas.contract {
            quota_parts.push(format!("контрактных мест {contract}"));
        }
        if let Some(target) = direction.quotas.target_reception {
            quota_parts.push(format!("целевая квота {target}"));
        }
        if !quota_parts.is_empty() {
            text.push_str(&format!(" Количество мест: {}.", quota_parts.join(", ")));
        }
        if !direction.disciplines.is_empty() {
            let subjects: Vec<&str> =
                direction.disciplines.iter().map(|d| d.title.as_str()).collect();
            text.push_str(&format!(" Вступительные испытания: {}.", subjects.join(", ")));
        }
        let mut meta = DocMeta::new(record, "direction");
        meta.code = Some(direction.code.clone());
        out.push((text, meta));
    }

    for requirement in &record.admission_requirements {
        if requirement.description.is_empty() {
            continue;
        }
        let mut meta = DocMeta::new(record, "admission_method");
        meta.method = Some(requirement.method.clone());
        out.push((
            format!("Поступление через {}: {}", requirement.method, requirement.description),
            meta,
        ));
    }

    for entry in &record.faq {
        if entry.question.is_empty() || entry.answer.is_empty() {
            continue;
        }
        out.push((
            format!("Вопрос: {} Ответ: {}", entry.question, entry.answer),
            DocMeta::new(record, "faq"),
        ));
    }

    if !record.partners.is_empty() {
        out.push((
            format!("Партнеры программы {}: {}", title, record.partners.join(", ")),
            DocMeta::new(record, "partners"),
        ));
    }

    for achievement in achievement_texts(&record.achievements) {
        out.push((
            format!("Достижение программы {}: {}", title, achievement),
            DocMeta::new(record, "achievements"),
        ));
    }

    let contacts = contact_pairs(&record.social_links);
    if !contacts.is_empty() {
        out.push((
            format!("Контакты программы {}: {}", title, contacts.join(", ")),
            DocMeta::new(record, "contacts"),
        ));
    }

    if let Some(table) = curriculum {
        for (category, courses) in table {
            if courses.is_empty() {
                continue;
            }
            let listing: Vec<String> = courses
                .iter()
                .map(|c| format!("{} ({} семестр)", c.title, c.semester))
                .collect();
            let mut meta = DocMeta::new(record, "curriculum");
            meta.category = Some(category.key().to_string());
            out.push((
                format!(
                    "Учебный план программы {}, {}: {}.",
                    title,
                    category.label(),
                    listing.join(", ")
                ),
                meta,
            ));
        }
    }

    out
}

/// One text per achievement element; objects are reduced to their string
/// fields, bare strings pass through.
fn achievement_texts(value: &serde_json::Value) -> Vec<String> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Object(map) => {
                let parts: Vec<&str> = ["title", "name", "description", "year"]
                    .iter()
                    .filter_map(|k| map.get(*k))
                    .filter_map(|v| v.as_str())
                    .filter(|s| !s.trim().is_empty())
                    .collect();
                (!parts.is_empty()).then(|| parts.join(". "))
            }
            _ => None,
        })
        .collect()
}

fn contact_pairs(value: &serde_json::Value) -> Vec<String> {
    let Some(map) = value.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(name, v)| v.as_str().map(|url| format!("{name}: {url}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::curriculum::{Category, CourseEntry};
    use crate::parser::{
        AdmissionRequirement, CostInfo, Direction, FaqEntry, ProgramRecord, Quotas, StudyInfo,
    };

    fn base_record() -> ProgramRecord {
        ProgramRecord {
            key: "ai".to_string(),
            title: "Искусственный интеллект".to_string(),
            ..ProgramRecord::default()
        }
    }

    #[test]
    fn empty_record_yields_no_documents() {
        assert!(build_documents(&base_record(), None).is_empty());
    }

    #[test]
    fn faq_entry_becomes_one_document_with_question_and_answer() {
        let mut record = base_record();
        record.faq.push(FaqEntry {
            question: "Как поступить?".to_string(),
            answer: "Через экзамен.".to_string(),
        });
        let docs = build_documents(&record, None);
        assert_eq!(docs.len(), 1);
        let (text, meta) = &docs[0];
        assert!(text.contains("Как поступить?"));
        assert!(text.contains("Через экзамен."));
        assert_eq!(meta.doc_type, "faq");
        assert_eq!(meta.program, "ai");
    }

    #[test]
    fn one_document_per_direction() {
        let mut record = base_record();
        for code in ["01.04.02", "09.04.01"] {
            record.admission_info.directions.push(Direction {
                code: code.to_string(),
                title: "Направление".to_string(),
                quotas: Quotas {
                    budget: Some(40),
                    contract: None,
                    target_reception: Some(2),
                },
                disciplines: Vec::new(),
            });
        }
        let docs = build_documents(&record, None);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].1.code.as_deref(), Some("01.04.02"));
        assert!(docs[0].0.contains("бюджетных мест 40"));
        assert!(docs[0].0.contains("целевая квота 2"));
        assert!(!docs[0].0.contains("контрактных"));
    }

    #[test]
    fn admission_method_keeps_original_phrasing() {
        let mut record = base_record();
        record.admission_requirements.push(AdmissionRequirement {
            method: "портфолио".to_string(),
            description: "Соберите портфолио проектов.".to_string(),
            link: None,
        });
        let docs = build_documents(&record, None);
        assert_eq!(docs[0].0, "Поступление через портфолио: Соберите портфолио проектов.");
        assert_eq!(docs[0].1.method.as_deref(), Some("портфолио"));
    }

    #[test]
    fn partners_in_insertion_order() {
        let mut record = base_record();
        record.partners = vec!["Sber AI".to_string(), "X5".to_string(), "Sber AI".to_string()];
        let docs = build_documents(&record, None);
        assert_eq!(docs.len(), 1);
        assert!(docs[0].0.contains("Sber AI, X5, Sber AI"));
        assert_eq!(docs[0].1.doc_type, "partners");
    }

    #[test]
    fn curriculum_category_becomes_single_listing_document() {
        let record = base_record();
        let mut table = CurriculumTable::new();
        table.insert(
            Category::ObligatoryCourses,
            vec![
                CourseEntry { semester: 1, title: "Математика".to_string() },
                CourseEntry { semester: 2, title: "Машинное обучение".to_string() },
            ],
        );
        let docs = build_documents(&record, Some(&table));
        assert_eq!(docs.len(), 1);
        let (text, meta) = &docs[0];
        assert!(text.contains("обязательные дисциплины"));
        assert!(text.contains("Математика (1 семестр)"));
        assert!(text.contains("Машинное обучение (2 семестр)"));
        assert_eq!(meta.doc_type, "curriculum");
        assert_eq!(meta.category.as_deref(), Some("obligatory_courses"));
    }

    #[test]
    fn study_and_cost_sentences() {
        let mut record = base_record();
        record.study_info = Some(StudyInfo {
            period: "2 года".to_string(),
            label: "магистратура".to_string(),
            mode: "очная".to_string(),
            language: "русский".to_string(),
            military: true,
        });
        record.cost_info = Some(CostInfo { russian: 399_000, foreigner: 419_000, year: 2024 });
        let docs = build_documents(&record, None);
        assert_eq!(docs.len(), 2);
        assert!(docs[0].0.contains("срок обучения 2 года"));
        assert!(docs[0].0.contains("Военный учебный центр есть."));
        assert_eq!(docs[0].1.doc_type, "study_info");
        assert!(docs[1].0.contains("399000 рублей в год"));
        assert_eq!(docs[1].1.doc_type, "cost");
    }

    #[test]
    fn achievements_and_contacts() {
        let mut record = base_record();
        record.achievements = serde_json::json!([
            "Первое место в рейтинге ИИ-программ",
            {"title": "Грант", "description": "Поддержка индустрии"}
        ]);
        record.social_links = serde_json::json!({"vk": "https://vk.com/itmo"});
        let docs = build_documents(&record, None);
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].1.doc_type, "achievements");
        assert!(docs[1].0.contains("Грант. Поддержка индустрии"));
        assert_eq!(docs[2].1.doc_type, "contacts");
        assert!(docs[2].0.contains("vk: https://vk.com/itmo"));
    }

    #[test]
    fn blank_faq_entries_are_skipped() {
        let mut record = base_record();
        record.faq.push(FaqEntry { question: "Вопрос?".to_string(), answer: String::new() });
        assert!(build_documents(&record, None).is_empty());
    }
}
