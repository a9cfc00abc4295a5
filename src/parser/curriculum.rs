use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Course row in extracted plan text: semester digit glued to the title,
/// then a trailing numeric code (hours) of 4+ digits.
static COURSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([1-9])([A-Za-zА-Яа-яЁё/().\- ]+?)\s+\d{4,}\s*$").unwrap()
});

/// Plan section a course row belongs to. Closed set; the declaration order
/// is also the marker-check order during the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ObligatoryCourses,
    ElectiveCourses,
    SoftSkills,
    UniversalPreparation,
    Practices,
    Gia,
}

impl Category {
    /// Stable snake_case key, matching the serialized form.
    pub fn key(self) -> &'static str {
        match self {
            Category::ObligatoryCourses => "obligatory_courses",
            Category::ElectiveCourses => "elective_courses",
            Category::SoftSkills => "soft_skills",
            Category::UniversalPreparation => "universal_preparation",
            Category::Practices => "practices",
            Category::Gia => "gia",
        }
    }

    /// Human-readable label used when the category is rendered into a
    /// corpus document.
    pub fn label(self) -> &'static str {
        match self {
            Category::ObligatoryCourses => "обязательные дисциплины",
            Category::ElectiveCourses => "выборные дисциплины",
            Category::SoftSkills => "дисциплины soft skills",
            Category::UniversalPreparation => "универсальная подготовка",
            Category::Practices => "практики",
            Category::Gia => "государственная итоговая аттестация",
        }
    }
}

/// Header phrases that switch the scan into a category. Checked in order;
/// first containment match wins.
const CATEGORY_MARKERS: &[(Category, &[&str])] = &[
    (Category::ObligatoryCourses, &["обязательные дисциплины"]),
    (Category::ElectiveCourses, &["пул выборных дисциплин", "выборные дисциплины"]),
    (Category::SoftSkills, &["soft skills", "софт скилл"]),
    (Category::UniversalPreparation, &["универсальная подготовка"]),
    (Category::Practices, &["практик"]),
    (Category::Gia, &["государственная итоговая аттестация", "гиа"]),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseEntry {
    pub semester: u8,
    pub title: String,
}

/// Courses grouped by plan section. A section absent from the source text
/// has no key at all.
pub type CurriculumTable = BTreeMap<Category, Vec<CourseEntry>>;

/// Scan concatenated plan text line by line and recover the course table.
///
/// PDF extraction flattens the plan's tables into a linear stream of section
/// headers and course rows, so a single pass with one sticky category is
/// enough: a header line switches the category, and every line is also
/// tested as a course row against the current category. Course rows seen
/// before any header are dropped.
pub fn extract(raw_text: &str) -> CurriculumTable {
    let mut table = CurriculumTable::new();
    let mut current: Option<Category> = None;

    for line in raw_text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let lower = line.to_lowercase();
        for (category, markers) in CATEGORY_MARKERS {
            if markers.iter().any(|m| lower.contains(m)) {
                current = Some(*category);
                break;
            }
        }

        // A header line may still carry a course row after it on malformed
        // extractions, so the course test runs unconditionally.
        if let (Some(category), Some(caps)) = (current, COURSE_RE.captures(line)) {
            let semester: u8 = caps[1].parse().unwrap_or(0);
            let title = caps[2].trim().to_string();
            if semester >= 1 && !title.is_empty() {
                table.entry(category).or_default().push(CourseEntry { semester, title });
            }
        }
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "\
Учебный план ОП Искусственный интеллект

Блок 1. Обязательные дисциплины
1Воркшоп по созданию продукта на данных / Data Product Development 1080
2Машинное обучение 123456
2Глубокое обучение / Deep Learning 3240

Пул выборных дисциплин. 1 семестр
1Вычисления на GPU 3240
1Обработка естественного языка (NLP) 3240

Практики
2Производственная практика 10368

Государственная итоговая аттестация
4Подготовка к защите и защита ВКР 32400
";

    #[test]
    fn course_after_obligatory_marker() {
        let text = "Обязательные дисциплины\n2Машинное обучение 123456\n";
        let table = extract(text);
        let entries = &table[&Category::ObligatoryCourses];
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].semester, 2);
        assert_eq!(entries[0].title, "Машинное обучение");
    }

    #[test]
    fn course_before_any_marker_is_dropped() {
        let table = extract("2Машинное обучение 123456\n");
        assert!(table.is_empty());
    }

    #[test]
    fn category_sticks_across_rows() {
        let table = extract(PLAN);
        assert_eq!(table[&Category::ObligatoryCourses].len(), 3);
        assert_eq!(table[&Category::ElectiveCourses].len(), 2);
        assert_eq!(table[&Category::Practices].len(), 1);
        assert_eq!(table[&Category::Gia].len(), 1);
    }

    #[test]
    fn absent_category_has_no_key() {
        let table = extract(PLAN);
        assert!(!table.contains_key(&Category::SoftSkills));
        assert!(!table.contains_key(&Category::UniversalPreparation));
    }

    #[test]
    fn titles_keep_latin_and_punctuation() {
        let table = extract(PLAN);
        let elective = &table[&Category::ElectiveCourses];
        assert_eq!(elective[1].title, "Обработка естественного языка (NLP)");
        let obligatory = &table[&Category::ObligatoryCourses];
        assert_eq!(
            obligatory[0].title,
            "Воркшоп по созданию продукта на данных / Data Product Development"
        );
    }

    #[test]
    fn marker_match_is_case_insensitive() {
        let text = "ОБЯЗАТЕЛЬНЫЕ ДИСЦИПЛИНЫ\n1Математика 1080\n";
        let table = extract(text);
        assert_eq!(table[&Category::ObligatoryCourses].len(), 1);
    }

    #[test]
    fn short_code_is_not_a_course() {
        // trailing number must be 4+ digits
        let text = "Обязательные дисциплины\n1Математика 108\n";
        let table = extract(text);
        assert!(table.is_empty());
    }

    #[test]
    fn idempotent_on_same_input() {
        assert_eq!(extract(PLAN), extract(PLAN));
    }
}
