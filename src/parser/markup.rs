use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::text::normalize_whitespace;
use super::{
    AdmissionInfo, AdmissionRequirement, CurriculumInfo, Description, Direction, FaqEntry,
    ProgramRecord,
};

static DIRECTION_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}\.\d{2}\.\d{2}$").unwrap());

/// Admission routes recognized in free-form page text.
const ADMISSION_METHODS: &[&str] = &[
    "вступительный экзамен",
    "портфолио",
    "олимпиада",
    "мегашкола",
    "я-профессионал",
];

const DESCRIPTION_KEYWORDS: &[&str] = &["программа", "обучение", "магистр"];

const FAQ_CAP: usize = 10;

/// Best-effort extraction from rendered markup, used only when the page
/// carries no structured payload. Marker phrase → nearest following sibling,
/// keyword containment scans. Empty fields are an acceptable degraded result.
pub fn extract(key: &str, url: &str, html: &str) -> ProgramRecord {
    let doc = Html::parse_document(html);

    ProgramRecord {
        key: key.to_string(),
        url: url.to_string(),
        title: extract_title(&doc),
        description: Description {
            lead: String::new(),
            full_description: extract_description(&doc),
        },
        admission_info: AdmissionInfo {
            directions: extract_directions(&doc),
            cost: extract_cost(&doc),
        },
        career_prospects: extract_career(&doc),
        partners: extract_partners(&doc),
        faq: extract_faq(&doc),
        admission_requirements: extract_admission_requirements(&doc),
        curriculum_info: extract_curriculum_info(&doc),
        ..ProgramRecord::default()
    }
}

fn extract_title(doc: &Html) -> String {
    let h1 = Selector::parse("h1").unwrap();
    if let Some(el) = doc.select(&h1).next() {
        return text_of(el);
    }
    let title = Selector::parse("title").unwrap();
    doc.select(&title).next().map(text_of).unwrap_or_default()
}

fn extract_description(doc: &Html) -> String {
    if let Some(marker) = find_marker(doc, "о программе") {
        if let Some(text) = following_sibling_text(marker) {
            if !text.is_empty() {
                return text;
            }
        }
    }

    // No marker: first long paragraph that reads like program copy.
    let p = Selector::parse("p").unwrap();
    for el in doc.select(&p) {
        let text = text_of(el);
        let lower = text.to_lowercase();
        if text.chars().count() > 100 && DESCRIPTION_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            return text;
        }
    }
    String::new()
}

fn extract_career(doc: &Html) -> String {
    let Some(marker) = find_marker(doc, "карьер") else {
        return String::new();
    };

    // Climb until a following sibling has enough text to be the section body.
    let mut el = marker;
    loop {
        if let Some(sib) = next_sibling_element(el) {
            let text = text_of(sib);
            if text.chars().count() > 50 {
                return text;
            }
        }
        match el.parent().and_then(ElementRef::wrap) {
            Some(parent) => el = parent,
            None => return String::new(),
        }
    }
}

fn extract_faq(doc: &Html) -> Vec<FaqEntry> {
    let mut faq = Vec::new();
    let Some(marker) = find_marker(doc, "часто задаваемые вопросы") else {
        return faq;
    };

    // Question nodes end with "?"; the immediate next sibling is the answer.
    let mut cursor = next_sibling_element(marker);
    while let Some(el) = cursor {
        if faq.len() >= FAQ_CAP {
            break;
        }
        let text = text_of(el);
        if text.ends_with('?') {
            let answer = next_sibling_element(el).map(text_of).unwrap_or_default();
            faq.push(FaqEntry {
                question: text,
                answer,
            });
        }
        cursor = next_sibling_element(el);
    }
    faq
}

fn extract_cost(doc: &Html) -> Option<String> {
    find_marker(doc, "стоимость").map(text_of).filter(|t| !t.is_empty())
}

fn extract_partners(doc: &Html) -> Vec<String> {
    let img = Selector::parse("img[src]").unwrap();
    doc.select(&img)
        .filter_map(|el| el.value().attr("src"))
        .filter(|src| src.contains("partners"))
        .filter_map(|src| {
            let stem = src.rsplit('/').next()?.split('.').next()?;
            (!stem.is_empty()).then(|| stem.to_string())
        })
        .collect()
}

fn extract_admission_requirements(doc: &Html) -> Vec<AdmissionRequirement> {
    let mut requirements = Vec::new();
    for method in ADMISSION_METHODS {
        let Some(marker) = find_marker(doc, method) else {
            continue;
        };
        let mut el = marker;
        loop {
            if let Some(sib) = next_sibling_element(el) {
                let text = text_of(sib);
                if text.chars().count() > 30 {
                    requirements.push(AdmissionRequirement {
                        method: method.to_string(),
                        description: text,
                        link: None,
                    });
                    break;
                }
            }
            match el.parent().and_then(ElementRef::wrap) {
                Some(parent) => el = parent,
                None => break,
            }
        }
    }
    requirements
}

fn extract_directions(doc: &Html) -> Vec<Direction> {
    let any = Selector::parse("body *").unwrap();
    let mut directions = Vec::new();
    for el in doc.select(&any) {
        let code = normalize_whitespace(&own_text(&el));
        if !DIRECTION_CODE_RE.is_match(&code) {
            continue;
        }
        // Direction title: first non-numeric sibling after the code node.
        let title = std::iter::successors(next_sibling_element(el), |e| next_sibling_element(*e))
            .take(3)
            .map(text_of)
            .find(|t| !t.is_empty() && !t.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or_default();
        directions.push(Direction {
            code,
            title,
            ..Direction::default()
        });
    }
    directions
}

fn extract_curriculum_info(doc: &Html) -> Option<CurriculumInfo> {
    let a = Selector::parse("a[href]").unwrap();
    doc.select(&a)
        .find(|el| text_of(*el).to_lowercase().contains("учебный план"))
        .map(|el| CurriculumInfo {
            link: el.value().attr("href").unwrap_or_default().to_string(),
            text: text_of(el),
        })
}

// ── DOM helpers ──

/// First element whose *own* text (direct text children only) contains the
/// phrase; mirrors finding a text node and taking its parent.
fn find_marker<'a>(doc: &'a Html, phrase: &str) -> Option<ElementRef<'a>> {
    let any = Selector::parse("body *").unwrap();
    doc.select(&any)
        .find(|el| own_text(el).to_lowercase().contains(phrase))
}

fn own_text(el: &ElementRef) -> String {
    el.children()
        .filter_map(|node| node.value().as_text().map(|t| t.text.to_string()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn text_of(el: ElementRef) -> String {
    normalize_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn next_sibling_element(el: ElementRef) -> Option<ElementRef> {
    el.next_siblings().find_map(ElementRef::wrap)
}

/// Climb parents until one has a following sibling element, then return that
/// sibling's text.
fn following_sibling_text(mut el: ElementRef) -> Option<String> {
    loop {
        if let Some(sib) = next_sibling_element(el) {
            return Some(text_of(sib));
        }
        el = el.parent().and_then(ElementRef::wrap)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>ИТМО</title></head><body>
        <h1>Искусственный интеллект</h1>
        <section>
            <h2>О программе</h2>
            <p>Готовим инженеров машинного обучения и исследователей данных мирового уровня.</p>
        </section>
        <section>
            <h3>Карьера</h3>
            <div>Выпускники работают ML-инженерами, дата-сайентистами и продуктовыми аналитиками в ведущих компаниях.</div>
        </section>
        <section>
            <h2>Часто задаваемые вопросы</h2>
            <div>Как поступить?</div>
            <div>Через экзамен или конкурсный отбор.</div>
            <div>Есть ли общежитие?</div>
            <div>Да, иногородним студентам предоставляется общежитие.</div>
        </section>
        <div>Стоимость обучения: 399 000 рублей в год</div>
        <img src="/images/partners/sber.png"/>
        <img src="/static/logo.svg"/>
        <section>
            <h4>Вступительный экзамен</h4>
            <div>Сдайте экзамен по профилю программы и пройдите по конкурсу баллов.</div>
        </section>
        <div><span>01.04.02</span><span>Прикладная математика и информатика</span></div>
        <a href="/files/plan.pdf">Учебный план</a>
    </body></html>"#;

    #[test]
    fn title_from_h1() {
        let record = extract("ai", "u", PAGE);
        assert_eq!(record.title, "Искусственный интеллект");
    }

    #[test]
    fn description_from_marker_sibling() {
        let record = extract("ai", "u", PAGE);
        assert!(record.description.full_description.starts_with("Готовим инженеров"));
        assert!(record.description.lead.is_empty());
    }

    #[test]
    fn career_needs_long_sibling() {
        let record = extract("ai", "u", PAGE);
        assert!(record.career_prospects.contains("ML-инженерами"));
    }

    #[test]
    fn faq_alternates_questions_and_answers() {
        let record = extract("ai", "u", PAGE);
        assert_eq!(record.faq.len(), 2);
        assert_eq!(record.faq[0].question, "Как поступить?");
        assert!(record.faq[0].answer.contains("экзамен"));
        assert_eq!(record.faq[1].question, "Есть ли общежитие?");
    }

    #[test]
    fn faq_capped_at_ten() {
        let mut body = String::from("<html><body><h2>Часто задаваемые вопросы</h2>");
        for i in 0..15 {
            body.push_str(&format!("<div>Вопрос {i}?</div><div>Ответ {i}.</div>"));
        }
        body.push_str("</body></html>");
        let record = extract("ai", "u", &body);
        assert_eq!(record.faq.len(), 10);
    }

    #[test]
    fn cost_from_keyword_scan() {
        let record = extract("ai", "u", PAGE);
        assert_eq!(
            record.admission_info.cost.as_deref(),
            Some("Стоимость обучения: 399 000 рублей в год")
        );
    }

    #[test]
    fn partners_from_image_stems() {
        let record = extract("ai", "u", PAGE);
        assert_eq!(record.partners, vec!["sber"]);
    }

    #[test]
    fn admission_method_keyword() {
        let record = extract("ai", "u", PAGE);
        assert_eq!(record.admission_requirements.len(), 1);
        assert_eq!(record.admission_requirements[0].method, "вступительный экзамен");
        assert!(record.admission_requirements[0].description.contains("конкурсу"));
    }

    #[test]
    fn direction_code_and_title() {
        let record = extract("ai", "u", PAGE);
        assert_eq!(record.admission_info.directions.len(), 1);
        assert_eq!(record.admission_info.directions[0].code, "01.04.02");
        assert_eq!(
            record.admission_info.directions[0].title,
            "Прикладная математика и информатика"
        );
    }

    #[test]
    fn curriculum_link() {
        let record = extract("ai", "u", PAGE);
        let info = record.curriculum_info.unwrap();
        assert_eq!(info.link, "/files/plan.pdf");
        assert_eq!(info.text, "Учебный план");
    }

    #[test]
    fn empty_page_degrades_to_empty_fields() {
        let record = extract("ai", "u", "<html><body></body></html>");
        assert!(record.title.is_empty());
        assert!(record.description.full_description.is_empty());
        assert!(record.faq.is_empty());
        assert!(record.partners.is_empty());
        assert!(record.curriculum_info.is_none());
    }
}
