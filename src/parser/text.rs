use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// HTML entities that show up in program payloads. Anything outside this set
/// is left as-is rather than guessed at.
const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&laquo;", "«"),
    ("&raquo;", "»"),
    ("&mdash;", "—"),
    ("&ndash;", "–"),
];

/// Strip markup tags, decode known entities, and collapse whitespace.
///
/// Payload fields arrive with residual `<p>`/`<br>` markup and escaped
/// non-breaking spaces; downstream document building expects plain text.
pub fn clean_markup(input: &str) -> String {
    let no_tags = TAG_RE.replace_all(input, " ");
    let mut decoded = no_tags.into_owned();
    for (entity, replacement) in ENTITIES {
        if decoded.contains(entity) {
            decoded = decoded.replace(entity, replacement);
        }
    }
    normalize_whitespace(&decoded)
}

/// Collapse runs of whitespace (including `\r`, `\n`, `\t`) to single spaces.
pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<&str>>().join(" ")
}
