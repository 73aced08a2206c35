use regex::Regex;
use std::sync::OnceLock;

/// Plants that commonly come up in grow conversations, most specific first.
const PLANT_KEYWORDS: &[&str] = &[
    "lettuce", "butterhead", "pak choi", "pak choy", "pak-choy", "kangkung", "spinach",
    "basil", "mint", "coriander", "spring onion", "green onion",
    "cherry tomato", "tomato", "chili", "pepper", "chilli",
    "arugula", "rocket", "kale", "chard", "watercress",
    "parsley", "cilantro", "dill", "thyme", "oregano",
    "bok choy", "mustard green", "collard", "cabbage",
    "kailan", "bayam", "amaranth", "chives",
    "salad", "herb", "microgreen",
];

const RECOMMENDATION_PATTERNS: &[&str] = &[
    r"(?i)(?:grow|growing|plant|try)\s+([a-z\s-]+?)(?:\s+is|\s+would|\s+can|\.|!|\?|,)",
    r"(?i)([a-z\s-]+?)\s+(?:is a great|would be|is perfect|works well)",
    r"(?i)recommend\s+([a-z\s-]+?)(?:\s+for|\s+because|\.|!)",
];

fn recommendation_patterns() -> &'static [Regex] {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RECOMMENDATION_PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern).expect("recommendation patterns are valid"))
            .collect()
    })
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// First known plant mentioned in `message`, title-cased.
pub fn detect_plant_in_message(message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    PLANT_KEYWORDS
        .iter()
        .find(|keyword| lower.contains(*keyword))
        .map(|keyword| title_case(keyword))
}

/// Plant an assistant reply recommends ("try basil.", "mint is a great choice"),
/// falling back to the first plant mentioned at all.
pub fn extract_plant_from_response(response: &str) -> Option<String> {
    for pattern in recommendation_patterns() {
        let Some(name) = pattern.captures(response).and_then(|c| c.get(1)) else {
            continue;
        };
        let name = name.as_str().trim();
        let lower = name.to_lowercase();
        if PLANT_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
            return Some(title_case(&lower));
        }
    }

    detect_plant_in_message(response)
}
