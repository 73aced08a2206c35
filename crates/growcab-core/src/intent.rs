//! Offline intent classification for grow questions.
//!
//! Classification is a pure function of the input text; reply formatting is a
//! separate step so both can be tested on their own.

use regex::Regex;
use std::sync::OnceLock;

use crate::plants::PlantCard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Temperature,
    Humidity,
    Ph,
    Moisture,
    Care,
    General,
}

// First match wins. Malay keywords: sejuk (cold), panas (hot), kering (dry).
const RULES: &[(Intent, &str)] = &[
    (Intent::Temperature, r"\b(temp\w*|heat\w*|hot|warm\w*|cold|cool\w*|sejuk|panas)\b"),
    (Intent::Humidity, r"\b(humid\w*|moist|wet|kering|mist\w*|water\w*)\b"),
    (Intent::Ph, r"\b(ph|acid\w*|alkalin\w*)\b"),
    (Intent::Moisture, r"\b(moisture|soil|media|substrate)\b"),
    (Intent::Care, r"\b(note|notes|care|tips?|how)\b"),
];

fn rules() -> &'static [(Intent, Regex)] {
    static COMPILED: OnceLock<Vec<(Intent, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|(intent, pattern)| {
                let regex = Regex::new(&format!("(?i){pattern}")).expect("intent patterns are valid");
                (*intent, regex)
            })
            .collect()
    })
}

/// Map free text to the topic it asks about.
pub fn classify(text: &str) -> Intent {
    rules()
        .iter()
        .find(|(_, regex)| regex.is_match(text))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::General)
}

/// Canned guidance for `intent` from the plant's setpoints.
pub fn local_reply(plant: &PlantCard, intent: Intent) -> String {
    let sp = &plant.setpoints;
    match intent {
        Intent::Temperature => format!(
            "For {}, keep the cabinet between {}°C and {}°C. If it climbs beyond {}°C, boost airflow or switch to a cooler crop.",
            plant.common_name, sp.air_temp_ideal.0, sp.air_temp_ideal.1, sp.air_temp_max
        ),
        Intent::Humidity => format!(
            "{} likes humidity around {}–{}%. Malaysia's ambient air is already moist, so top up mist only when you drop below {}%.",
            plant.common_name, sp.humidity_ideal.0, sp.humidity_ideal.1, sp.humidity_ideal.0
        ),
        Intent::Moisture => format!(
            "Aim for media moisture {}–{}%. {}",
            sp.moisture_target.0, sp.moisture_target.1, sp.moisture_hint
        ),
        Intent::Ph => format!(
            "{} prefers pH {}–{}. Adjust with hydroponic buffers if you drift outside this range.",
            plant.common_name, sp.ph_ideal.0, sp.ph_ideal.1
        ),
        Intent::Care => plant.notes.to_string(),
        Intent::General => plant.setpoint_summary(),
    }
}
