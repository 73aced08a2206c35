//! Cabinet crop dataset and setpoint checks.

use crate::sensor::SensorSnapshot;

pub const DEFAULT_PLANT_ID: &str = "lettuce-butterhead";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlantCategory {
    Herb,
    Leafy,
    Fruiting,
}

impl PlantCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlantCategory::Herb => "Herb",
            PlantCategory::Leafy => "Leafy",
            PlantCategory::Fruiting => "Fruiting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CabinetFit {
    Compact,
    Medium,
    Tall,
}

impl CabinetFit {
    pub fn as_str(&self) -> &'static str {
        match self {
            CabinetFit::Compact => "compact",
            CabinetFit::Medium => "medium",
            CabinetFit::Tall => "tall",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setpoints {
    pub air_temp_min: f64,
    pub air_temp_ideal: (f64, f64),
    pub air_temp_max: f64,
    pub humidity_ideal: (f64, f64),
    pub ph_ideal: (f64, f64),
    pub moisture_target: (f64, f64),
    pub moisture_hint: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlantCard {
    pub id: &'static str,
    pub common_name: &'static str,
    pub latin_name: &'static str,
    pub name_ms: &'static str,
    pub name_zh: &'static str,
    pub category: PlantCategory,
    pub cabinet_fit: CabinetFit,
    pub cycle_days: &'static str,
    pub setpoints: Setpoints,
    pub notes: &'static str,
}

/// Where a reading sits relative to a plant's ideal band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Low,
    Ideal,
    High,
}

impl Band {
    fn of(value: f64, (low, high): (f64, f64)) -> Self {
        if value < low {
            Band::Low
        } else if value > high {
            Band::High
        } else {
            Band::Ideal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub temperature: Option<Band>,
    pub humidity: Option<Band>,
}

impl PlantCard {
    pub fn setpoint_summary(&self) -> String {
        let sp = &self.setpoints;
        format!(
            "Here's a summary for {}: keep air at {}–{} °C, humidity around {}–{} %, moisture {}–{} %, and pH {}–{}. {}",
            self.common_name,
            sp.air_temp_ideal.0,
            sp.air_temp_ideal.1,
            sp.humidity_ideal.0,
            sp.humidity_ideal.1,
            sp.moisture_target.0,
            sp.moisture_target.1,
            sp.ph_ideal.0,
            sp.ph_ideal.1,
            self.notes,
        )
    }

    /// Compare a reading with the ideal bands. Missing values stay unassessed.
    pub fn assess(&self, snapshot: &SensorSnapshot) -> Assessment {
        let sp = &self.setpoints;
        Assessment {
            temperature: snapshot.temp_c.map(|t| Band::of(t, sp.air_temp_ideal)),
            humidity: snapshot.humidity_percent.map(|h| Band::of(h, sp.humidity_ideal)),
        }
    }

    /// Above the plant's survivable maximum or below its minimum.
    pub fn is_temperature_critical(&self, temp_c: f64) -> bool {
        temp_c > self.setpoints.air_temp_max || temp_c < self.setpoints.air_temp_min
    }
}

pub fn plants() -> &'static [PlantCard] {
    PLANTS
}

pub fn plant_by_id(id: &str) -> Option<&'static PlantCard> {
    PLANTS.iter().find(|plant| plant.id == id)
}

pub fn default_plant() -> &'static PlantCard {
    plant_by_id(DEFAULT_PLANT_ID).unwrap_or(&PLANTS[0])
}

static PLANTS: &[PlantCard] = &[
    PlantCard {
        id: "basil",
        common_name: "Basil",
        latin_name: "Ocimum basilicum",
        name_ms: "Selasih",
        name_zh: "罗勒",
        category: PlantCategory::Herb,
        cabinet_fit: CabinetFit::Medium,
        cycle_days: "25–60",
        setpoints: Setpoints {
            air_temp_min: 18.0,
            air_temp_ideal: (26.0, 32.0),
            air_temp_max: 35.0,
            humidity_ideal: (50.0, 70.0),
            ph_ideal: (5.5, 6.5),
            moisture_target: (30.0, 45.0),
            moisture_hint: "Allow partial dry between watering",
        },
        notes: "Heat-loving; prune tips for bushiness.",
    },
    PlantCard {
        id: "mint",
        common_name: "Mint",
        latin_name: "Mentha sp.",
        name_ms: "Pudina",
        name_zh: "薄荷",
        category: PlantCategory::Herb,
        cabinet_fit: CabinetFit::Compact,
        cycle_days: "30+ (continuous)",
        setpoints: Setpoints {
            air_temp_min: 15.0,
            air_temp_ideal: (20.0, 25.0),
            air_temp_max: 32.0,
            humidity_ideal: (55.0, 75.0),
            ph_ideal: (6.0, 7.0),
            moisture_target: (40.0, 60.0),
            moisture_hint: "Keep consistently moist",
        },
        notes: "Thrives in partial shade; spreads easily in trays.",
    },
    PlantCard {
        id: "pak-choy",
        common_name: "Pak-choy",
        latin_name: "Brassica rapa var. chinensis",
        name_ms: "Sawi Cina",
        name_zh: "小白菜",
        category: PlantCategory::Leafy,
        cabinet_fit: CabinetFit::Compact,
        cycle_days: "30–50",
        setpoints: Setpoints {
            air_temp_min: 20.0,
            air_temp_ideal: (22.0, 28.0),
            air_temp_max: 33.0,
            humidity_ideal: (55.0, 70.0),
            ph_ideal: (5.8, 6.5),
            moisture_target: (45.0, 60.0),
            moisture_hint: "Keep moisture steady to avoid bolting",
        },
        notes: "Very Malaysia-friendly and fast-growing.",
    },
    PlantCard {
        id: "kailan",
        common_name: "Kailan",
        latin_name: "Brassica oleracea var. alboglabra",
        name_ms: "Sawi Kailan",
        name_zh: "芥兰",
        category: PlantCategory::Leafy,
        cabinet_fit: CabinetFit::Medium,
        cycle_days: "40–55",
        setpoints: Setpoints {
            air_temp_min: 20.0,
            air_temp_ideal: (22.0, 28.0),
            air_temp_max: 33.0,
            humidity_ideal: (55.0, 70.0),
            ph_ideal: (5.8, 6.5),
            moisture_target: (45.0, 60.0),
            moisture_hint: "Keep evenly moist",
        },
        notes: "Tolerates Malaysian warmth better than lettuce.",
    },
    PlantCard {
        id: "bayam",
        common_name: "Bayam (Amaranth)",
        latin_name: "Amaranthus tricolor",
        name_ms: "Bayam",
        name_zh: "苋菜",
        category: PlantCategory::Leafy,
        cabinet_fit: CabinetFit::Compact,
        cycle_days: "25–35",
        setpoints: Setpoints {
            air_temp_min: 22.0,
            air_temp_ideal: (24.0, 30.0),
            air_temp_max: 34.0,
            humidity_ideal: (55.0, 75.0),
            ph_ideal: (5.8, 6.5),
            moisture_target: (45.0, 60.0),
            moisture_hint: "Tolerant and quick to harvest",
        },
        notes: "Local favourite; forgiving for beginners.",
    },
    PlantCard {
        id: "lettuce-butterhead",
        common_name: "Lettuce (Butterhead)",
        latin_name: "Lactuca sativa",
        name_ms: "Salad Mentega",
        name_zh: "奶油生菜",
        category: PlantCategory::Leafy,
        cabinet_fit: CabinetFit::Compact,
        cycle_days: "35–45",
        setpoints: Setpoints {
            air_temp_min: 18.0,
            air_temp_ideal: (18.0, 24.0),
            air_temp_max: 29.0,
            humidity_ideal: (50.0, 70.0),
            ph_ideal: (5.5, 6.5),
            moisture_target: (45.0, 60.0),
            moisture_hint: "Avoid over-wet roots",
        },
        notes: "Cooler-loving; watch for tip burn above 28 °C.",
    },
    PlantCard {
        id: "coriander",
        common_name: "Coriander",
        latin_name: "Coriandrum sativum",
        name_ms: "Daun Ketumbar",
        name_zh: "香菜",
        category: PlantCategory::Herb,
        cabinet_fit: CabinetFit::Compact,
        cycle_days: "28–55",
        setpoints: Setpoints {
            air_temp_min: 15.0,
            air_temp_ideal: (18.0, 24.0),
            air_temp_max: 28.0,
            humidity_ideal: (50.0, 65.0),
            ph_ideal: (6.2, 6.8),
            moisture_target: (40.0, 55.0),
            moisture_hint: "Keep cool; bolts if too warm",
        },
        notes: "Great for teaching temperature management.",
    },
    PlantCard {
        id: "chives",
        common_name: "Chives",
        latin_name: "Allium schoenoprasum",
        name_ms: "Daun Kucai",
        name_zh: "韭菜",
        category: PlantCategory::Herb,
        cabinet_fit: CabinetFit::Compact,
        cycle_days: "30–40",
        setpoints: Setpoints {
            air_temp_min: 18.0,
            air_temp_ideal: (18.0, 26.0),
            air_temp_max: 32.0,
            humidity_ideal: (50.0, 70.0),
            ph_ideal: (6.0, 6.5),
            moisture_target: (40.0, 55.0),
            moisture_hint: "Avoid waterlogging",
        },
        notes: "Handles indoor light well; harvest by trimming 2 cm above base.",
    },
    PlantCard {
        id: "parsley",
        common_name: "Parsley",
        latin_name: "Petroselinum crispum",
        name_ms: "Daun Parsli",
        name_zh: "欧芹",
        category: PlantCategory::Herb,
        cabinet_fit: CabinetFit::Compact,
        cycle_days: "60–75",
        setpoints: Setpoints {
            air_temp_min: 18.0,
            air_temp_ideal: (18.0, 24.0),
            air_temp_max: 30.0,
            humidity_ideal: (50.0, 70.0),
            ph_ideal: (6.0, 6.8),
            moisture_target: (40.0, 55.0),
            moisture_hint: "Moderate moisture",
        },
        notes: "Slow starter but reliable once established.",
    },
    PlantCard {
        id: "dwarf-chilli",
        common_name: "Dwarf Chilli",
        latin_name: "Capsicum annuum",
        name_ms: "Cili Padi Kerdil",
        name_zh: "矮生辣椒",
        category: PlantCategory::Fruiting,
        cabinet_fit: CabinetFit::Medium,
        cycle_days: "75–100",
        setpoints: Setpoints {
            air_temp_min: 22.0,
            air_temp_ideal: (24.0, 30.0),
            air_temp_max: 34.0,
            humidity_ideal: (55.0, 70.0),
            ph_ideal: (5.5, 6.8),
            moisture_target: (40.0, 55.0),
            moisture_hint: "Needs airflow; avoid soggy media",
        },
        notes: "Needs strong light; fun stretch goal crop.",
    },
];
