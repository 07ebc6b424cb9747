pub const ENV_FEATURES: [&str; 9] = [
    "aqi",
    "pm2_5",
    "pm10",
    "no2",
    "o3",
    "temperature",
    "humidity",
    "hospital_capacity",
    "occupancy_ratio",
];

pub const TEXT_FEATURE: &str = "population_density";

/// Every value the text feature may take, the encoder assigns indices in sorted order.
pub const POPULATION_CLASSES: [&str; 3] = ["Rural", "Urban", "Suburban"];

pub const WEARABLE_FEATURES: [&str; 6] = [
    "heart_rate",
    "oxygen_saturation",
    "steps",
    "sleep_hours",
    "respiratory_rate",
    "body_temp",
];

pub const TARGET: &str = "hospital_admissions";

pub const CITY_COLUMN: &str = "city";

/// One row of the dataset, restricted to the columns the model uses.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub city: String,
    pub env: [f64; ENV_FEATURES.len()],
    pub population_density: String,
    pub wearable: [f64; WEARABLE_FEATURES.len()],
    pub hospital_admissions: f64,
}
