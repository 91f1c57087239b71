use crate::types::City;

/// The cities both panels offer out of the box.
pub fn default_cities() -> Vec<City> {
    vec![
        City::new(524901u64, "Moscow"),
        City::new(703448u64, "Kiev"),
        City::new(2643743u64, "London"),
        City::new(2172797u64, "Cairns"),
    ]
}
