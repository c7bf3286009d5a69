//! GRIB2 parameter, level and code lookup tables.
//!
//! Translates the numeric codes of a GRIB2 field into the short names used
//! downstream (`t`, `u`, `isobaricInhPa`, ...). A standard table covering
//! common meteorological parameters is built in; callers may add or
//! override entries from their own configuration.

use std::collections::HashMap;

/// Lookup key for parameter: (discipline, category, number)
pub type ParamKey = (u8, u8, u8);

/// Named level type, with the divisor applied to the raw surface value
/// (e.g. 100 to turn Pa into hPa).
#[derive(Debug, Clone, PartialEq)]
pub struct LevelType {
    pub name: String,
    pub divisor: f64,
}

impl LevelType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            divisor: 1.0,
        }
    }

    pub fn scaled(name: impl Into<String>, divisor: f64) -> Self {
        Self {
            name: name.into(),
            divisor,
        }
    }
}

/// GRIB2 parameter and level lookup tables.
#[derive(Debug, Clone, Default)]
pub struct Grib2Tables {
    /// (discipline, category, number) -> parameter short name (e.g., "t", "u")
    parameters: HashMap<ParamKey, String>,
    /// level_type -> level name and unit divisor
    levels: HashMap<u8, LevelType>,
}

impl Grib2Tables {
    /// Create empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables pre-populated with common WMO parameters and level types,
    /// named the way ecCodes names them.
    pub fn standard() -> Self {
        let mut tables = Self::new();

        let parameters: [(ParamKey, &str); 32] = [
            // Discipline 0, category 0: temperature
            ((0, 0, 0), "t"),
            ((0, 0, 2), "pt"),
            ((0, 0, 4), "tmax"),
            ((0, 0, 5), "tmin"),
            ((0, 0, 6), "dpt"),
            // Category 1: moisture
            ((0, 1, 0), "q"),
            ((0, 1, 1), "r"),
            ((0, 1, 3), "pwat"),
            ((0, 1, 7), "prate"),
            ((0, 1, 8), "tp"),
            ((0, 1, 13), "sdwe"),
            // Category 2: momentum
            ((0, 2, 0), "wdir"),
            ((0, 2, 1), "ws"),
            ((0, 2, 2), "u"),
            ((0, 2, 3), "v"),
            ((0, 2, 8), "w"),
            ((0, 2, 10), "absv"),
            ((0, 2, 22), "gust"),
            // Category 3: mass
            ((0, 3, 0), "pres"),
            ((0, 3, 1), "prmsl"),
            ((0, 3, 4), "z"),
            ((0, 3, 5), "gh"),
            // Category 6: cloud
            ((0, 6, 1), "tcc"),
            ((0, 6, 3), "lcc"),
            ((0, 6, 4), "mcc"),
            ((0, 6, 5), "hcc"),
            // Category 7: stability
            ((0, 7, 6), "cape"),
            ((0, 7, 7), "cin"),
            // Category 19: physical atmospheric properties
            ((0, 19, 0), "vis"),
            // Discipline 2: land surface
            ((2, 0, 0), "lsm"),
            // Discipline 10: oceanographic
            ((10, 0, 3), "swh"),
            ((10, 3, 0), "wtmp"),
        ];
        for ((discipline, category, number), name) in parameters {
            tables.add_parameter(discipline, category, number, name.to_string());
        }

        let levels: [(u8, LevelType); 16] = [
            (1, LevelType::new("surface")),
            (2, LevelType::new("cloudBase")),
            (3, LevelType::new("cloudTop")),
            (4, LevelType::new("isothermZero")),
            (6, LevelType::new("maxWind")),
            (7, LevelType::new("tropopause")),
            (8, LevelType::new("nominalTop")),
            (10, LevelType::new("entireAtmosphere")),
            (100, LevelType::scaled("isobaricInhPa", 100.0)),
            (101, LevelType::new("meanSea")),
            (102, LevelType::new("heightAboveSea")),
            (103, LevelType::new("heightAboveGround")),
            (104, LevelType::new("sigma")),
            (105, LevelType::new("hybrid")),
            (106, LevelType::new("depthBelowLandLayer")),
            (108, LevelType::scaled("pressureFromGroundLayer", 100.0)),
        ];
        for (code, level) in levels {
            tables.add_level(code, level);
        }

        tables
    }

    /// Add a parameter mapping
    pub fn add_parameter(&mut self, discipline: u8, category: u8, number: u8, name: String) {
        self.parameters.insert((discipline, category, number), name);
    }

    /// Add a level type mapping
    pub fn add_level(&mut self, level_type: u8, level: LevelType) {
        self.levels.insert(level_type, level);
    }

    /// Look up parameter short name by GRIB2 codes.
    ///
    /// Returns "P{discipline}_{category}_{number}" if not found.
    pub fn get_parameter_name(&self, discipline: u8, category: u8, number: u8) -> String {
        self.parameters
            .get(&(discipline, category, number))
            .cloned()
            .unwrap_or_else(|| format!("P{}_{}_{}", discipline, category, number))
    }

    /// Look up a level type by its code.
    pub fn get_level_type(&self, level_type: u8) -> Option<&LevelType> {
        self.levels.get(&level_type)
    }

    /// Level type name, "levelType{code}" if not found.
    pub fn get_level_name(&self, level_type: u8) -> String {
        self.get_level_type(level_type)
            .map(|level| level.name.clone())
            .unwrap_or_else(|| format!("levelType{}", level_type))
    }

    /// Get the number of parameters in the table
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Get the number of level types in the table
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Check if the tables are empty
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.levels.is_empty()
    }
}

/// ecCodes `gridType` for a grid definition template (Code Table 3.1).
pub fn grid_type_name(template: u16) -> &'static str {
    match template {
        0 => "regular_ll",
        1 => "rotated_ll",
        10 => "mercator",
        20 => "polar_stereographic",
        30 => "lambert",
        40 => "regular_gg",
        90 => "space_view",
        _ => "unknown",
    }
}

/// ecCodes `dataType` for a type-of-data code (Code Table 1.4).
pub fn data_type_name(code: u8) -> String {
    match code {
        0 => "an".to_string(),
        1 => "fc".to_string(),
        2 => "af".to_string(),
        3 => "cf".to_string(),
        4 => "pf".to_string(),
        5 => "cp".to_string(),
        6 => "sa".to_string(),
        7 => "ra".to_string(),
        other => other.to_string(),
    }
}

/// Originating centre abbreviation (Common Code Table C-11).
pub fn centre_name(code: u16) -> String {
    match code {
        7 => "kwbc".to_string(),
        34 => "rjtd".to_string(),
        54 => "cwao".to_string(),
        74 => "egrr".to_string(),
        78 => "edzw".to_string(),
        85 => "lfpw".to_string(),
        98 => "ecmf".to_string(),
        other => other.to_string(),
    }
}
