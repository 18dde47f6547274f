//! Parameter types configuring the pipeline stages.
//!
//! Every tolerance and cap lives in [`AlgorithmConfig`]; the executor embeds
//! the active configuration in each artifact so a result is traceable to the
//! constants that produced it.

use serde::{Deserialize, Serialize};

use crate::entity::OpeningKind;

/// Pipeline-wide algorithm parameters. Defaults match the production values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    /// Coordinate quantisation step (mm).
    pub epsilon_mm: f64,
    /// Max angle between directions for two lines to count as parallel (deg).
    pub angular_tolerance_deg: f64,
    /// Perpendicular distance window for a wall pair (mm, inclusive).
    pub min_distance_mm: f64,
    pub max_distance_mm: f64,
    /// Minimum longitudinal overlap as a percentage of the shorter line.
    pub min_overlap_percentage: f64,
    /// Detector safety cap; more lines than this fails the stage.
    pub max_detector_lines: usize,
    /// Band clustering: direction tolerance (deg) and normal-offset tolerance (mm).
    pub band_angle_tol_deg: f64,
    pub band_offset_tol_mm: f64,
    /// Max end-to-end gap bridged when concatenating band neighbours (mm).
    pub band_join_gap_mm: f64,
    /// Max thickness difference between merged band neighbours (mm).
    pub band_thickness_tol_mm: f64,
    /// Corner tolerance for oriented-quad containment (mm).
    pub containment_tol_mm: f64,
    /// Area slack below which two rectangles count as equal-area (mm²).
    pub containment_area_eps_mm2: f64,
    /// L-junction pairing: allowed deviation from perpendicular (deg).
    pub logic_f_angle_tol_deg: f64,
    /// Max distance a wall end may move to meet a junction (mm).
    pub logic_f_max_extension_mm: f64,
    /// Max distance from the junction point to either rectangle (mm).
    pub logic_f_max_junction_distance_mm: f64,
    /// Max door-centre offset from a wall centreline in the normal direction (mm).
    pub door_snap_tol_mm: f64,
    /// Longitudinal extension of a door bridge past the opening, per side (mm).
    pub bridge_end_cap_mm: f64,
    /// Window/door layer identification rules.
    pub layer_rules: LayerRules,
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            epsilon_mm: 1e-6,
            angular_tolerance_deg: 5.0,
            min_distance_mm: 20.0,
            max_distance_mm: 450.0,
            min_overlap_percentage: 60.0,
            max_detector_lines: 20_000,
            band_angle_tol_deg: 1.0,
            band_offset_tol_mm: 2.0,
            band_join_gap_mm: 5.0,
            band_thickness_tol_mm: 5.0,
            containment_tol_mm: 1.0,
            containment_area_eps_mm2: 1.0,
            logic_f_angle_tol_deg: 25.0,
            logic_f_max_extension_mm: 300.0,
            logic_f_max_junction_distance_mm: 500.0,
            door_snap_tol_mm: 300.0,
            bridge_end_cap_mm: 10.0,
            layer_rules: LayerRules::default(),
        }
    }
}

/// Rules identifying window/door layers by name.
///
/// Matching is case-insensitive substring: first against the keyword lists,
/// then against the explicit layer-name lists. Window matches win over door
/// matches so `A-WINDOW-DOOR-TRIM`-style names classify stably.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayerRules {
    pub window_keywords: Vec<String>,
    pub door_keywords: Vec<String>,
    pub window_layer_names: Vec<String>,
    pub door_layer_names: Vec<String>,
}

impl Default for LayerRules {
    fn default() -> Self {
        Self {
            window_keywords: vec!["window".into(), "חלון".into()],
            door_keywords: vec!["door".into(), "דלת".into()],
            window_layer_names: [
                "A-WINDOW",
                "A-WIN",
                "ARCH-WINDOW",
                "WIN",
                "WINDOWS",
                "A-OPENING-WIN",
                "A-GLAZ",
                "A-FENST",
                "A-WIND-FRM",
                "A-WIND-GLS",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            door_layer_names: [
                "A-DR",
                "ARCH-DOOR",
                "DOOR",
                "DOORS",
                "A-OPENING-DOOR",
                "A-DOOR-SWING",
                "A-DOOR-SLIDING",
                "A-DOOR-FOLDING",
                "A-DOOR-PLAN",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl LayerRules {
    /// Classifies a layer name as window/door, or `None` for neither.
    pub fn classify(&self, layer_name: &str) -> Option<OpeningKind> {
        if layer_name.is_empty() {
            return None;
        }
        let lower = layer_name.to_lowercase();
        let upper = layer_name.to_uppercase();

        let matches_any = |needles: &[String], hay_lower: &str, hay_upper: &str| {
            needles.iter().any(|n| {
                let nl = n.to_lowercase();
                hay_lower.contains(&nl) || hay_upper.contains(n.as_str())
            })
        };

        if matches_any(&self.window_keywords, &lower, &upper)
            || matches_any(&self.window_layer_names, &lower, &upper)
        {
            return Some(OpeningKind::Window);
        }
        if matches_any(&self.door_keywords, &lower, &upper)
            || matches_any(&self.door_layer_names, &lower, &upper)
        {
            return Some(OpeningKind::Door);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_match_is_case_insensitive() {
        let rules = LayerRules::default();
        assert_eq!(rules.classify("A-Door-Swing"), Some(OpeningKind::Door));
        assert_eq!(rules.classify("my_WINDOW_layer"), Some(OpeningKind::Window));
        assert_eq!(rules.classify("walls"), None);
    }

    #[test]
    fn hebrew_keywords_match() {
        let rules = LayerRules::default();
        assert_eq!(rules.classify("קומה-דלת-1"), Some(OpeningKind::Door));
        assert_eq!(rules.classify("חלון-צפון"), Some(OpeningKind::Window));
    }

    #[test]
    fn explicit_names_match_as_substrings() {
        let rules = LayerRules::default();
        assert_eq!(rules.classify("xx-ARCH-DOOR-01"), Some(OpeningKind::Door));
        assert_eq!(rules.classify("A-GLAZ-EXT"), Some(OpeningKind::Window));
    }

    #[test]
    fn empty_layer_is_never_an_opening() {
        assert_eq!(LayerRules::default().classify(""), None);
    }
}
