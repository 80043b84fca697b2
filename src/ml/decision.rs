//! Turns a maintenance probability into an actionable triage signal.
//!
//! Recommendation thresholds are operational limits applied to the raw,
//! unscaled readings. They are deliberately distinct from the thresholds used
//! for the training-time urgency score.

use crate::ml::schema::{Feature, Observation};
use serde::{Deserialize, Serialize};

/// Baseline service interval in days
pub const BASE_SERVICE_DAYS: f64 = 14.0;

/// Probability above which an empty recommendation list gets a fallback
pub const FALLBACK_PROBABILITY: f64 = 0.7;

pub const FALLBACK_RECOMMENDATION: &str = "Comprehensive vehicle inspection recommended";

/// Triage level, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    /// Strictly-greater thresholds, highest first
    pub fn from_probability(probability: f64) -> Self {
        if probability > 0.8 {
            Urgency::Critical
        } else if probability > 0.6 {
            Urgency::High
        } else if probability > 0.4 {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "LOW",
            Urgency::Medium => "MEDIUM",
            Urgency::High => "HIGH",
            Urgency::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Days until the vehicle should be serviced, always at least 1
pub fn estimate_days(probability: f64) -> u32 {
    let days = if probability > 0.8 {
        (BASE_SERVICE_DAYS * (1.0 - probability)).max(1.0)
    } else if probability > 0.5 {
        BASE_SERVICE_DAYS
    } else {
        BASE_SERVICE_DAYS + BASE_SERVICE_DAYS * (1.0 - probability)
    };

    (days.trunc() as u32).max(1)
}

/// Comparison applied to a raw reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Threshold {
    Above(f64),
    Below(f64),
}

impl Threshold {
    pub fn is_crossed(&self, value: f64) -> bool {
        match *self {
            Threshold::Above(limit) => value > limit,
            Threshold::Below(limit) => value < limit,
        }
    }
}

/// One independent recommendation rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecommendationRule {
    pub feature: Feature,
    pub threshold: Threshold,
    /// Value assumed when the reading is absent; chosen so the rule stays quiet
    pub absent_value: f64,
    pub message: &'static str,
}

impl RecommendationRule {
    pub fn fires(&self, observation: &Observation) -> bool {
        let value = observation.get(self.feature).unwrap_or(self.absent_value);
        self.threshold.is_crossed(value)
    }
}

/// Rules in evaluation order
pub const RECOMMENDATION_RULES: [RecommendationRule; 5] = [
    RecommendationRule {
        feature: Feature::EngineTemperature,
        threshold: Threshold::Above(95.0),
        absent_value: 0.0,
        message: "Check cooling system",
    },
    RecommendationRule {
        feature: Feature::VibrationLevel,
        threshold: Threshold::Above(7.0),
        absent_value: 0.0,
        message: "Inspect engine mounts and suspension",
    },
    RecommendationRule {
        feature: Feature::OilPressure,
        threshold: Threshold::Below(35.0),
        absent_value: 100.0,
        message: "Check oil levels and pressure sensor",
    },
    RecommendationRule {
        feature: Feature::BrakeWear,
        threshold: Threshold::Above(80.0),
        absent_value: 0.0,
        message: "Replace brake pads",
    },
    RecommendationRule {
        feature: Feature::DaysSinceLastMaintenance,
        threshold: Threshold::Above(150.0),
        absent_value: 0.0,
        message: "Schedule routine maintenance",
    },
];

/// Decision layer output, before the classifier fields are attached
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub urgency: Urgency,
    pub estimated_days: u32,
    pub recommendations: Vec<String>,
}

/// Final result for one observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub needs_maintenance: bool,
    pub probability: f64,
    pub estimated_days: u32,
    pub urgency: Urgency,
    #[serde(rename = "recommended_actions")]
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
}

impl PredictionResult {
    pub fn from_decision(needs_maintenance: bool, probability: f64, decision: Decision) -> Self {
        Self {
            needs_maintenance,
            probability,
            estimated_days: decision.estimated_days,
            urgency: decision.urgency,
            recommendations: decision.recommendations,
            vehicle_id: None,
        }
    }

    pub fn with_vehicle_id(mut self, vehicle_id: Option<String>) -> Self {
        self.vehicle_id = vehicle_id;
        self
    }
}

/// Maps probability and raw readings to urgency, day estimate and actions
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    rules: Vec<RecommendationRule>,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(RECOMMENDATION_RULES.to_vec())
    }
}

impl DecisionEngine {
    pub fn new(rules: Vec<RecommendationRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RecommendationRule] {
        &self.rules
    }

    pub fn decide(&self, probability: f64, observation: &Observation) -> Decision {
        Decision {
            urgency: Urgency::from_probability(probability),
            estimated_days: estimate_days(probability),
            recommendations: self.recommend(probability, observation),
        }
    }

    /// Scan every rule in order; fall back to a general inspection when
    /// nothing fired and the probability is high.
    pub fn recommend(&self, probability: f64, observation: &Observation) -> Vec<String> {
        let mut recommendations: Vec<String> = self
            .rules
            .iter()
            .filter(|rule| rule.fires(observation))
            .map(|rule| rule.message.to_string())
            .collect();

        if recommendations.is_empty() && probability > FALLBACK_PROBABILITY {
            recommendations.push(FALLBACK_RECOMMENDATION.to_string());
        }
        recommendations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_vehicle() -> Observation {
        Observation::new()
            .with(Feature::EngineTemperature, 92.0)
            .with(Feature::VibrationLevel, 7.5)
            .with(Feature::OilPressure, 45.0)
            .with(Feature::BrakeWear, 65.0)
            .with(Feature::DaysSinceLastMaintenance, 120.0)
    }

    #[test]
    fn test_urgency_thresholds() {
        assert_eq!(Urgency::from_probability(0.81), Urgency::Critical);
        assert_eq!(Urgency::from_probability(0.8), Urgency::High);
        assert_eq!(Urgency::from_probability(0.6), Urgency::Medium);
        assert_eq!(Urgency::from_probability(0.4), Urgency::Low);
        assert_eq!(Urgency::from_probability(0.0), Urgency::Low);
        assert_eq!(Urgency::from_probability(1.0), Urgency::Critical);
    }

    #[test]
    fn test_urgency_monotonic() {
        let mut previous = Urgency::from_probability(0.0);
        for step in 1..=1000 {
            let current = Urgency::from_probability(step as f64 / 1000.0);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_estimate_days_bounds() {
        assert_eq!(estimate_days(1.0), 1);
        assert_eq!(estimate_days(0.0), 28);
        for step in 0..=1000 {
            assert!(estimate_days(step as f64 / 1000.0) >= 1);
        }
    }

    #[test]
    fn test_estimate_days_pieces() {
        assert_eq!(estimate_days(0.9), 1);
        assert_eq!(estimate_days(0.85), 2);
        assert_eq!(estimate_days(0.8), 14);
        assert_eq!(estimate_days(0.51), 14);
        assert_eq!(estimate_days(0.5), 21);
        assert_eq!(estimate_days(0.25), 24);
    }

    #[test]
    fn test_reference_vehicle_decision() {
        let decision = DecisionEngine::default().decide(0.72, &reference_vehicle());

        assert_eq!(decision.urgency, Urgency::High);
        assert_eq!(decision.estimated_days, 14);
        assert!(decision
            .recommendations
            .contains(&"Inspect engine mounts and suspension".to_string()));
        assert!(!decision
            .recommendations
            .contains(&"Check oil levels and pressure sensor".to_string()));
        assert!(!decision.recommendations.contains(&"Replace brake pads".to_string()));
        assert!(!decision
            .recommendations
            .contains(&FALLBACK_RECOMMENDATION.to_string()));
    }

    #[test]
    fn test_each_rule_fires_independently() {
        let obs = Observation::new()
            .with(Feature::EngineTemperature, 96.0)
            .with(Feature::VibrationLevel, 7.1)
            .with(Feature::OilPressure, 34.0)
            .with(Feature::BrakeWear, 81.0)
            .with(Feature::DaysSinceLastMaintenance, 151.0);
        let recommendations = DecisionEngine::default().recommend(0.1, &obs);

        let expected: Vec<String> = RECOMMENDATION_RULES
            .iter()
            .map(|rule| rule.message.to_string())
            .collect();
        assert_eq!(recommendations, expected);
    }

    #[test]
    fn test_rule_boundaries_do_not_fire() {
        let obs = Observation::new()
            .with(Feature::EngineTemperature, 95.0)
            .with(Feature::VibrationLevel, 7.0)
            .with(Feature::OilPressure, 35.0)
            .with(Feature::BrakeWear, 80.0)
            .with(Feature::DaysSinceLastMaintenance, 150.0);
        assert!(DecisionEngine::default().recommend(0.5, &obs).is_empty());
    }

    #[test]
    fn test_absent_oil_pressure_does_not_fire() {
        let rule = RECOMMENDATION_RULES[2];
        assert_eq!(rule.feature, Feature::OilPressure);
        assert!(!rule.fires(&Observation::new()));
        assert!(rule.fires(&Observation::new().with(Feature::OilPressure, 0.0)));
    }

    #[test]
    fn test_fallback_only_when_nothing_fired() {
        let engine = DecisionEngine::default();
        let quiet = Observation::new();

        assert_eq!(
            engine.recommend(0.71, &quiet),
            vec![FALLBACK_RECOMMENDATION.to_string()]
        );
        assert!(engine.recommend(0.7, &quiet).is_empty());

        let hot = Observation::new().with(Feature::EngineTemperature, 110.0);
        assert_eq!(
            engine.recommend(0.95, &hot),
            vec!["Check cooling system".to_string()]
        );
    }

    #[test]
    fn test_prediction_result_wire_names() {
        let result = PredictionResult::from_decision(
            true,
            0.9,
            DecisionEngine::default().decide(0.9, &Observation::new()),
        )
        .with_vehicle_id(Some("BUS-12".to_string()));
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["urgency"], "CRITICAL");
        assert_eq!(value["estimated_days"], 1);
        assert_eq!(value["vehicle_id"], "BUS-12");
        assert!(value["recommended_actions"].is_array());
        assert!(value.get("recommendations").is_none());
    }

    #[test]
    fn test_vehicle_id_omitted_when_absent() {
        let result = PredictionResult::from_decision(
            false,
            0.1,
            DecisionEngine::default().decide(0.1, &Observation::new()),
        );
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("vehicle_id").is_none());
    }
}
