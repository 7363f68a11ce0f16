//! Risk segmentation, churn-reason synthesis and strategy recommendation.
//!
//! Everything here is a pure function of the feature row and the model
//! output, so concurrent requests share nothing and always agree.

use crate::inference::ModelOutput;
use crate::models::{DecisionResult, FeatureRow};

/// Risk tier derived from the churn probability. Variant order follows
/// severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskSegment {
    Low,
    Medium,
    High,
}

impl RiskSegment {
    /// Boundaries are inclusive on the lower bound of each higher tier:
    /// p > 0.80 is High, 0.40 <= p <= 0.80 is Medium, p < 0.40 is Low.
    pub fn from_probability(probability: f64) -> Self {
        if probability > 0.80 {
            RiskSegment::High
        } else if probability >= 0.40 {
            RiskSegment::Medium
        } else {
            RiskSegment::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskSegment::High => "High Risk",
            RiskSegment::Medium => "Medium Risk",
            RiskSegment::Low => "Low Risk",
        }
    }

    pub fn strategy(self) -> &'static str {
        match self {
            RiskSegment::High => {
                "assign a retention agent within 24 hours and offer a loyalty benefit."
            }
            RiskSegment::Medium => "send an engagement communication and monitor usage weekly.",
            RiskSegment::Low => "send an appreciation note and track monthly.",
        }
    }
}

/// Status line keyed on the hard label only, not the probability.
fn status_message(label: u8) -> &'static str {
    if label == 1 {
        "churn risk detected – customer requires retention intervention"
    } else {
        "customer appears stable – no immediate churn indicators."
    }
}

/// Behavioral rules in fixed order. Every rule that fires contributes one
/// clause; evaluation is never short-circuited.
fn churn_signals(row: &FeatureRow) -> Vec<&'static str> {
    let mut signals = Vec::new();
    if row.loans_accessed == 0.0 {
        signals.push("hasn't accessed loans recently");
    }
    if row.loans_taken > 4.0 {
        signals.push("multiple declined loan attempts");
    }
    if row.login_total < 0.3 {
        signals.push("very low app login activity");
    }
    if row.overdraft_events > 2.0 {
        signals.push("frequent overdraft events");
    }
    if row.tickets_raised > 3.0 {
        signals.push("multiple support tickets raised");
    }
    if row.sentiment_score < 0.3 {
        signals.push("low customer sentiment");
    }
    if row.monthly_avg_balance < 1000.0 {
        signals.push("consistently low average balance");
    }
    if row.credit_score < 400.0 {
        signals.push("very poor credit score");
    }
    signals
}

fn churn_reason(row: &FeatureRow, label: u8, segment: RiskSegment) -> String {
    if label != 1 {
        return "no strong churn signals detected; customer appears healthy based on current usage behavior".to_string();
    }
    let signals = churn_signals(row);
    if signals.is_empty() {
        if segment == RiskSegment::Medium {
            "churn predicted due to moderate behavioral signals not captured in the current rule set"
                .to_string()
        } else {
            "churn predicted, but no dominant behavioral churn signal identified.".to_string()
        }
    } else {
        format!(
            "The customer is likely to churn because {}.",
            signals.join("; ")
        )
    }
}

fn round4(probability: f64) -> f64 {
    (probability * 10_000.0).round() / 10_000.0
}

/// Composes the full decision payload. The segment is derived from the raw
/// probability; only the reported value is rounded.
pub fn decide(row: &FeatureRow, output: &ModelOutput) -> DecisionResult {
    let segment = RiskSegment::from_probability(output.probability);
    let strategy = segment.strategy();
    DecisionResult {
        prediction: output.label,
        churn_probability: round4(output.probability),
        risk_segment: segment.as_str().to_string(),
        message: status_message(output.label).to_string(),
        churn_reason: churn_reason(row, output.label, segment),
        recommended_strategy: strategy.to_string(),
        final_action: format!("{} → {}", segment.as_str(), strategy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_row() -> FeatureRow {
        FeatureRow {
            loans_accessed: 1.0,
            loans_taken: 0.0,
            login_total: 0.9,
            overdraft_events: 0.0,
            tickets_raised: 0.0,
            sentiment_score: 0.9,
            monthly_avg_balance: 5000.0,
            credit_score: 700.0,
        }
    }

    fn risky_row() -> FeatureRow {
        FeatureRow {
            loans_accessed: 0.0,
            loans_taken: 5.0,
            login_total: 0.1,
            overdraft_events: 3.0,
            tickets_raised: 4.0,
            sentiment_score: 0.2,
            monthly_avg_balance: 500.0,
            credit_score: 350.0,
        }
    }

    #[test]
    fn segment_boundaries_are_exact() {
        assert_eq!(RiskSegment::from_probability(0.80), RiskSegment::Medium);
        assert_eq!(RiskSegment::from_probability(0.80001), RiskSegment::High);
        assert_eq!(RiskSegment::from_probability(0.40), RiskSegment::Medium);
        assert_eq!(RiskSegment::from_probability(0.39999), RiskSegment::Low);
        assert_eq!(RiskSegment::from_probability(0.0), RiskSegment::Low);
        assert_eq!(RiskSegment::from_probability(1.0), RiskSegment::High);
    }

    #[test]
    fn segment_never_decreases_as_probability_rises() {
        let mut previous = RiskSegment::Low;
        for step in 0..=1000 {
            let segment = RiskSegment::from_probability(f64::from(step) / 1000.0);
            assert!(segment >= previous);
            previous = segment;
        }
    }

    #[test]
    fn probability_is_rounded_to_four_decimals() {
        let output = ModelOutput {
            label: 1,
            probability: f64::from(0.85_f32),
        };
        let result = decide(&risky_row(), &output);
        assert_eq!(result.churn_probability, 0.85);
        assert!((0.0..=1.0).contains(&result.churn_probability));

        let output = ModelOutput {
            label: 0,
            probability: 0.123456,
        };
        let result = decide(&healthy_row(), &output);
        assert_eq!(result.churn_probability, 0.1235);
    }

    #[test]
    fn stable_customer_reason_ignores_features() {
        let output = ModelOutput {
            label: 0,
            probability: 0.1,
        };
        for row in [healthy_row(), risky_row()] {
            let result = decide(&row, &output);
            assert_eq!(
                result.churn_reason,
                "no strong churn signals detected; customer appears healthy based on current usage behavior"
            );
            assert_eq!(
                result.message,
                "customer appears stable – no immediate churn indicators."
            );
        }
    }

    #[test]
    fn all_firing_rules_contribute_in_fixed_order() {
        let output = ModelOutput {
            label: 1,
            probability: 0.85,
        };
        let result = decide(&risky_row(), &output);
        assert_eq!(result.risk_segment, "High Risk");
        assert_eq!(
            result.churn_reason,
            "The customer is likely to churn because hasn't accessed loans recently; \
             multiple declined loan attempts; very low app login activity; \
             frequent overdraft events; multiple support tickets raised; \
             low customer sentiment; consistently low average balance; \
             very poor credit score."
        );
        assert_eq!(
            result.final_action,
            "High Risk → assign a retention agent within 24 hours and offer a loyalty benefit."
        );
        assert_eq!(
            result.message,
            "churn risk detected – customer requires retention intervention"
        );
    }

    #[test]
    fn non_adjacent_rules_keep_table_order() {
        let mut row = healthy_row();
        row.loans_taken = 5.0;
        row.credit_score = 350.0;
        let output = ModelOutput {
            label: 1,
            probability: 0.6,
        };
        let result = decide(&row, &output);
        assert_eq!(
            result.churn_reason,
            "The customer is likely to churn because multiple declined loan attempts; very poor credit score."
        );
    }

    #[test]
    fn single_rule_still_gets_prefix_and_period() {
        let mut row = healthy_row();
        row.sentiment_score = 0.1;
        let output = ModelOutput {
            label: 1,
            probability: 0.5,
        };
        let result = decide(&row, &output);
        assert_eq!(
            result.churn_reason,
            "The customer is likely to churn because low customer sentiment."
        );
    }

    #[test]
    fn rule_thresholds_are_strict() {
        let mut row = healthy_row();
        // boundary values must not fire
        row.loans_taken = 4.0;
        row.login_total = 0.3;
        row.overdraft_events = 2.0;
        row.tickets_raised = 3.0;
        row.sentiment_score = 0.3;
        row.monthly_avg_balance = 1000.0;
        row.credit_score = 400.0;
        assert!(churn_signals(&row).is_empty());
    }

    #[test]
    fn medium_risk_fallback_when_no_rule_fires() {
        let output = ModelOutput {
            label: 1,
            probability: 0.6,
        };
        let result = decide(&healthy_row(), &output);
        assert_eq!(result.risk_segment, "Medium Risk");
        assert_eq!(
            result.churn_reason,
            "churn predicted due to moderate behavioral signals not captured in the current rule set"
        );
        assert_eq!(
            result.final_action,
            "Medium Risk → send an engagement communication and monitor usage weekly."
        );
    }

    #[test]
    fn other_tiers_fall_back_to_no_dominant_signal() {
        for probability in [0.95, 0.2] {
            let output = ModelOutput {
                label: 1,
                probability,
            };
            let result = decide(&healthy_row(), &output);
            assert_eq!(
                result.churn_reason,
                "churn predicted, but no dominant behavioral churn signal identified."
            );
        }
    }

    #[test]
    fn low_risk_strategy_and_action() {
        let output = ModelOutput {
            label: 0,
            probability: 0.05,
        };
        let result = decide(&healthy_row(), &output);
        assert_eq!(result.risk_segment, "Low Risk");
        assert_eq!(
            result.recommended_strategy,
            "send an appreciation note and track monthly."
        );
        assert_eq!(
            result.final_action,
            "Low Risk → send an appreciation note and track monthly."
        );
    }

    #[test]
    fn decision_is_idempotent() {
        let output = ModelOutput {
            label: 1,
            probability: 0.7321,
        };
        let first = decide(&risky_row(), &output);
        let second = decide(&risky_row(), &output);
        assert_eq!(first, second);
    }
}
