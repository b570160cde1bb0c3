// Verdict aggregation: per-category scores → one toxic/non-toxic decision.
//
// A message is toxic when any category scores strictly above the threshold.
// The categories that do are the reasons, listed in category order. This is a
// pure function so it can be tested without a model or a network.

use crate::toxicity::traits::{Category, CategoryScores};

/// Default decision threshold, shared by the relay and the scoring service.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// The decision for one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub toxic: bool,
    /// The `toxicity` category score, shown in alerts.
    pub primary_score: f64,
    /// Categories above the threshold, in category order.
    pub reasons: Vec<Category>,
    pub categories: CategoryScores,
}

impl Verdict {
    /// Comma-joined reasons, or "toxic" when there are none.
    pub fn reasons_label(&self) -> String {
        if self.reasons.is_empty() {
            return "toxic".to_string();
        }
        self.reasons
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Aggregate category scores into a verdict.
pub fn decide(categories: &CategoryScores, threshold: f64) -> Verdict {
    let reasons: Vec<Category> = categories
        .iter()
        .filter(|(_, score)| *score > threshold)
        .map(|(category, _)| category)
        .collect();

    Verdict {
        toxic: !reasons.is_empty(),
        primary_score: categories.get(Category::Toxicity),
        reasons,
        categories: categories.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_scores_are_not_toxic() {
        let scores = CategoryScores::from_pairs([(Category::Toxicity, 0.01)]);
        let verdict = decide(&scores, DEFAULT_THRESHOLD);
        assert!(!verdict.toxic);
        assert!(verdict.reasons.is_empty());
        assert!((verdict.primary_score - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_score_equal_to_threshold_is_not_toxic() {
        let scores = CategoryScores::from_pairs([(Category::Insult, 0.5)]);
        assert!(!decide(&scores, 0.5).toxic);
    }

    #[test]
    fn test_secondary_category_alone_flags_message() {
        let scores = CategoryScores::from_pairs([
            (Category::Toxicity, 0.2),
            (Category::IdentityAttack, 0.9),
        ]);
        let verdict = decide(&scores, DEFAULT_THRESHOLD);
        assert!(verdict.toxic);
        assert_eq!(verdict.reasons, vec![Category::IdentityAttack]);
        assert!((verdict.primary_score - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_reasons_follow_category_order() {
        let scores = CategoryScores::from_pairs([
            (Category::Insult, 0.7),
            (Category::Threat, 0.81),
            (Category::Toxicity, 0.92),
        ]);
        let verdict = decide(&scores, DEFAULT_THRESHOLD);
        assert_eq!(
            verdict.reasons,
            vec![Category::Toxicity, Category::Threat, Category::Insult]
        );
        assert_eq!(verdict.reasons_label(), "toxicity, threat, insult");
    }

    #[test]
    fn test_empty_reasons_label_falls_back() {
        let verdict = Verdict {
            toxic: true,
            primary_score: 0.9,
            reasons: Vec::new(),
            categories: CategoryScores::default(),
        };
        assert_eq!(verdict.reasons_label(), "toxic");
    }
}
