// Scoring service wire format.
//
// POST /analyze {"text": "..."}  →  {"toxic", "toxicity", "labels", "reasons"}
//
// The relay sends requests and reads responses; the scoring service does the
// reverse. Both sides share these types so the contract lives in one place.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scoring::Verdict;
use crate::toxicity::traits::{Category, CategoryScores};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub toxic: bool,
    pub toxicity: f64,
    pub labels: BTreeMap<String, f64>,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl ScoreResponse {
    pub fn from_verdict(verdict: &Verdict) -> Self {
        Self {
            toxic: verdict.toxic,
            toxicity: verdict.primary_score,
            labels: verdict
                .categories
                .iter()
                .map(|(category, score)| (category.as_str().to_string(), score))
                .collect(),
            reasons: verdict.reasons.iter().map(|c| c.as_str().to_string()).collect(),
        }
    }

    /// Category scores carried by the response. Unknown labels are ignored;
    /// when `labels` has no `toxicity` entry the top-level score fills it in.
    pub fn category_scores(&self) -> CategoryScores {
        let mut pairs: Vec<(Category, f64)> = self
            .labels
            .iter()
            .filter_map(|(label, score)| Category::from_label(label).map(|c| (c, *score)))
            .collect();
        if !self.labels.contains_key(Category::Toxicity.as_str()) {
            pairs.push((Category::Toxicity, self.toxicity));
        }
        CategoryScores::from_pairs(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{decide, DEFAULT_THRESHOLD};

    #[test]
    fn test_deserialize_service_response() {
        let json = r#"{
            "toxic": true,
            "toxicity": 0.92,
            "labels": {"toxicity": 0.92, "severe_toxicity": 0.1, "obscene": 0.2,
                       "threat": 0.81, "insult": 0.3, "identity_attack": 0.05},
            "reasons": ["toxicity", "threat"]
        }"#;
        let resp: ScoreResponse = serde_json::from_str(json).unwrap();
        let scores = resp.category_scores();
        assert_eq!(scores.get(Category::Threat), 0.81);
        assert_eq!(scores.get(Category::IdentityAttack), 0.05);
        assert_eq!(resp.reasons, vec!["toxicity", "threat"]);
    }

    #[test]
    fn test_missing_labels_fall_back_to_toxicity_field() {
        let json = r#"{"toxic": false, "toxicity": 0.3, "labels": {}}"#;
        let resp: ScoreResponse = serde_json::from_str(json).unwrap();
        let scores = resp.category_scores();
        assert_eq!(scores.get(Category::Toxicity), 0.3);
        assert!(resp.reasons.is_empty());
    }

    #[test]
    fn test_unknown_labels_are_ignored() {
        let json = r#"{"toxic": true, "toxicity": 0.1, "labels": {"sexual_explicit": 0.99}}"#;
        let resp: ScoreResponse = serde_json::from_str(json).unwrap();
        let verdict = decide(&resp.category_scores(), DEFAULT_THRESHOLD);
        assert!(!verdict.toxic);
    }

    #[test]
    fn test_from_verdict_lists_every_label() {
        let scores =
            CategoryScores::from_pairs([(Category::Toxicity, 0.9), (Category::Insult, 0.6)]);
        let resp = ScoreResponse::from_verdict(&decide(&scores, DEFAULT_THRESHOLD));
        assert!(resp.toxic);
        assert_eq!(resp.labels.len(), 6);
        assert_eq!(resp.reasons, vec!["toxicity", "insult"]);
        assert_eq!(resp.toxicity, 0.9);
    }

    #[test]
    fn test_missing_required_field_is_an_error() {
        let json = r#"{"toxicity": 0.3, "labels": {}}"#;
        assert!(serde_json::from_str::<ScoreResponse>(json).is_err());
    }
}
