// Score provider trait: the swap-ready abstraction.
//
// A provider turns text into per-category probabilities and nothing else.
// The relay talks to the remote scoring service through one implementation;
// the scoring service itself runs the local ONNX model through another. Tests
// plug in fakes.

use std::fmt;

use async_trait::async_trait;

use crate::error::ScoreError;

/// Number of toxicity categories.
pub const CATEGORY_COUNT: usize = 6;

/// Toxicity categories, in the fixed order used for reasons and labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Toxicity,
    SevereToxicity,
    Obscene,
    Threat,
    Insult,
    IdentityAttack,
}

impl Category {
    /// Every category in enumeration order.
    pub const ALL: [Category; CATEGORY_COUNT] = [
        Category::Toxicity,
        Category::SevereToxicity,
        Category::Obscene,
        Category::Threat,
        Category::Insult,
        Category::IdentityAttack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Toxicity => "toxicity",
            Category::SevereToxicity => "severe_toxicity",
            Category::Obscene => "obscene",
            Category::Threat => "threat",
            Category::Insult => "insult",
            Category::IdentityAttack => "identity_attack",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Category::ALL.into_iter().find(|c| c.as_str() == label)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probability per category, each in [0, 1]. Categories a provider did not
/// report score 0.0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryScores {
    scores: [f64; CATEGORY_COUNT],
}

impl CategoryScores {
    /// Build from (category, probability) pairs. Values are clamped to [0, 1];
    /// NaN becomes 0.0.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Category, f64)>) -> Self {
        let mut scores = [0.0; CATEGORY_COUNT];
        for (category, value) in pairs {
            scores[category.index()] = if value.is_nan() {
                0.0
            } else {
                value.clamp(0.0, 1.0)
            };
        }
        Self { scores }
    }

    pub fn get(&self, category: Category) -> f64 {
        self.scores[category.index()]
    }

    /// (category, probability) in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        Category::ALL.into_iter().map(|c| (c, self.get(c)))
    }
}

/// Anything that can score a piece of text.
#[async_trait]
pub trait ScoreProvider: Send + Sync {
    /// Score already-normalized text.
    async fn score_text(&self, text: &str) -> Result<CategoryScores, ScoreError>;
}
