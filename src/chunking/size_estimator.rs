//! Size estimation for chunk budgeting
//!
//! The estimate is a cheap stand-in for a tokenizer. It only needs to be
//! deterministic and monotonic under concatenation.

/// Keywords that tend to tokenize densely in source code.
///
/// None of these can overlap with itself, so substring counts never shrink
/// when more text is appended.
const CODE_KEYWORDS: &[&str] = &[
    "fn", "let", "const", "return", "import", "export", "class", "function", "def", "struct",
    "impl", "async", "await", "match", "while", "for", "if", "else", "pub", "var",
];

/// Size estimator trait for different costing strategies
pub trait SizeEstimator: Send + Sync {
    /// Estimate the cost of the given text
    fn estimate(&self, text: &str) -> usize;

    /// Estimate costs for multiple texts
    fn estimate_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|t| self.estimate(t)).collect()
    }

    /// Cost of a line as it appears inside joined chunk content.
    ///
    /// Includes the line separator so that the sum of line costs is never
    /// below the cost of the joined text.
    fn estimate_line(&self, line: &str) -> usize {
        let mut owned = String::with_capacity(line.len() + 1);
        owned.push_str(line);
        owned.push('\n');
        self.estimate(&owned)
    }
}

/// Character-ratio estimator with a bias for code syntax
#[derive(Debug, Clone)]
pub struct HeuristicEstimator {
    chars_per_token: f64,
    structural_bonus: f64,
    keyword_bonus: f64,
}

impl HeuristicEstimator {
    pub fn new(chars_per_token: f64, structural_bonus: f64, keyword_bonus: f64) -> Self {
        Self {
            chars_per_token,
            structural_bonus,
            keyword_bonus,
        }
    }

    fn is_structural(c: char) -> bool {
        matches!(
            c,
            '{' | '}' | '(' | ')' | '[' | ']' | ';' | ':' | ',' | '.' | '<' | '>' | '=' | '+'
                | '-' | '*' | '/' | '&' | '|' | '!' | '"' | '\''
        )
    }
}

impl Default for HeuristicEstimator {
    fn default() -> Self {
        Self::new(3.5, 0.1, 0.5)
    }
}

impl SizeEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let chars = text.chars().count() as f64;
        let structural = text.chars().filter(|c| Self::is_structural(*c)).count() as f64;
        let keywords: usize = CODE_KEYWORDS.iter().map(|kw| text.matches(kw).count()).sum();

        let cost = chars / self.chars_per_token
            + structural * self.structural_bonus
            + keywords as f64 * self.keyword_bonus;

        cost.ceil() as usize
    }
}
