use serde::Serialize;

pub const GOOD_MATCH_PERCENT: f64 = 80.0;
pub const MEDIUM_MATCH_PERCENT: f64 = 60.0;

/// Percentage match between `reference` and `candidate`, in `[0, 100]`.
///
/// Both sides are lowercased and compared by Levenshtein distance over their
/// characters. Two empty strings are a perfect match.
pub fn score(reference: &str, candidate: &str) -> f64 {
    let reference: Vec<char> = reference.to_lowercase().chars().collect();
    let candidate: Vec<char> = candidate.to_lowercase().chars().collect();

    let distance = edit_distance(&reference, &candidate);
    let max_len = reference.len().max(candidate.len());
    if max_len == 0 {
        return 100.0;
    }

    ((max_len - distance) as f64 / max_len as f64) * 100.0
}

/// Unit-cost edit distance between two strings, case-sensitive.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    edit_distance(&a, &b)
}

// Rows walk the candidate, columns walk the reference.
fn edit_distance(reference: &[char], candidate: &[char]) -> usize {
    let rows = candidate.len() + 1;
    let cols = reference.len() + 1;
    let mut matrix = vec![vec![0usize; cols]; rows];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in matrix[0].iter_mut().enumerate() {
        *cell = j;
    }

    for i in 1..rows {
        for j in 1..cols {
            matrix[i][j] = if candidate[i - 1] == reference[j - 1] {
                matrix[i - 1][j - 1]
            } else {
                let substitution = matrix[i - 1][j - 1] + 1;
                let insertion = matrix[i][j - 1] + 1;
                let deletion = matrix[i - 1][j] + 1;
                substitution.min(insertion).min(deletion)
            };
        }
    }

    matrix[rows - 1][cols - 1]
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MatchGrade {
    Good,
    Medium,
    Poor,
}

impl MatchGrade {
    pub fn from_score(score_percent: f64) -> Self {
        if score_percent >= GOOD_MATCH_PERCENT {
            MatchGrade::Good
        } else if score_percent >= MEDIUM_MATCH_PERCENT {
            MatchGrade::Medium
        } else {
            MatchGrade::Poor
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        match self {
            MatchGrade::Good => "good",
            MatchGrade::Medium => "medium",
            MatchGrade::Poor => "poor",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityResult {
    pub reference_text: String,
    pub candidate_text: String,
    pub score_percent: f64,
}

impl SimilarityResult {
    pub fn compute(reference: &str, candidate: &str) -> Self {
        Self {
            reference_text: reference.to_string(),
            candidate_text: candidate.to_string(),
            score_percent: score(reference, candidate),
        }
    }

    pub fn grade(&self) -> MatchGrade {
        MatchGrade::from_score(self.score_percent)
    }
}
