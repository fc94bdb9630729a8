//! Weighted per-slot fuzzy comparison of two names.
//!
//! Both names are partitioned into four slots (see
//! [`NamePartition`]). Each slot gets a 0–100 ratio; a slot below its
//! threshold vetoes the match, two or more "marginal" slots veto it as
//! well, and otherwise the weighted average must reach [`MATCH_SCORE`].

use crate::normalize::{normalize, NamePartition, NormalizedName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    First1,
    First2,
    Last1,
    Last2,
}

impl Slot {
    pub const ALL: [Slot; 4] = [Slot::First1, Slot::First2, Slot::Last1, Slot::Last2];

    pub fn weight(self) -> f64 {
        match self {
            Slot::First1 => 0.25,
            Slot::First2 => 0.15,
            Slot::Last1 => 0.30,
            Slot::Last2 => 0.30,
        }
    }

    /// Minimum ratio below which the slot vetoes the match.
    pub fn threshold(self) -> f64 {
        match self {
            Slot::First1 => 85.0,
            Slot::First2 => 75.0,
            Slot::Last1 => 85.0,
            Slot::Last2 => 75.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Slot::First1 => "first1",
            Slot::First2 => "first2",
            Slot::Last1 => "last1",
            Slot::Last2 => "last2",
        }
    }

    fn of(self, p: &NamePartition) -> &str {
        match self {
            Slot::First1 => &p.first1,
            Slot::First2 => &p.first2,
            Slot::Last1 => &p.last1,
            Slot::Last2 => &p.last2,
        }
    }
}

/// Scores at or above a slot's threshold but below this are marginal.
pub const MARGINAL_CEILING: f64 = 90.0;

/// Marginal slots tolerated before the match is rejected.
pub const MAX_MARGINAL_SLOTS: usize = 1;

/// Weighted average required for a positive verdict.
pub const MATCH_SCORE: f64 = 85.0;

/// Per-slot ratios of one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PartScores {
    pub first1: f64,
    pub first2: f64,
    pub last1: f64,
    pub last2: f64,
}

impl PartScores {
    pub fn get(&self, slot: Slot) -> f64 {
        match slot {
            Slot::First1 => self.first1,
            Slot::First2 => self.first2,
            Slot::Last1 => self.last1,
            Slot::Last2 => self.last2,
        }
    }

    fn set(&mut self, slot: Slot, value: f64) {
        match slot {
            Slot::First1 => self.first1 = value,
            Slot::First2 => self.first2 = value,
            Slot::Last1 => self.last1 = value,
            Slot::Last2 => self.last2 = value,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, f64)> + '_ {
        Slot::ALL.into_iter().map(move |s| (s, self.get(s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub verdict: bool,
    /// Weighted average of the slot ratios, 0–100.
    pub score: f64,
    pub per_part: PartScores,
}

impl Similarity {
    fn none() -> Self {
        Similarity {
            verdict: false,
            score: 0.0,
            per_part: PartScores::default(),
        }
    }
}

/// Fuzzy ratio in [0, 100] based on normalized Levenshtein distance.
/// Two empty strings are identical; an empty string against a non-empty
/// one scores 0.
pub fn ratio(a: &str, b: &str) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 100.0,
        (true, false) | (false, true) => 0.0,
        _ => strsim::normalized_levenshtein(a, b) * 100.0,
    }
}

/// Compare two raw names.
pub fn similarity(a: &str, b: &str) -> Similarity {
    similarity_normalized(&normalize(a), &normalize(b))
}

/// Compare two already-normalized names. Total: degenerate names never
/// match.
pub fn similarity_normalized(a: &NormalizedName, b: &NormalizedName) -> Similarity {
    if a.is_empty() || b.is_empty() {
        return Similarity::none();
    }

    let pa = NamePartition::from_normalized(a);
    let pb = NamePartition::from_normalized(b);

    let mut per_part = PartScores::default();
    let mut vetoed = false;
    let mut marginal = 0usize;
    let mut weighted = 0.0;

    for slot in Slot::ALL {
        let r = ratio(slot.of(&pa), slot.of(&pb));
        per_part.set(slot, r);
        weighted += r * slot.weight();

        if r < slot.threshold() {
            vetoed = true;
        } else if r < MARGINAL_CEILING {
            marginal += 1;
        }
    }

    let verdict = !vetoed && marginal <= MAX_MARGINAL_SLOTS && weighted >= MATCH_SCORE;

    Similarity {
        verdict,
        score: weighted,
        per_part,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn weights_sum_to_one() {
        let total: f64 = Slot::ALL.iter().map(|s| s.weight()).sum();
        assert!(approx(total, 1.0));
    }

    #[test]
    fn identical_names_score_100() {
        let s = similarity("JUAN PEREZ GOMEZ", "JUAN PEREZ GOMEZ");
        assert!(s.verdict);
        assert!(approx(s.score, 100.0));
        for (_, r) in s.per_part.iter() {
            assert!(approx(r, 100.0));
        }
    }

    #[test]
    fn accents_and_case_do_not_matter() {
        let s = similarity("josé pérez gómez", "JOSE PEREZ GOMEZ");
        assert!(s.verdict);
        assert!(approx(s.score, 100.0));
    }

    #[test]
    fn different_first_name_is_vetoed() {
        let s = similarity("JUAN PEREZ", "PEDRO PEREZ");
        assert!(!s.verdict);
        assert!(s.per_part.first1 < Slot::First1.threshold());
    }

    #[test]
    fn single_typo_in_long_surname_passes() {
        // last2: GONZALEZ vs GONZALES = 1 - 1/8 = 87.5, marginal but alone
        let s = similarity("MARIA LOPEZ GONZALEZ", "MARIA LOPEZ GONZALES");
        assert!(approx(s.per_part.last2, 87.5));
        assert!(s.verdict, "{:?}", s);
    }

    #[test]
    fn two_marginal_slots_are_rejected() {
        // Both surnames land in [threshold, 90): 87.5 each.
        let s = similarity("MARIA GONZALEZ MARTINEZ", "MARIA GONZALES MARTINES");
        assert!(approx(s.per_part.last1, 87.5));
        assert!(approx(s.per_part.last2, 87.5));
        assert!(s.score >= MATCH_SCORE);
        assert!(!s.verdict);
    }

    #[test]
    fn missing_slot_on_one_side_vetoes() {
        // 3 tokens vs 2 tokens: last2 is empty on one side only.
        let s = similarity("JUAN PEREZ GOMEZ", "JUAN PEREZ");
        assert!(approx(s.per_part.last2, 0.0));
        assert!(!s.verdict);
    }

    #[test]
    fn degenerate_names_score_low() {
        let s = similarity("", "");
        assert!(!s.verdict);
        assert!(approx(s.score, 0.0));
        let s = similarity("!!!", "JUAN");
        assert!(!s.verdict);
    }

    #[test]
    fn ratio_edges() {
        assert!(approx(ratio("", ""), 100.0));
        assert!(approx(ratio("", "A"), 0.0));
        assert!(approx(ratio("PEREZ", "PEREZ"), 100.0));
        assert!(approx(ratio("PEREZ", "PERES"), 80.0));
    }
}
