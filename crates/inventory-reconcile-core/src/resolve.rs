//! Name resolution cascade.
//!
//! A raw name is resolved against an [`IdentityIndex`] by trying, in
//! order, and stopping at the first hit:
//!
//! 1. **exact**: normalized key lookup;
//! 2. **reversed**: token order reversed ("PEREZ JUAN" → "JUAN PEREZ");
//! 3. **token subset**: users sharing a significant token whose full name
//!    contains every significant input token;
//! 4. **fuzzy**: weighted slot comparison against every user.
//!
//! The order matters: the cheap, precise stages decide before the fuzzy
//! scan runs, and they decide which of several plausible users wins.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::compare::similarity_normalized;
use crate::index::IdentityIndex;
use crate::models::UserId;
use crate::normalize::{normalize, NormalizedName};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionResult {
    Resolved(UserId),
    Unresolved,
    /// Several users qualified and the tie-break policy refused to pick.
    Ambiguous(Vec<UserId>),
}

impl ResolutionResult {
    pub fn user(&self) -> Option<UserId> {
        match self {
            ResolutionResult::Resolved(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Exact,
    Reversed,
    TokenSubset,
    Fuzzy,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Exact => "exact",
            Stage::Reversed => "reversed",
            Stage::TokenSubset => "token-subset",
            Stage::Fuzzy => "fuzzy",
        }
    }
}

/// What to do when the token-subset stage finds more than one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// Pick the lowest user id.
    #[default]
    LowestId,
    /// Report the candidates as [`ResolutionResult::Ambiguous`].
    Reject,
}

/// Result of one resolution call with the stage that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub result: ResolutionResult,
    pub stage: Option<Stage>,
    /// Weighted similarity, for fuzzy matches only.
    pub score: Option<f64>,
}

impl Resolution {
    fn unresolved() -> Self {
        Resolution {
            result: ResolutionResult::Unresolved,
            stage: None,
            score: None,
        }
    }

    fn at(stage: Stage, result: ResolutionResult) -> Self {
        Resolution {
            result,
            stage: Some(stage),
            score: None,
        }
    }
}

pub struct Resolver<'a> {
    index: &'a IdentityIndex,
    tie_break: TieBreak,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a IdentityIndex) -> Self {
        Self {
            index,
            tie_break: TieBreak::default(),
        }
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn resolve(&self, raw: Option<&str>) -> Resolution {
        let name = match raw {
            Some(r) => normalize(r),
            None => return Resolution::unresolved(),
        };
        if name.is_empty() {
            return Resolution::unresolved();
        }

        if let Some(id) = self.index.exact(&name.key()) {
            return Resolution::at(Stage::Exact, ResolutionResult::Resolved(id));
        }

        if let Some(id) = self.reversed(&name) {
            return Resolution::at(Stage::Reversed, ResolutionResult::Resolved(id));
        }

        if let Some(result) = self.token_subset(&name) {
            return Resolution::at(Stage::TokenSubset, result);
        }

        if let Some((id, score)) = self.fuzzy(&name) {
            return Resolution {
                result: ResolutionResult::Resolved(id),
                stage: Some(Stage::Fuzzy),
                score: Some(score),
            };
        }

        Resolution::unresolved()
    }

    fn reversed(&self, name: &NormalizedName) -> Option<UserId> {
        self.index
            .exact(&name.reversed().key())
            .or_else(|| self.index.reversed(&name.key()))
    }

    fn token_subset(&self, name: &NormalizedName) -> Option<ResolutionResult> {
        let tokens: Vec<&str> = name.significant_tokens().collect();
        if tokens.is_empty() {
            return None;
        }

        let mut qualifying: BTreeSet<UserId> = BTreeSet::new();
        for token in &tokens {
            for (id, key) in self.index.token_candidates(token) {
                if tokens.iter().all(|t| key.contains(t)) {
                    qualifying.insert(*id);
                }
            }
        }

        let first = *qualifying.iter().next()?;
        if qualifying.len() == 1 {
            return Some(ResolutionResult::Resolved(first));
        }
        match self.tie_break {
            TieBreak::LowestId => Some(ResolutionResult::Resolved(first)),
            TieBreak::Reject => Some(ResolutionResult::Ambiguous(qualifying.into_iter().collect())),
        }
    }

    fn fuzzy(&self, name: &NormalizedName) -> Option<(UserId, f64)> {
        let mut best: Option<(UserId, f64)> = None;
        for user in self.index.users() {
            let sim = similarity_normalized(name, &user.name);
            if !sim.verdict {
                continue;
            }
            best = match best {
                Some((id, score))
                    if score > sim.score || (score == sim.score && id < user.id) =>
                {
                    Some((id, score))
                }
                _ => Some((user.id, sim.score)),
            };
        }
        best
    }
}

/// Resolve `raw` with the default tie-break policy.
pub fn resolve(index: &IdentityIndex, raw: &str) -> ResolutionResult {
    Resolver::new(index).resolve(Some(raw)).result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::NoopSink;
    use crate::models::CanonicalUser;

    fn registry() -> IdentityIndex {
        IdentityIndex::build(
            &[
                CanonicalUser::new(5, "JUAN PEREZ"),
                CanonicalUser::new(8, "María Fernanda López Gómez"),
                CanonicalUser::new(12, "Carlos Andrés Ruiz"),
                CanonicalUser::new(20, "Ana Ruiz Soto"),
                CanonicalUser::new(21, "Ana Ruiz Salas"),
            ],
            &NoopSink,
        )
    }

    #[test]
    fn blank_and_absent_are_unresolved() {
        let index = registry();
        assert_eq!(resolve(&index, ""), ResolutionResult::Unresolved);
        assert_eq!(resolve(&index, "  .. "), ResolutionResult::Unresolved);
        let r = Resolver::new(&index).resolve(None);
        assert_eq!(r.result, ResolutionResult::Unresolved);
        assert_eq!(r.stage, None);

        let empty = IdentityIndex::default();
        assert_eq!(resolve(&empty, ""), ResolutionResult::Unresolved);
    }

    #[test]
    fn every_display_name_resolves_to_itself() {
        let index = registry();
        for user in index.users() {
            let r = Resolver::new(&index).resolve(Some(&user.display_name));
            assert_eq!(r.result, ResolutionResult::Resolved(user.id));
            assert_eq!(r.stage, Some(Stage::Exact));
        }
    }

    #[test]
    fn reversed_order_resolves() {
        let index = registry();
        let r = Resolver::new(&index).resolve(Some("perez juan"));
        assert_eq!(r.result, ResolutionResult::Resolved(UserId(5)));
        assert_eq!(r.stage, Some(Stage::Reversed));

        let r = Resolver::new(&index).resolve(Some("Gomez Lopez Fernanda Maria"));
        assert_eq!(r.result, ResolutionResult::Resolved(UserId(8)));
    }

    #[test]
    fn token_subset_matches_partial_names() {
        let index = registry();
        let r = Resolver::new(&index).resolve(Some("Maria Lopez"));
        assert_eq!(r.result, ResolutionResult::Resolved(UserId(8)));
        assert_eq!(r.stage, Some(Stage::TokenSubset));
    }

    #[test]
    fn token_subset_tie_break() {
        let index = registry();
        // "ANA RUIZ" is contained in both 20 and 21.
        let r = Resolver::new(&index).resolve(Some("Ana Ruiz"));
        assert_eq!(r.result, ResolutionResult::Resolved(UserId(20)));

        let r = Resolver::new(&index)
            .with_tie_break(TieBreak::Reject)
            .resolve(Some("Ana Ruiz"));
        assert_eq!(
            r.result,
            ResolutionResult::Ambiguous(vec![UserId(20), UserId(21)])
        );
        assert_eq!(r.result.user(), None);
    }

    #[test]
    fn fuzzy_catches_typos() {
        let index = registry();
        // CARLOS ANDRES RUIZ: 3 tokens vs the typo'd 3 tokens.
        let r = Resolver::new(&index).resolve(Some("Carlos Andres Ruis"));
        assert_eq!(r.result, ResolutionResult::Resolved(UserId(12)));
        assert_eq!(r.stage, Some(Stage::Fuzzy));
        assert!(r.score.unwrap_or_default() >= 85.0);
    }

    #[test]
    fn fuzzy_ties_go_to_lowest_id() {
        let index = IdentityIndex::build(
            &[
                CanonicalUser::new(40, "Pablo Mora Vega"),
                CanonicalUser::new(30, "Pablo Mora Vega"),
            ],
            &NoopSink,
        );
        // Exact key belongs to 30 (last writer), so force the fuzzy stage.
        let r = Resolver::new(&index).resolve(Some("Pablo Mora Vegas"));
        assert_eq!(r.stage, Some(Stage::Fuzzy));
        assert_eq!(r.result, ResolutionResult::Resolved(UserId(30)));
    }

    #[test]
    fn unknown_name_is_unresolved() {
        let index = registry();
        assert_eq!(resolve(&index, "Pedro Perez"), ResolutionResult::Unresolved);
        assert_eq!(resolve(&index, "Zoe"), ResolutionResult::Unresolved);
    }

    #[test]
    fn repeated_calls_are_idempotent() {
        let index = registry();
        for raw in ["perez juan", "Ana Ruiz", "Carlos Andres Ruis", "nadie"] {
            assert_eq!(resolve(&index, raw), resolve(&index, raw));
        }
    }
}
