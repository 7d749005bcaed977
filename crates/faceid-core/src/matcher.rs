//! Gallery ranking: scores a probe against every enrolled identity.

use crate::error::DimensionMismatch;
use crate::types::{EnrollmentRecord, Embedding};

/// Score reported when there is nothing to compare against.
/// Sits below any valid cosine value.
pub const NO_CANDIDATE_SCORE: f32 = -1.0;

/// Highest-scoring candidate of one ranking pass.
#[derive(Debug, Clone, Copy)]
pub struct BestMatch<'a> {
    /// `None` only when the candidate set was empty.
    pub candidate: Option<&'a EnrollmentRecord>,
    /// Cosine similarity of the best candidate, or [`NO_CANDIDATE_SCORE`].
    pub score: f32,
}

impl BestMatch<'_> {
    pub fn user_id(&self) -> Option<&str> {
        self.candidate.map(|record| record.user_id.as_str())
    }

    /// Accept/reject belongs to the caller; this is the comparison it should use.
    pub fn meets(&self, threshold: f32) -> bool {
        self.candidate.is_some() && self.score >= threshold
    }
}

/// Strategy for ranking a probe embedding against a gallery of enrolled faces.
///
/// Implementations rank and report only. They never decide acceptance.
pub trait Matcher {
    fn best_match<'a, I>(
        &self,
        probe: &Embedding,
        candidates: I,
    ) -> Result<BestMatch<'a>, DimensionMismatch>
    where
        I: IntoIterator<Item = &'a EnrollmentRecord>;
}

/// Cosine similarity matcher with full gallery traversal.
///
/// Every candidate is scored, no early exit. Exact ties keep the first
/// candidate seen, so the winner is fixed by the iteration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn best_match<'a, I>(
        &self,
        probe: &Embedding,
        candidates: I,
    ) -> Result<BestMatch<'a>, DimensionMismatch>
    where
        I: IntoIterator<Item = &'a EnrollmentRecord>,
    {
        let mut best = BestMatch {
            candidate: None,
            score: NO_CANDIDATE_SCORE,
        };

        for record in candidates {
            let score = probe.similarity(&record.embedding)?;
            // First candidate always wins the slot, even at exactly -1.0.
            if best.candidate.is_none() || score > best.score {
                best = BestMatch {
                    candidate: Some(record),
                    score,
                };
            }
        }

        Ok(best)
    }
}
