//! Nearest-neighbour identity matching over the enrolled gallery.

use crate::gallery::Identity;
use crate::types::Embedding;
use serde::Serialize;

/// Distance below which a live face is accepted as an enrolled identity.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.5;

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    /// The nearest identity lies strictly within the threshold.
    Accepted {
        identity: String,
        /// Enrollment index of the identity in the unfiltered gallery.
        index: usize,
        distance: f32,
    },
    /// No comparable identity, or the nearest one is at or beyond the threshold.
    NoMatch {
        /// Distance to the nearest comparable identity, if there was one.
        nearest: Option<f32>,
    },
}

impl MatchOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, MatchOutcome::Accepted { .. })
    }

    /// Accepted identity name, if any.
    pub fn identity(&self) -> Option<&str> {
        match self {
            MatchOutcome::Accepted { identity, .. } => Some(identity),
            MatchOutcome::NoMatch { .. } => None,
        }
    }
}

/// Strategy for comparing a probe embedding against a gallery of enrolled identities.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[Identity], threshold: f32) -> MatchOutcome;
}

/// Euclidean nearest-neighbour matcher.
///
/// Identities without an embedding, or with an embedding of a different
/// dimension than the probe, are skipped before any distance is computed.
/// Ties go to the earliest-enrolled identity.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[Identity], threshold: f32) -> MatchOutcome {
        let candidates = gallery.iter().enumerate().filter_map(|(index, identity)| {
            let enrolled = identity.embedding.as_ref()?;
            let distance = probe.euclidean_distance(enrolled);
            if distance.is_none() {
                tracing::trace!(
                    identity = %identity.name,
                    enrolled_dim = enrolled.dim(),
                    probe_dim = probe.dim(),
                    "skipping identity with mismatched embedding dimension"
                );
            }
            distance.map(|d| (index, d))
        });

        let mut best: Option<(usize, f32)> = None;
        for (index, distance) in candidates {
            // Strict comparison keeps the earliest index on ties; NaN never wins.
            let better = match best {
                None => !distance.is_nan(),
                Some((_, best_distance)) => distance < best_distance,
            };
            if better {
                best = Some((index, distance));
            }
        }

        match best {
            Some((index, distance)) if distance < threshold => MatchOutcome::Accepted {
                identity: gallery[index].name.clone(),
                index,
                distance,
            },
            Some((_, distance)) => MatchOutcome::NoMatch {
                nearest: Some(distance),
            },
            None => MatchOutcome::NoMatch { nearest: None },
        }
    }
}
