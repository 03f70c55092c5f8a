use rollcall_devices::face::{cosine_distance, euclidean_distance};
use rollcall_devices::{FaceProbe, FeatureVector, SensorSlot};
use serde::{Deserialize, Serialize};

use crate::storage::IdentityStore;

/// Result of running one probe through a matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Accepted(String),
    Rejected,
    /// No usable face in the frame; keep scanning without a "not recognized" message.
    NoFaceDetected,
    /// Fingerprint image too poor to featurize; re-prompt.
    CaptureFailed,
    /// The sensor matched a slot that no stored identity owns.
    InconsistentState { slot: SensorSlot },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    Euclidean,
    Cosine,
}

impl Distance {
    pub fn between(self, a: &FeatureVector, b: &FeatureVector) -> f32 {
        match self {
            Distance::Euclidean => euclidean_distance(a, b),
            Distance::Cosine => cosine_distance(a, b),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FaceMatcher {
    pub threshold: f32,
    pub distance: Distance,
}

impl FaceMatcher {
    pub fn new(threshold: f32, distance: Distance) -> Self {
        Self {
            threshold,
            distance,
        }
    }

    pub fn match_probe(&self, store: &IdentityStore, probe: &FaceProbe) -> MatchOutcome {
        match probe {
            FaceProbe::NoFaceDetected => MatchOutcome::NoFaceDetected,
            FaceProbe::Features(features) => match self.best_match(store, features) {
                Some((identity_id, distance)) if distance < self.threshold => {
                    log::debug!(
                        "face accepted: {} at {:.3} (threshold {:.3})",
                        identity_id,
                        distance,
                        self.threshold
                    );
                    MatchOutcome::Accepted(identity_id.to_string())
                }
                Some((identity_id, distance)) => {
                    log::debug!(
                        "face rejected: nearest {} at {:.3} (threshold {:.3})",
                        identity_id,
                        distance,
                        self.threshold
                    );
                    MatchOutcome::Rejected
                }
                None => MatchOutcome::Rejected,
            },
        }
    }

    /// Nearest enrolled face and its distance. On an exact tie the identity that
    /// comes first in store order wins.
    pub fn best_match<'s>(
        &self,
        store: &'s IdentityStore,
        probe: &FeatureVector,
    ) -> Option<(&'s str, f32)> {
        let mut best: Option<(&'s str, f32)> = None;
        for identity in store.all().values() {
            let Some(template) = identity.face_template.as_ref() else {
                continue;
            };
            if template.len() != probe.len() {
                log::warn!(
                    "face template of {} has {} values, probe has {}; skipped",
                    identity.identity_id,
                    template.len(),
                    probe.len()
                );
                continue;
            }
            let d = self.distance.between(template, probe);
            if !d.is_finite() {
                log::warn!(
                    "face distance to {} is not finite; skipped",
                    identity.identity_id
                );
                continue;
            }
            match best {
                Some((_, current)) if current <= d => {}
                _ => best = Some((identity.identity_id.as_str(), d)),
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use crate::identity::{Identity, IdentityUpdate};
    use tempfile::TempDir;

    fn store_with(faces: &[(&str, Vec<f32>)]) -> (TempDir, IdentityStore) {
        let tmp = TempDir::new().unwrap();
        let mut store = IdentityStore::load(&tmp.path().join("identities.bin")).unwrap();
        for (id, face) in faces {
            store
                .upsert(id, IdentityUpdate::face(FeatureVector::new(face.clone())))
                .unwrap();
        }
        (tmp, store)
    }

    fn probe(values: Vec<f32>) -> FaceProbe {
        FaceProbe::Features(FeatureVector::new(values))
    }

    #[test]
    fn test_reflexive() {
        let (_tmp, store) = store_with(&[("u1", vec![0.1, 0.9]), ("u2", vec![0.9, 0.1])]);
        let matcher = FaceMatcher::new(0.5, Distance::Euclidean);
        for identity in store.all().values() {
            let template = identity.face_template.as_ref().unwrap();
            let (id, d) = matcher.best_match(&store, template).unwrap();
            assert_eq!(id, identity.identity_id);
            assert_eq!(d, 0.0);
        }
    }

    #[test]
    fn test_within_threshold_accepted() {
        let (_tmp, store) = store_with(&[("u1", vec![0.0, 0.0])]);
        let matcher = FaceMatcher::new(0.5, Distance::Euclidean);
        assert_eq!(
            matcher.match_probe(&store, &probe(vec![0.3, 0.0])),
            MatchOutcome::Accepted("u1".into())
        );
    }

    #[test]
    fn test_beyond_threshold_rejected() {
        let (_tmp, store) = store_with(&[("u1", vec![0.0, 0.0]), ("u2", vec![2.0, 0.0])]);
        let matcher = FaceMatcher::new(0.5, Distance::Euclidean);
        assert_eq!(
            matcher.match_probe(&store, &probe(vec![1.0, 0.0])),
            MatchOutcome::Rejected
        );
        // Exactly at the threshold is not below it.
        assert_eq!(
            matcher.match_probe(&store, &probe(vec![0.5, 0.0])),
            MatchOutcome::Rejected
        );
    }

    #[test]
    fn test_nearest_wins() {
        let (_tmp, store) = store_with(&[("u1", vec![0.0, 0.0]), ("u2", vec![0.4, 0.0])]);
        let matcher = FaceMatcher::new(0.5, Distance::Euclidean);
        assert_eq!(
            matcher.match_probe(&store, &probe(vec![0.3, 0.0])),
            MatchOutcome::Accepted("u2".into())
        );
    }

    #[test]
    fn test_exact_tie_takes_store_order() {
        let (_tmp, store) = store_with(&[("b", vec![0.2, 0.0]), ("a", vec![-0.2, 0.0])]);
        let matcher = FaceMatcher::new(0.5, Distance::Euclidean);
        assert_eq!(
            matcher.match_probe(&store, &probe(vec![0.0, 0.0])),
            MatchOutcome::Accepted("a".into())
        );
    }

    #[test]
    fn test_empty_store_rejects() {
        let (_tmp, store) = store_with(&[]);
        let matcher = FaceMatcher::new(0.5, Distance::Euclidean);
        assert_eq!(
            matcher.match_probe(&store, &probe(vec![0.0, 0.0])),
            MatchOutcome::Rejected
        );
    }

    #[test]
    fn test_no_face_passes_through() {
        let (_tmp, store) = store_with(&[("u1", vec![0.0])]);
        let matcher = FaceMatcher::new(0.5, Distance::Euclidean);
        assert_eq!(
            matcher.match_probe(&store, &FaceProbe::NoFaceDetected),
            MatchOutcome::NoFaceDetected
        );
    }

    #[test]
    fn test_skips_pending_and_mismatched_lengths() {
        let (_tmp, mut store) = store_with(&[("long", vec![0.0, 0.0, 0.0])]);
        store.upsert("pending", IdentityUpdate::name("Pat")).unwrap();
        let matcher = FaceMatcher::new(0.5, Distance::Euclidean);
        assert_eq!(
            matcher.match_probe(&store, &probe(vec![0.0, 0.0])),
            MatchOutcome::Rejected
        );
    }

    #[test]
    fn test_nan_distance_never_displaces_a_match() {
        let mut identities = BTreeMap::new();
        for (id, face) in [("a", vec![0.0, 0.0]), ("b", vec![f32::NAN, 0.0])] {
            let mut identity = Identity::new(id, id);
            identity.face_template = Some(FeatureVector::new(face));
            identities.insert(id.to_string(), identity);
        }
        let store = IdentityStore::from_identities(PathBuf::from("unused.bin"), identities);
        let matcher = FaceMatcher::new(0.5, Distance::Euclidean);
        assert_eq!(
            matcher.match_probe(&store, &probe(vec![0.0, 0.0])),
            MatchOutcome::Accepted("a".into())
        );
    }

    #[test]
    fn test_cosine_metric() {
        let (_tmp, store) = store_with(&[("u1", vec![1.0, 0.0]), ("u2", vec![0.0, 1.0])]);
        let matcher = FaceMatcher::new(0.1, Distance::Cosine);
        assert_eq!(
            matcher.match_probe(&store, &probe(vec![5.0, 0.2])),
            MatchOutcome::Accepted("u1".into())
        );
    }
}
