//! Component B: Recognition Worker.
//!
//! Consumes decoded frames, matches against a TTL-cached gallery, and
//! maintains the in-session running average described in §4.2. The face
//! embedding model itself is out of scope (§1) — callers provide one via
//! [`FaceEmbedder`].

use crate::config::RecognitionConfig;
use crate::embedding::{fold_average, similarity};
use crate::error::Result;
use crate::store::Store;
use crate::types::{new_unnamed_person_id, Embedding, GalleryEntry, PersonId, PersonObservation};
use chrono::Utc;
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// External collaborator: decode + detect + embed a JPEG frame.
///
/// A pure function `image -> embedding | none` with a confidence score, per
/// §1's "out of scope" boundary.
pub trait FaceEmbedder: Send + Sync {
    /// Returns `Some((embedding, detection_score))` when a face is found,
    /// `None` when decoding fails or no face is present.
    fn embed(&self, jpeg: &[u8]) -> Option<(Embedding, f32)>;
}

/// The in-session running average for one matched person.
struct RunningAverage {
    avg: Embedding,
    count: u32,
}

/// Owns the gallery cache and per-session running averages (§3 ownership
/// rule: exactly one Recognition Worker owns these).
pub struct RecognitionWorker<E: FaceEmbedder> {
    config: RecognitionConfig,
    store: Store,
    embedder: E,
    gallery_cache: Cache<(), Vec<GalleryEntry>>,
    running_averages: Mutex<HashMap<PersonId, RunningAverage>>,
}

impl<E: FaceEmbedder> RecognitionWorker<E> {
    pub fn new(config: RecognitionConfig, store: Store, embedder: E) -> Self {
        let gallery_cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(Duration::from_secs(config.gallery_cache_ttl_secs))
            .build();
        Self {
            config,
            store,
            embedder,
            gallery_cache,
            running_averages: Mutex::new(HashMap::new()),
        }
    }

    async fn gallery(&self) -> Result<Vec<GalleryEntry>> {
        if let Some(cached) = self.gallery_cache.get(&()).await {
            return Ok(cached);
        }
        let loaded = self.store.load_gallery()?;
        self.gallery_cache.insert((), loaded.clone()).await;
        Ok(loaded)
    }

    /// Invalidate the gallery cache immediately (§4.2 step 4/5, §9 gallery
    /// growth note: explicit invalidation rather than TTL-only polling).
    async fn invalidate_gallery(&self) {
        self.gallery_cache.invalidate(&()).await;
    }

    /// Best match in `gallery` for `e`, `None` if nothing clears the match
    /// threshold. Ties break by lexicographic `PersonId` (§4.2 step 4).
    fn best_match(&self, gallery: &[GalleryEntry], e: &Embedding) -> Option<(PersonId, f32)> {
        let mut best: Option<(PersonId, f32)> = None;
        for entry in gallery {
            let Some(sim) = similarity(&entry.embedding, e) else {
                continue;
            };
            if sim < self.config.match_threshold {
                continue;
            }
            best = match best {
                None => Some((entry.person_id.clone(), sim)),
                Some((ref best_id, best_sim)) => {
                    if sim > best_sim || (sim == best_sim && entry.person_id < *best_id) {
                        Some((entry.person_id.clone(), sim))
                    } else {
                        Some((best_id.clone(), best_sim))
                    }
                }
            };
        }
        best
    }

    /// Process one frame into a [`PersonObservation`] (§4.2 steps 1-6).
    pub async fn process_frame(&self, jpeg: &[u8]) -> PersonObservation {
        let now = Utc::now();

        let Some((embedding, det_score)) = self.embedder.embed(jpeg) else {
            return PersonObservation {
                person_id: None,
                similarity: 0.0,
                timestamp: now,
            };
        };

        if det_score < self.config.detection_floor {
            return PersonObservation {
                person_id: None,
                similarity: 0.0,
                timestamp: now,
            };
        }

        let gallery = match self.gallery().await {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!(error = %e, "gallery load failed, treating as empty");
                Vec::new()
            }
        };

        match self.best_match(&gallery, &embedding) {
            Some((person_id, sim)) => {
                self.fold_into_running_average(&person_id, &embedding, &gallery);
                PersonObservation {
                    person_id: Some(person_id),
                    similarity: sim,
                    timestamp: now,
                }
            }
            None => {
                let person_id = new_unnamed_person_id();
                if let Err(e) = self.store.insert_new_face(&person_id, &embedding) {
                    tracing::warn!(error = %e, %person_id, "best-effort gallery insert failed");
                }
                self.invalidate_gallery().await;
                self.running_averages.lock().expect("lock poisoned").insert(
                    person_id.clone(),
                    RunningAverage {
                        avg: embedding,
                        count: 1,
                    },
                );
                PersonObservation {
                    person_id: Some(person_id),
                    similarity: 1.0,
                    timestamp: now,
                }
            }
        }
    }

    fn fold_into_running_average(&self, person_id: &PersonId, e: &Embedding, gallery: &[GalleryEntry]) {
        let mut averages = self.running_averages.lock().expect("lock poisoned");
        let entry = averages.entry(person_id.clone()).or_insert_with(|| {
            let seed = gallery
                .iter()
                .find(|g| &g.person_id == person_id)
                .map(|g| (g.embedding.clone(), g.count))
                .unwrap_or_else(|| (e.clone(), 1));
            RunningAverage {
                avg: seed.0,
                count: seed.1,
            }
        });
        entry.avg = fold_average(&entry.avg, entry.count, e);
        entry.count += 1;
    }

    /// Persist the final folded centroid for a departing person (§4.2 step
    /// 6, §8 property 3: at most one write between two switch events, and
    /// that write happens before the departure notification is enqueued).
    pub fn finalize_departure(&self, person_id: &PersonId) -> Result<()> {
        let removed = self
            .running_averages
            .lock()
            .expect("lock poisoned")
            .remove(person_id);
        let Some(running) = removed else {
            return Ok(());
        };
        self.store
            .write_final_centroid(person_id, &running.avg, running.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecognitionConfig;

    struct FixedEmbedder {
        response: Option<(Vec<f32>, f32)>,
    }

    impl FaceEmbedder for FixedEmbedder {
        fn embed(&self, _jpeg: &[u8]) -> Option<(Embedding, f32)> {
            self.response
                .clone()
                .map(|(v, s)| (Embedding::new(v), s))
        }
    }

    fn worker_with(response: Option<(Vec<f32>, f32)>) -> RecognitionWorker<FixedEmbedder> {
        let store = Store::open_in_memory().expect("open store");
        RecognitionWorker::new(RecognitionConfig::default(), store, FixedEmbedder { response })
    }

    #[tokio::test]
    async fn no_face_emits_none_observation() {
        let worker = worker_with(None);
        let obs = worker.process_frame(&[]).await;
        assert!(obs.person_id.is_none());
    }

    #[tokio::test]
    async fn below_detection_floor_emits_none() {
        let worker = worker_with(Some((vec![1.0, 0.0], 0.1)));
        let obs = worker.process_frame(&[]).await;
        assert!(obs.person_id.is_none());
    }

    #[tokio::test]
    async fn unmatched_face_creates_new_person_with_similarity_one() {
        let worker = worker_with(Some((vec![1.0, 0.0], 0.9)));
        let obs = worker.process_frame(&[]).await;
        assert!(obs.person_id.is_some());
        assert_eq!(obs.similarity, 1.0);
        assert!(obs.person_id.unwrap().starts_with("Unnamed_"));
    }

    #[tokio::test]
    async fn repeated_frame_of_same_person_matches_existing_gallery_entry() {
        let worker = worker_with(Some((vec![1.0, 0.0], 0.9)));
        let first = worker.process_frame(&[]).await;
        let second = worker.process_frame(&[]).await;
        assert_eq!(first.person_id, second.person_id);
        assert!(second.similarity >= 0.99);
    }

    #[tokio::test]
    async fn finalize_departure_writes_centroid_and_clears_session_state() {
        let worker = worker_with(Some((vec![1.0, 0.0], 0.9)));
        let obs = worker.process_frame(&[]).await;
        let person_id = obs.person_id.unwrap();

        worker.finalize_departure(&person_id).expect("finalize");

        let gallery = worker.store.load_gallery().expect("load");
        let entry = gallery.iter().find(|g| g.person_id == person_id).unwrap();
        assert_eq!(entry.count, 2);

        // A second finalize on an already-cleared person is a no-op, not an error.
        worker.finalize_departure(&person_id).expect("second finalize");
    }
}
