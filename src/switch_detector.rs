//! Component C: Switch Detector.
//!
//! Smooths noisy per-frame [`PersonObservation`]s into a stable
//! `PersonId | None` using an FPS-adaptive sliding-window vote (§4.3). Owns
//! its sliding window exclusively; no other component reads it.

use crate::config::SwitchDetectorConfig;
use crate::types::{PersonId, SwitchEvent};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// FPS-adaptive sliding-window vote detector.
pub struct SwitchDetector {
    config: SwitchDetectorConfig,
    history: VecDeque<Option<PersonId>>,
    current: Option<PersonId>,
    frame_times: VecDeque<DateTime<Utc>>,
}

impl SwitchDetector {
    pub fn new(config: SwitchDetectorConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
            current: None,
            frame_times: VecDeque::new(),
        }
    }

    pub fn current(&self) -> Option<&PersonId> {
        self.current.as_ref()
    }

    /// Estimated FPS over up to `fps_sample_size` recent frame timestamps.
    fn estimated_fps(&self) -> f32 {
        if self.frame_times.len() < 2 {
            return self.config.default_fps;
        }
        let span = *self.frame_times.back().unwrap() - *self.frame_times.front().unwrap();
        let secs = span.num_milliseconds() as f32 / 1000.0;
        if secs <= 0.0 {
            return self.config.default_fps;
        }
        (self.frame_times.len() as f32 - 1.0) / secs
    }

    fn window_size(&self, fps: f32) -> usize {
        clamp_usize(fps.round() as i64, self.config.min_window, self.config.max_window)
    }

    fn threshold_to_person(&self, fps: f32, window: usize) -> usize {
        let target = (5.0 * fps / 10.0).floor() as i64;
        clamp_usize(target, 3, window.saturating_sub(1).max(3))
    }

    fn threshold_to_absent(&self, fps: f32, window: usize) -> usize {
        let target = (7.0 * fps / 10.0).floor() as i64;
        clamp_usize(target, 5, window.saturating_sub(1).max(5))
    }

    /// Append one observation and return a [`SwitchEvent`] if this
    /// observation triggers a confirmed transition (§4.3 "Transitions").
    pub fn observe(&mut self, person_id: Option<PersonId>, at: DateTime<Utc>) -> Option<SwitchEvent> {
        self.frame_times.push_back(at);
        if self.frame_times.len() > self.config.fps_sample_size {
            self.frame_times.pop_front();
        }

        let fps = self.estimated_fps();
        let window = self.window_size(fps);

        self.history.push_back(person_id.clone());
        while self.history.len() > window {
            self.history.pop_front();
        }

        let t_to_person = self.threshold_to_person(fps, window);
        let t_to_absent = self.threshold_to_absent(fps, window);

        let count = |target: &Option<PersonId>| {
            self.history.iter().filter(|o| *o == target).count()
        };

        if self.current.is_some() && person_id.is_none() {
            if count(&None) >= t_to_absent {
                let event = SwitchEvent {
                    from: self.current.take(),
                    to: None,
                    at,
                };
                return Some(event);
            }
            return None;
        }

        if let Some(p) = &person_id {
            if Some(p) != self.current.as_ref() && count(&person_id) >= t_to_person {
                let event = SwitchEvent {
                    from: self.current.take(),
                    to: Some(p.clone()),
                    at,
                };
                self.current = Some(p.clone());
                return Some(event);
            }
        }

        None
    }
}

fn clamp_usize(value: i64, min: usize, max: usize) -> usize {
    let min = min as i64;
    let max = max as i64;
    value.clamp(min.min(max), max.max(min)) as usize
}
