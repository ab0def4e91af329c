use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::telemetry::{Motion, Sample};

/// Thresholds for incident detection. Expect to tune these per car and track.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    /// Seconds `IsOnTrack` must stay false before an off track is reported.
    /// An excursion lasts from its first off track sample to the sample where
    /// the car is back on track, or to the latest sample while still off.
    pub off_track_min_duration_s: f64,
    /// Yaw rate (rad/s) above which a low speed slide counts towards a spin
    pub spin_yaw_rate_rps: f32,
    /// Spins only happen below this speed (m/s); faster slides can be saves
    pub spin_max_speed_mps: f32,
    /// Seconds the spin condition must hold
    pub spin_min_duration_s: f64,
    /// Yaw rate (rad/s) above which a slide at speed can be a big save
    pub save_yaw_rate_rps: f32,
    /// Steering wheel angle (rad) needed for a big save
    pub save_steering_rad: f32,
    /// Seconds after a spin or big save during which new slides are ignored
    pub cooldown_s: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            off_track_min_duration_s: 0.5,
            spin_yaw_rate_rps: 2.0,
            spin_max_speed_mps: 8.0,
            spin_min_duration_s: 0.5,
            save_yaw_rate_rps: 1.2,
            save_steering_rad: 0.4,
            cooldown_s: 1.5,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    OffTrack,
    Spin,
    BigSave,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OffTrack => "off_track",
            EventType::Spin => "spin",
            EventType::BigSave => "big_save",
        }
    }

    /// Big saves are informational; spins and off tracks spoil a lap.
    pub fn is_serious(&self) -> bool {
        matches!(self, EventType::OffTrack | EventType::Spin)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_type: EventType,
    pub session_time: f64,
    pub lap_number: i32,
    /// Lap distance at the triggering sample, used for hotspot bucketing
    pub lap_dist_pct: f32,
}

impl Event {
    fn at(event_type: EventType, sample: &Sample) -> Self {
        Self {
            event_type,
            session_time: sample.session_time,
            lap_number: sample.lap,
            lap_dist_pct: sample.lap_dist_pct,
        }
    }
}

/// A contiguous run of samples with elevated yaw rate.
#[derive(Debug, Default)]
struct SlideWindow {
    /// Opened during the cooldown of a previous spin or big save
    suppressed: bool,
    spin_since: Option<f64>,
    spin_emitted: bool,
    save_candidate: Option<Event>,
}

pub struct IncidentDetector {
    config: DetectionConfig,
    off_track_since: Option<f64>,
    /// Last sample seen off track, reported if the excursion qualifies on return
    off_track_last: Option<Event>,
    off_track_emitted: bool,
    window: Option<SlideWindow>,
    /// Only spins and big saves start a cooldown
    yaw_cooldown_until: f64,
    events: Vec<Event>,
}

impl IncidentDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            off_track_since: None,
            off_track_last: None,
            off_track_emitted: false,
            window: None,
            yaw_cooldown_until: f64::NEG_INFINITY,
            events: Vec::new(),
        }
    }

    /// Feeds one sample. Samples without motion data are ignored.
    pub fn push(&mut self, sample: &Sample) {
        let Some(motion) = sample.motion else {
            return;
        };
        self.check_off_track(sample, &motion);
        self.check_slide(sample, &motion);
    }

    fn check_off_track(&mut self, sample: &Sample, motion: &Motion) {
        let min_duration = self.config.off_track_min_duration_s;
        if motion.is_on_track {
            let since = self.off_track_since.take();
            let last = self.off_track_last.take();
            // the excursion lasted until this sample
            if let (Some(since), Some(last)) = (since, last) {
                if !self.off_track_emitted && sample.session_time - since >= min_duration {
                    self.emit(last);
                }
            }
            self.off_track_emitted = false;
            return;
        }
        let since = *self.off_track_since.get_or_insert(sample.session_time);
        self.off_track_last = Some(Event::at(EventType::OffTrack, sample));
        if !self.off_track_emitted && sample.session_time - since >= min_duration {
            self.off_track_emitted = true;
            self.emit(Event::at(EventType::OffTrack, sample));
        }
    }

    fn check_slide(&mut self, sample: &Sample, motion: &Motion) {
        let config = self.config;
        let yaw = motion.yaw_rate.abs();
        if yaw <= config.spin_yaw_rate_rps.min(config.save_yaw_rate_rps) {
            self.close_window();
            return;
        }

        let suppressed = sample.session_time < self.yaw_cooldown_until;
        let window = self.window.get_or_insert_with(|| SlideWindow {
            suppressed,
            ..Default::default()
        });
        if window.suppressed || window.spin_emitted {
            return;
        }

        // spin takes precedence over a big save within the same window
        if yaw > config.spin_yaw_rate_rps && motion.speed < config.spin_max_speed_mps {
            let since = *window.spin_since.get_or_insert(sample.session_time);
            if sample.session_time - since >= config.spin_min_duration_s {
                window.spin_emitted = true;
                window.save_candidate = None;
                self.emit(Event::at(EventType::Spin, sample));
            }
            return;
        }
        window.spin_since = None;

        if window.save_candidate.is_none()
            && yaw > config.save_yaw_rate_rps
            && motion.steering_wheel_angle.abs() > config.save_steering_rad
            && motion.speed >= config.spin_max_speed_mps
        {
            window.save_candidate = Some(Event::at(EventType::BigSave, sample));
        }
    }

    /// A big save is only reported once its window ends without a spin.
    fn close_window(&mut self) {
        let Some(window) = self.window.take() else {
            return;
        };
        if window.spin_emitted {
            return;
        }
        if let Some(event) = window.save_candidate {
            self.emit(event);
        }
    }

    fn emit(&mut self, event: Event) {
        debug!(
            "{} on lap {} at {:.3}s ({:.3})",
            event.event_type, event.lap_number, event.session_time, event.lap_dist_pct
        );
        if event.event_type != EventType::OffTrack {
            self.yaw_cooldown_until = self
                .yaw_cooldown_until
                .max(event.session_time + self.config.cooldown_s);
        }
        self.events.push(event);
    }

    /// Closes any open window and returns the events ordered by time.
    pub fn finish(mut self) -> Vec<Event> {
        self.close_window();
        self.events
            .sort_by(|a, b| a.session_time.total_cmp(&b.session_time));
        self.events
    }
}

pub fn detect_events<'a>(
    samples: impl IntoIterator<Item = &'a Sample>,
    config: DetectionConfig,
) -> Vec<Event> {
    let mut detector = IncidentDetector::new(config);
    for sample in samples {
        detector.push(sample);
    }
    detector.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HZ: f64 = 60.;

    /// Builds a 60Hz stream from (duration_s, motion) phases.
    fn stream(phases: &[(f64, Motion)]) -> Vec<Sample> {
        let mut samples = Vec::new();
        let mut tick = 0usize;
        for (duration, motion) in phases {
            let ticks = (duration * HZ).round() as usize;
            for _ in 0..ticks {
                samples.push(Sample {
                    tick,
                    session_time: tick as f64 / HZ,
                    lap: 3,
                    lap_dist_pct: 0.25,
                    motion: Some(*motion),
                    ..Default::default()
                });
                tick += 1;
            }
        }
        samples
    }

    fn cruising() -> Motion {
        Motion {
            speed: 40.,
            yaw_rate: 0.1,
            steering_wheel_angle: 0.05,
            is_on_track: true,
        }
    }

    fn off_track() -> Motion {
        Motion {
            is_on_track: false,
            ..cruising()
        }
    }

    fn spinning() -> Motion {
        Motion {
            speed: 5.,
            yaw_rate: -2.6,
            steering_wheel_angle: 1.2,
            is_on_track: true,
        }
    }

    fn saving() -> Motion {
        Motion {
            speed: 30.,
            yaw_rate: 1.5,
            steering_wheel_angle: -0.7,
            is_on_track: true,
        }
    }

    fn count(events: &[Event], event_type: EventType) -> usize {
        events.iter().filter(|e| e.event_type == event_type).count()
    }

    #[test]
    fn test_off_track_over_threshold() {
        // 37 samples at 60Hz span 0.6s
        let mut samples = stream(&[(1.0, cruising()), (37. / 60., off_track()), (1.0, cruising())]);
        let events = detect_events(&samples, DetectionConfig::default());
        assert_eq!(count(&events, EventType::OffTrack), 1);
        assert_eq!(events[0].lap_number, 3);
        assert_eq!(events[0].lap_dist_pct, 0.25);

        samples = stream(&[(1.0, cruising()), (19. / 60., off_track()), (1.0, cruising())]);
        let events = detect_events(&samples, DetectionConfig::default());
        assert!(events.is_empty());
    }

    #[test]
    fn test_off_track_is_time_based() {
        let mut samples = stream(&[(1.0, cruising()), (0.6, off_track()), (1.0, cruising())]);
        // thin the stream to 10Hz
        samples.retain(|s| s.tick % 6 == 0);
        let events = detect_events(&samples, DetectionConfig::default());
        assert_eq!(count(&events, EventType::OffTrack), 1);
    }

    #[test]
    fn test_off_track_rearms_after_returning() {
        let samples = stream(&[
            (3.0, off_track()),
            (1.0, cruising()),
            (1.0, off_track()),
            (1.0, cruising()),
        ]);
        let events = detect_events(&samples, DetectionConfig::default());
        assert_eq!(count(&events, EventType::OffTrack), 2);
    }

    #[test]
    fn test_spin_at_low_speed() {
        let samples = stream(&[(1.0, cruising()), (0.8, spinning()), (1.0, cruising())]);
        let events = detect_events(&samples, DetectionConfig::default());
        assert_eq!(count(&events, EventType::Spin), 1);
        assert_eq!(count(&events, EventType::BigSave), 0);
    }

    #[test]
    fn test_short_spin_is_ignored() {
        let samples = stream(&[(1.0, cruising()), (0.2, spinning()), (1.0, cruising())]);
        assert!(detect_events(&samples, DetectionConfig::default()).is_empty());
    }

    #[test]
    fn test_big_save_at_speed() {
        let samples = stream(&[(1.0, cruising()), (0.3, saving()), (1.0, cruising())]);
        let events = detect_events(&samples, DetectionConfig::default());
        assert_eq!(count(&events, EventType::BigSave), 1);
        assert_eq!(events[0].session_time, 1.0);
    }

    #[test]
    fn test_big_save_reported_when_stream_ends_mid_slide() {
        let samples = stream(&[(1.0, cruising()), (0.3, saving())]);
        let events = detect_events(&samples, DetectionConfig::default());
        assert_eq!(count(&events, EventType::BigSave), 1);
    }

    #[test]
    fn test_spin_suppresses_big_save_in_same_window() {
        let fast_spin = Motion {
            speed: 30.,
            ..spinning()
        };
        let samples = stream(&[
            (1.0, cruising()),
            (0.2, fast_spin),
            (0.8, spinning()),
            (1.0, cruising()),
        ]);
        let events = detect_events(&samples, DetectionConfig::default());
        assert_eq!(count(&events, EventType::Spin), 1);
        assert_eq!(count(&events, EventType::BigSave), 0);
    }

    #[test]
    fn test_cooldown_merges_back_to_back_slides() {
        let samples = stream(&[
            (1.0, cruising()),
            (0.2, saving()),
            (0.2, cruising()),
            (0.2, saving()),
            (3.0, cruising()),
            (0.2, saving()),
            (1.0, cruising()),
        ]);
        let events = detect_events(&samples, DetectionConfig::default());
        assert_eq!(count(&events, EventType::BigSave), 2);
    }

    #[test]
    fn test_off_track_lasting_exactly_threshold() {
        // 30 samples at 60Hz, back on track 0.5s after leaving
        let samples = stream(&[(1.0, cruising()), (0.5, off_track()), (1.0, cruising())]);
        let events = detect_events(&samples, DetectionConfig::default());
        assert_eq!(count(&events, EventType::OffTrack), 1);
        assert_eq!(events[0].session_time, 89. / 60.);

        let samples = stream(&[(1.0, cruising()), (29. / 60., off_track()), (1.0, cruising())]);
        assert!(detect_events(&samples, DetectionConfig::default()).is_empty());
    }

    #[test]
    fn test_off_track_does_not_suppress_spin() {
        let samples = stream(&[
            (1.0, cruising()),
            (1.0, off_track()),
            (0.2, cruising()),
            (
                1.0,
                Motion {
                    speed: 4.,
                    yaw_rate: 3.,
                    ..spinning()
                },
            ),
            (1.0, cruising()),
        ]);
        let events = detect_events(&samples, DetectionConfig::default());
        let kinds: Vec<_> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(kinds, vec![EventType::OffTrack, EventType::Spin]);
        assert_eq!(events[0].session_time, 1.5);
    }

    #[test]
    fn test_samples_without_motion_are_skipped() {
        let samples: Vec<Sample> = (0..120)
            .map(|i| Sample {
                session_time: i as f64 / HZ,
                ..Default::default()
            })
            .collect();
        assert!(detect_events(&samples, DetectionConfig::default()).is_empty());
    }

    #[test]
    fn test_events_are_time_ordered() {
        let samples = stream(&[
            (1.0, cruising()),
            (0.3, saving()),
            (0.1, Motion {
                is_on_track: false,
                ..saving()
            }),
            (1.0, off_track()),
            (1.0, cruising()),
        ]);
        let events = detect_events(&samples, DetectionConfig::default());
        assert_eq!(events.len(), 2);
        assert!(events.windows(2).all(|w| w[0].session_time <= w[1].session_time));
        assert_eq!(events[0].event_type, EventType::BigSave);
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(EventType::BigSave.to_string(), "big_save");
        assert_eq!(
            serde_json::to_string(&EventType::OffTrack).unwrap(),
            "\"off_track\""
        );
        assert!(!EventType::BigSave.is_serious());
    }
}
