//! Per-priority channel payloads: vibration patterns and alert tones

use crate::domain::types::Priority;

/// Peak gain of the tone envelope
const TONE_GAIN: f32 = 0.3;

/// Gain the envelope decays to by the end of the tone
const TONE_FLOOR_GAIN: f32 = 0.01;

const TONE_DURATION_MS: u32 = 300;

/// Vibration pattern (alternating on/off milliseconds) for a priority
pub fn haptic_pattern(priority: Priority) -> &'static [u32] {
    match priority {
        Priority::Critical => &[500, 200, 500, 200, 500],
        Priority::High => &[200, 100, 200, 100, 200],
        Priority::Medium => &[200, 100, 200],
        Priority::Low => &[200],
    }
}

/// Short sine tone with an exponential decay envelope
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    pub frequency_hz: f32,
    pub duration_ms: u32,
    pub gain: f32,
    pub floor_gain: f32,
}

impl ToneSpec {
    /// Pitch rises with priority
    pub fn for_priority(priority: Priority) -> Self {
        let frequency_hz = match priority {
            Priority::Low => 440.0,
            Priority::Medium => 523.25,
            Priority::High => 659.25,
            Priority::Critical => 880.0,
        };
        Self { frequency_hz, duration_ms: TONE_DURATION_MS, gain: TONE_GAIN, floor_gain: TONE_FLOOR_GAIN }
    }

    /// Envelope gain at `t` seconds into the tone
    #[inline]
    pub fn envelope(&self, t: f32) -> f32 {
        let duration_s = self.duration_ms as f32 / 1000.0;
        if duration_s <= 0.0 {
            return 0.0;
        }
        let progress = (t / duration_s).clamp(0.0, 1.0);
        self.gain * (self.floor_gain / self.gain).powf(progress)
    }

    /// Mono PCM samples in [-1, 1]
    pub fn render_samples(&self, sample_rate: u32) -> Vec<f32> {
        let count = (sample_rate as u64 * self.duration_ms as u64 / 1000) as usize;
        let omega = 2.0 * std::f32::consts::PI * self.frequency_hz;
        (0..count)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (omega * t).sin() * self.envelope(t)
            })
            .collect()
    }
}
