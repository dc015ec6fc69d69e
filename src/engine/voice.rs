// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! A single sounding note and its signal chain.
//!
//! Per frame a voice reads its sample at the current playback rate, filters it, applies the
//! envelope (plus tremolo), then splits into the panned dry path, the echo path and the reverb
//! send.

use crate::audio::AudioBuffer;
use crate::dsp::{
    pan_stereo, AutomationParam, DelaySettings, FeedbackDelay, FilterSettings, StereoBiquad,
};
use crate::samples::{Sample, SampleId};

/// Extra time a released voice keeps running after its ramp reaches silence.
pub const STOP_MARGIN_SECS: f64 = 0.02;

/// Public description of a started voice.
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceHandle {
    pub id: u64,
    /// The key the note was played on.
    pub key: u8,
    /// The sounding pitch after transposition.
    pub pitch: i32,
    pub sample_id: SampleId,
    pub sample_name: String,
    pub peak_gain: f32,
}

/// Accumulation buffers for one render block.
pub(crate) struct MixBuffers {
    pub dry_left: Vec<f32>,
    pub dry_right: Vec<f32>,
    pub send_left: Vec<f32>,
    pub send_right: Vec<f32>,
}

impl MixBuffers {
    pub fn new(block_size: usize) -> Self {
        Self {
            dry_left: vec![0.0; block_size],
            dry_right: vec![0.0; block_size],
            send_left: vec![0.0; block_size],
            send_right: vec![0.0; block_size],
        }
    }

    pub fn clear(&mut self) {
        self.dry_left.fill(0.0);
        self.dry_right.fill(0.0);
        self.send_left.fill(0.0);
        self.send_right.fill(0.0);
    }
}

/// Everything a voice captures from the engine when it starts.
pub(crate) struct VoiceParams {
    pub id: u64,
    pub key: u8,
    pub pitch: i32,
    pub peak: f32,
    pub start_time: f64,
    /// Pitch to glide from, and over how long.
    pub glide: Option<(i32, f32)>,
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub filter: FilterSettings,
    pub delay: DelaySettings,
    pub reverb_send: f32,
    pub mod_depth: f32,
    pub pan: f32,
}

pub(crate) struct Voice {
    id: u64,
    key: u8,
    pitch: i32,
    sample_id: SampleId,
    sample_name: String,
    buffer: AudioBuffer,
    /// Read position in source frames.
    position: f64,
    /// Source frames per output frame at a playback rate of 1.
    rate_scale: f64,
    sample_rate: u32,
    rate: AutomationParam,
    gain: AutomationParam,
    peak: f32,
    mod_depth: f32,
    filter: StereoBiquad,
    delay: Option<(FeedbackDelay, f32)>,
    reverb_send: f32,
    pan: f32,
    stop_time: Option<f64>,
    /// Set once the voice was cut for the voice cap.
    stolen: bool,
    finished: bool,
}

/// Playback rate that shifts a sample rooted at `root` to sound at `pitch`.
pub fn playback_rate(pitch: i32, root: u8) -> f32 {
    2f32.powf((pitch - root as i32) as f32 / 12.0)
}

impl Voice {
    pub fn new(sample: &Sample, params: VoiceParams, sample_rate: u32) -> Self {
        let now = params.start_time;
        let root = sample.root_midi();

        let target_rate = playback_rate(params.pitch, root);
        let mut rate = AutomationParam::new(target_rate);
        match params.glide {
            Some((from, time)) if time > 0.0 => {
                rate.set_value_at_time(playback_rate(from, root), now);
                rate.linear_ramp_to_value_at_time(target_rate, now + time as f64);
            }
            _ => rate.set_value_at_time(target_rate, now),
        }

        let attack_end = now + params.attack as f64;
        let mut gain = AutomationParam::new(0.0);
        gain.set_value_at_time(0.0, now);
        gain.linear_ramp_to_value_at_time(params.peak, attack_end);
        gain.linear_ramp_to_value_at_time(
            params.peak * params.sustain,
            attack_end + params.decay as f64,
        );

        let delay = (params.delay.mix > 0.0).then(|| {
            (
                FeedbackDelay::new(&params.delay, sample_rate),
                params.delay.mix,
            )
        });

        let buffer = sample.buffer().clone();
        Self {
            id: params.id,
            key: params.key,
            pitch: params.pitch,
            sample_id: sample.id(),
            sample_name: sample.name().to_string(),
            rate_scale: buffer.sample_rate() as f64 / sample_rate as f64,
            buffer,
            position: 0.0,
            sample_rate,
            rate,
            gain,
            peak: params.peak,
            mod_depth: params.mod_depth,
            filter: StereoBiquad::new(&params.filter, sample_rate),
            delay,
            reverb_send: params.reverb_send,
            pan: params.pan,
            stop_time: None,
            stolen: false,
            finished: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    #[cfg(test)]
    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn handle(&self) -> VoiceHandle {
        VoiceHandle {
            id: self.id,
            key: self.key,
            pitch: self.pitch,
            sample_id: self.sample_id,
            sample_name: self.sample_name.clone(),
            peak_gain: self.peak,
        }
    }

    pub fn sends_to_reverb(&self) -> bool {
        self.reverb_send > 0.0
    }

    pub fn set_mod_depth(&mut self, depth: f32) {
        self.mod_depth = depth;
    }

    #[cfg(test)]
    pub fn mod_depth(&self) -> f32 {
        self.mod_depth
    }

    #[cfg(test)]
    pub fn gain_at(&self, time: f64) -> f32 {
        self.gain.value_at(time)
    }

    #[cfg(test)]
    pub fn rate_at(&self, time: f64) -> f32 {
        self.rate.value_at(time)
    }

    #[cfg(test)]
    pub fn stop_time(&self) -> Option<f64> {
        self.stop_time
    }

    pub fn is_stolen(&self) -> bool {
        self.stolen
    }

    pub fn mark_stolen(&mut self) {
        self.stolen = true;
    }

    /// Fades the voice to silence over `release` seconds from `now` and schedules its stop.
    ///
    /// Releasing an already releasing voice only ever brings its stop forward.
    pub fn release(&mut self, now: f64, release: f32) {
        let stop = now + release as f64 + STOP_MARGIN_SECS;
        if self.stop_time.is_some_and(|current| current <= stop) {
            return;
        }

        let current = self.gain.value_at(now);
        self.gain.cancel_scheduled_values(now);
        self.gain.set_value_at_time(current, now);
        self.gain.linear_ramp_to_value_at_time(0.0, now + release as f64);
        self.mod_depth = 0.0;
        self.stop_time = Some(stop);
    }

    /// Whether the sweep may drop this voice at `now`.
    pub fn is_done(&self, now: f64) -> bool {
        self.finished || self.stop_time.is_some_and(|stop| now >= stop)
    }

    /// Renders `lfo.len()` frames starting at `start_time` into `mix`.
    pub fn render(&mut self, start_time: f64, lfo: &[f32], mix: &mut MixBuffers) {
        if self.finished {
            return;
        }

        let frames = self.buffer.frames() as f64;
        let sample_rate = self.sample_rate as f64;

        for (i, &modulation) in lfo.iter().enumerate() {
            let time = start_time + i as f64 / sample_rate;
            if self.stop_time.is_some_and(|stop| time >= stop) || self.position >= frames {
                self.finished = true;
                break;
            }

            let (left, right) = self.buffer.read_stereo(self.position);
            self.position += self.rate.value_at(time) as f64 * self.rate_scale;

            let (left, right) = self.filter.process(left, right);
            let gain = self.gain.value_at(time) + self.mod_depth * modulation;
            let (left, right) = (left * gain, right * gain);

            let (dry_left, dry_right) = pan_stereo(left, right, self.pan);
            mix.dry_left[i] += dry_left;
            mix.dry_right[i] += dry_right;

            if let Some((delay, level)) = self.delay.as_mut() {
                let (wet_left, wet_right) = delay.process(left, right);
                mix.dry_left[i] += wet_left * *level;
                mix.dry_right[i] += wet_right * *level;
            }

            if self.reverb_send > 0.0 {
                mix.send_left[i] += left * self.reverb_send;
                mix.send_right[i] += right * self.reverb_send;
            }
        }

        let end = start_time + lfo.len() as f64 / sample_rate;
        self.gain.prune(end);
        self.rate.prune(end);
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("sample", &self.sample_name)
            .field("stop_time", &self.stop_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::SampleMetadata;
    use crate::testutil::TEST_SAMPLE_RATE;

    fn params(id: u64) -> VoiceParams {
        VoiceParams {
            id,
            key: 60,
            pitch: 60,
            peak: 1.0,
            start_time: 0.0,
            glide: None,
            attack: 0.01,
            decay: 0.1,
            sustain: 0.5,
            filter: FilterSettings::default(),
            delay: DelaySettings::default(),
            reverb_send: 0.0,
            mod_depth: 0.0,
            pan: 0.0,
        }
    }

    fn sample() -> Sample {
        Sample::for_test(1, SampleMetadata::new("c4", 60), (0, 127))
    }

    #[test]
    fn test_playback_rate() {
        assert_eq!(playback_rate(60, 60), 1.0);
        assert!((playback_rate(72, 60) - 2.0).abs() < 1e-6);
        assert!((playback_rate(48, 60) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_envelope_shape() {
        let voice = Voice::new(&sample(), params(1), TEST_SAMPLE_RATE);
        assert_eq!(voice.gain_at(0.0), 0.0);
        assert!((voice.gain_at(0.01) - 1.0).abs() < 1e-4);
        assert!((voice.gain_at(0.11) - 0.5).abs() < 1e-4);
        assert!((voice.gain_at(5.0) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_release_ramps_from_current_gain() {
        let mut voice = Voice::new(&sample(), params(1), TEST_SAMPLE_RATE);
        voice.set_mod_depth(0.4);
        voice.release(0.005, 0.1);

        assert!((voice.gain_at(0.005) - 0.5).abs() < 1e-3);
        assert!((voice.gain_at(0.055) - 0.25).abs() < 1e-3);
        assert_eq!(voice.gain_at(0.2), 0.0);
        assert_eq!(voice.mod_depth(), 0.0);
        assert!((voice.stop_time().unwrap() - 0.125).abs() < 1e-6);
        assert!(!voice.is_done(0.12));
        assert!(voice.is_done(0.126));
    }

    #[test]
    fn test_release_only_shortens() {
        let mut voice = Voice::new(&sample(), params(1), TEST_SAMPLE_RATE);
        voice.release(1.0, 0.005);
        let stop = voice.stop_time();
        voice.release(1.001, 5.0);
        assert_eq!(voice.stop_time(), stop);
    }

    #[test]
    fn test_glide_ramps_rate() {
        let mut glide = params(1);
        glide.pitch = 72;
        glide.glide = Some((60, 0.5));
        let voice = Voice::new(&sample(), glide, TEST_SAMPLE_RATE);

        assert_eq!(voice.rate_at(0.0), 1.0);
        assert!((voice.rate_at(0.25) - 1.5).abs() < 1e-4);
        assert!((voice.rate_at(0.5) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_render_produces_audio_and_finishes() {
        let mut voice = Voice::new(&sample(), params(1), TEST_SAMPLE_RATE);
        let mut mix = MixBuffers::new(128);
        let lfo = vec![0.0; 128];

        let mut time = 0.0;
        let mut energy = 0.0;
        while !voice.is_done(time) {
            mix.clear();
            voice.render(time, &lfo, &mut mix);
            energy += mix.dry_left.iter().map(|s| s * s).sum::<f32>();
            time += 128.0 / TEST_SAMPLE_RATE as f64;
            assert!(time < 10.0, "voice never finished");
        }
        assert!(energy > 0.0);
        // Nothing was sent to the reverb.
        assert!(mix.send_left.iter().all(|s| *s == 0.0));
    }
}
