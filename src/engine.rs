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

//! The sample playback engine.
//!
//! The engine owns the sample store, the zone resolver, the parameter state and every
//! sounding voice. All mutation happens through `&mut self`, so callers feeding it from
//! several sources (a MIDI port, a scripted performance) serialize their calls themselves.
//!
//! Time is the engine's own audio clock: a frame counter advanced by [`SampleEngine::render`].
//! Note and pedal events take effect at the current clock position, and every envelope,
//! glide and release is scheduled against that clock.

mod meter;
mod midi;
mod output;
mod params;
mod pedals;
mod voice;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crossbeam_channel::Receiver;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

pub use meter::{MeterLevels, MeterTap, NUM_BANDS};
pub use output::{OutputBlock, WavRecorder};
pub use params::{CategorySelection, EngineParameters, Envelope};
pub use pedals::VoiceSlot;
pub use voice::{playback_rate, VoiceHandle};

use crate::audio::{decode_file_async, AudioBuffer};
use crate::config::{EngineConfig, Performance, PerformanceAction};
use crate::dsp::{
    DelaySettings, FilterSettings, ImpulseResponse, Lfo, ReverbBus, ReverbSettings, VelocityCurve,
};
use crate::samples::{
    load_directory, load_directory_async, LoadReport, ResolveRequest, RoundRobinMode,
    SampleError, SampleId, SampleInfo, SampleMetadata, SampleStore, ZoneResolver,
};

use self::output::OutputStreams;
use self::pedals::{PedalState, VoiceMap};
use self::voice::{MixBuffers, Voice, VoiceParams};

/// Release time used for panic stops and stolen voices.
pub const FAST_RELEASE_SECS: f32 = 0.005;

/// Per-call mix adjustments for a note.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MixOptions {
    /// Scales the velocity peak, 0 to 1.
    pub gain: f32,
    /// Stereo position, -1 to 1.
    pub pan: f32,
}

impl Default for MixOptions {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pan: 0.0,
        }
    }
}

/// How a note should be played. Unset fields fall back to the category's selection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NoteOptions {
    pub category: Option<String>,
    pub articulation: Option<String>,
    pub mic: Option<String>,
    pub round_robin: Option<RoundRobinMode>,
    pub mix: Option<MixOptions>,
}

impl NoteOptions {
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn articulation(mut self, articulation: impl Into<String>) -> Self {
        self.articulation = Some(articulation.into());
        self
    }

    pub fn mic(mut self, mic: impl Into<String>) -> Self {
        self.mic = Some(mic.into());
        self
    }

    pub fn round_robin(mut self, mode: RoundRobinMode) -> Self {
        self.round_robin = Some(mode);
        self
    }

    pub fn mix(mut self, gain: f32, pan: f32) -> Self {
        self.mix = Some(MixOptions { gain, pan });
        self
    }
}

/// The polyphonic sample engine.
pub struct SampleEngine {
    sample_rate: u32,
    block_size: usize,
    max_voices: usize,
    reverb_settings: ReverbSettings,

    store: SampleStore,
    resolver: ZoneResolver,
    params: EngineParameters,
    voices: VoiceMap,
    pedals: PedalState,
    /// Last triggered pitch per glide scope. `None` is the category-less scope.
    glide_from: HashMap<Option<String>, i32>,
    channel_categories: HashMap<u8, String>,
    next_voice_id: u64,
    /// The audio clock.
    frame: u64,

    lfo: Lfo,
    /// Created with the first voice that sends to it.
    reverb: Option<ReverbBus>,
    rng: StdRng,

    mix: MixBuffers,
    lfo_buffer: Vec<f32>,
    wet_left: Vec<f32>,
    wet_right: Vec<f32>,

    meter: MeterTap,
    outputs: OutputStreams,
}

impl SampleEngine {
    /// Creates an engine with an empty sample store.
    pub fn new(config: &EngineConfig) -> Self {
        let sample_rate = config.sample_rate();
        let block_size = config.block_size();
        let params = config.parameters();

        info!(
            sample_rate,
            block_size,
            max_voices = config.max_voices(),
            "Sample engine created"
        );

        Self {
            sample_rate,
            block_size,
            max_voices: config.max_voices(),
            reverb_settings: config.reverb(),
            store: SampleStore::new(),
            resolver: ZoneResolver::new(config.seed()),
            lfo: Lfo::new(params.mod_rate(), sample_rate),
            params,
            voices: VoiceMap::default(),
            pedals: PedalState::default(),
            glide_from: HashMap::new(),
            channel_categories: config.channel_categories(),
            next_voice_id: 0,
            frame: 0,
            reverb: None,
            rng: match config.seed() {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
            mix: MixBuffers::new(block_size),
            lfo_buffer: vec![0.0; block_size],
            wet_left: vec![0.0; block_size],
            wet_right: vec![0.0; block_size],
            meter: MeterTap::new(sample_rate),
            outputs: OutputStreams::default(),
        }
    }

    /// Adds a decoded sample to the store.
    pub fn ingest(
        &mut self,
        metadata: SampleMetadata,
        buffer: AudioBuffer,
    ) -> Result<SampleId, SampleError> {
        self.store.ingest(metadata, buffer)
    }

    /// Decodes a file off the calling thread, then adds it to the store.
    pub async fn ingest_file(
        &mut self,
        path: PathBuf,
        metadata: SampleMetadata,
    ) -> Result<SampleId, SampleError> {
        let display = path.display().to_string();
        let buffer = decode_file_async(path)
            .await
            .map_err(|source| SampleError::Decode {
                path: display,
                source,
            })?;
        self.store.ingest(metadata, buffer)
    }

    /// Loads every audio file below `dir`. Files that fail are reported, not fatal.
    pub fn load_directory(&mut self, dir: &Path) -> Result<LoadReport, SampleError> {
        load_directory(&mut self.store, dir)
    }

    pub async fn load_directory_async(&mut self, dir: &Path) -> Result<LoadReport, SampleError> {
        load_directory_async(&mut self.store, dir).await
    }

    pub fn remove(&mut self, id: SampleId) -> Result<(), SampleError> {
        self.store.remove(id).map(|_| ())
    }

    /// Empties the sample store. Voices already sounding play on from their own copy of
    /// the audio.
    pub fn clear(&mut self) {
        let sounding = self.sounding_voice_count();
        if sounding > 0 {
            warn!(sounding, "Clearing samples while voices are sounding");
        }
        self.store.clear();
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    /// A snapshot of every ingested sample.
    pub fn samples(&self) -> Vec<SampleInfo> {
        self.store.snapshot()
    }

    pub fn reset_round_robin(&mut self) {
        self.resolver.reset_round_robin();
    }

    /// Starts a note. Returns `None` when there is nothing to play.
    pub fn note_on(&mut self, midi: u8, velocity: u8, options: &NoteOptions) -> Option<VoiceHandle> {
        let now = self.current_time();
        self.sweep(now);

        if midi > 127 {
            warn!(midi, "Ignoring note on outside the MIDI range");
            return None;
        }
        let velocity = velocity.min(127);

        let category = options.category.as_deref();
        let selection = self.params.selection(category);
        let articulation = options
            .articulation
            .as_deref()
            .or(selection.articulation.as_deref());
        let mic = options.mic.as_deref().or(selection.mic.as_deref());
        let mode = options.round_robin.unwrap_or(selection.round_robin);

        let pitch = midi as i32 + self.params.transpose();
        let request = ResolveRequest {
            midi: pitch.clamp(0, 127) as u8,
            velocity,
            category,
            articulation,
            mic,
            mode,
        };

        let Some(sample) = self.resolver.resolve(self.store.samples(), &request) else {
            debug!(midi, velocity, ?category, "No sample to play");
            return None;
        };

        let mix = options.mix.unwrap_or_default();
        let envelope = self.params.envelope();
        let glide_time = self.params.glide_time();
        let scope = category.map(str::to_string);
        let glide = self
            .glide_from
            .get(&scope)
            .filter(|_| glide_time > 0.0)
            .map(|from| (*from, glide_time));

        self.next_voice_id += 1;
        let voice = Voice::new(
            sample,
            VoiceParams {
                id: self.next_voice_id,
                key: midi,
                pitch,
                peak: self.params.velocity_curve().peak_gain(velocity) * mix.gain.clamp(0.0, 1.0),
                start_time: now,
                glide,
                attack: envelope.attack,
                decay: envelope.decay,
                sustain: envelope.sustain,
                filter: self.params.filter(),
                delay: self.params.delay(),
                reverb_send: self.params.reverb_mix(),
                mod_depth: self.params.mod_depth(),
                pan: mix.pan,
            },
            self.sample_rate,
        );

        self.glide_from.insert(scope, pitch);
        if voice.sends_to_reverb() {
            self.ensure_reverb();
        }
        self.make_room(now);

        let handle = voice.handle();
        debug!(
            midi,
            velocity,
            pitch,
            sample = %handle.sample_name,
            voice = handle.id,
            "Voice started"
        );
        self.voices.push(VoiceSlot::Held(midi), voice);
        Some(handle)
    }

    /// Ends the most recent note on `midi`, unless a pedal holds it.
    pub fn note_off(&mut self, midi: u8) {
        let now = self.current_time();
        self.sweep(now);

        let Some(mut voice) = self.voices.pop(VoiceSlot::Held(midi)) else {
            debug!(midi, "Note off with no held voice");
            return;
        };

        if self.pedals.holds(midi) {
            debug!(midi, voice = voice.id(), "Voice parked by pedal");
            self.voices.push(VoiceSlot::Sustained(midi), voice);
        } else {
            voice.release(now, self.params.envelope().release);
            debug!(midi, voice = voice.id(), "Voice released");
            self.voices.push_releasing(voice);
        }
    }

    /// Engages or lifts the sustain pedal. Lifting releases every parked voice.
    pub fn set_sustain(&mut self, on: bool) {
        self.pedals.sustain = on;
        if on {
            debug!("Sustain on");
            return;
        }

        let now = self.current_time();
        let release = self.params.envelope().release;
        let parked = self.voices.drain_sustained();
        debug!(released = parked.len(), "Sustain off");
        for mut voice in parked {
            voice.release(now, release);
            self.voices.push_releasing(voice);
        }
    }

    /// Engages or lifts the sostenuto pedal.
    ///
    /// Engaging captures the keys that are down at that moment. Engaging again while already
    /// engaged changes nothing, so a controller streaming CC 66 values above the threshold
    /// does not re-capture keys pressed after the pedal went down. Lifting forgets the
    /// captured keys but releases nothing.
    pub fn set_sostenuto(&mut self, on: bool) {
        if on {
            if self.pedals.sostenuto {
                debug!("Sostenuto already engaged");
                return;
            }
            self.pedals.sostenuto = true;
            self.pedals.sostenuto_keys = self.voices.held_keys();
            debug!(keys = self.pedals.sostenuto_keys.len(), "Sostenuto on");
        } else {
            self.pedals.sostenuto = false;
            self.pedals.sostenuto_keys.clear();
            debug!("Sostenuto off");
        }
    }

    /// Releases every held and parked voice. `immediate` uses a 5 ms fade and also cuts
    /// short voices that were already fading out.
    pub fn stop_all_voices(&mut self, immediate: bool) {
        let now = self.current_time();
        let release = if immediate {
            FAST_RELEASE_SECS
        } else {
            self.params.envelope().release
        };

        let voices = self.voices.drain_all();
        let stopped = voices.len();
        for mut voice in voices {
            voice.release(now, release);
            self.voices.push_releasing(voice);
        }
        if immediate {
            for voice in self.voices.releasing_mut() {
                voice.release(now, FAST_RELEASE_SECS);
            }
        }
        self.pedals.sostenuto_keys.clear();

        info!(stopped, immediate, "All voices stopped");
    }

    /// Steals voices until a new one fits under the voice cap.
    fn make_room(&mut self, now: f64) {
        while self.voices.sounding_count() >= self.max_voices {
            if let Some(voice) = self.voices.oldest_unstolen_releasing() {
                voice.release(now, FAST_RELEASE_SECS);
                voice.mark_stolen();
                warn!(
                    max_voices = self.max_voices,
                    voice = voice.id(),
                    "Voice limit reached, stealing oldest releasing voice"
                );
                continue;
            }

            let Some(mut voice) = self.voices.take_oldest() else {
                break;
            };
            voice.release(now, FAST_RELEASE_SECS);
            voice.mark_stolen();
            warn!(
                max_voices = self.max_voices,
                voice = voice.id(),
                "Voice limit reached, stealing oldest voice"
            );
            self.voices.push_releasing(voice);
        }
    }

    fn ensure_reverb(&mut self) {
        if self.reverb.is_none() {
            let ir = ImpulseResponse::generate(&self.reverb_settings, self.sample_rate, &mut self.rng);
            self.reverb = Some(ReverbBus::new(&ir, self.block_size));
        }
    }

    fn sweep(&mut self, now: f64) {
        let dropped = self.voices.sweep(now);
        if dropped > 0 {
            debug!(dropped, "Finished voices swept");
        }
    }

    /// Renders the master bus into `left` and `right`, advancing the clock by their length.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        let mut offset = 0;

        while offset < frames {
            let n = (frames - offset).min(self.block_size);
            let start = self.current_time();

            self.mix.clear();
            self.lfo.fill(&mut self.lfo_buffer[..n]);
            for voice in self.voices.iter_mut() {
                voice.render(start, &self.lfo_buffer[..n], &mut self.mix);
            }

            match self.reverb.as_mut() {
                Some(bus) => bus.process(
                    &self.mix.send_left[..n],
                    &self.mix.send_right[..n],
                    &mut self.wet_left[..n],
                    &mut self.wet_right[..n],
                ),
                None => {
                    self.wet_left[..n].fill(0.0);
                    self.wet_right[..n].fill(0.0);
                }
            }

            let gain = self.params.master_gain();
            let out_left = &mut left[offset..offset + n];
            let out_right = &mut right[offset..offset + n];
            for i in 0..n {
                out_left[i] = (self.mix.dry_left[i] + self.wet_left[i]) * gain;
                out_right[i] = (self.mix.dry_right[i] + self.wet_right[i]) * gain;
            }

            self.meter.push(out_left, out_right);
            self.outputs.publish(self.frame, out_left, out_right);

            self.frame += n as u64;
            offset += n;
            self.sweep(self.current_time());
        }
    }

    /// Renders `seconds` of output into new buffers.
    pub fn render_seconds(&mut self, seconds: f64) -> (Vec<f32>, Vec<f32>) {
        let frames = (seconds.max(0.0) * self.sample_rate as f64).round() as usize;
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        self.render(&mut left, &mut right);
        (left, right)
    }

    /// Plays a scripted performance from the current clock position, handing each rendered
    /// block to `sink`. Returns the number of frames rendered.
    pub fn render_performance<E>(
        &mut self,
        performance: &Performance,
        mut sink: impl FnMut(&[f32], &[f32]) -> Result<(), E>,
    ) -> Result<u64, E> {
        let origin = self.frame;
        let mut left = vec![0.0; self.block_size];
        let mut right = vec![0.0; self.block_size];

        let mut render_until = |engine: &mut Self, target: u64| -> Result<(), E> {
            while engine.frame < target {
                let n = ((target - engine.frame) as usize).min(engine.block_size);
                engine.render(&mut left[..n], &mut right[..n]);
                sink(&left[..n], &right[..n])?;
            }
            Ok(())
        };

        for event in performance.events() {
            let target = origin + self.seconds_to_frames(event.time);
            render_until(self, target)?;
            self.apply(&event.action);
        }

        let end = origin + self.seconds_to_frames(performance.duration());
        render_until(self, end)?;

        info!(
            frames = self.frame - origin,
            events = performance.events().len(),
            "Performance rendered"
        );
        Ok(self.frame - origin)
    }

    fn seconds_to_frames(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    /// Applies one performance action at the current clock position.
    pub fn apply(&mut self, action: &PerformanceAction) {
        match action {
            PerformanceAction::NoteOn {
                note,
                velocity,
                options,
            } => {
                self.note_on(*note, *velocity, options);
            }
            PerformanceAction::NoteOff { note } => self.note_off(*note),
            PerformanceAction::Sustain(on) => self.set_sustain(*on),
            PerformanceAction::Sostenuto(on) => self.set_sostenuto(*on),
            PerformanceAction::StopAll { immediate } => self.stop_all_voices(*immediate),
            PerformanceAction::ModDepth(depth) => self.set_mod_depth(*depth),
        }
    }

    pub fn parameters(&self) -> &EngineParameters {
        &self.params
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        self.params.set_master_gain(gain);
    }

    pub fn set_envelope(&mut self, envelope: Envelope) {
        self.params.set_envelope(envelope);
    }

    pub fn set_filter(&mut self, filter: FilterSettings) {
        self.params.set_filter(filter);
    }

    pub fn set_delay(&mut self, delay: DelaySettings) {
        self.params.set_delay(delay);
    }

    pub fn set_reverb_mix(&mut self, mix: f32) {
        self.params.set_reverb_mix(mix);
    }

    pub fn set_velocity_curve(&mut self, curve: VelocityCurve) {
        self.params.set_velocity_curve(curve);
    }

    pub fn set_velocity_curve_name(&mut self, name: &str) {
        self.params.set_velocity_curve_name(name);
    }

    pub fn set_transpose(&mut self, semitones: i32) {
        self.params.set_transpose(semitones);
    }

    pub fn set_glide_time(&mut self, seconds: f32) {
        self.params.set_glide_time(seconds);
    }

    pub fn set_mod_rate(&mut self, rate: f32) {
        self.params.set_mod_rate(rate);
        self.lfo.set_rate(self.params.mod_rate());
    }

    /// Sets the modulation depth and applies it to every held or parked voice.
    pub fn set_mod_depth(&mut self, depth: f32) {
        self.params.set_mod_depth(depth);
        let depth = self.params.mod_depth();
        for voice in self.voices.mapped_mut() {
            voice.set_mod_depth(depth);
        }
    }

    pub fn set_articulation(&mut self, category: Option<&str>, articulation: Option<String>) {
        self.params.set_articulation(category, articulation);
    }

    pub fn set_mic(&mut self, category: Option<&str>, mic: Option<String>) {
        self.params.set_mic(category, mic);
    }

    pub fn set_round_robin_mode(&mut self, category: Option<&str>, mode: RoundRobinMode) {
        self.params.set_round_robin_mode(category, mode);
    }

    pub fn set_round_robin_mode_name(&mut self, category: Option<&str>, name: &str) {
        self.params.set_round_robin_mode_name(category, name);
    }

    /// Routes a MIDI channel (1-16) to a category, or back to the category-less pool.
    pub fn set_channel_category(&mut self, channel: u8, category: Option<String>) {
        match category {
            Some(category) => {
                self.channel_categories.insert(channel, category);
            }
            None => {
                self.channel_categories.remove(&channel);
            }
        }
    }

    pub fn is_sustain_on(&self) -> bool {
        self.pedals.sustain
    }

    pub fn is_sostenuto_on(&self) -> bool {
        self.pedals.sostenuto
    }

    /// A metering view of the master output.
    pub fn meter(&self) -> MeterTap {
        self.meter.clone()
    }

    /// Subscribes to the master output. The stream holds up to `capacity` blocks; blocks
    /// rendered while it is full are dropped for this subscriber.
    pub fn output_stream(&mut self, capacity: usize) -> Receiver<OutputBlock> {
        self.outputs.subscribe(capacity)
    }

    /// Voices whose key is down.
    pub fn active_voice_count(&self) -> usize {
        self.voices.active_count()
    }

    /// Voices kept sounding by a pedal.
    pub fn parked_voice_count(&self) -> usize {
        self.voices.parked_count()
    }

    /// Every voice still producing sound, including ones fading out.
    pub fn sounding_voice_count(&self) -> usize {
        self.voices.active_count() + self.voices.parked_count() + self.voices.releasing_count()
    }

    /// Current position of the audio clock in seconds.
    pub fn current_time(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    pub fn current_frame(&self) -> u64 {
        self.frame
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

impl std::fmt::Debug for SampleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleEngine")
            .field("samples", &self.store.len())
            .field("active_voices", &self.voices.active_count())
            .field("parked_voices", &self.voices.parked_count())
            .field("releasing_voices", &self.voices.releasing_count())
            .field("frame", &self.frame)
            .finish()
    }
}
