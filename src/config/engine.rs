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
use std::collections::HashMap;
use std::path::Path;

use config::{Config, File, FileFormat};
use serde::Deserialize;

use super::ConfigError;
use crate::dsp::ReverbSettings;
use crate::engine::EngineParameters;

const DEFAULT_SAMPLE_RATE: u32 = 48000;
const DEFAULT_BLOCK_SIZE: usize = 128;
const DEFAULT_MAX_VOICES: usize = 64;

const MIN_SAMPLE_RATE: u32 = 8000;
const MAX_SAMPLE_RATE: u32 = 384000;
const MAX_BLOCK_SIZE: usize = 8192;

/// Routes a MIDI channel to a sample category.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct ChannelCategory {
    /// MIDI channel, 1-16.
    channel: u8,
    category: String,
}

impl ChannelCategory {
    pub fn new(channel: u8, category: &str) -> ChannelCategory {
        ChannelCategory {
            channel,
            category: category.to_string(),
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct EngineConfig {
    /// Output sample rate in Hz (default: 48000)
    sample_rate: Option<u32>,

    /// Frames rendered per internal block (default: 128)
    block_size: Option<usize>,

    /// Voice cap before stealing starts (default: 64)
    max_voices: Option<usize>,

    /// Seeds round-robin randomization and the reverb impulse. Unset draws from entropy.
    seed: Option<u64>,

    /// Shape of the generated reverb impulse.
    reverb: Option<ReverbSettings>,

    /// Initial playback parameters.
    parameters: Option<EngineParameters>,

    /// MIDI channel to category routing.
    midi_channels: Option<Vec<ChannelCategory>>,
}

impl EngineConfig {
    /// Reads and validates an engine configuration file.
    pub fn deserialize(path: &Path) -> Result<EngineConfig, ConfigError> {
        Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<EngineConfig>()?
            .validate()
    }

    /// Parses and validates an engine configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<EngineConfig, ConfigError> {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<EngineConfig>()?
            .validate()
    }

    fn validate(self) -> Result<EngineConfig, ConfigError> {
        if let Some(sample_rate) = self.sample_rate {
            if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
                return Err(ConfigError::invalid(
                    "sample_rate",
                    format!("{sample_rate} is outside {MIN_SAMPLE_RATE}-{MAX_SAMPLE_RATE} Hz"),
                ));
            }
        }
        if let Some(block_size) = self.block_size {
            if block_size == 0 || block_size > MAX_BLOCK_SIZE {
                return Err(ConfigError::invalid(
                    "block_size",
                    format!("{block_size} is outside 1-{MAX_BLOCK_SIZE} frames"),
                ));
            }
        }
        if self.max_voices == Some(0) {
            return Err(ConfigError::invalid("max_voices", "must be at least 1"));
        }
        if let Some(reverb) = &self.reverb {
            if !(reverb.length_secs > 0.0 && reverb.decay > 0.0) {
                return Err(ConfigError::invalid(
                    "reverb",
                    "length_secs and decay must be positive",
                ));
            }
        }
        for mapping in self.midi_channels.iter().flatten() {
            if !(1..=16).contains(&mapping.channel) {
                return Err(ConfigError::invalid(
                    "midi_channels",
                    format!("channel {} is outside 1-16", mapping.channel),
                ));
            }
        }
        Ok(self)
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = Some(block_size);
        self
    }

    pub fn with_max_voices(mut self, max_voices: usize) -> Self {
        self.max_voices = Some(max_voices);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_parameters(mut self, parameters: EngineParameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_midi_channel(mut self, channel: u8, category: &str) -> Self {
        self.midi_channels
            .get_or_insert_with(Vec::new)
            .push(ChannelCategory::new(channel, category));
        self
    }

    /// Returns the output sample rate (default: 48000)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
            .unwrap_or(DEFAULT_SAMPLE_RATE)
            .clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE)
    }

    /// Returns the render block size (default: 128)
    pub fn block_size(&self) -> usize {
        self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE).max(1)
    }

    /// Returns the voice cap (default: 64)
    pub fn max_voices(&self) -> usize {
        self.max_voices.unwrap_or(DEFAULT_MAX_VOICES).max(1)
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn reverb(&self) -> ReverbSettings {
        self.reverb.unwrap_or_default()
    }

    /// Returns the initial parameters, clamped to their valid ranges.
    pub fn parameters(&self) -> EngineParameters {
        self.parameters.clone().unwrap_or_default().clamped()
    }

    /// Returns the channel routing keyed by channel number.
    pub fn channel_categories(&self) -> HashMap<u8, String> {
        self.midi_channels
            .iter()
            .flatten()
            .map(|mapping| (mapping.channel, mapping.category.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::dsp::{FilterType, VelocityCurve};
    use crate::samples::RoundRobinMode;

    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::from_yaml("{}").unwrap();
        assert_eq!(config.sample_rate(), 48000);
        assert_eq!(config.block_size(), 128);
        assert_eq!(config.max_voices(), 64);
        assert_eq!(config.seed(), None);
        assert_eq!(config.parameters(), EngineParameters::default());
        assert!(config.channel_categories().is_empty());
    }

    #[test]
    fn full_config() {
        let config = EngineConfig::from_yaml(
            r#"
            sample_rate: 44100
            block_size: 256
            max_voices: 16
            seed: 7
            reverb:
              length_secs: 1.5
              decay: 3.0
            parameters:
              master_gain: 0.5
              transpose: -12
              velocity_curve: hard
              filter:
                type: highpass
                cutoff: 200.0
              categories:
                strings:
                  articulation: legato
                  round_robin: random
            midi_channels:
              - channel: 1
                category: piano
              - channel: 10
                category: drums
            "#,
        )
        .unwrap();

        assert_eq!(config.sample_rate(), 44100);
        assert_eq!(config.block_size(), 256);
        assert_eq!(config.max_voices(), 16);
        assert_eq!(config.seed(), Some(7));
        assert_eq!(config.reverb().length_secs, 1.5);

        let params = config.parameters();
        assert_eq!(params.master_gain(), 0.5);
        assert_eq!(params.transpose(), -12);
        assert_eq!(params.velocity_curve(), VelocityCurve::Hard);
        assert_eq!(params.filter().filter_type, FilterType::Highpass);
        assert_eq!(params.filter().cutoff, 200.0);

        let strings = params.selection(Some("strings"));
        assert_eq!(strings.articulation.as_deref(), Some("legato"));
        assert_eq!(strings.round_robin, RoundRobinMode::Random);
        assert_eq!(params.selection(None).round_robin, RoundRobinMode::Cycle);

        let channels = config.channel_categories();
        assert_eq!(channels.get(&1).map(String::as_str), Some("piano"));
        assert_eq!(channels.get(&10).map(String::as_str), Some("drums"));
    }

    #[test]
    fn parameters_are_clamped() {
        let config = EngineConfig::from_yaml(
            r#"
            parameters:
              master_gain: 5.0
              transpose: 100
            "#,
        )
        .unwrap();
        let params = config.parameters();
        assert_eq!(params.master_gain(), 1.0);
        assert_eq!(params.transpose(), 48);
    }

    #[test]
    fn rejects_invalid_values() {
        for yaml in [
            "sample_rate: 100",
            "block_size: 0",
            "max_voices: 0",
            "midi_channels:\n  - channel: 17\n    category: piano",
            "reverb:\n  length_secs: 0.0\n  decay: 2.0",
        ] {
            let result = EngineConfig::from_yaml(yaml);
            assert!(
                matches!(result, Err(ConfigError::Invalid { .. })),
                "{yaml} should be rejected"
            );
        }
    }

    #[test]
    fn builder_sample_rate_is_clamped() {
        assert_eq!(EngineConfig::default().with_sample_rate(0).sample_rate(), 8000);
        assert_eq!(
            EngineConfig::default().with_sample_rate(1_000_000).sample_rate(),
            384000
        );
        assert_eq!(EngineConfig::default().with_sample_rate(44100).sample_rate(), 44100);
    }

    #[test]
    fn malformed_yaml_is_a_load_error() {
        let result = EngineConfig::from_yaml("sample_rate: [not, a, number]");
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn deserialize_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "sample_rate: 96000\nmax_voices: 8").unwrap();

        let config = EngineConfig::deserialize(file.path()).unwrap();
        assert_eq!(config.sample_rate(), 96000);
        assert_eq!(config.max_voices(), 8);
    }
}
