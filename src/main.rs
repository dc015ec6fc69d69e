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
use std::error::Error;
use std::path::PathBuf;

use clap::{crate_version, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use keyzone::config::{EngineConfig, Performance};
use keyzone::engine::{SampleEngine, WavRecorder};
use keyzone::naming::parse_file_name;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A zone-mapped sample player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Loads a sample library and lists the zones it maps to.
    Samples {
        /// The path to the sample library on disk.
        path: PathBuf,
        /// Only list samples in this category.
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Renders a scripted performance to a WAV file.
    Render {
        /// The path to the sample library on disk.
        library_path: PathBuf,
        /// The performance to play.
        performance_path: PathBuf,
        /// Where to write the rendered audio.
        output_path: PathBuf,
        /// The engine config. Defaults apply when unset.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Shows the metadata sample file names map to.
    ParseName {
        /// The file names to parse.
        #[arg(required = true)]
        file_names: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Samples { path, category } => {
            let mut engine = SampleEngine::new(&EngineConfig::default());
            let report = engine.load_directory_async(&path).await?;

            let samples: Vec<_> = engine
                .samples()
                .into_iter()
                .filter(|sample| category.as_deref().map_or(true, |c| sample.category == c))
                .collect();
            if samples.is_empty() {
                println!("No samples found in {}.", path.display());
            } else {
                println!("Samples (count: {}):", samples.len());
                for sample in samples {
                    println!("- {sample}");
                }
            }

            if !report.failed.is_empty() {
                println!("Failed (count: {}):", report.failed.len());
                for (path, err) in report.failed {
                    println!("- {}: {}", path.display(), err);
                }
            }
        }
        Commands::Render {
            library_path,
            performance_path,
            output_path,
            config,
        } => {
            let config = match config {
                Some(path) => EngineConfig::deserialize(&path)?,
                None => EngineConfig::default(),
            };
            let performance = Performance::deserialize(&performance_path)?;

            let mut engine = SampleEngine::new(&config);
            let report = engine.load_directory_async(&library_path).await?;
            if report.loaded.is_empty() {
                return Err(format!("no samples loaded from {}", library_path.display()).into());
            }

            let mut recorder = WavRecorder::create(&output_path, engine.sample_rate())?;
            let meter = engine.meter();
            engine.render_performance(&performance, |left, right| {
                recorder.write_stereo(left, right)
            })?;
            let frames = recorder.finalize()?;

            let levels = meter.levels();
            info!(
                frames,
                output = ?output_path,
                peak = levels.peak,
                rms = levels.rms,
                "Render complete"
            );
            println!(
                "Rendered {:.2}s to {}.",
                frames as f64 / engine.sample_rate() as f64,
                output_path.display()
            );
        }
        Commands::ParseName { file_names } => {
            for file_name in file_names {
                let hints = parse_file_name(&file_name);
                println!("{}:", file_name);
                println!("  Name: {}", hints.name);
                println!("  Root: {:?}", hints.root_midi);
                println!("  Velocity: {:?}", hints.velocity_range);
                println!("  Round robin: {:?}", hints.rr_index);
                println!("  Mic: {:?}", hints.mic);
                println!("  Articulation: {:?}", hints.articulation);
            }
        }
    }

    Ok(())
}
