//! Play a song from a list of stems.
//!
//! Run with: cargo run -- [--bpm 120] [--tempo 132] [--pitch -2] [--seconds 30]
//!           [--base-url http://host] [--no-cache] [--headless] [--settings file.json]
//!           <stem url or path>...

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use stagemix_lib::audio::{ByteFetcher, FileFetcher, HttpFetcher};
use stagemix_lib::{
    EngineSettings, MixAction, MixerEngine, SongInfo, SongLoadOutcome, TrackDescriptor,
};

#[derive(Parser)]
#[command(name = "stagemix", about = "Play a song's stems in sync")]
struct Cli {
    /// Nominal tempo of the song
    #[arg(long = "bpm")]
    nominal_bpm: Option<f32>,

    /// Tempo to play at; needs --bpm
    #[arg(long = "tempo")]
    tempo_bpm: Option<f32>,

    /// Transpose by this many semitones
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pitch: i32,

    /// Stop after this many seconds (default: song length)
    #[arg(long)]
    seconds: Option<f64>,

    /// Resolve stem keys against this server
    #[arg(long)]
    base_url: Option<String>,

    /// Skip the on-disk stem cache
    #[arg(long)]
    no_cache: bool,

    /// Render without opening an audio device
    #[arg(long)]
    headless: bool,

    /// Engine settings as JSON
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Stem URLs or file paths
    #[arg(required = true)]
    stems: Vec<String>,
}

fn stem_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next().unwrap_or(path);
    file.rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file)
        .to_string()
}

fn print_levels(engine: &MixerEngine, levels: &stagemix_lib::LevelSnapshot) {
    let fmt = |db: f32| {
        if db.is_finite() {
            format!("{:6.1}", db)
        } else {
            "  -inf".to_string()
        }
    };
    let line: Vec<String> = levels
        .tracks
        .iter()
        .map(|t| format!("{} {}", t.id, fmt(t.level_db)))
        .collect();
    println!(
        "[{:7.2}s] master {} | {}",
        engine.position_seconds(),
        fmt(levels.master_db),
        line.join(" | ")
    );
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Cli::parse();

    let mut settings = match &args.settings {
        Some(path) => match EngineSettings::load_json(path) {
            Ok(settings) => settings,
            Err(err) => {
                eprintln!("{}", err);
                return ExitCode::FAILURE;
            }
        },
        None => EngineSettings::default(),
    };
    if args.no_cache {
        settings.cache_enabled = false;
    }
    if args.headless {
        settings.audio_output_enabled = false;
    }
    if args.base_url.is_some() {
        settings.fetch_base_url = args.base_url.clone();
    }

    let remote = settings.fetch_base_url.is_some()
        || args
            .stems
            .iter()
            .any(|s| s.starts_with("http://") || s.starts_with("https://"));
    let fetcher: Arc<dyn ByteFetcher> = if remote {
        Arc::new(HttpFetcher::new(settings.fetch_base_url.clone()))
    } else {
        Arc::new(FileFetcher)
    };

    let song = SongInfo {
        id: "cli".into(),
        name: None,
        tempo_bpm: args.nominal_bpm,
        key: None,
    };
    let descriptors: Vec<TrackDescriptor> = args
        .stems
        .iter()
        .enumerate()
        .map(|(i, url)| TrackDescriptor {
            id: format!("{}-{}", i, stem_name(url)),
            name: stem_name(url),
            source_url: url.clone(),
            song_id: song.id.clone(),
        })
        .collect();

    let engine = MixerEngine::new(settings, fetcher);
    let duration = match engine.select_song(song, descriptors).await {
        Ok(SongLoadOutcome::Ready {
            loaded,
            failed,
            duration_seconds,
        }) => {
            for err in &failed {
                eprintln!("warning: {}", err);
            }
            if loaded.is_empty() {
                eprintln!("No stems could be loaded");
                return ExitCode::FAILURE;
            }
            duration_seconds
        }
        Ok(SongLoadOutcome::Superseded) => return ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    if let Some(bpm) = args.tempo_bpm {
        match engine.set_tempo(bpm) {
            Ok(rate) => log::info!("playback rate {:.3}", rate),
            Err(err) => eprintln!("{}", err),
        }
    }
    if args.pitch != 0 {
        engine.apply(MixAction::SetPitch(args.pitch));
    }

    if let Err(err) = engine.play().await {
        eprintln!("{}", err);
        return ExitCode::FAILURE;
    }

    let run_for = args.seconds.unwrap_or(duration).max(0.0);
    let headless = !engine.settings().audio_output_enabled;
    let mut levels = engine.start_metering();
    let deadline = tokio::time::Instant::now() + Duration::from_secs_f64(run_for);
    let mut last_report = tokio::time::Instant::now();

    while tokio::time::Instant::now() < deadline {
        if headless {
            // No device pulls blocks, so render roughly in real time here.
            let frames = engine.settings().sample_rate as usize / 100;
            engine.render_block(frames);
            tokio::time::sleep(Duration::from_millis(10)).await;
        } else {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if last_report.elapsed() >= Duration::from_millis(500) {
            let snapshot = levels.borrow_and_update().clone();
            print_levels(&engine, &snapshot);
            last_report = tokio::time::Instant::now();
        }
    }

    engine.stop();
    engine.shutdown();
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_stems() {
        let cli = Cli::try_parse_from([
            "stagemix", "--bpm", "120", "--tempo", "132", "--pitch", "-2", "--headless",
            "click.wav", "vox.wav",
        ])
        .unwrap();
        assert_eq!(cli.nominal_bpm, Some(120.0));
        assert_eq!(cli.tempo_bpm, Some(132.0));
        assert_eq!(cli.pitch, -2);
        assert!(cli.headless);
        assert!(!cli.no_cache);
        assert_eq!(cli.stems, ["click.wav", "vox.wav"]);
    }

    #[test]
    fn stems_are_required() {
        assert!(Cli::try_parse_from(["stagemix", "--headless"]).is_err());
        assert!(Cli::try_parse_from(["stagemix", "--pitch", "x", "a.wav"]).is_err());
    }

    #[test]
    fn stem_names_drop_path_query_and_extension() {
        assert_eq!(stem_name("https://host/s/Lead Vox.mp3?sig=1"), "Lead Vox");
        assert_eq!(stem_name("click"), "click");
    }
}
