use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use speech_practice::audio::{
    read_wav, CpalInput, InputDevice, LevelSmoother, PersistedRecording, Player, RecordingStore,
    RodioPlayer, WaveformSnapshot,
};
use speech_practice::services::{
    AzureSpeechClient, Language, OpenAiClient, SpeechSynthesizer,
};
use speech_practice::settings::{default_settings_path, load_settings};
use speech_practice::store::{Difficulty, NewPracticeText, PracticeStore};
use speech_practice::{
    AppSettings, ControllerOptions, PracticeCoach, RecordingController, StopOutcome,
};

const METER_BARS: usize = 24;

#[derive(Parser)]
#[command(name = "speech-practice")]
#[command(about = "Record yourself reading a passage and get pronunciation feedback")]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record from the microphone with a live level meter
    Record {
        /// Maximum recording length; Ctrl+C stops early
        #[arg(short, long, default_value = "10.0")]
        seconds: f64,

        /// Play the recording back when done
        #[arg(long)]
        play: bool,

        /// Send the recording for assessment and feedback
        #[arg(long, requires = "text_id")]
        analyze: bool,

        /// Practice text being read (see `texts`)
        #[arg(long)]
        text_id: Option<i64>,

        /// Input device name (see `devices`)
        #[arg(long)]
        device: Option<String>,
    },

    /// List practice texts
    Texts,

    /// Add a practice text
    AddText {
        #[arg(long)]
        title: String,

        #[arg(long)]
        content: String,

        #[arg(long, default_value = "beginner")]
        difficulty: Difficulty,

        #[arg(long, default_value = "custom")]
        category: String,
    },

    /// Show analysed attempts
    History {
        #[arg(long)]
        text_id: Option<i64>,
    },

    /// Pronunciation guide for a word or a passage
    Guide {
        #[arg(long, conflicts_with = "text", required_unless_present = "text")]
        word: Option<String>,

        #[arg(long)]
        text: Option<String>,

        /// Language of the explanation (defaults to the feedback language)
        #[arg(long)]
        language: Option<Language>,
    },

    /// Synthesize a passage to a WAV file
    Say {
        #[arg(long)]
        text: String,

        #[arg(short, long, default_value = "speech.wav")]
        output: PathBuf,

        /// Rate multiplier, 0.5 to 2.0
        #[arg(long, default_value = "1.0")]
        speed: f32,

        /// english or chinese (defaults to the feedback language)
        #[arg(long)]
        language: Option<Language>,

        #[arg(long)]
        play: bool,
    },

    /// Print the effective settings
    Settings,

    /// List audio input devices
    Devices,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file if present; production uses system env vars
    let _ = dotenvy::dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings_path = match cli.settings {
        Some(path) => path,
        None => default_settings_path().map_err(anyhow::Error::msg)?,
    };
    let settings = load_settings(&settings_path);

    match cli.command {
        Command::Record {
            seconds,
            play,
            analyze,
            text_id,
            device,
        } => {
            let text_id = if analyze { text_id } else { None };
            record(&settings, seconds, play, text_id, device).await
        }
        Command::Texts => list_texts(&settings),
        Command::AddText {
            title,
            content,
            difficulty,
            category,
        } => {
            let mut store = open_store(&settings)?;
            let text = store.create_text(NewPracticeText {
                title,
                content,
                difficulty,
                category,
            })?;
            println!("Added practice text #{}", text.id);
            Ok(())
        }
        Command::History { text_id } => show_history(&settings, text_id),
        Command::Guide {
            word,
            text,
            language,
        } => {
            let language = language.unwrap_or(settings.feedback_language);
            guide(&settings, word, text, language).await
        }
        Command::Say {
            text,
            output,
            speed,
            language,
            play,
        } => {
            let language = language.unwrap_or(settings.feedback_language);
            say(&settings, &text, &output, speed, language, play).await
        }
        Command::Settings => {
            println!("Settings file: {}", settings_path.display());
            println!("Recordings:    {}", settings.recordings_dir().display());
            println!("Practice data: {}", settings.database_path().display());
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Command::Devices => {
            for name in CpalInput::device_names()? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn open_store(settings: &AppSettings) -> Result<PracticeStore> {
    let mut store = PracticeStore::open(settings.database_path())?;
    store.preset_texts()?;
    Ok(store)
}

async fn record(
    settings: &AppSettings,
    seconds: f64,
    play: bool,
    analyze_text: Option<i64>,
    device: Option<String>,
) -> Result<()> {
    // Build the coach first so missing keys or a bad text id fail before recording
    let mut coach = match analyze_text {
        Some(text_id) => {
            let assessor = AzureSpeechClient::from_env(
                &settings.effective_azure_region(),
                &settings.speech_language,
            )?;
            let feedback = OpenAiClient::from_env(&settings.openai_model)?;
            let mut coach =
                PracticeCoach::new(assessor, feedback, open_store(settings)?, settings.feedback_language);
            let text = coach.select_text(text_id)?;
            println!("Read aloud:\n\n  {}\n", text.content);
            Some(coach)
        }
        None => None,
    };

    let input: Arc<dyn InputDevice> = match device {
        Some(name) => Arc::new(CpalInput::named(name)),
        None => Arc::new(CpalInput::default_device()),
    };
    let store = RecordingStore::new(settings.recordings_dir(), settings.max_recordings);
    let mut controller = RecordingController::new(
        input,
        store,
        Box::new(RodioPlayer::new()),
        ControllerOptions::from_settings(settings),
    );

    let (tx, mut rx) = mpsc::channel(8);
    let feed_shutdown = controller.attach_waveform_sink(Handle::current(), tx);

    controller
        .start_recording()
        .context("Failed to start recording")?;
    eprintln!("Recording for up to {:.1}s, press Ctrl+C to stop", seconds);

    let deadline = tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.1)));
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut smoother = LevelSmoother::new();
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = &mut ctrl_c => break,
            Some(snapshot) = rx.recv() => render_meter(&snapshot, &mut smoother),
        }
    }
    eprintln!();

    let outcome = controller.stop_recording();
    feed_shutdown.cancel();

    let recording = match outcome.context("Failed to stop recording")? {
        StopOutcome::Saved(recording) => recording,
        StopOutcome::NoRecording => {
            println!("No recording made");
            return Ok(());
        }
        StopOutcome::NotRecording => return Ok(()),
    };
    println!(
        "Saved {} ({:.2}s)",
        recording.path.display(),
        recording.duration_secs
    );

    if play {
        controller.play_recording().context("Playback failed")?;
    }

    if let Some(coach) = coach.as_mut() {
        analyze(coach, &recording).await?;
    }

    Ok(())
}

async fn analyze(
    coach: &mut PracticeCoach<AzureSpeechClient, OpenAiClient>,
    recording: &PersistedRecording,
) -> Result<()> {
    eprintln!("Analyzing...");
    let report = coach.submit_for_analysis(recording).await?;

    let a = &report.assessment;
    println!("Recognized: {}", a.transcribed_text);
    println!(
        "Overall {:.1} | Accuracy {:.1} | Fluency {:.1} | Completeness {:.1}",
        a.overall_score, a.accuracy_score, a.fluency_score, a.completeness_score
    );
    println!("\n{}\n", report.feedback);
    println!("Saved as session #{}", report.session.id);
    Ok(())
}

fn render_meter(snapshot: &WaveformSnapshot, smoother: &mut LevelSmoother) {
    let mut levels = snapshot.levels(METER_BARS);
    smoother.apply(&mut levels);

    let bars: String = levels
        .iter()
        .map(|&level| match (level * 4.0 * 8.0) as u32 {
            0 => ' ',
            1..=2 => '▁',
            3..=4 => '▃',
            5..=6 => '▅',
            _ => '█',
        })
        .collect();

    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "\r[{}] {:6.1}s", bars, snapshot.elapsed_secs);
    let _ = stderr.flush();
}

fn list_texts(settings: &AppSettings) -> Result<()> {
    let store = open_store(settings)?;
    for text in store.texts() {
        println!(
            "#{:<3} [{}] {} ({})\n     {}",
            text.id, text.difficulty, text.title, text.category, text.content
        );
    }
    Ok(())
}

fn show_history(settings: &AppSettings, text_id: Option<i64>) -> Result<()> {
    let store = open_store(settings)?;
    let sessions = store.sessions(text_id);
    if sessions.is_empty() {
        println!("No practice sessions yet");
        return Ok(());
    }

    for session in sessions {
        let title = store
            .text(session.practice_text_id)
            .map(|t| t.title.as_str())
            .unwrap_or("?");
        println!(
            "#{:<3} {} {:>5.1}  {}\n     {}",
            session.id,
            session.created_at.format("%Y-%m-%d %H:%M"),
            session.score,
            title,
            session.transcribed_text
        );
    }
    Ok(())
}

async fn guide(
    settings: &AppSettings,
    word: Option<String>,
    text: Option<String>,
    language: Language,
) -> Result<()> {
    let client = OpenAiClient::from_env(&settings.openai_model)?;
    let guide = match (word, text) {
        (Some(word), _) => client.word_guide(&word, language).await?,
        (None, Some(text)) => client.phonetic_guide(&text).await?,
        (None, None) => anyhow::bail!("Pass --word or --text"),
    };
    println!("{}", guide);
    Ok(())
}

async fn say(
    settings: &AppSettings,
    text: &str,
    output: &std::path::Path,
    speed: f32,
    language: Language,
    play: bool,
) -> Result<()> {
    let client =
        AzureSpeechClient::from_env(&settings.effective_azure_region(), &settings.speech_language)?;
    let wav = client.synthesize(text, language, speed).await?;
    std::fs::write(output, &wav).with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {}", output.display());

    if play {
        let decoded = read_wav(output)?;
        RodioPlayer::new().play_blocking(decoded.samples, decoded.format)?;
    }
    Ok(())
}
