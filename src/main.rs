use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

use parley_gateway::api::{ApiServer, ApiState};
use parley_gateway::client::{GatewayTransport, HistoryStore, Microphone, Speaker};
use parley_gateway::config::PAGE_CONTEXT_BUDGET;
use parley_gateway::voice::SpeechAudio;
use parley_gateway::{
    ChatPipeline, Config, ElevenLabsStt, ElevenLabsTts, OpenAiResponses, TurnInput,
    VoiceController,
};

/// Parley - voice chat gateway and hold-to-talk client
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "PARLEY_PORT", default_value = "8788")]
    port: u16,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway (default when no subcommand is given)
    Serve,
    /// Interactive hold-to-talk client against a running gateway
    Talk {
        /// Voice-chat endpoint URL
        #[arg(long, env = "PARLEY_API_URL", default_value = "http://127.0.0.1:8788/api/voice-chat")]
        url: String,

        /// File whose contents are sent as page context with every turn
        #[arg(long)]
        context_file: Option<PathBuf>,
    },
    /// One-shot text turn through the pipeline (requires API keys)
    Ask {
        /// The question to ask
        text: String,

        /// Skip playing the synthesized reply
        #[arg(long)]
        no_play: bool,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,parley_gateway=info",
        1 => "info,parley_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        None | Some(Command::Serve) => serve(cli.port).await,
        Some(Command::Talk { url, context_file }) => talk(url, context_file).await,
        Some(Command::Ask { text, no_play }) => ask(&text, no_play).await,
        Some(Command::TestMic { duration }) => test_mic(duration).await,
        Some(Command::TestSpeaker) => test_speaker(),
    }
}

/// Build the orchestration pipeline from configuration
fn build_pipeline(config: &Config) -> anyhow::Result<ChatPipeline> {
    let eleven_key = config.eleven_api_key.clone().unwrap_or_default();

    let transcriber = ElevenLabsStt::new(eleven_key.clone(), config.stt_model.clone())?;
    let completer = OpenAiResponses::new(
        config.openai_api_key.clone().unwrap_or_default(),
        config.chat_model.clone(),
    )?;
    let synthesizer = ElevenLabsTts::new(
        eleven_key,
        config.voice_id.clone().unwrap_or_default(),
        config.tts_model.clone(),
    )?;

    Ok(ChatPipeline::new(
        Arc::new(transcriber),
        Arc::new(completer),
        Arc::new(synthesizer),
        config.system_prompt.clone(),
        PAGE_CONTEXT_BUDGET,
    ))
}

/// Run the gateway
async fn serve(port: u16) -> anyhow::Result<()> {
    let config = Config::load()?;
    let pipeline = build_pipeline(&config)?;

    let state = Arc::new(ApiState {
        pipeline,
        allow_origin: config.allow_origin.clone(),
    });

    tracing::info!(port, "starting parley gateway");
    ApiServer::new(state, port, config.static_dir).run().await?;
    Ok(())
}

/// Interactive hold-to-talk loop
///
/// Enter toggles the hold gesture; a press while the reply is playing (or
/// still in flight) interrupts it and starts a new recording.
async fn talk(url: String, context_file: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::load()?;

    let page_context = context_file
        .map(std::fs::read_to_string)
        .transpose()?
        .filter(|c| !c.trim().is_empty());

    let controller = VoiceController::new(
        Arc::new(Microphone::new()),
        Arc::new(Speaker::new()?),
        Arc::new(GatewayTransport::new(url)),
        HistoryStore::new(config.history_path()),
        page_context,
        config.max_history_messages,
    );

    println!("Press Enter to start talking, Enter again to stop.");
    println!("Pressing Enter while the assistant is speaking interrupts it. 'q' quits.\n");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut held = false;

    loop {
        println!("[{:?}] {}", controller.phase(), controller.status());

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim() == "q" {
            break;
        }

        if held {
            controller.release().await;
            held = false;
        } else {
            if let Err(e) = controller.press().await {
                tracing::warn!(error = %e, "could not start recording");
            }
            held = controller.phase() == parley_gateway::Phase::Recording;
        }
    }

    controller.dispose();
    Ok(())
}

/// One-shot text turn through the pipeline
async fn ask(text: &str, no_play: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let pipeline = build_pipeline(&config)?;

    let outcome = pipeline
        .run(TurnInput::Text(text.to_string()), &[], None)
        .await?;

    println!("You: {}", outcome.user_text);
    println!("Assistant: {}", outcome.assistant_text);

    if !no_play {
        play_reply(&outcome.audio)?;
    }

    Ok(())
}

/// Play synthesized audio to completion
fn play_reply(audio: &SpeechAudio) -> anyhow::Result<()> {
    use parley_gateway::client::controller::AudioSink;

    let speaker = Speaker::new()?;
    let control = speaker.start(audio)?;
    while !control.is_finished() {
        std::thread::sleep(Duration::from_millis(50));
    }
    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    use parley_gateway::client::controller::AudioSource;

    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mic = Microphone::new();
    mic.acquire().await?;
    mic.start()?;

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = mic.peek_samples();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );

        mic.clear();
    }

    mic.stop();
    mic.close();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
fn test_speaker() -> anyhow::Result<()> {
    use parley_gateway::client::controller::PlaybackControl;

    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24_000_f32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (sample_rate * 2.0) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    let speaker = Speaker::new()?;
    let handle = speaker.start_samples(samples)?;
    while !handle.is_finished() {
        std::thread::sleep(Duration::from_millis(50));
    }

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    Ok(())
}
