use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use clap::Parser;
use gemini_live::capture::{AudioCaptureEngine, CaptureConfig, CpalCapture};
use gemini_live::playback::{AudioPlaybackEngine, CpalPlayback, PlaybackConfig};
use gemini_live::tools::FunctionRegistry;
use gemini_live::turns::{SinkError, Turn, TurnSink};
use gemini_live::types::audio::Voice;
use gemini_live::types::tools::FunctionDeclaration;
use gemini_live::types::SessionConfig;
use gemini_live::utils::device;
use gemini_live::{Config, Control, Conversation, ConversationConfig, SessionConnection};
use serde_json::json;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Talk to a Gemini Live model through the default microphone and speaker")]
struct Args {
    /// Prebuilt voice name, e.g. Puck or Kore
    #[arg(long, default_value = "Zephyr")]
    voice: String,
    /// System prompt
    #[arg(long)]
    prompt: Option<String>,
    /// Overrides GEMINI_LIVE_MODEL
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    input: Option<String>,
    #[arg(long)]
    output: Option<String>,
    /// Lists audio devices and exits
    #[arg(long)]
    devices: bool,
}

/// Prints finished turns.
struct PrintSink;

#[async_trait]
impl TurnSink for PrintSink {
    async fn append_turn(&self, turn: Turn) -> Result<(), SinkError> {
        println!("[{}] {:?}: {}", turn.index(), turn.actor(), turn.content());
        Ok(())
    }
}

fn tools() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry.register(
        FunctionDeclaration::new("get_unix_time")
            .with_description("Returns the current time as seconds since the Unix epoch."),
        |_| async move {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            Ok(json!({ "seconds": now }))
        },
    );
    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let args = Args::parse();
    if args.devices {
        println!("inputs:\n{}", device::get_available_inputs()?);
        println!("outputs:\n{}", device::get_available_outputs()?);
        return Ok(());
    }

    let mut config = Config::from_env()?;
    if let Some(model) = args.model.as_deref() {
        config = config.into_builder().with_model(model).build();
    }

    let registry = tools();
    let mut session = SessionConfig::new()
        .with_voice(args.voice.parse::<Voice>()?)
        .with_tools(registry.declarations());
    if let Some(prompt) = args.prompt.as_deref() {
        session = session.with_system_instruction(prompt);
    }

    let capture = AudioCaptureEngine::new(CpalCapture::new(args.input)?, CaptureConfig::new());
    let playback = AudioPlaybackEngine::new(CpalPlayback::new(args.output)?, PlaybackConfig::new());
    let mut conversation = Conversation::new(
        SessionConnection::new(config),
        capture,
        playback,
        Arc::new(registry),
        Arc::new(PrintSink),
        ConversationConfig::new().with_tool_timeout(Duration::from_secs(10)),
    );

    let mut notices = conversation.notices();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            eprintln!("! {}", notice);
        }
    });

    let controls = conversation.controls();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Received Ctrl-C, shutting down...");
            let _ = controls.send(Control::Hangup).await;
        }
    });

    println!("Listening. Press Ctrl-C to hang up.");
    conversation
        .run(session.build(), std::future::pending())
        .await?;
    println!("usage: {:?}", conversation.connection().stats());
    Ok(())
}
