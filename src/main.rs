use indicatif::{ProgressBar, ProgressStyle};
use slidecast::config::Settings;
use slidecast::deck::SlideDeck;
use slidecast::init_app_dirs;
use slidecast::scheduler::{AutoplayState, Scheduler, SchedulerCommand, SchedulerStateUpdate};
use slidecast::synth::{HttpSynthesisClient, SynthesisClient};
use slidecast::ui::Cli;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const STATE_UPDATE_CAPACITY: usize = 64;
const COMMAND_BUFFER_SIZE: usize = 16;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Parse command-line arguments and initialize CLI
    let cli = Cli::new();
    let args = &cli.args;

    // Initialize application directories
    init_app_dirs()?;

    // Load configuration from file or create default
    let config_path = match &args.config {
        Some(path) => Path::new(path).to_path_buf(),
        None => Settings::default_path(),
    };
    let mut settings = Settings::load(&config_path)?;

    // Override settings with command-line arguments / environment
    settings.synthesis_url = args.synthesis_url.clone().unwrap_or(settings.synthesis_url);
    settings.default_voice = args.voice.clone().unwrap_or(settings.default_voice);
    settings.autoplay_delay_ms = args.delay_ms.unwrap_or(settings.autoplay_delay_ms);
    settings.validate()?;

    // Load the deck and apply the effective default voice
    let mut deck = SlideDeck::load(Path::new(&args.deck))?;
    if deck.default_voice.is_empty() {
        deck.default_voice = settings.default_voice.clone();
    }
    cli.display_deck(&deck);

    let synthesis_client: Arc<dyn SynthesisClient> = Arc::new(HttpSynthesisClient::new(&settings.synthesis_url));
    let (mut scheduler, command_tx) = Scheduler::new(
        synthesis_client,
        deck.clone(),
        &settings,
        STATE_UPDATE_CAPACITY,
        COMMAND_BUFFER_SIZE,
    );
    let mut updates = scheduler.subscribe_state_updates();

    let scheduler_handle = tokio::spawn(async move {
        scheduler.run().await;
    });

    command_tx.send(SchedulerCommand::SetAutoplay(true)).await?;

    // Render narration progress until autoplay returns to idle
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{msg:<20} [{bar:40}] {percent:>3}%")?
            .progress_chars("=> "),
    );
    if let Some(slide) = deck.slide(0) {
        bar.set_message(slide.id.clone());
    }

    loop {
        match updates.recv().await {
            Ok(SchedulerStateUpdate::SlideAdvanced { index }) => {
                bar.set_position(0);
                if let Some(slide) = deck.slide(index) {
                    bar.set_message(slide.id.clone());
                }
            }
            Ok(SchedulerStateUpdate::Progress { fraction, .. }) => {
                bar.set_position((fraction * 100.0).round() as u64);
            }
            Ok(SchedulerStateUpdate::TransientError(message)) => {
                bar.println(format!("! {}", message));
            }
            Ok(SchedulerStateUpdate::AutoplayStateChanged(AutoplayState::Idle)) | Ok(SchedulerStateUpdate::Stopped) => {
                break;
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {} scheduler updates.", skipped);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
    bar.finish_and_clear();
    println!("Presentation finished.");

    command_tx.send(SchedulerCommand::Shutdown).await.ok();
    scheduler_handle.await?;
    Ok(())
}
