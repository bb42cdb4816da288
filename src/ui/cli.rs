//! Command-line interface implementation

use clap::Parser;

use crate::deck::SlideDeck;

/// Command-line arguments for slidecast
#[derive(Parser, Debug)]
#[command(author, version, about = "Narrated slide deck auto-player", long_about = None)]
pub struct Args {
    /// Slide deck JSON file to present
    #[arg(short = 'f', long, env = "SLIDECAST_DECK")]
    pub deck: String,

    /// Speech-synthesis service endpoint URL
    #[arg(short, long, env = "SLIDECAST_SYNTHESIS_URL")]
    pub synthesis_url: Option<String>,

    /// Default narration voice
    #[arg(short, long, env = "SLIDECAST_VOICE")]
    pub voice: Option<String>,

    /// Delay between slides in milliseconds (0-10000)
    #[arg(short = 'd', long, env = "SLIDECAST_DELAY_MS")]
    pub delay_ms: Option<u64>,

    /// Config file path
    #[arg(short, long, env = "SLIDECAST_CONFIG")]
    pub config: Option<String>,
}

/// CLI user interface for interacting with the application
pub struct Cli {
    pub args: Args,
}

impl Cli {
    /// Create a new CLI instance
    pub fn new() -> Self {
        Cli { args: Args::parse() }
    }

    /// Display a summary of the deck about to be presented
    pub fn display_deck(&self, deck: &SlideDeck) {
        println!("\nPresenting {} slides (default voice: {})", deck.slide_count(), deck.default_voice);
        println!("{:<5} {:<20} {:<10} {}", "#", "Slide", "Voice", "Narration");
        println!("{}", "-".repeat(70));

        for (index, slide) in deck.slides.iter().enumerate() {
            let voice = slide.voice_override.as_deref().unwrap_or(&deck.default_voice);
            let narration = if slide.narration_text.len() > 32 {
                format!("{:.29}...", slide.narration_text)
            } else if slide.narration_text.is_empty() {
                "(silent)".to_string()
            } else {
                slide.narration_text.clone()
            };
            println!("{:<5} {:<20} {:<10} {}", index + 1, slide.id, voice, narration);
        }
        println!();
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self::new()
    }
}
