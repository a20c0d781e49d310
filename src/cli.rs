use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "speakez", about = "SpeakEZ - live sign recognition sessions")]
pub struct CliArgs {
    /// Settings file (defaults to $SPEAKEZ_CONFIG or ./speakez.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Classifier base URL, overriding the settings file
    #[arg(long)]
    pub url: Option<String>,

    /// Start with audio feedback switched off
    #[arg(long)]
    pub no_audio: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Practise letters with frames from a directory standing in for the camera
    Practice {
        #[arg(long)]
        frames: PathBuf,
    },
    /// Pair with the glove and echo every detected letter
    Pair {
        /// Send simulated sensor readings instead of pulling from the device
        #[arg(long)]
        simulate: bool,
    },
}
