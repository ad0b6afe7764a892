use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// AI clinical intake CLI
#[derive(Debug, Parser)]
#[command(name = "intake")]
#[command(version)]
#[command(about = "AI clinical intake CLI", long_about = None)]
pub struct Args {
    /// Model name (OpenAI: single candidate; Hugging Face: model id)
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Provider (default: config/provider or "openai")
    #[arg(long = "provider")]
    pub provider: Option<String>,

    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Prompt text (positional) (used when no subcommand is given)
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a clinical questionnaire from a patient-context JSON file
    Generate {
        /// Patient context JSON (vitals, uploads, free-form notes);
        /// defaults to an empty context
        #[arg(long = "context", value_name = "FILE")]
        context: Option<PathBuf>,
    },

    /// Generate a narrative health report from questionnaire answers
    Report {
        /// Questionnaire JSON as produced by `generate`
        #[arg(long = "questions", value_name = "FILE")]
        questions: PathBuf,

        /// Answers JSON object keyed by question id
        #[arg(long = "answers", value_name = "FILE")]
        answers: PathBuf,
    },

    /// Run a differential-diagnosis analysis over a patient case JSON file
    Analyze {
        /// Case JSON (age, gender, symptoms, vitals, history, medications)
        #[arg(value_name = "FILE")]
        case: PathBuf,
    },

    /// Store an API token in the local settings file
    SetToken {
        /// Provider the token belongs to ("openai" or "huggingface")
        provider: String,
        token: String,
    },

    /// Configure client-direct mode (browser-style direct endpoint calls)
    Direct {
        /// Dedicated inference endpoint URL
        #[arg(long)]
        url: Option<String>,

        /// Token for the dedicated endpoint
        #[arg(long)]
        token: Option<String>,

        /// Turn client-direct mode off
        #[arg(long)]
        disable: bool,
    },
}
