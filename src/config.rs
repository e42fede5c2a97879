use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ChatError;

/// Longest prompt accepted, counted in characters.
pub const MAX_PROMPT_LEN: usize = 4096;

const RESPONSES_PATH: &str = "/v1/responses";

// relative to the user's home directory
const SECRETS_RELATIVE_PATH: &str = ".local/share/chat-cli/secrets.json";

const DEFAULT_INSTRUCTIONS: &str = "You are my in-console assistant. Respond only with text, \
never code snippets, images, or any formatting, only plain text. Respond with the tone of a \
servitor robot from Warhammer 40k.";

#[derive(Debug, Clone, Parser)]
#[clap(
    name = "chat-cli",
    version = "0.1.0",
    about = "Sends a single prompt to an AI text generation API and reveals the answer in the terminal."
)]
pub struct Config {
    #[clap(value_name = "PROMPT", help = "The prompt to send; quote it if it has spaces")]
    pub prompt: Option<String>,

    #[clap(
        long("api"),
        value_name = "URL",
        help = "The API endpoint base URL to use.",
        default_value = "https://api.openai.com"
    )]
    pub api: String,

    #[clap(
        long("model"),
        value_name = "MODEL_ID",
        help = "Sets the model to use for generating the response",
        default_value = "gpt-4.1-nano"
    )]
    pub model_id: String,

    #[clap(
        long,
        value_name = "TEXT",
        help = "The system instructions sent along with every prompt",
        default_value = DEFAULT_INSTRUCTIONS
    )]
    pub instructions: String,

    #[clap(
        long("secrets"),
        value_name = "FILEPATH",
        help = "Reads the API key from this file instead of ~/.local/share/chat-cli/secrets.json"
    )]
    pub secrets_file: Option<PathBuf>,

    #[clap(
        long,
        value_name = "INT",
        help = "Milliseconds to wait between revealed characters",
        default_value_t = 10
    )]
    pub delay_ms: u64,

    #[clap(
        short('v'),
        long,
        action = clap::ArgAction::Count,
        help = "Log more detail to stderr; repeat for more"
    )]
    pub verbose: u8,
}

impl Config {
    pub fn from_cli() -> Self {
        Config::parse()
    }

    /// The full URL the prompt is posted to.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.api.trim_end_matches('/'), RESPONSES_PATH)
    }

    /// Resolves the secrets file, preferring an explicit `--secrets` path.
    pub fn secrets_path(&self) -> Result<PathBuf, ChatError> {
        if let Some(path) = &self.secrets_file {
            return Ok(path.clone());
        }

        match dirs::home_dir() {
            Some(home) => Ok(home.join(SECRETS_RELATIVE_PATH)),
            None => Err(ChatError::CredentialMissing {
                path: PathBuf::from("~").join(SECRETS_RELATIVE_PATH),
                reason: "could not determine the home directory".to_string(),
            }),
        }
    }

    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Returns false when the prompt is over `MAX_PROMPT_LEN` characters.
pub fn validate_prompt(prompt: &str) -> bool {
    prompt.chars().count() <= MAX_PROMPT_LEN
}
