mod api;
mod config;
mod credentials;
mod error;
mod logger;
mod render;
mod response;

use std::io;
use std::process::exit;

use anyhow::{Context, Result};
use clap::CommandFactory;
use log::warn;

use api::ApiClient;
use config::{validate_prompt, Config};
use error::ChatError;
use render::Renderer;

/// What the command line asks for before anything is loaded or sent.
#[derive(Debug, PartialEq, Eq)]
enum Invocation {
    Usage,
    PromptTooLong,
    Ask(String),
}

fn invocation(config: &Config) -> Invocation {
    match &config.prompt {
        None => Invocation::Usage,
        Some(p) if !validate_prompt(p) => Invocation::PromptTooLong,
        Some(p) => Invocation::Ask(p.clone()),
    }
}

/// Exit status for a failed run; pipeline errors keep their own code.
fn failure_exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<ChatError>()
        .map(ChatError::exit_code)
        .unwrap_or(1)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = Config::from_cli();
    if let Err(e) = logger::initialize(config.verbose) {
        eprintln!("WARNING: logging is unavailable: {}", e);
    }

    let prompt = match invocation(&config) {
        Invocation::Ask(prompt) => prompt,
        Invocation::Usage => {
            println!("Missing argument.\n");
            if let Err(e) = Config::command().print_help() {
                warn!("Could not print help: {}", e);
            }
            exit(0);
        }
        Invocation::PromptTooLong => {
            println!("Prompt too large. Brevity is a virtue.");
            exit(0);
        }
    };

    if let Err(e) = run(config, &prompt).await {
        eprintln!("ERROR: {:#}", e);
        exit(failure_exit_code(&e));
    }
}

async fn run(config: Config, prompt: &str) -> Result<()> {
    let renderer = Renderer::new(config.reveal_delay());
    let api_client = ApiClient::new(config);

    let answer = api_client
        .do_completion(prompt)
        .await
        .context("Failed posting prompt")?;

    let mut stdout = io::stdout().lock();
    renderer
        .render(&mut stdout, answer.as_str())
        .map_err(ChatError::from)
        .context("Failed rendering answer")?;

    Ok(())
}
