//! ChatGPT command line client
//!
//! Sends one prompt (optionally with an image) and prints the reply
//!
//! Usage: chatgpt-client [--image <url-or-base64>] <prompt...>

use anyhow::{Context, Result};
use chatgpt_client::utils::logging::init_logging;
use chatgpt_client::{
    ChatGptClient, HasContent, HasUsage, RequestOptions, Settings, VisionResponse,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let (settings, source) = load_settings()?;
    init_logging(&settings.logging);
    info!("{}", chatgpt_client::version_info());
    info!("Configuration loaded from {}", source);

    let (image, prompt) = parse_args(std::env::args().skip(1).collect())?;
    let client = ChatGptClient::new(&settings).context("Failed to create client")?;

    match image {
        Some(image) => {
            let response = if image.starts_with("http") {
                client.vision(&image, &prompt, RequestOptions::new()).await
            } else {
                client
                    .vision_from_base64(&image, &prompt, RequestOptions::new())
                    .await
            }
            .context("Vision request failed")?;
            print_vision(&response);
        }
        None => {
            let response = client
                .chat(&prompt, RequestOptions::new())
                .await
                .context("Chat request failed")?;
            println!("{}", response.content());
            println!();
            println!(
                "model: {}  tokens: {} prompt + {} completion = {}",
                response.model(),
                response.prompt_tokens(),
                response.completion_tokens(),
                response.total_tokens()
            );
        }
    }

    let status = client.rate_limit_status();
    println!(
        "rate limit: {}/{} remaining, resets at {}",
        status.remaining, status.limit, status.reset_at
    );

    Ok(())
}

/// Settings file if one exists, environment otherwise
fn load_settings() -> Result<(Settings, &'static str)> {
    let file_found = chatgpt_client::config::file::default_config_paths()
        .iter()
        .any(|path| path.exists());

    if file_found {
        let settings = Settings::load_default().context("Failed to load configuration file")?;
        Ok((settings, "configuration file"))
    } else {
        let settings = Settings::new().context("Failed to load client settings")?;
        Ok((settings, "environment"))
    }
}

fn parse_args(args: Vec<String>) -> Result<(Option<String>, String)> {
    let mut image = None;
    let mut words = Vec::new();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        if arg == "--image" {
            image = Some(iter.next().context("--image requires a value")?);
        } else {
            words.push(arg);
        }
    }

    if words.is_empty() {
        anyhow::bail!("Usage: chatgpt-client [--image <url-or-base64>] <prompt...>");
    }

    Ok((image, words.join(" ")))
}

fn print_vision(response: &VisionResponse) {
    println!("{}", response.analysis());
    println!();
    println!("summary: {}", response.summary());
    for (category, terms) in response.detected_entities() {
        println!("{}: {}", category, terms.join(", "));
    }
    if response.has_safety_concerns() {
        println!("warning: the analysis mentions safety concerns");
    }
}
