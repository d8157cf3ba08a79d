use std::io::Write;

use anyhow::{Context, Result};
use nai_llm::{discover_api_key, ClientConfig, Conversation};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let api_key = discover_api_key(None).context("No NovelAI token found (NAI_API_KEY or ~/.naitoken)")?;
    let mut config = ClientConfig::load(None)?.with_api_key(api_key);
    // Small limit so the continuation loop has something to do
    config.generation.max_tokens = 64;

    let mut conversation = Conversation::from_config("You are a storyteller.", &config)?;

    let mut on_token = |text: &str, done: bool| {
        if done {
            println!();
        } else {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
    };

    let reply = match conversation
        .send_streaming_until_done("Tell me a short story about a lighthouse keeper.", &mut on_token)
        .await
    {
        Ok(reply) => reply,
        Err(incomplete) => {
            eprintln!("\nStopped early: {}", incomplete.error);
            incomplete.partial
        }
    };

    println!("\nStop reason: {}", reply.stop_reason);
    println!("Turns in history: {}", conversation.messages().len());

    Ok(())
}
