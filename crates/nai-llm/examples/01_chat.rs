use anyhow::{Context, Result};
use nai_llm::{discover_api_key, ClientConfig, Conversation};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let api_key = discover_api_key(None).context("No NovelAI token found (NAI_API_KEY or ~/.naitoken)")?;
    let config = ClientConfig::load(None)?.with_api_key(api_key);

    let mut conversation = Conversation::from_config("You are a concise assistant.", &config)?;

    let reply = conversation.send("Name three moons of Jupiter.").await?;
    println!("Response: {}", reply.text);
    println!("Stop reason: {}", reply.stop_reason);

    let reply = conversation.send("Which one is the largest?").await?;
    println!("Response: {}", reply.text);

    let usage = conversation.usage();
    println!("Tokens - Input: {}, Output: {}", usage.input_tokens, usage.output_tokens);

    Ok(())
}
