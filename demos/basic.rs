//! Structured call with redaction, moderation, caching and repair.
//!
//! Run with `cargo run --example basic --features mocks`.

use std::sync::Arc;
use std::time::Duration;

use llm_safecall::mocks::MockBackend;
use llm_safecall::observability::{LogFormat, LoggingConfig};
use llm_safecall::{JsonSchema, SafeCall};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct Contact {
    name: String,
    city: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    LoggingConfig::new().with_format(LogFormat::Compact).init()?;

    let backend = Arc::new(
        MockBackend::new(r#"{"name": "Ada", "city": "London"}"#).with_model("mock-small"),
    );
    // The first answer is prose, so the repair path runs once.
    backend.queue_text("Ada lives in London.");

    let call = SafeCall::builder(backend.clone())
        .output(JsonSchema::<Contact>::new().with_validator(|c: &Contact| {
            if c.name.is_empty() {
                Err("name must not be empty".to_string())
            } else {
                Ok(())
            }
        }))
        .redact("email")
        .redact("phone")
        .param("temperature", 0.0)
        .timeout(Duration::from_secs(10))
        .build()?;

    let prompt = "Extract the contact from: Ada, ada@example.com, +1 555 010 9999, London";

    let contact = call.generate(prompt).await?;
    println!(
        "{} in {} (model {:?}, {:.1} ms, repaired: {})",
        contact.name,
        contact.city,
        contact.report().model,
        contact.report().latency_ms,
        contact.report().repaired,
    );

    let again = call.generate(prompt).await?;
    println!("second call served from cache: {}", again.report() == contact.report());

    println!("backend saw: {:?}", backend.prompts());
    println!("metrics: {:?}", call.metrics().get_metrics());

    Ok(())
}
