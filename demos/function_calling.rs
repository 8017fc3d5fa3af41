use gemini_rest_api::{
    CancellationToken, ChatSession, Content, FunctionTarget, GenerativeModelBuilder,
    function_target, types::*,
};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{info, warn};

#[derive(Default)]
struct Calculator {
    call_count: AtomicU32,
}

#[function_target]
impl Calculator {
    /// Calculates the sum of two numbers
    #[callable]
    fn sum(&self, a: f64, b: f64) -> f64 {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!("[Tool] sum called (count {}). Args: a={}, b={}", count, a, b);
        a + b
    }

    #[callable("Calculates the division of two numbers")]
    fn divide(&self, numerator: f64, denominator: f64) -> Result<f64, String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        info!(
            "[Tool] divide called with num={}, den={}",
            numerator, denominator
        );
        if denominator == 0.0 {
            Err("Cannot divide by zero.".to_string())
        } else {
            Ok(numerator / denominator)
        }
    }
}

const MAX_ROUNDS: usize = 8;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    dotenv::dotenv().ok();

    let calculator = Calculator::default();
    let registry = Calculator::function_registry()?;

    info!("Configuring model for function calling...");
    let model = GenerativeModelBuilder::from_env()?
        .generation_config(GenerationConfig {
            temperature: Some(0.2),
            ..Default::default()
        })
        .system_instruction(Content::instruction(
            "You are an assistant that uses tools for calculations.",
        ))
        .tools(vec![registry.tool()?])
        .build()?;
    info!("Using model {}", model.model_name());

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received.");
            on_ctrl_c.cancel();
        }
    });

    let mut chat = ChatSession::new(model);
    let prompt = "Please calculate 15.5 + 7.2 for me. Then, divide that sum by 2. Then add 10 + 5.";
    info!("Sending initial prompt: {}", prompt);
    let mut response = chat.send(Content::user(prompt), &cancel).await?;

    for _ in 0..MAX_ROUNDS {
        let calls = response.function_calls();
        if calls.is_empty() {
            break;
        }
        let replies = calls
            .into_iter()
            .map(|call| registry.respond(&calculator, call))
            .collect();
        response = chat.send_function_responses(replies, &cancel).await?;
    }

    if !response.function_calls().is_empty() {
        warn!("Model still requesting tools after {} rounds", MAX_ROUNDS);
    }
    info!(
        "\n--- Final Text Response ---\n{}\n--------------------\nTool call count: {}",
        response.text().trim(),
        calculator.call_count.load(Ordering::SeqCst)
    );
    Ok(())
}
