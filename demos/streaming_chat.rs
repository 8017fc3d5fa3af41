use gemini_rest_api::{CancellationToken, Content, GenerativeModelBuilder};
use std::io::{self, BufRead, Write};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    dotenv::dotenv().ok();

    let model = GenerativeModelBuilder::from_env()?
        .system_instruction(Content::instruction("You are a concise, friendly assistant."))
        .build()?;
    info!("Streaming chat with {}. Empty line quits.", model.model_name());

    let mut chat = model.start_chat();
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }

        // Ctrl+C cancels the current turn only.
        let cancel = CancellationToken::new();
        let on_ctrl_c = cancel.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_ctrl_c.cancel();
            }
        });

        let result = chat
            .send_stream(Content::user(line.trim()), &cancel, |fragment| {
                print!("{}", fragment.text());
                let _ = io::stdout().flush();
            })
            .await;
        watcher.abort();
        println!();

        match result {
            Ok(_) => info!("History has {} entries", chat.history().len()),
            Err(e) if e.is_canceled() => info!("Turn canceled."),
            Err(e) => error!("Turn failed: {}", e),
        }
    }
    Ok(())
}
