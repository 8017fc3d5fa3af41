use gemini_rest_api::{CancellationToken, GenerateImageRequest, GenerativeModelBuilder};
use std::env;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    dotenv::dotenv().ok();

    let image_model =
        env::var("GEMINI_IMAGE_MODEL").unwrap_or_else(|_| "imagen-3.0-generate-002".to_string());
    let model = GenerativeModelBuilder::from_env()?.build()?.with_model(image_model);

    let cancel = CancellationToken::new();
    let models = model.list_models(&cancel).await?;
    let predict_models: Vec<_> = models
        .iter()
        .filter(|m| m.supports("predict"))
        .map(|m| m.name.as_str())
        .collect();
    info!("Models supporting predict: {:?}", predict_models);

    let prompt = env::args()
        .nth(1)
        .unwrap_or_else(|| "A lighthouse on a cliff at dusk, watercolor".to_string());
    info!("Generating image for prompt: {}", prompt);
    let response = model
        .generate_image(
            GenerateImageRequest::new(prompt)
                .sample_count(1)
                .aspect_ratio("16:9"),
            &cancel,
        )
        .await?;

    for (index, image) in response.predictions.iter().enumerate() {
        let extension = image.mime_type.rsplit('/').next().unwrap_or("png");
        let file = format!("image_{index}.{extension}");
        tokio::fs::write(&file, image.bytes()?).await?;
        info!("Saved {}", file);
    }
    Ok(())
}
