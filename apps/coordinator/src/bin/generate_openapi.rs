use anyhow::Context;
use std::fs;
use utoipa::OpenApi;

use coordinator::api::rest::ApiDoc;

fn main() -> anyhow::Result<()> {
    println!("Generating OpenAPI specification...");

    let openapi_json = serde_json::to_string_pretty(&ApiDoc::openapi())
        .context("Failed to serialize OpenAPI spec")?;

    // First argument overrides the output path
    let output_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());
    fs::write(&output_path, &openapi_json)
        .with_context(|| format!("Could not write {}", output_path))?;

    println!("✅ Generated {}", output_path);
    println!("📄 {} bytes written", openapi_json.len());
    Ok(())
}
