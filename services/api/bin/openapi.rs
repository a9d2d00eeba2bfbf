use duologue_api::router::ApiDoc;
use utoipa::OpenApi;

/// Writes the OpenAPI document for the sharing API to `path`.
fn write_openapi(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let json = ApiDoc::openapi().to_pretty_json()?;
    std::fs::write(path, json)?;
    println!("OpenAPI document written to {}", path);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());
    write_openapi(&path)
}
