//! services/api/src/bin/openapi.rs
//!
//! Writes the OpenAPI 3.0 specification for the study API to disk, for
//! clients that want the schema without a running server.

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Output path may be given as the first argument.
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());

    let spec_json = ApiDoc::openapi().to_pretty_json()?;
    std::fs::write(&path, spec_json)?;
    println!("OpenAPI specification written to {path}");
    Ok(())
}
