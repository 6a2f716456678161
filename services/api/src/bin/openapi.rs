//! services/api/src/bin/openapi.rs
//!
//! Dumps the StudyDesk REST API description to `openapi.json`, so the
//! document can be committed or fed to client generators without starting
//! the server.

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

fn write_spec(doc: utoipa::openapi::OpenApi, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(path, doc.to_pretty_json()?)?;
    println!("wrote the API description to {path}");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    write_spec(ApiDoc::openapi(), "openapi.json")
}
