use std::fs;

fn main() -> anyhow::Result<()> {
    // Generate the OpenAPI document exactly as the server would serve it.
    let doc = lectern::docs::build_openapi(8000)?;
    let s = serde_json::to_string_pretty(&doc)?;
    let path = "/tmp/lectern-openapi.json";
    fs::write(path, s)?;
    println!("wrote {}", path);
    Ok(())
}
