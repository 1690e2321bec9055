use utoipa::OpenApi;

fn main() {
    let spec = roomcast_gateway::routes::ApiDoc::openapi()
        .to_pretty_json()
        .expect("serialize openapi");
    let out = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../specs/gateway.json");
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).expect("create specs dir");
    }
    std::fs::write(&out, spec).expect("write openapi spec");
    println!("Wrote {}", out.display());
}
