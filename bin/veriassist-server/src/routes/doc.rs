use utoipa::OpenApi;

use crate::routes::{chat, health};

#[derive(OpenApi)]
#[openapi(info(
    title = "veriassist-server",
    description = "VeriAssist chat API: streams answers from a local Ollama model"
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(chat::ChatApi::openapi());
    root.merge(health::HealthApi::openapi());
    root
}
