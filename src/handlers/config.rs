use crate::{config::AppConfig, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// The effective configuration, with secrets masked.
pub async fn get_config(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": redacted_config(state.config())
    }))
}

fn redacted_config(config: &AppConfig) -> serde_json::Value {
    let api_key = if config.transcription.api_key.is_empty() { "" } else { "********" };

    json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port
        },
        "storage": {
            "audio_dir": config.storage.audio_dir,
            "public_prefix": config.storage.public_prefix
        },
        "transcoder": {
            "ffmpeg_path": config.transcoder.ffmpeg_path,
            "output_format": config.transcoder.output_format,
            "timeout_secs": config.transcoder.timeout_secs
        },
        "transcription": {
            "backend": config.transcription.backend,
            "command": config.transcription.command,
            "model_path": config.transcription.model_path,
            "language": config.transcription.language,
            "base_url": config.transcription.base_url,
            "api_key": api_key,
            "model": config.transcription.model,
            "timeout_secs": config.transcription.timeout_secs
        },
        "performance": {
            "max_concurrent_sessions": config.performance.max_concurrent_sessions,
            "max_frame_bytes": config.performance.max_frame_bytes
        }
    })
}
