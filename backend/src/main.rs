use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use retina_backend::config::AppConfig;
use retina_backend::pipeline::DiagnosisPipeline;
use retina_backend::routes::configure_routes;
use retina_backend::session::SessionStore;
use std::env;
use std::time::Duration;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::other(format!("Configuration failed: {}", e))
    })?;

    let pipeline = DiagnosisPipeline::from_config(&config).map_err(|e| {
        log::error!("Failed to initialise the diagnosis backend: {}", e);
        std::io::Error::other(format!("Backend setup failed: {}", e))
    })?;
    let pipeline = web::Data::new(pipeline);
    let sessions = SessionStore::with_ttl(config.pipeline.session_ttl());
    actix_web::rt::spawn(sessions.clone().sweep_every(sessions.ttl().min(Duration::from_secs(60))));
    log::info!("Idle sessions expire after {}s", sessions.ttl().as_secs());
    let sessions = web::Data::new(sessions);

    let status = pipeline.backend().status();
    log::info!(
        "Model {} (kind: {}, enhanced: {})",
        status.model,
        status.kind,
        status.loaded
    );
    log::info!("Serving static assets from {}", config.frontend_dir);
    log::info!("Starting server on {}", config.bind_address);

    let frontend_dir = config.frontend_dir.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(pipeline.clone())
            .app_data(sessions.clone())
            .configure(|cfg| configure_routes(cfg, frontend_dir.clone()))
    })
    .bind(&config.bind_address)?
    .run()
    .await
}
