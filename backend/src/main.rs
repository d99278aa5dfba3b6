use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use backend::config::ServiceConfig;
use backend::routes::configure_routes;
use backend::startup::{AppState, StartupError, load_classifier};
use std::env;

fn startup_failed(e: StartupError) -> std::io::Error {
    log::error!("Startup failed: {}", e);
    std::io::Error::new(std::io::ErrorKind::Other, format!("Startup failed: {}", e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("Starting backend for Cow Lumpy Disease Prediction...");
    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = ServiceConfig::from_env()
        .map_err(StartupError::from)
        .map_err(startup_failed)?;

    log::info!("Loading model from: {}", config.model.path.display());
    let classifier = load_classifier(&config).map_err(startup_failed)?;
    log::info!("Model loaded successfully");

    let state = web::Data::new(AppState::new(&config, classifier).map_err(startup_failed)?);
    log::info!("Staging uploads under {}", config.upload.dir.display());

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(state.clone())
            .configure(configure_routes)
    });
    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    server.bind(&bind_address)?.run().await
}
