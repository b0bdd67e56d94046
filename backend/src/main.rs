use std::path::PathBuf;

use actix_web::dev::ServerHandle;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use backend::config::ServerConfig;
use backend::configure_routes;
use backend::inference::model::{backend_available, load_classifier, warm_up};
use backend::inference::{InferenceError, LabelTable, ModelSlot};
use backend::state::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = ServerConfig::from_env().map_err(startup_error)?;
    let preprocess = config.load_preprocess().map_err(startup_error)?;
    let labels = LabelTable::load_or_synthetic(config.labels_path.as_deref());

    log::info!("Allowed origins: {:?}", config.allowed_origins);
    if !backend_available() {
        log::warn!(
            "Built without the `torch` feature: no model can be loaded and the server will stop once startup finishes"
        );
    }
    if !config.require_origin {
        log::warn!("Sessions without an Origin header are accepted (REQUIRE_ORIGIN=false)");
    }

    let state = web::Data::new(AppState::new(&config, ModelSlot::new(), labels, preprocess));
    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .configure(|cfg| configure_routes(cfg, app_state.clone()))
    })
    .bind(&bind_address)?
    .run();

    actix_web::rt::spawn(load_model(
        state.clone(),
        config.model_path.clone(),
        server.handle(),
    ));
    server.await?;

    if !state.model.is_loaded() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "Server stopped without a loaded model",
        ));
    }
    Ok(())
}

/// Loads and warms up the model off the event loop. The server is stopped if
/// no model can be loaded, since it would never become ready.
async fn load_model(state: web::Data<AppState>, model_path: Option<PathBuf>, server: ServerHandle) {
    log::info!("Loading model...");
    let preprocess = state.preprocess.clone();
    let loaded = web::block(move || {
        let model = load_classifier(model_path.as_deref())?;
        let classes = warm_up(model.as_ref(), &preprocess)?;
        Ok::<_, InferenceError>((model, classes))
    })
    .await;

    let error = match loaded {
        Ok(Ok((model, classes))) => {
            if !state.labels.is_empty() && state.labels.len() != classes {
                log::warn!(
                    "Label table has {} entries but the model outputs {} classes",
                    state.labels.len(),
                    classes
                );
            }
            match state.model.install(model) {
                Ok(()) => {
                    log::info!("Model loaded successfully ({} classes)", classes);
                    return;
                }
                Err(e) => e.to_string(),
            }
        }
        Ok(Err(e)) => e.to_string(),
        Err(e) => e.to_string(),
    };

    log::error!("Failed to load model: {}", error);
    server.stop(true).await;
}

fn startup_error(e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("Configuration error: {}", e),
    )
}
