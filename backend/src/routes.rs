use actix_cors::Cors;
use actix_web::http::{Method, header};
use actix_web::{Error, HttpRequest, HttpResponse, web};
use shared::PreflightAck;

use crate::health;
use crate::session::handler::{ClassificationSession, reject};
use crate::session::origin::{OriginDecision, OriginGate};
use crate::state::AppState;

pub fn configure_routes(cfg: &mut web::ServiceConfig, state: web::Data<AppState>) {
    let cors = health_cors(&state.origins);
    cfg.app_data(state)
        .service(
            web::resource("/ws")
                .route(web::get().to(session_endpoint))
                .route(web::method(Method::OPTIONS).to(session_preflight)),
        )
        .service(
            web::resource("/health")
                .wrap(cors)
                .route(web::get().to(health_check)),
        );
}

fn health_cors(origins: &OriginGate) -> Cors {
    origins
        .allowed_origins()
        .filter(|origin| *origin != "*")
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allowed_methods(vec!["GET", "OPTIONS"])
        .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
        .max_age(3600)
}

fn peer_identity(req: &HttpRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn session_endpoint(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let peer = peer_identity(&req);
    log::info!("Session connection attempt from {}", peer);

    // A non-UTF-8 Origin can never match the allow-list.
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .map(|value| value.to_str().unwrap_or("<invalid>"));
    let decision = state.origins.check(origin);

    let (response, session, stream) = actix_ws::handle(&req, body)?;
    match decision {
        OriginDecision::Accept => {
            let handler = ClassificationSession::new(state, session, peer);
            actix_web::rt::spawn(handler.run(stream));
        }
        OriginDecision::Reject(reason) => {
            actix_web::rt::spawn(reject(session, stream, reason, peer));
        }
    }
    Ok(response)
}

async fn session_preflight() -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .insert_header((
            header::ACCESS_CONTROL_ALLOW_METHODS,
            "GET, POST, OPTIONS, CONNECT",
        ))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "*"))
        .insert_header((header::ACCESS_CONTROL_MAX_AGE, "3600"))
        .json(PreflightAck {
            message: "WebSocket connection allowed".to_string(),
        })
}

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let status = health::report(&state.model);
    if status.model_loaded {
        HttpResponse::Ok().json(status)
    } else {
        HttpResponse::ServiceUnavailable().json(status)
    }
}
