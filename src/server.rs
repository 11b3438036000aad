use actix_cors::Cors;
use actix_web::{
    dev::Server, http::header, middleware, web, App, HttpServer, Scope,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    configuration::{AppState, State},
    controller::push,
    error::Error,
};

const JSON_LIMIT: usize = 4096;

pub async fn server_task(
    app_state: &AppState<State>,
    token: CancellationToken,
) -> Result<(), Error> {
    let app = app_state.clone();
    tokio::spawn(async move {
        let server = init_server(app)?;
        let handle = server.handle();

        tokio::spawn(async move {
            token.cancelled().await;
            info!("Stopping HTTP server");
            handle.stop(true).await;
        });

        server.await?;
        Ok(())
    })
    .await?
}

pub fn api_scope() -> Scope {
    web::scope("/api/push")
        .service(push::vapid_key)
        .service(push::subscribe)
        .service(push::unsubscribe)
        .service(push::send)
        .service(push::status)
}

/// Malformed bodies surface as `ValidationError` instead of actix's plain
/// text 400.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_LIMIT)
        .error_handler(|err, _req| {
            Error::ValidationError(err.to_string()).into()
        })
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        Error::ValidationError(err.to_string()).into()
    })
}

fn init_server(app_state: AppState<State>) -> Result<Server, Error> {
    let host = app_state.config.server_host.to_owned();
    let port = app_state.config.port;

    info!("Listening on {}:{}", host, port);

    let server = HttpServer::new(move || {
        let app = app_state.clone();
        let allowed_cors = String::from("*");
        let cors_access_all =
            app.config.allowed_origins.contains(&allowed_cors);
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _| {
                if cors_access_all {
                    return true;
                }
                let allowed = &app.config.allowed_origins;
                if let Ok(origin) = origin.to_str() {
                    return allowed.contains(&origin.to_owned());
                }
                false
            })
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT])
            .allowed_header(header::CONTENT_TYPE);

        App::new()
            .wrap(cors)
            .wrap(middleware::Compress::default())
            .app_data(web::Data::new(app_state.clone()))
            .app_data(json_config())
            .app_data(query_config())
            .service(api_scope())
    })
    .bind((host, port))?
    .disable_signals()
    .run();
    Ok(server)
}
