use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod auth;
mod config;
mod db;
mod error;
mod models;
mod services;

use config::Config;
use db::create_mongodb_client;
use error::ApiError;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env().expect("Failed to load configuration");
    error::set_development_mode(config.development);

    log::info!(
        "Starting server on {}:{}",
        config.server.host,
        config.server.port
    );

    let mongodb_db = create_mongodb_client(&config)
        .await
        .expect("Failed to create MongoDB client");

    db::ensure_indexes(&mongodb_db)
        .await
        .expect("Failed to create MongoDB indexes");

    services::uploads::ensure_upload_dirs(&config).expect("Failed to create upload directories");

    log::info!("Database connection established");

    let openapi = api::ApiDoc::openapi();

    let server_host = config.server.host.clone();
    let server_port = config.server.port;
    HttpServer::new(move || {
        let cors = match &config.cors.client_url {
            // Credentialed CORS requires a concrete origin, so the browser
            // client is pinned when CLIENT_URL is set.
            Some(client_url) => Cors::default()
                .allowed_origin(client_url)
                .allow_any_method()
                .allow_any_header()
                .supports_credentials(),
            None => Cors::permissive(),
        };

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(mongodb_db.clone()))
            // Extractor failures come back as the same {message} JSON body
            // the handlers produce.
            .app_data(
                web::QueryConfig::default()
                    .error_handler(|err, _| ApiError::validation(err.to_string()).into()),
            )
            .app_data(
                web::JsonConfig::default()
                    .error_handler(|err, _| ApiError::validation(err.to_string()).into()),
            )
            .app_data(
                web::PathConfig::default()
                    .error_handler(|err, _| ApiError::validation(err.to_string()).into()),
            )
            .route(
                "/api/docs",
                web::get().to(|| async {
                    actix_web::HttpResponse::PermanentRedirect()
                        .append_header(("Location", "/api/docs/"))
                        .finish()
                }),
            )
            .service(
                SwaggerUi::new("/api/docs/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
            .service(actix_files::Files::new("/uploads", config.uploads.dir.clone()))
            .configure(api::configure)
            .default_service(web::route().to(api::not_found))
    })
    .bind(format!("{}:{}", server_host, server_port))?
    .run()
    .await
}
