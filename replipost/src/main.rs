use actix_web::{web, App, HttpServer, middleware::{Logger, DefaultHeaders}, cookie::Key, HttpResponse, Responder};
use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_csrf::CsrfMiddleware;
use tera::Tera;
use replipost::{
    config::Config,
    duplicator::{Duplicator, LogObserver},
    helper::nonce_helpers::NonceStore,
    middleware::{ip_guard, LoginRequired},
    models::content_types::ContentTypeRegistry,
    models::db_operations::posts_db_operations::RedbContentStore,
    routes,
    AppState,
};
use redb::Database;
use r2d2_sqlite::SqliteConnectionManager;
use r2d2::Pool;
use std::fs;
use std::time::Duration;
use clap::Parser;
use std::path::PathBuf;
use rand::prelude::StdRng;

async fn root_handler() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

#[derive(Parser, Debug)]
#[command(name = "replipost_server", author, version, about = "Starts the RepliPost admin server.")]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file)
        .expect("FATAL: Failed to load or parse configuration.");

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    let tera = Tera::new("templates/**/*.html").expect("Tera initialization failed");

    fs::create_dir_all(&config.database_path)
        .expect("Failed to create database directory");

    let registry = ContentTypeRegistry::new(config.content_types.clone(), config.taxonomies.clone());
    let posts_db = Database::open(&config.posts_db_path())
        .expect("FATAL: posts.db not found. Run 'cargo run --bin setup_cli -- --env-file <path> db setup'");
    let store = web::Data::new(
        RedbContentStore::new(posts_db, registry).expect("FATAL: Failed to open the content tables."),
    );

    let manager = SqliteConnectionManager::file(config.users_db_path());
    let pool = Pool::builder()
        .build(manager)
        .expect("FATAL: Failed to create Rusqlite connection pool.");

    let duplicator = web::Data::new(Duplicator::new().with_observer(LogObserver));
    let app_state = web::Data::new(AppState {
        nonces: NonceStore::new(Duration::from_secs(config.nonce_ttl_seconds)),
    });

    let session_key_bytes = hex::decode(&config.session_secret_key)
        .expect("FATAL: SESSION_SECRET_KEY in .env is not a valid hex string.");
    let session_key = Key::try_from(session_key_bytes.as_slice())
        .expect("FATAL: The decoded SESSION_SECRET_KEY is not long enough (minimum 64 bytes required).");

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    log::info!("Server starting at http://{}{}", server_address, config.admin_path("login"));

    HttpServer::new(move || {
        let session_mw = SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
            .cookie_secure(config.use_secure_cookies)
            .cookie_http_only(true)
            .cookie_same_site(actix_web::cookie::SameSite::Lax)
            .build();

        let admin_url_prefix = config.admin_url_prefix.clone();

        App::new()
            .wrap(Logger::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block"))
            )
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(tera.clone()))
            .app_data(store.clone())
            .app_data(web::Data::new(pool.clone()))
            .app_data(duplicator.clone())
            .app_data(app_state.clone())

            .route("/", web::get().to(root_handler))

            .service(
                web::scope("")
                    .wrap(session_mw)
                    .service(
                        web::scope("/management")
                            .service(
                                web::scope(&admin_url_prefix)
                                    .wrap(
                                        CsrfMiddleware::<StdRng>::new()
                                            .set_cookie(
                                                actix_web::http::Method::GET,
                                                format!("/management/{}/login", admin_url_prefix)
                                            )
                                            .set_cookie(
                                                actix_web::http::Method::GET,
                                                format!("/management/{}/posts", admin_url_prefix)
                                            )
                                            .set_cookie(
                                                actix_web::http::Method::GET,
                                                format!("/management/{}/settings", admin_url_prefix)
                                            )
                                            .set_cookie(
                                                actix_web::http::Method::GET,
                                                format!("/management/{}/posts/{{id}}/edit", admin_url_prefix)
                                            )
                                    )
                                    .guard(actix_web::guard::fn_guard(ip_guard))
                                    .configure(routes::admin::config_login)
                                    .service(
                                        web::scope("")
                                            .wrap(LoginRequired)
                                            .configure(routes::posts::config_posts)
                                            .configure(routes::admin::config_settings)
                                    )
                            )
                    )
            )
    })
    .bind(server_address)?
    .run()
    .await
}
