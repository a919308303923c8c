use crate::config::Config;
use crate::helper::admin_helpers::{self, DuplicationSettingsInput};
use crate::helper::form_helpers::collect_prefixed;
use crate::middleware::{logged_in, AuthenticatedUser};
use crate::models::db_operations::posts_db_operations::RedbContentStore;
use crate::models::db_operations::users_db_operations;
use crate::routes::{load_user, redirect, render, render_error, set_notification, status_choices, take_notification};
use crate::DbPool;
use actix_csrf::extractor::{Csrf, CsrfGuarded, CsrfToken};
use actix_session::Session;
use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tera::{Context, Tera};

#[derive(Deserialize)]
struct LoginForm {
    csrf_token: CsrfToken,
    username: String,
    password: String,
}

impl CsrfGuarded for LoginForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Deserialize)]
struct SettingsForm {
    csrf_token: CsrfToken,
    title_suffix: Option<String>,
    default_status: Option<String>,
    /// One `post_type_<name>` field per checked type.
    #[serde(flatten)]
    fields: HashMap<String, String>,
}

impl CsrfGuarded for SettingsForm {
    fn csrf_token(&self) -> &CsrfToken {
        &self.csrf_token
    }
}

#[derive(Serialize)]
struct TypeChoice<'a> {
    name: &'a str,
    label: &'a str,
    checked: bool,
}

pub fn config_login(cfg: &mut web::ServiceConfig) {
    cfg.route("/login", web::get().to(show_login_form))
        .route("/login", web::post().to(handle_login))
        .route("/logout", web::post().to(handle_logout));
}

pub fn config_settings(cfg: &mut web::ServiceConfig) {
    cfg.route("/settings", web::get().to(show_settings))
        .route("/settings", web::post().to(update_settings_action));
}

async fn show_login_form(
    session: Session,
    tera: web::Data<Tera>,
    token: CsrfToken,
    config: web::Data<Config>,
) -> impl Responder {
    if logged_in(&session) {
        return redirect(&config.admin_path("posts"));
    }

    let mut ctx = Context::new();
    ctx.insert("admin_base", &config.admin_path(""));
    ctx.insert("csrf_token", token.get());

    if let Ok(Some(error)) = session.get::<String>("error") {
        ctx.insert("error", &error);
        session.remove("error");
    }

    render(&tera, "admin/login.html", &ctx)
}

async fn handle_login(
    session: Session,
    pool: web::Data<DbPool>,
    form: Csrf<web::Form<LoginForm>>,
    config: web::Data<Config>,
) -> impl Responder {
    let login_url = config.admin_path("login");
    let login_data = form.into_inner().into_inner();

    let conn = match admin_helpers::get_conn(&pool) {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Could not get DB connection for login: {}", e);
            return HttpResponse::InternalServerError().body("Database unavailable.");
        }
    };

    match users_db_operations::verify_credentials(&conn, &login_data.username, &login_data.password) {
        Some((username, role)) => {
            session.renew();
            let stored = session
                .insert("username", &username)
                .and_then(|_| session.insert("role", &role));
            if let Err(e) = stored {
                log::error!("Could not store session for '{}': {}", username, e);
                return HttpResponse::InternalServerError().body("Could not start session.");
            }
            if let Err(e) = users_db_operations::update_last_login_time(&conn, &username) {
                log::warn!("Could not update last login time for '{}': {}", username, e);
            }
            log::info!("User '{}' logged in", username);
            redirect(&config.admin_path("posts"))
        }
        None => {
            log::warn!("Failed login attempt for '{}'", login_data.username);
            if let Err(e) = session.insert("error", "Invalid credentials or account suspended.") {
                log::error!("Could not store login error in session: {}", e);
            }
            redirect(&login_url)
        }
    }
}

async fn handle_logout(session: Session, config: web::Data<Config>) -> impl Responder {
    session.purge();
    redirect(&config.admin_path("login"))
}

async fn show_settings(
    auth: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    store: web::Data<RedbContentStore>,
    token: CsrfToken,
    config: web::Data<Config>,
) -> impl Responder {
    let admin_base = config.admin_path("");
    let user = match load_user(&pool, &auth, &tera, &admin_base) {
        Ok(user) => user,
        Err(response) => return response,
    };
    if !user.is_admin() {
        return render_error(&tera, &admin_base, StatusCode::FORBIDDEN, "Only administrators can change these settings.");
    }

    let loaded = admin_helpers::get_conn(&pool)
        .and_then(|conn| admin_helpers::load_duplication_settings(&conn, store.registry()));
    let settings = match loaded {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Could not load duplication settings: {}", e);
            return render_error(&tera, &admin_base, StatusCode::INTERNAL_SERVER_ERROR, "Could not load settings.");
        }
    };

    let type_choices: Vec<TypeChoice> = store
        .registry()
        .public_types()
        .into_iter()
        .map(|t| TypeChoice { name: &t.name, label: &t.label, checked: settings.is_eligible(&t.name) })
        .collect();

    let mut ctx = Context::new();
    ctx.insert("admin_base", &admin_base);
    ctx.insert("user", &user);
    ctx.insert("csrf_token", token.get());
    ctx.insert("type_choices", &type_choices);
    ctx.insert("status_choices", &status_choices(settings.default_status));
    ctx.insert("title_suffix", &settings.title_suffix);
    take_notification(&session, &mut ctx);

    render(&tera, "admin/settings.html", &ctx)
}

async fn update_settings_action(
    auth: AuthenticatedUser,
    session: Session,
    tera: web::Data<Tera>,
    pool: web::Data<DbPool>,
    store: web::Data<RedbContentStore>,
    form: Csrf<web::Form<SettingsForm>>,
    config: web::Data<Config>,
) -> impl Responder {
    let admin_base = config.admin_path("");
    let user = match load_user(&pool, &auth, &tera, &admin_base) {
        Ok(user) => user,
        Err(response) => return response,
    };
    if !user.is_admin() {
        return render_error(&tera, &admin_base, StatusCode::FORBIDDEN, "Only administrators can change these settings.");
    }

    let form = form.into_inner().into_inner();
    let input = DuplicationSettingsInput {
        post_types: collect_prefixed(&form.fields, "post_type_"),
        title_suffix: form.title_suffix,
        default_status: form.default_status,
    };
    let settings = admin_helpers::sanitize_duplication_settings(&input, store.registry());

    let saved = admin_helpers::get_conn(&pool)
        .and_then(|mut conn| admin_helpers::save_duplication_settings(&mut conn, &settings));
    match saved {
        Ok(()) => set_notification(&session, "Settings saved.", "success"),
        Err(e) => {
            log::error!("Failed to save duplication settings: {}", e);
            set_notification(&session, "Failed to save settings.", "error");
        }
    }
    redirect(&config.admin_path("settings"))
}
