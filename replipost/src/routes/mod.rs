pub mod admin;
pub mod posts;

use crate::helper::admin_helpers;
use crate::middleware::AuthenticatedUser;
use crate::models::{Notification, PostStatus, User};
use crate::DbPool;
use actix_session::Session;
use actix_web::{http::StatusCode, HttpResponse};
use serde::Serialize;
use tera::{Context, Tera};

#[derive(Serialize)]
pub struct StatusChoice {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

/// Options of a status `<select>`.
pub fn status_choices(selected: PostStatus) -> Vec<StatusChoice> {
    PostStatus::ALL
        .iter()
        .map(|status| StatusChoice { value: status.as_str(), label: status.label(), selected: *status == selected })
        .collect()
}

pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found().append_header(("location", location)).finish()
}

pub fn set_notification(session: &Session, message: &str, r#type: &str) {
    let notification = Notification { message: message.to_string(), r#type: r#type.to_string() };
    if let Err(e) = session.insert("notification", &notification) {
        log::error!("Could not store notification in session: {}", e);
    }
}

/// Moves a pending flash notification into `ctx`.
pub fn take_notification(session: &Session, ctx: &mut Context) {
    if let Ok(Some(notification)) = session.get::<Notification>("notification") {
        ctx.insert("notification", &notification);
        session.remove("notification");
    }
}

pub fn render(tera: &Tera, template: &str, ctx: &Context) -> HttpResponse {
    match tera.render(template, ctx) {
        Ok(rendered) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(rendered),
        Err(err) => {
            log::error!("Template rendering error in {}: {}", template, err);
            HttpResponse::InternalServerError().body("Template error")
        }
    }
}

/// A blocking error page, the end of the request.
pub fn render_error(tera: &Tera, admin_base: &str, status: StatusCode, message: &str) -> HttpResponse {
    let mut ctx = Context::new();
    ctx.insert("message", message);
    ctx.insert("status", &status.as_u16());
    ctx.insert("admin_base", admin_base);
    match tera.render("admin/error.html", &ctx) {
        Ok(rendered) => HttpResponse::build(status).content_type("text/html; charset=utf-8").body(rendered),
        Err(err) => {
            log::error!("Template rendering error in admin/error.html: {}", err);
            HttpResponse::build(status).content_type("text/plain; charset=utf-8").body(message.to_string())
        }
    }
}

/// The stored account behind the session, or the error page to show instead.
pub fn load_user(
    pool: &DbPool,
    auth: &AuthenticatedUser,
    tera: &Tera,
    admin_base: &str,
) -> Result<User, HttpResponse> {
    match admin_helpers::current_user(pool, &auth.username) {
        Ok(Some(user)) if user.is_active => Ok(user),
        Ok(_) => Err(render_error(tera, admin_base, StatusCode::FORBIDDEN, "Your account is not active.")),
        Err(e) => {
            log::error!("Failed to load user '{}': {}", auth.username, e);
            Err(render_error(tera, admin_base, StatusCode::INTERNAL_SERVER_ERROR, "Could not load your account."))
        }
    }
}
