use actix_web::{
    body::EitherBody,
    dev::{self, forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    guard, web, Error, FromRequest, HttpRequest, HttpResponse,
};
use actix_session::{Session, SessionExt};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use serde::Serialize;
use std::env;
use std::future::{ready, Ready as StdReady};
use crate::config::Config;

#[derive(Serialize, Debug, Clone)]
pub struct AuthenticatedUser {
    pub username: String,
    pub role: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = StdReady<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let session = req.get_session();
        if let (Ok(Some(username)), Ok(Some(role))) = (session.get("username"), session.get("role")) {
            ready(Ok(AuthenticatedUser { username, role }))
        } else {
            ready(Err(actix_web::error::ErrorUnauthorized("Not logged in.")))
        }
    }
}

pub fn logged_in(session: &Session) -> bool {
    session.get::<String>("username").unwrap_or(None).is_some()
}

pub fn ip_guard(ctx: &guard::GuardContext) -> bool {
    let allowed_ips_str = match env::var("ADMIN_LOGIN_ACCEPT_IP") {
        Ok(val) => val,
        Err(_) => {
            log::warn!("ADMIN_LOGIN_ACCEPT_IP is not set. Denying all admin requests.");
            return false;
        }
    };

    if allowed_ips_str.trim() == "*" {
        return true;
    }

    // Behind a reverse proxy the first X-Forwarded-For entry is the client.
    let request_ip = ctx.head().headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            ctx.head().peer_addr.map(|addr| addr.ip().to_string())
        });

    let peer_addr = match request_ip {
        Some(ip) => ip,
        None => {
            log::warn!("Could not determine peer IP address for admin request.");
            return false;
        }
    };

    let is_allowed = allowed_ips_str.split(',').any(|ip| ip.trim() == peer_addr);

    if !is_allowed {
        log::warn!("Blocked admin request from unauthorized IP: {}", peer_addr);
    }

    is_allowed
}

/// Sends visitors without a session to the login page.
pub struct LoginRequired;

impl<S, B> Transform<S, ServiceRequest> for LoginRequired
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = LoginRequiredMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(LoginRequiredMiddleware { service })
    }
}

pub struct LoginRequiredMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for LoginRequiredMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if logged_in(&req.get_session()) {
            let fut = self.service.call(req);
            return Box::pin(async move {
                let res = fut.await?;
                Ok(res.map_into_left_body())
            });
        }

        let login_url = req
            .app_data::<web::Data<Config>>()
            .map(|config| config.admin_path("login"))
            .unwrap_or_else(|| "/".to_string());
        Box::pin(async move {
            let (http_req, _payload) = req.into_parts();
            let res = HttpResponse::Found()
                .append_header(("location", login_url))
                .finish()
                .map_into_right_body();
            Ok(ServiceResponse::new(http_req, res))
        })
    }
}
