use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error, HttpMessage, ResponseError,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use tracing::{debug, warn};

use crate::api_error::ApiError;
use crate::service::session_service::{Identity, SessionService};

/// Authentication middleware for protected routes. On success the verified
/// identity lands in the request extensions; every authentication failure
/// is a uniform 401.
pub struct AuthMiddleware {
    session_service: Rc<SessionService>,
}

impl AuthMiddleware {
    pub fn new(session_service: SessionService) -> Self {
        Self {
            session_service: Rc::new(session_service),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
            session_service: self.session_service.clone(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    session_service: Rc<SessionService>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let session_service = self.session_service.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let token = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string);

            let token = match token {
                Some(token) => token,
                None => {
                    warn!("missing or malformed authorization header");
                    return Ok(reject(req, ApiError::Unauthorized));
                }
            };

            match session_service.verify(&token).await {
                Ok(identity) => {
                    debug!(user_id = identity.user_id, "request authenticated");
                    req.extensions_mut().insert(identity);
                    service
                        .call(req)
                        .await
                        .map(ServiceResponse::map_into_left_body)
                }
                Err(err) => Ok(reject(req, err)),
            }
        })
    }
}

fn reject<B>(req: ServiceRequest, err: ApiError) -> ServiceResponse<EitherBody<B>> {
    let (request, _) = req.into_parts();
    let response = err.error_response().map_into_right_body();
    ServiceResponse::new(request, response)
}

/// Accessor for the identity stashed by the middleware.
pub trait IdentityExt {
    fn identity(&self) -> Option<Identity>;
}

impl IdentityExt for actix_web::HttpRequest {
    fn identity(&self) -> Option<Identity> {
        self.extensions().get::<Identity>().cloned()
    }
}
