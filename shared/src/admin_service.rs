use crate::http::{make_boxed_error_response, make_error_response};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

type AdminFuture<E> =
    Pin<Box<dyn Future<Output = Result<Response<BoxBody<Bytes, Infallible>>, E>> + Send + 'static>>;

/// Serves `/health`, `/ready` and `POST /reload` on the admin listener.
pub struct AdminService<F, R, E> {
    is_ready: F,
    reload: R,
    _error: PhantomData<E>,
}

impl<F, R, Fut, E> AdminService<F, R, E>
where
    F: Fn() -> bool,
    R: Fn() -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    pub fn new(is_ready: F, reload: R) -> Self {
        Self {
            is_ready,
            reload,
            _error: PhantomData,
        }
    }
}

fn ok_body() -> BoxBody<Bytes, Infallible> {
    Full::new(Bytes::from("ok\n")).boxed()
}

fn respond<E: Send + 'static>(res: Response<BoxBody<Bytes, Infallible>>) -> AdminFuture<E> {
    Box::pin(async move { Ok(res) })
}

impl<F, R, Fut, E, B> Service<Request<B>> for AdminService<F, R, E>
where
    F: Fn() -> bool + Send + Sync + 'static,
    R: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
    E: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = E;
    type Future = AdminFuture<E>;

    fn call(&self, req: Request<B>) -> Self::Future {
        match (req.method(), req.uri().path()) {
            (_, "/health") => respond(Response::new(ok_body())),
            (_, "/ready") => match (self.is_ready)() {
                true => respond(Response::new(ok_body())),
                false => respond(make_boxed_error_response(StatusCode::SERVICE_UNAVAILABLE)),
            },
            (&Method::POST, "/reload") => {
                let reload = (self.reload)();
                Box::pin(async move {
                    let res = match reload.await {
                        Ok(()) => Response::new(ok_body()),
                        Err(message) => {
                            tracing::error!(error = %message, "configuration reload failed");
                            let (parts, body) =
                                make_error_response(StatusCode::INTERNAL_SERVER_ERROR, &message)
                                    .into_parts();
                            Response::from_parts(parts, Full::new(body).boxed())
                        }
                    };
                    Ok(res)
                })
            }
            _ => respond(make_boxed_error_response(StatusCode::NOT_FOUND)),
        }
    }
}
