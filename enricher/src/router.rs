use crate::classify::{EnrichmentTarget, TargetId};
use crate::config::Route;
use hyper::Request;
use std::sync::Arc;

/// Router that matches incoming requests against configured routes
#[derive(Clone)]
pub struct Router {
    routes: Arc<Vec<Route>>,
}

impl Router {
    /// Creates a new router with the given routes
    pub fn new(routes: Vec<Route>) -> Self {
        Self {
            routes: Arc::new(routes),
        }
    }

    /// Returns the enrichment marker of the first route matching `req`
    pub fn find_target<B>(&self, req: &Request<B>) -> Option<EnrichmentTarget> {
        let route = self.routes.iter().find(|route| matches_route(req, route))?;
        tracing::debug!(
            resource = %route.action.resource,
            method = %route.action.method,
            "Matched route"
        );

        Some(EnrichmentTarget {
            resource: Some(route.action.resource.clone()),
            method: Some(route.action.method.clone()),
            id: Some(TargetId::PathSegment(route.action.id_segment)),
        })
    }
}

/// Checks if a request matches a route's criteria
fn matches_route<B>(req: &Request<B>, route: &Route) -> bool {
    // Match host if specified
    if let Some(expected_host) = &route.r#match.host {
        let req_host = req
            .headers()
            .get(hyper::header::HOST)
            .and_then(|h| h.to_str().ok());

        match req_host {
            Some(host) => {
                // Strip port if present for comparison
                let host_without_port = host.split(':').next().unwrap_or(host);
                if host_without_port != expected_host {
                    return false;
                }
            }
            None => return false,
        }
    }

    req.uri().path().starts_with(&route.r#match.path_prefix)
}
