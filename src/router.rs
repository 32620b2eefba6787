//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. Every registration is
//! also recorded in a route table, which is what the OpenAPI document is
//! generated from.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use matchit::Router as MatchitRouter;

use crate::docs::Operation;
use crate::error::ApiError;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::trace;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// One registered route, as listed in the route table.
#[derive(Clone, Debug)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub operation: Operation,
}

pub(crate) enum Lookup<S> {
    Found(BoxedHandler<S>, HashMap<String, String>),
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// The application router.
///
/// Build it once at startup; hand it to [`Server::serve`](crate::Server::serve)
/// together with the state every handler receives.
pub struct Router<S> {
    routes: HashMap<Method, MatchitRouter<BoxedHandler<S>>>,
    table: Vec<Route>,
}

impl<S: Clone + Send + Sync + 'static> Router<S> {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), table: Vec::new() }
    }

    /// Register an undocumented handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    pub fn on(self, method: Method, path: &str, handler: impl Handler<S>) -> Self {
        self.route(method, path, Operation::default(), handler)
    }

    /// Register a handler together with its documentation.
    ///
    /// # Panics
    ///
    /// Panics on an invalid or conflicting path.
    pub fn route(mut self, method: Method, path: &str, operation: Operation, handler: impl Handler<S>) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{method} {path}`: {e}"));
        self.table.push(Route { method, path: path.to_owned(), operation });
        self
    }

    /// Every registered route, in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.table
    }

    pub(crate) fn lookup(&self, method: Method, path: &str) -> Lookup<S> {
        if let Some(matched) = self.routes.get(&method).and_then(|tree| tree.at(path).ok()) {
            let handler = Arc::clone(matched.value);
            let params = matched.params.iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            return Lookup::Found(handler, params);
        }
        match self.allowed(path) {
            allow if allow.is_empty() => Lookup::NotFound,
            allow => Lookup::MethodNotAllowed(allow),
        }
    }

    fn allowed(&self, path: &str) -> Vec<Method> {
        Method::ALL.into_iter()
            .filter(|m| self.routes.get(m).is_some_and(|tree| tree.at(path).is_ok()))
            .collect()
    }

    /// Routes one buffered request and produces one response.
    ///
    /// Never fails: routing misses become 404/405 JSON bodies. The server
    /// calls this for every request; tests can call it directly.
    pub async fn handle(&self, req: http::Request<Bytes>, state: S) -> Response {
        let (parts, body) = req.into_parts();
        let path = normalize(parts.uri.path()).to_owned();
        let query = parts.uri.query();
        let method = Method::try_from(&parts.method);

        trace::instrument(parts.method.as_str(), &path, async {
            let method = match method {
                Ok(m) => m,
                Err(()) => {
                    let allow = self.allowed(&path);
                    if allow.is_empty() {
                        return ApiError::RouteNotFound(path.clone()).into_response();
                    }
                    return ApiError::MethodNotAllowed { allow }.into_response();
                }
            };

            match self.lookup(method, &path) {
                Lookup::Found(handler, params) => {
                    let req = Request::new(query, body, params);
                    handler.call(req, state).await
                }
                Lookup::MethodNotAllowed(allow) => ApiError::MethodNotAllowed { allow }.into_response(),
                Lookup::NotFound => ApiError::RouteNotFound(path.clone()).into_response(),
            }
        })
        .await
    }
}

impl<S: Clone + Send + Sync + 'static> Default for Router<S> {
    fn default() -> Self { Self::new() }
}

/// `/users/` and `/users` are the same route.
fn normalize(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;

    async fn echo_id(req: Request, _state: ()) -> String {
        req.param("id").unwrap_or("none").to_owned()
    }

    async fn search(_req: Request, _state: ()) -> &'static str {
        "search"
    }

    fn router() -> Router<()> {
        Router::new()
            .on(Method::Get, "/things/{id}", echo_id)
            .on(Method::Delete, "/things/{id}", echo_id)
            .on(Method::Get, "/things/search", search)
    }

    fn get(path: &str) -> http::Request<Bytes> {
        http::Request::get(path).body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn static_segments_win_over_parameters() {
        let r = router();
        assert_eq!(r.handle(get("/things/search"), ()).await.body(), b"search");
        assert_eq!(r.handle(get("/things/42/"), ()).await.body(), b"42");
    }

    #[tokio::test]
    async fn wrong_verb_is_405_and_unknown_path_is_404() {
        let r = router();
        let put = http::Request::put("/things/1").body(Bytes::new()).unwrap();
        let res = r.handle(put, ()).await;
        assert_eq!(res.status_code(), Status::MethodNotAllowed);
        assert_eq!(res.header("allow"), Some("GET, DELETE"));

        let options = http::Request::builder()
            .method(http::Method::OPTIONS)
            .uri("/things/1")
            .body(Bytes::new())
            .unwrap();
        assert_eq!(r.handle(options, ()).await.status_code(), Status::MethodNotAllowed);

        assert_eq!(r.handle(get("/nowhere"), ()).await.status_code(), Status::NotFound);
    }

    #[test]
    fn route_table_records_registration_order() {
        let r = router();
        let listed: Vec<_> = r.routes().iter().map(|r| (r.method, r.path.as_str())).collect();
        assert_eq!(listed, vec![
            (Method::Get, "/things/{id}"),
            (Method::Delete, "/things/{id}"),
            (Method::Get, "/things/search"),
        ]);
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_routes_panic_at_startup() {
        let _ = Router::<()>::new()
            .on(Method::Get, "/a/{id}", search)
            .on(Method::Get, "/a/{other}", search);
    }
}
