//! The CRUD resource contract.
//!
//! Every resource is an [`Entity`] plus a [`Resource`] description: where it
//! is mounted, which store holds it, how its list filters are parsed. The
//! handlers below are written once and instantiated per resource by
//! [`mount`], so users, products and tasks cannot drift apart:
//!
//! | Verb | Path | Store op | Success |
//! |---|---|---|---|
//! | GET | `/{resource}` | `list` | 200 + array |
//! | GET | `/{resource}/{id}` | `get` | 200 |
//! | POST | `/{resource}` | `create` | 201 + `location` |
//! | PUT | `/{resource}/{id}` | `update` | 200 |
//! | PATCH | `/{resource}/{id}` | `patch` | 200 |
//! | DELETE | `/{resource}/{id}` | `delete` | 204 (deletable resources only) |

use std::sync::Arc;

use crate::app::AppState;
use crate::docs::{Body, Operation, Param, ParamKind, Returns};
use crate::error::ApiError;
use crate::method::Method;
use crate::request::{Query, Request};
use crate::response::Response;
use crate::router::Router;
use crate::status::Status;
use crate::store::{self, Entity, Page, Store};
use crate::validate::{FieldError, Mode, ValidationError};

pub mod product;
pub mod task;
pub mod user;

/// How an entity is exposed over HTTP.
pub trait Resource: Entity {
    /// Collection path, e.g. `/users`.
    const PATH: &'static str;
    /// Documentation tag.
    const TAG: &'static str;
    /// Whether `DELETE /{resource}/{id}` is routed.
    const DELETABLE: bool;

    fn store(state: &AppState) -> Arc<dyn Store<Self>>;

    /// Resource-specific list filters from the query string.
    fn filter(query: &Query, errors: &mut FieldErrors) -> Self::Filter;

    /// Documentation for the parameters [`filter`](Resource::filter) reads.
    fn filter_params() -> Vec<Param>;
}

/// Collects coercion failures so a request reports all of them at once.
#[derive(Default)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    /// Unwraps a typed query lookup, remembering the failure.
    pub fn take<T>(&mut self, lookup: Result<Option<T>, FieldError>) -> Option<T> {
        lookup.unwrap_or_else(|e| {
            self.0.push(e);
            None
        })
    }

    pub fn push(&mut self, e: FieldError) {
        self.0.push(e);
    }

    pub fn extend(&mut self, e: ValidationError) {
        self.0.extend(e.errors);
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        ValidationError::from_errors(self.0).map_or(Ok(()), Err)
    }
}

const PAGE_PARAMS: [Param; 2] = [
    Param::query("skip", ParamKind::Integer, "Number of records to skip (default 0)"),
    Param::query("limit", ParamKind::Integer, "Maximum number of records to return (default 10, max 100)"),
];

const CLIENT_ERRORS: [Status; 2] = [Status::BadRequest, Status::UnprocessableContent];

/// Registers the standard CRUD routes for `R`.
pub fn mount<R: Resource>(router: Router<AppState>) -> Router<AppState> {
    let item = format!("{}/{{id}}", R::PATH);
    let kind = R::KIND.to_lowercase();
    let schema = R::schema();

    let router = router
        .route(
            Method::Get,
            R::PATH,
            Operation::new(format!("List {kind}s"))
                .tag(R::TAG)
                .params(PAGE_PARAMS.into_iter().chain(R::filter_params()))
                .returns(Returns::List(schema))
                .errors([Status::UnprocessableContent]),
            list::<R>,
        )
        .route(
            Method::Post,
            R::PATH,
            Operation::new(format!("Create a {kind}"))
                .tag(R::TAG)
                .body(Body::One(schema, Mode::Full))
                .returns(Returns::Entity(schema))
                .success(Status::Created)
                .errors(CLIENT_ERRORS.into_iter().chain([Status::Conflict])),
            create::<R>,
        )
        .route(
            Method::Get,
            &item,
            Operation::new(format!("Get a {kind} by id"))
                .tag(R::TAG)
                .returns(Returns::Entity(schema))
                .errors([Status::NotFound, Status::UnprocessableContent]),
            get::<R>,
        )
        .route(
            Method::Put,
            &item,
            Operation::new(format!("Replace a {kind}"))
                .tag(R::TAG)
                .body(Body::One(schema, Mode::Full))
                .returns(Returns::Entity(schema))
                .errors(CLIENT_ERRORS.into_iter().chain([Status::NotFound, Status::Conflict])),
            update::<R>,
        )
        .route(
            Method::Patch,
            &item,
            Operation::new(format!("Partially update a {kind}"))
                .tag(R::TAG)
                .body(Body::One(schema, Mode::Partial))
                .returns(Returns::Entity(schema))
                .errors(CLIENT_ERRORS.into_iter().chain([Status::NotFound, Status::Conflict])),
            patch::<R>,
        );

    if !R::DELETABLE {
        return router;
    }
    router.route(
        Method::Delete,
        &item,
        Operation::new(format!("Delete a {kind}"))
            .tag(R::TAG)
            .returns(Returns::Nothing)
            .success(Status::NoContent)
            .errors([Status::NotFound, Status::UnprocessableContent]),
        delete::<R>,
    )
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn list<R: Resource>(req: Request, state: AppState) -> Result<Response, ApiError> {
    let mut errors = FieldErrors::default();
    let page = Page::clamped(
        errors.take(req.query().saturating_int("skip")),
        errors.take(req.query().saturating_int("limit")),
    );
    let filter = R::filter(req.query(), &mut errors);
    errors.finish()?;

    let store = R::store(&state);
    let rows = store::run(state.store_timeout, move || store.list(&filter, page)).await?;
    Ok(Response::json(&rows))
}

async fn get<R: Resource>(req: Request, state: AppState) -> Result<Response, ApiError> {
    let id = req.id_param("id")?;
    let store = R::store(&state);
    let entity = store::run(state.store_timeout, move || store.get(id)).await?;
    Ok(Response::json(&entity))
}

async fn create<R: Resource>(req: Request, state: AppState) -> Result<Response, ApiError> {
    let input: R::Input = R::schema().validate(&req.json()?, Mode::Full)?;
    let store = R::store(&state);
    let entity = store::run(state.store_timeout, move || store.create(input)).await?;
    Ok(Response::builder()
        .status(Status::Created)
        .header("location", &format!("{}/{}", R::PATH, entity.id()))
        .json(&entity))
}

async fn update<R: Resource>(req: Request, state: AppState) -> Result<Response, ApiError> {
    let id = req.id_param("id")?;
    let input: R::Input = R::schema().validate(&req.json()?, Mode::Full)?;
    let store = R::store(&state);
    let entity = store::run(state.store_timeout, move || store.update(id, input)).await?;
    Ok(Response::json(&entity))
}

async fn patch<R: Resource>(req: Request, state: AppState) -> Result<Response, ApiError> {
    let id = req.id_param("id")?;
    let patch: R::Patch = R::schema().validate(&req.json()?, Mode::Partial)?;
    let store = R::store(&state);
    let entity = store::run(state.store_timeout, move || store.patch(id, patch)).await?;
    Ok(Response::json(&entity))
}

async fn delete<R: Resource>(req: Request, state: AppState) -> Result<Status, ApiError> {
    let id = req.id_param("id")?;
    let store = R::store(&state);
    store::run(state.store_timeout, move || store.delete(id)).await?;
    Ok(Status::NoContent)
}
