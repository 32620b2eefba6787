//! Machine-readable API documentation.
//!
//! The OpenAPI 3 document is generated from two things the service already
//! relies on at runtime: the router's route table and the [`Schema`] values
//! used for validation. There is no hand-maintained copy to fall out of sync.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::router::Router;
use crate::status::Status;
use crate::validate::{Constraint, Field, FieldType, Mode, Schema};

// ── Operation descriptors ─────────────────────────────────────────────────────

/// JSON type of a query or path parameter.
#[derive(Clone, Copy, Debug)]
pub enum ParamKind {
    Integer,
    Number,
    Boolean,
    String,
    Enum(&'static [&'static str]),
}

/// A documented query parameter.
#[derive(Clone, Copy, Debug)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl Param {
    pub const fn query(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, required: false, description }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Request body shape.
#[derive(Clone, Debug)]
pub enum Body {
    /// One payload validated against `schema` in the given mode.
    One(&'static Schema, Mode),
    /// `{"<key>": [payload, ...], "notify": bool}`.
    Batch { schema: &'static Schema, key: &'static str },
}

/// Success response shape.
#[derive(Clone, Debug, Default)]
pub enum Returns {
    Entity(&'static Schema),
    List(&'static Schema),
    #[default]
    Json,
    Html,
    Text,
    Nothing,
}

/// Documentation attached to one route.
#[derive(Clone, Debug)]
pub struct Operation {
    pub summary: String,
    pub tag: Option<&'static str>,
    pub params: Vec<Param>,
    pub body: Option<Body>,
    pub returns: Returns,
    pub success: Status,
    pub errors: Vec<Status>,
}

impl Default for Operation {
    fn default() -> Self {
        Self {
            summary: String::new(),
            tag: None,
            params: Vec::new(),
            body: None,
            returns: Returns::default(),
            success: Status::Ok,
            errors: Vec::new(),
        }
    }
}

impl Operation {
    pub fn new(summary: impl Into<String>) -> Self {
        Self { summary: summary.into(), ..Self::default() }
    }

    pub fn tag(mut self, tag: &'static str) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn params(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    pub fn returns(mut self, returns: Returns) -> Self {
        self.returns = returns;
        self
    }

    pub fn success(mut self, status: Status) -> Self {
        self.success = status;
        self
    }

    pub fn errors(mut self, errors: impl IntoIterator<Item = Status>) -> Self {
        self.errors.extend(errors);
        self
    }
}

// ── Document generation ───────────────────────────────────────────────────────

/// Title and version shown in the document's `info` block.
pub struct Info {
    pub title: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

/// Builds the OpenAPI 3.0 document for every route registered on `router`.
pub fn openapi<S: Clone + Send + Sync + 'static>(router: &Router<S>, info: &Info) -> Value {
    let mut paths: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
    let mut schemas: BTreeMap<&'static str, &'static Schema> = BTreeMap::new();

    for route in router.routes() {
        let op = &route.operation;
        if let Some(Body::One(s, _) | Body::Batch { schema: s, .. }) = &op.body {
            schemas.insert(s.name(), *s);
        }
        if let Returns::Entity(s) | Returns::List(s) = op.returns {
            schemas.insert(s.name(), s);
        }

        paths.entry(route.path.clone())
            .or_default()
            .insert(route.method.as_openapi_key().to_owned(), operation(&route.path, op));
    }

    let mut components = Map::new();
    for (name, schema) in schemas {
        components.insert(name.to_owned(), object_schema(schema, View::Entity));
        components.insert(format!("{name}Input"), object_schema(schema, View::Input));
        components.insert(format!("{name}Patch"), object_schema(schema, View::Patch));
    }
    components.insert("ErrorResponse".to_owned(), error_schema());

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": info.title,
            "version": info.version,
            "description": info.description,
        },
        "paths": paths,
        "components": { "schemas": components },
    })
}

fn operation(path: &str, op: &Operation) -> Value {
    let mut out = Map::new();
    out.insert("summary".into(), json!(op.summary));
    if let Some(tag) = op.tag {
        out.insert("tags".into(), json!([tag]));
    }

    let mut parameters: Vec<Value> = path_params(path)
        .map(|name| json!({
            "name": name,
            "in": "path",
            "required": true,
            "schema": { "type": "integer", "format": "int64" },
        }))
        .collect();
    parameters.extend(op.params.iter().map(|p| {
        let mut schema = param_schema(p.kind);
        if let Some(obj) = schema.as_object_mut() {
            obj.insert("description".into(), json!(p.description));
        }
        json!({ "name": p.name, "in": "query", "required": p.required, "schema": schema })
    }));
    if !parameters.is_empty() {
        out.insert("parameters".into(), Value::Array(parameters));
    }

    if let Some(body) = &op.body {
        let schema = match body {
            Body::One(s, Mode::Full) => reference(&format!("{}Input", s.name())),
            Body::One(s, Mode::Partial) => reference(&format!("{}Patch", s.name())),
            Body::Batch { schema, key } => json!({
                "type": "object",
                "required": [key],
                "properties": {
                    *key: { "type": "array", "items": reference(&format!("{}Input", schema.name())) },
                    "notify": { "type": "boolean", "default": false },
                },
            }),
        };
        out.insert("requestBody".into(), json!({
            "required": true,
            "content": { "application/json": { "schema": schema } },
        }));
    }

    let mut responses = Map::new();
    responses.insert(op.success.as_u16().to_string(), success(op));
    for status in &op.errors {
        responses.insert(status.as_u16().to_string(), json!({
            "description": status.reason(),
            "content": { "application/json": { "schema": reference("ErrorResponse") } },
        }));
    }
    out.insert("responses".into(), Value::Object(responses));
    Value::Object(out)
}

fn success(op: &Operation) -> Value {
    let description = op.success.reason();
    let content = |media: &str, schema: Value| json!({
        "description": description,
        "content": { media: { "schema": schema } },
    });
    match op.returns {
        Returns::Entity(s) => content("application/json", reference(s.name())),
        Returns::List(s) => content("application/json", json!({ "type": "array", "items": reference(s.name()) })),
        Returns::Json => content("application/json", json!({ "type": "object" })),
        Returns::Html => content("text/html", json!({ "type": "string" })),
        Returns::Text => content("text/plain", json!({ "type": "string" })),
        Returns::Nothing => json!({ "description": description }),
    }
}

fn path_params(path: &str) -> impl Iterator<Item = &str> {
    path.split('/')
        .filter_map(|seg| seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
}

fn reference(name: &str) -> Value {
    json!({ "$ref": format!("#/components/schemas/{name}") })
}

fn param_schema(kind: ParamKind) -> Value {
    match kind {
        ParamKind::Integer => json!({ "type": "integer" }),
        ParamKind::Number => json!({ "type": "number" }),
        ParamKind::Boolean => json!({ "type": "boolean" }),
        ParamKind::String => json!({ "type": "string" }),
        ParamKind::Enum(variants) => json!({ "type": "string", "enum": variants }),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum View {
    /// Everything the server returns, read-only fields included.
    Entity,
    /// POST/PUT body.
    Input,
    /// PATCH body: nothing required.
    Patch,
}

fn object_schema(schema: &Schema, view: View) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for field in schema.fields() {
        if field.is_read_only() && view != View::Entity {
            continue;
        }
        properties.insert(field.name().to_owned(), field_schema(field));
        let listed = match view {
            View::Entity => !field.is_nullable() || field.is_read_only(),
            View::Input => field.is_required(),
            View::Patch => false,
        };
        if listed {
            required.push(field.name());
        }
    }

    let mut out = json!({ "type": "object", "properties": properties });
    if !required.is_empty() {
        out["required"] = json!(required);
    }
    out
}

fn field_schema(field: &Field) -> Value {
    let mut s = match field.ty() {
        FieldType::String => json!({ "type": "string" }),
        FieldType::Integer => json!({ "type": "integer", "format": "int64" }),
        FieldType::Number => json!({ "type": "number" }),
        FieldType::Boolean => json!({ "type": "boolean" }),
        FieldType::Enum(variants) => json!({ "type": "string", "enum": variants }),
        FieldType::Timestamp => json!({ "type": "string", "format": "date-time" }),
    };
    let Some(obj) = s.as_object_mut() else { return s };

    for c in field.constraints() {
        match *c {
            Constraint::MinLength(n) => { obj.insert("minLength".into(), json!(n)); }
            Constraint::MaxLength(n) => { obj.insert("maxLength".into(), json!(n)); }
            Constraint::Min(v) => { obj.insert("minimum".into(), json!(v)); }
            Constraint::Max(v) => { obj.insert("maximum".into(), json!(v)); }
            Constraint::Email => { obj.insert("format".into(), json!("email")); }
        }
    }
    if field.is_nullable() {
        obj.insert("nullable".into(), json!(true));
    }
    if field.is_read_only() {
        obj.insert("readOnly".into(), json!(true));
    }
    if let Some(default) = field.default_value() {
        obj.insert("default".into(), default.clone());
    }
    if !field.description().is_empty() {
        obj.insert("description".into(), json!(field.description()));
    }
    s
}

fn error_schema() -> Value {
    json!({
        "type": "object",
        "required": ["detail", "error_code"],
        "properties": {
            "detail": { "type": "string" },
            "error_code": { "type": "string" },
            "errors": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "field": { "type": "string" },
                        "message": { "type": "string" },
                    },
                },
            },
        },
    })
}

/// Interactive documentation page rendering `/openapi.json` with Swagger UI.
pub const SWAGGER_UI: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>roster API docs</title>
  <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5.9.0/swagger-ui.css">
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5.9.0/swagger-ui-bundle.js"></script>
  <script>
    window.ui = SwaggerUIBundle({ url: "/openapi.json", dom_id: "#swagger-ui" });
  </script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use crate::request::Request;
    use std::sync::LazyLock;

    static THING: LazyLock<Schema> = LazyLock::new(|| {
        Schema::new("Thing", vec![
            Field::integer("id").read_only(),
            Field::string("name").required().min_length(1).describe("Display name"),
            Field::integer("size").nullable().min(0.0),
        ])
        .unwrap()
    });

    async fn noop(_req: Request, _state: ()) -> &'static str { "" }

    fn doc() -> Value {
        let router = Router::<()>::new()
            .route(
                Method::Post,
                "/things",
                Operation::new("Create a thing")
                    .tag("things")
                    .body(Body::One(&THING, Mode::Full))
                    .returns(Returns::Entity(&THING))
                    .success(Status::Created)
                    .errors([Status::UnprocessableContent]),
                noop,
            )
            .route(
                Method::Patch,
                "/things/{id}",
                Operation::new("Patch a thing").body(Body::One(&THING, Mode::Partial)),
                noop,
            )
            .on(Method::Get, "/healthz", noop);
        openapi(&router, &Info { title: "t", version: "1", description: "" })
    }

    #[test]
    fn every_route_is_documented() {
        let doc = doc();
        assert!(doc["paths"]["/things"]["post"].is_object());
        assert!(doc["paths"]["/things/{id}"]["patch"].is_object());
        assert!(doc["paths"]["/healthz"]["get"].is_object());
    }

    #[test]
    fn schemas_follow_the_field_specification() {
        let doc = doc();
        let input = &doc["components"]["schemas"]["ThingInput"];
        assert_eq!(input["required"], json!(["name"]));
        assert_eq!(input["properties"]["name"]["minLength"], 1);
        assert_eq!(input["properties"]["name"]["description"], "Display name");
        assert!(input["properties"].get("id").is_none());

        let entity = &doc["components"]["schemas"]["Thing"];
        assert_eq!(entity["properties"]["id"]["readOnly"], true);
        assert_eq!(entity["properties"]["size"]["minimum"], 0.0);

        assert!(doc["components"]["schemas"]["ThingPatch"].get("required").is_none());
    }

    #[test]
    fn path_parameters_and_responses_are_listed() {
        let doc = doc();
        let patch = &doc["paths"]["/things/{id}"]["patch"];
        assert_eq!(patch["parameters"][0]["name"], "id");
        assert_eq!(patch["parameters"][0]["in"], "path");
        assert_eq!(
            patch["requestBody"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/ThingPatch",
        );

        let post = &doc["paths"]["/things"]["post"];
        assert!(post["responses"]["201"].is_object());
        assert_eq!(
            post["responses"]["422"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/ErrorResponse",
        );
    }
}
