//! Fluent construction of [`ApiNode`] trees.
//!
//! ```
//! use servecheck::{ApiDescription, ValueType, api::{ApiNode, BodySchema, FieldSpec}, route};
//!
//! let api = ApiNode::branch([
//!     route()
//!         .segment("items")
//!         .capture("id", ValueType::Integer)
//!         .get(["application/json"]),
//!     route()
//!         .segment("items")
//!         .body(
//!             BodySchema::object([FieldSpec::required(
//!                 "name",
//!                 BodySchema::scalar(ValueType::Text),
//!             )]),
//!             ["application/json"],
//!         )
//!         .post(["application/json"]),
//! ]);
//! let description = ApiDescription::build(&api)?;
//! assert_eq!(description.endpoints().len(), 2);
//! # Ok::<(), servecheck::TranslationError>(())
//! ```

use super::{ApiNode, BodySchema, Method, ParamSpec, ValueType};

enum Step {
    Segment(String),
    Capture(String, ValueType),
    Query(ParamSpec),
    Header(ParamSpec),
    Body(BodySchema, Vec<String>),
}

impl Step {
    fn wrap(self, next: ApiNode) -> ApiNode {
        let boxed = Box::new(next);
        match self {
            Self::Segment(literal) => ApiNode::Segment {
                literal,
                next: boxed,
            },
            Self::Capture(name, ty) => ApiNode::Capture {
                name,
                ty,
                next: boxed,
            },
            Self::Query(param) => ApiNode::Query { param, next: boxed },
            Self::Header(param) => ApiNode::Header { param, next: boxed },
            Self::Body(schema, content_types) => ApiNode::Body {
                schema,
                content_types,
                next: boxed,
            },
        }
    }
}

/// Accumulates route steps until a verb or branch terminates the route.
#[derive(Default)]
pub struct Route {
    steps: Vec<Step>,
}

/// Start an empty route rooted at `/`.
#[must_use]
pub fn route() -> Route { Route::default() }

impl Route {
    /// Append a literal path segment.
    #[must_use]
    pub fn segment(mut self, literal: impl Into<String>) -> Self {
        self.steps.push(Step::Segment(literal.into()));
        self
    }

    /// Append every non-empty `/`-separated segment of `path`.
    #[must_use]
    pub fn path(self, path: &str) -> Self {
        path.split('/')
            .filter(|part| !part.is_empty())
            .fold(self, |acc, part| acc.segment(part))
    }

    /// Append a typed capture.
    #[must_use]
    pub fn capture(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.steps.push(Step::Capture(name.into(), ty));
        self
    }

    /// Append an optional query parameter.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.steps.push(Step::Query(ParamSpec::optional(name, ty)));
        self
    }

    /// Append a required query parameter.
    #[must_use]
    pub fn required_query(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.steps.push(Step::Query(ParamSpec::required(name, ty)));
        self
    }

    /// Append a required header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.steps.push(Step::Header(ParamSpec::required(name, ty)));
        self
    }

    /// Append an optional header.
    #[must_use]
    pub fn optional_header(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.steps.push(Step::Header(ParamSpec::optional(name, ty)));
        self
    }

    /// Append a request body accepted in the given MIME types.
    #[must_use]
    pub fn body<I, S>(mut self, schema: BodySchema, content_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.push(Step::Body(
            schema,
            content_types.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Terminate the route with `method`.
    pub fn verb<I, S>(self, method: Method, produces: I) -> ApiNode
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.finish(ApiNode::Verb {
            method,
            produces: produces.into_iter().map(Into::into).collect(),
        })
    }

    /// Terminate the route with `GET`.
    pub fn get<I, S>(self, produces: I) -> ApiNode
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.verb(Method::Get, produces)
    }

    /// Terminate the route with `POST`.
    pub fn post<I, S>(self, produces: I) -> ApiNode
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.verb(Method::Post, produces)
    }

    /// Terminate the route with `PUT`.
    pub fn put<I, S>(self, produces: I) -> ApiNode
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.verb(Method::Put, produces)
    }

    /// Terminate the route with `DELETE`.
    pub fn delete<I, S>(self, produces: I) -> ApiNode
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.verb(Method::Delete, produces)
    }

    /// Terminate the route with `PATCH`.
    pub fn patch<I, S>(self, produces: I) -> ApiNode
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.verb(Method::Patch, produces)
    }

    /// Share the accumulated prefix between several sub-routes.
    pub fn routes(self, alternatives: impl IntoIterator<Item = ApiNode>) -> ApiNode {
        self.finish(ApiNode::branch(alternatives))
    }

    fn finish(self, terminal: ApiNode) -> ApiNode {
        self.steps
            .into_iter()
            .rev()
            .fold(terminal, |next, step| step.wrap(next))
    }
}
