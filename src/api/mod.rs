//! Runtime description of an HTTP API.
//!
//! An API is declared as an [`ApiNode`] tree whose nodes are literal path
//! segments, typed captures, query parameters, headers, request bodies,
//! branches and terminal verbs. [`ApiDescription::build`] walks the tree once
//! and flattens it into an ordered list of [`Endpoint`]s, rejecting constructs
//! that have no mapping (unsupported body codecs, ambiguous siblings).

mod builder;

use std::{fmt, sync::Arc};

pub use builder::{Route, route};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::value::ValueType;

/// HTTP methods an endpoint may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
    /// `PATCH`
    Patch,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
}

impl Method {
    /// Canonical upper-case token for the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A named query parameter or header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter or header name as sent on the wire.
    pub name: String,
    /// Semantic type used to pick a generator.
    #[serde(rename = "type")]
    pub ty: ValueType,
    /// Whether every request must carry the parameter.
    #[serde(default)]
    pub required: bool,
}

impl ParamSpec {
    /// A parameter that is always sent.
    pub fn required(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
        }
    }

    /// A parameter that may be omitted.
    pub fn optional(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
        }
    }
}

/// Shape of a request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BodySchema {
    /// A single value.
    Scalar {
        /// Type of the value.
        #[serde(rename = "type")]
        ty: ValueType,
    },
    /// A record with named fields in declaration order.
    Object {
        /// Field specifications.
        fields: Vec<FieldSpec>,
    },
    /// A homogeneous list.
    List {
        /// Schema of every element.
        items: Box<BodySchema>,
    },
}

impl BodySchema {
    /// Scalar body of the given type.
    #[must_use]
    pub const fn scalar(ty: ValueType) -> Self { Self::Scalar { ty } }

    /// Object body with the given fields.
    pub fn object(fields: impl IntoIterator<Item = FieldSpec>) -> Self {
        Self::Object {
            fields: fields.into_iter().collect(),
        }
    }

    /// List body whose elements follow `items`.
    #[must_use]
    pub fn list(items: Self) -> Self {
        Self::List {
            items: Box::new(items),
        }
    }
}

/// One field of an object body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Field schema.
    pub schema: BodySchema,
    /// Whether the field is always present.
    #[serde(default = "field_required_default")]
    pub required: bool,
}

const fn field_required_default() -> bool { true }

impl FieldSpec {
    /// A field that is always present.
    pub fn required(name: impl Into<String>, schema: BodySchema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: true,
        }
    }

    /// A field that may be omitted.
    pub fn optional(name: impl Into<String>, schema: BodySchema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: false,
        }
    }
}

/// Body codecs the generator can serialise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// `application/json`
    Json,
    /// `application/x-www-form-urlencoded`
    FormUrlEncoded,
    /// `text/plain`
    PlainText,
}

impl ContentType {
    /// Parse a MIME type, ignoring parameters such as `charset`.
    #[must_use]
    pub fn parse(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "application/json" => Some(Self::Json),
            "application/x-www-form-urlencoded" => Some(Self::FormUrlEncoded),
            "text/plain" => Some(Self::PlainText),
            _ => None,
        }
    }

    /// MIME type sent in the `Content-Type` header.
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
            Self::PlainText => "text/plain; charset=utf-8",
        }
    }

    /// Whether this codec can express bodies of the given schema.
    #[must_use]
    pub fn supports(self, schema: &BodySchema) -> bool {
        match self {
            Self::Json => true,
            Self::PlainText => matches!(schema, BodySchema::Scalar { .. }),
            Self::FormUrlEncoded => match schema {
                BodySchema::Object { fields } => fields
                    .iter()
                    .all(|field| matches!(field.schema, BodySchema::Scalar { .. })),
                BodySchema::Scalar { .. } | BodySchema::List { .. } => false,
            },
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.mime()) }
}

/// A node of the route tree.
///
/// Every non-terminal node carries the rest of its route in `next`; a
/// [`ApiNode::Branch`] fans out into alternatives that share the prefix
/// accumulated so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum ApiNode {
    /// A literal path segment.
    Segment {
        /// Segment text, without slashes.
        literal: String,
        /// Remainder of the route.
        next: Box<ApiNode>,
    },
    /// A typed path capture.
    Capture {
        /// Capture name used in templates and reports.
        name: String,
        /// Type of the captured value.
        #[serde(rename = "type")]
        ty: ValueType,
        /// Remainder of the route.
        next: Box<ApiNode>,
    },
    /// A query parameter.
    Query {
        /// Parameter specification.
        param: ParamSpec,
        /// Remainder of the route.
        next: Box<ApiNode>,
    },
    /// A request header.
    Header {
        /// Header specification.
        param: ParamSpec,
        /// Remainder of the route.
        next: Box<ApiNode>,
    },
    /// A request body accepted in one or more content types.
    Body {
        /// Body shape.
        schema: BodySchema,
        /// Accepted MIME types, in preference order.
        content_types: Vec<String>,
        /// Remainder of the route.
        next: Box<ApiNode>,
    },
    /// Alternative sub-routes, in declaration order.
    Branch {
        /// The alternatives.
        routes: Vec<ApiNode>,
    },
    /// Terminal node naming the method and response content types.
    Verb {
        /// Request method.
        method: Method,
        /// Content types the endpoint responds with.
        #[serde(default)]
        produces: Vec<String>,
    },
}

impl ApiNode {
    /// Combine routes into a branch.
    pub fn branch(routes: impl IntoIterator<Item = Self>) -> Self {
        Self::Branch {
            routes: routes.into_iter().collect(),
        }
    }
}

/// One element of an endpoint's path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Fixed text.
    Literal(String),
    /// A typed capture.
    Capture {
        /// Capture name.
        name: String,
        /// Capture type.
        ty: ValueType,
    },
}

/// Body specification attached to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodySpec {
    /// Body shape.
    pub schema: BodySchema,
    /// Codecs the endpoint accepts; the first is used for generation.
    pub content_types: Vec<ContentType>,
}

/// A fully resolved route: method, path template and parameter specs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Request method.
    pub method: Method,
    /// Path template.
    pub path: Vec<PathSegment>,
    /// Query parameters.
    pub query: Vec<ParamSpec>,
    /// Request headers.
    pub headers: Vec<ParamSpec>,
    /// Optional body.
    pub body: Option<BodySpec>,
    /// Response content types.
    pub produces: Vec<String>,
}

impl Endpoint {
    /// Path template such as `/items/{id}`.
    #[must_use]
    pub fn template(&self) -> String { template_of(&self.path) }

    /// Capture specifications in path order.
    pub fn captures(&self) -> impl Iterator<Item = (&str, &ValueType)> {
        self.path.iter().filter_map(|segment| match segment {
            PathSegment::Capture { name, ty } => Some((name.as_str(), ty)),
            PathSegment::Literal(_) => None,
        })
    }

    fn collides_with(&self, other: &Self) -> bool {
        self.method == other.method
            && self.path.len() == other.path.len()
            && self
                .path
                .iter()
                .zip(&other.path)
                .all(|pair| match pair {
                    (PathSegment::Literal(left), PathSegment::Literal(right)) => left == right,
                    (PathSegment::Capture { .. }, PathSegment::Capture { .. }) => true,
                    _ => false,
                })
    }

    fn is_probe_candidate(&self) -> bool {
        self.method == Method::Get
            && self.body.is_none()
            && self
                .path
                .iter()
                .all(|segment| matches!(segment, PathSegment::Literal(_)))
            && self
                .query
                .iter()
                .chain(&self.headers)
                .all(|param| !param.required)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.template())
    }
}

fn template_of(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }
    path.iter().fold(String::new(), |mut acc, segment| {
        acc.push('/');
        match segment {
            PathSegment::Literal(text) => acc.push_str(text),
            PathSegment::Capture { name, .. } => {
                acc.push('{');
                acc.push_str(name);
                acc.push('}');
            }
        }
        acc
    })
}

/// Errors raised while translating an [`ApiNode`] tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslationError {
    /// A body declares a MIME type with no registered codec.
    #[error("route {route}: unsupported content type {content_type:?}")]
    UnsupportedContentType {
        /// Template of the offending route prefix.
        route: String,
        /// The MIME type as declared.
        content_type: String,
    },
    /// A codec cannot express the declared body schema.
    #[error("route {route}: {content_type} cannot encode the declared body")]
    CodecMismatch {
        /// Template of the offending route prefix.
        route: String,
        /// The codec.
        content_type: ContentType,
    },
    /// A body node lists no content types.
    #[error("route {route}: body declares no content type")]
    MissingContentType {
        /// Template of the offending route prefix.
        route: String,
    },
    /// Two body nodes appear on one route.
    #[error("route {route}: more than one request body")]
    DuplicateBody {
        /// Template of the offending route prefix.
        route: String,
    },
    /// A branch has no alternatives.
    #[error("route {route}: empty branch")]
    EmptyBranch {
        /// Template of the route prefix leading to the branch.
        route: String,
    },
    /// Two endpoints cannot be told apart by method and path.
    #[error("ambiguous routes {first} and {second}")]
    AmbiguousRoute {
        /// The endpoint declared first.
        first: String,
        /// The endpoint declared later.
        second: String,
    },
}

/// Translation from a host API type into an [`ApiNode`] tree.
pub trait ReflectApi {
    /// The route tree describing this API.
    fn api() -> ApiNode;
}

/// The flattened, validated API description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiDescription {
    endpoints: Vec<Arc<Endpoint>>,
}

#[derive(Clone, Default)]
struct Prefix {
    path: Vec<PathSegment>,
    query: Vec<ParamSpec>,
    headers: Vec<ParamSpec>,
    body: Option<BodySpec>,
}

impl Prefix {
    fn route(&self) -> String { template_of(&self.path) }
}

impl ApiDescription {
    /// Translate a route tree into endpoints in declaration order.
    ///
    /// # Errors
    ///
    /// Returns a [`TranslationError`] when the tree contains a construct with
    /// no mapping or two sibling routes are ambiguous.
    pub fn build(root: &ApiNode) -> Result<Self, TranslationError> {
        let mut endpoints = Vec::new();
        visit(root, Prefix::default(), &mut endpoints)?;
        for (index, endpoint) in endpoints.iter().enumerate() {
            if let Some(earlier) = endpoints
                .iter()
                .take(index)
                .find(|earlier| earlier.collides_with(endpoint))
            {
                return Err(TranslationError::AmbiguousRoute {
                    first: earlier.to_string(),
                    second: endpoint.to_string(),
                });
            }
        }
        Ok(Self {
            endpoints: endpoints.into_iter().map(Arc::new).collect(),
        })
    }

    /// Build the description of a type implementing [`ReflectApi`].
    ///
    /// # Errors
    ///
    /// See [`ApiDescription::build`].
    pub fn reflect<T: ReflectApi>() -> Result<Self, TranslationError> { Self::build(&T::api()) }

    /// All endpoints, in declaration order.
    #[must_use]
    pub fn endpoints(&self) -> &[Arc<Endpoint>] { &self.endpoints }

    /// Path of the first parameterless `GET` endpoint, used as a readiness
    /// probe target.
    #[must_use]
    pub fn health_path(&self) -> Option<String> {
        self.endpoints
            .iter()
            .find(|endpoint| endpoint.is_probe_candidate())
            .map(|endpoint| endpoint.template())
    }
}

fn visit(node: &ApiNode, prefix: Prefix, out: &mut Vec<Endpoint>) -> Result<(), TranslationError> {
    match node {
        ApiNode::Segment { literal, next } => {
            let mut extended = prefix;
            extended.path.push(PathSegment::Literal(literal.clone()));
            visit(next, extended, out)
        }
        ApiNode::Capture { name, ty, next } => {
            let mut extended = prefix;
            extended.path.push(PathSegment::Capture {
                name: name.clone(),
                ty: ty.clone(),
            });
            visit(next, extended, out)
        }
        ApiNode::Query { param, next } => {
            let mut extended = prefix;
            extended.query.push(param.clone());
            visit(next, extended, out)
        }
        ApiNode::Header { param, next } => {
            let mut extended = prefix;
            extended.headers.push(param.clone());
            visit(next, extended, out)
        }
        ApiNode::Body {
            schema,
            content_types,
            next,
        } => {
            let body = translate_body(&prefix, schema, content_types)?;
            let mut extended = prefix;
            extended.body = Some(body);
            visit(next, extended, out)
        }
        ApiNode::Branch { routes } => {
            if routes.is_empty() {
                return Err(TranslationError::EmptyBranch {
                    route: prefix.route(),
                });
            }
            routes
                .iter()
                .try_for_each(|alternative| visit(alternative, prefix.clone(), out))
        }
        ApiNode::Verb { method, produces } => {
            out.push(Endpoint {
                method: *method,
                path: prefix.path,
                query: prefix.query,
                headers: prefix.headers,
                body: prefix.body,
                produces: produces.clone(),
            });
            Ok(())
        }
    }
}

fn translate_body(
    prefix: &Prefix,
    schema: &BodySchema,
    content_types: &[String],
) -> Result<BodySpec, TranslationError> {
    if prefix.body.is_some() {
        return Err(TranslationError::DuplicateBody {
            route: prefix.route(),
        });
    }
    if content_types.is_empty() {
        return Err(TranslationError::MissingContentType {
            route: prefix.route(),
        });
    }
    let codecs = content_types
        .iter()
        .map(|mime| {
            let codec =
                ContentType::parse(mime).ok_or_else(|| TranslationError::UnsupportedContentType {
                    route: prefix.route(),
                    content_type: mime.clone(),
                })?;
            if codec.supports(schema) {
                Ok(codec)
            } else {
                Err(TranslationError::CodecMismatch {
                    route: prefix.route(),
                    content_type: codec,
                })
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(BodySpec {
        schema: schema.clone(),
        content_types: codecs,
    })
}
