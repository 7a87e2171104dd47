//! Request synthesis from an [`ApiDescription`].
//!
//! A [`RequestGenerator`] picks an endpoint uniformly, draws a value for every
//! capture, parameter, header and body field from the [`Registry`], and
//! assembles the wire form of the request. [`RequestSequence`] turns a seed
//! and a size schedule into a reproducible, restartable stream of requests.

use std::{fmt, sync::Arc};

use bytes::Bytes;
use rand::{Rng, SeedableRng, rngs::StdRng};
use thiserror::Error;
use url::form_urlencoded;

use crate::{
    api::{ApiDescription, BodySchema, ContentType, Endpoint, Method, PathSegment, ParamSpec},
    value::{Registry, Value, ValueType},
};

/// Upper bound on generated list lengths, whatever the size.
const MAX_LIST_LEN: u32 = 16;

/// Draws allowed for a capture before giving up on a dot segment.
const CAPTURE_DRAWS: u32 = 32;

/// Maps a trial index to the size parameter used for that trial.
pub type SizeSchedule = Arc<dyn Fn(u32) -> u32 + Send + Sync>;

/// Sizes cycling through `0..=max_size`.
#[must_use]
pub fn cycling_sizes(max_size: u32) -> SizeSchedule {
    let period = max_size.saturating_add(1);
    Arc::new(move |trial| trial.checked_rem(period).unwrap_or(trial))
}

/// Errors raised while synthesising requests.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// No generator is registered for a field's type.
    #[error("no generator registered for type {ty} (field {field} of {endpoint})")]
    MissingGenerator {
        /// Field label, e.g. `id`, `?page`, `body.name`.
        field: String,
        /// Endpoint label, e.g. `GET /items/{id}`.
        endpoint: String,
        /// The unregistered type.
        ty: ValueType,
    },
    /// The description contains no endpoints.
    #[error("the API description has no endpoints")]
    NoEndpoints,
    /// Inputs do not fit the endpoint or the body codec.
    #[error("cannot assemble request for {endpoint}: {message}")]
    Encode {
        /// Endpoint label.
        endpoint: String,
        /// What went wrong.
        message: String,
    },
}

/// Body value together with the codec chosen for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyInput {
    /// The body value.
    pub value: Value,
    /// Codec used to serialise it.
    pub content_type: ContentType,
}

/// Structured inputs of a request, parallel to its endpoint's specs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInputs {
    /// One value per path capture.
    pub captures: Vec<Value>,
    /// One slot per query parameter; `None` omits it.
    pub query: Vec<Option<Value>>,
    /// One slot per header; `None` omits it.
    pub headers: Vec<Option<Value>>,
    /// The body, when the endpoint declares one.
    pub body: Option<BodyInput>,
}

impl RequestInputs {
    /// Combined size of every input.
    #[must_use]
    pub fn size(&self) -> u64 {
        let captures: u64 = self.captures.iter().map(Value::size).sum();
        let params: u64 = self
            .query
            .iter()
            .chain(&self.headers)
            .flatten()
            .map(|value| 1 + value.size())
            .sum();
        let body = self.body.as_ref().map_or(0, |body| 1 + body.value.size());
        captures + params + body
    }
}

/// One concrete request derived from an [`Endpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedRequest {
    endpoint: Arc<Endpoint>,
    inputs: RequestInputs,
    path: String,
    query: String,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl GeneratedRequest {
    /// Render `inputs` against `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Encode`] when the inputs do not match the
    /// endpoint's specs, a capture renders as `.` or `..`, or the body cannot
    /// be serialised.
    pub fn assemble(endpoint: Arc<Endpoint>, inputs: RequestInputs) -> Result<Self, GenerationError> {
        let path = encode_path(&endpoint, &inputs.captures)?;
        let query = encode_query(&endpoint.query, &inputs.query);
        let mut headers: Vec<(String, String)> = endpoint
            .headers
            .iter()
            .zip(&inputs.headers)
            .filter_map(|(spec, value)| {
                value
                    .as_ref()
                    .map(|present| (spec.name.to_ascii_lowercase(), present.render()))
            })
            .collect();
        if !endpoint.produces.is_empty() {
            headers.push(("accept".to_owned(), endpoint.produces.join(", ")));
        }
        let body = match &inputs.body {
            Some(body) => {
                headers.push(("content-type".to_owned(), body.content_type.mime().to_owned()));
                encode_body(&endpoint, body)?
            }
            None => Bytes::new(),
        };
        Ok(Self {
            endpoint,
            inputs,
            path,
            query,
            headers,
            body,
        })
    }

    /// The endpoint this request was derived from.
    #[must_use]
    pub fn endpoint(&self) -> &Arc<Endpoint> { &self.endpoint }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> Method { self.endpoint.method }

    /// Structured inputs, used for shrinking.
    #[must_use]
    pub const fn inputs(&self) -> &RequestInputs { &self.inputs }

    /// Percent-encoded path, always starting with `/`.
    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    /// Encoded query string without the leading `?`; empty when absent.
    #[must_use]
    pub fn query(&self) -> &str { &self.query }

    /// Path plus query string.
    #[must_use]
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }

    /// Header pairs, names in lower case.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// Serialised body; empty when the endpoint has none.
    #[must_use]
    pub const fn body(&self) -> &Bytes { &self.body }

    /// Codec of the body, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<ContentType> {
        self.inputs.body.as_ref().map(|body| body.content_type)
    }

    /// Size measure of the inputs.
    #[must_use]
    pub fn size(&self) -> u64 { self.inputs.size() }
}

impl fmt::Display for GeneratedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method(), self.path_and_query())?;
        if !self.body.is_empty() {
            write!(f, " {}", String::from_utf8_lossy(&self.body))?;
        }
        Ok(())
    }
}

fn encode_segment(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// `.` and `..` are normalised away by URL parsing, so they cannot be sent
/// as segments.
fn is_dot_segment(rendered: &str) -> bool { matches!(rendered, "." | "..") }

fn encode_path(endpoint: &Endpoint, captures: &[Value]) -> Result<String, GenerationError> {
    let mut values = captures.iter();
    let mut path = String::new();
    for segment in &endpoint.path {
        path.push('/');
        match segment {
            PathSegment::Literal(text) => path.push_str(&encode_segment(text)),
            PathSegment::Capture { name, .. } => {
                let value = values.next().ok_or_else(|| GenerationError::Encode {
                    endpoint: endpoint.to_string(),
                    message: format!("missing value for capture {name}"),
                })?;
                let rendered = value.render();
                if is_dot_segment(&rendered) {
                    return Err(GenerationError::Encode {
                        endpoint: endpoint.to_string(),
                        message: format!("capture {name} renders as the dot segment {rendered:?}"),
                    });
                }
                path.push_str(&encode_segment(&rendered));
            }
        }
    }
    if values.next().is_some() {
        return Err(GenerationError::Encode {
            endpoint: endpoint.to_string(),
            message: "more capture values than captures".to_owned(),
        });
    }
    if path.is_empty() {
        path.push('/');
    }
    Ok(path)
}

fn encode_query(specs: &[ParamSpec], values: &[Option<Value>]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (spec, value) in specs.iter().zip(values) {
        if let Some(present) = value {
            serializer.append_pair(&spec.name, &present.render());
        }
    }
    serializer.finish()
}

fn encode_body(endpoint: &Endpoint, body: &BodyInput) -> Result<Bytes, GenerationError> {
    match body.content_type {
        ContentType::Json => serde_json::to_vec(&body.value.to_json())
            .map(Bytes::from)
            .map_err(|err| GenerationError::Encode {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }),
        ContentType::PlainText => Ok(Bytes::from(body.value.render())),
        ContentType::FormUrlEncoded => {
            let Value::Object(fields) = &body.value else {
                return Err(GenerationError::Encode {
                    endpoint: endpoint.to_string(),
                    message: "form bodies must be objects".to_owned(),
                });
            };
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (name, value) in fields {
                if let Some(present) = value {
                    serializer.append_pair(name, &present.render());
                }
            }
            Ok(Bytes::from(serializer.finish()))
        }
    }
}

/// Draws requests for the endpoints of one description.
#[derive(Debug, Clone, Copy)]
pub struct RequestGenerator<'a> {
    description: &'a ApiDescription,
    registry: &'a Registry,
}

impl<'a> RequestGenerator<'a> {
    /// Generator over `description` using the types in `registry`.
    #[must_use]
    pub const fn new(description: &'a ApiDescription, registry: &'a Registry) -> Self {
        Self {
            description,
            registry,
        }
    }

    /// The registry values are drawn from.
    #[must_use]
    pub const fn registry(&self) -> &'a Registry { self.registry }

    /// Check that every type used by every endpoint has a generator.
    ///
    /// # Errors
    ///
    /// Returns the first [`GenerationError::MissingGenerator`] found, in
    /// endpoint declaration order, or [`GenerationError::NoEndpoints`].
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.description.endpoints().is_empty() {
            return Err(GenerationError::NoEndpoints);
        }
        for endpoint in self.description.endpoints() {
            for (name, ty) in endpoint.captures() {
                self.require(ty, name, endpoint)?;
            }
            for param in &endpoint.query {
                self.require(&param.ty, &format!("?{}", param.name), endpoint)?;
            }
            for param in &endpoint.headers {
                self.require(&param.ty, &format!("header {}", param.name), endpoint)?;
            }
            if let Some(body) = &endpoint.body {
                self.require_schema(&body.schema, "body", endpoint)?;
            }
        }
        Ok(())
    }

    fn require(&self, ty: &ValueType, field: &str, endpoint: &Endpoint) -> Result<(), GenerationError> {
        if self.registry.contains(ty) {
            Ok(())
        } else {
            Err(missing(ty, field, endpoint))
        }
    }

    fn require_schema(
        &self,
        schema: &BodySchema,
        field: &str,
        endpoint: &Endpoint,
    ) -> Result<(), GenerationError> {
        match schema {
            BodySchema::Scalar { ty } => self.require(ty, field, endpoint),
            BodySchema::Object { fields } => fields.iter().try_for_each(|spec| {
                self.require_schema(&spec.schema, &format!("{field}.{}", spec.name), endpoint)
            }),
            BodySchema::List { items } => self.require_schema(items, &format!("{field}[]"), endpoint),
        }
    }

    /// Draw one request for a uniformly chosen endpoint.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerationError`] when a field type has no generator or
    /// the description is empty.
    pub fn generate(&self, rng: &mut StdRng, size: u32) -> Result<GeneratedRequest, GenerationError> {
        let endpoints = self.description.endpoints();
        if endpoints.is_empty() {
            return Err(GenerationError::NoEndpoints);
        }
        let index = rng.gen_range(0..endpoints.len());
        let endpoint = endpoints.get(index).ok_or(GenerationError::NoEndpoints)?;
        self.generate_for(endpoint, rng, size)
    }

    /// Draw one request for a specific endpoint.
    ///
    /// # Errors
    ///
    /// See [`RequestGenerator::generate`].
    pub fn generate_for(
        &self,
        endpoint: &Arc<Endpoint>,
        rng: &mut StdRng,
        size: u32,
    ) -> Result<GeneratedRequest, GenerationError> {
        let captures = endpoint
            .captures()
            .map(|(name, ty)| self.capture(ty, name, endpoint, rng, size))
            .collect::<Result<Vec<_>, _>>()?;
        let query = endpoint
            .query
            .iter()
            .map(|param| self.param(param, &format!("?{}", param.name), endpoint, rng, size))
            .collect::<Result<Vec<_>, _>>()?;
        let headers = endpoint
            .headers
            .iter()
            .map(|param| self.param(param, &format!("header {}", param.name), endpoint, rng, size))
            .collect::<Result<Vec<_>, _>>()?;
        let body = match &endpoint.body {
            Some(spec) => {
                let value = self.body_value(&spec.schema, "body", endpoint, rng, size)?;
                let choice = rng.gen_range(0..spec.content_types.len().max(1));
                let content_type = spec.content_types.get(choice).copied().ok_or_else(|| {
                    GenerationError::Encode {
                        endpoint: endpoint.to_string(),
                        message: "body declares no content type".to_owned(),
                    }
                })?;
                Some(BodyInput {
                    value,
                    content_type,
                })
            }
            None => None,
        };
        GeneratedRequest::assemble(
            Arc::clone(endpoint),
            RequestInputs {
                captures,
                query,
                headers,
                body,
            },
        )
    }

    fn scalar(
        &self,
        ty: &ValueType,
        field: &str,
        endpoint: &Endpoint,
        rng: &mut StdRng,
        size: u32,
    ) -> Result<Value, GenerationError> {
        self.registry
            .get(ty)
            .map(|generator| generator.generate(rng, size))
            .ok_or_else(|| missing(ty, field, endpoint))
    }

    fn capture(
        &self,
        ty: &ValueType,
        field: &str,
        endpoint: &Endpoint,
        rng: &mut StdRng,
        size: u32,
    ) -> Result<Value, GenerationError> {
        let mut value = self.scalar(ty, field, endpoint, rng, size)?;
        for _ in 1..CAPTURE_DRAWS {
            if !is_dot_segment(&value.render()) {
                break;
            }
            value = self.scalar(ty, field, endpoint, rng, size)?;
        }
        Ok(value)
    }

    fn param(
        &self,
        param: &ParamSpec,
        field: &str,
        endpoint: &Endpoint,
        rng: &mut StdRng,
        size: u32,
    ) -> Result<Option<Value>, GenerationError> {
        if param.required || rng.gen_bool(0.5) {
            self.scalar(&param.ty, field, endpoint, rng, size).map(Some)
        } else {
            Ok(None)
        }
    }

    fn body_value(
        &self,
        schema: &BodySchema,
        field: &str,
        endpoint: &Endpoint,
        rng: &mut StdRng,
        size: u32,
    ) -> Result<Value, GenerationError> {
        match schema {
            BodySchema::Scalar { ty } => self.scalar(ty, field, endpoint, rng, size),
            BodySchema::Object { fields } => fields
                .iter()
                .map(|spec| {
                    let value = if spec.required || rng.gen_bool(0.5) {
                        let label = format!("{field}.{}", spec.name);
                        Some(self.body_value(&spec.schema, &label, endpoint, rng, size)?)
                    } else {
                        None
                    };
                    Ok((spec.name.clone(), value))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Object),
            BodySchema::List { items } => {
                let len = rng.gen_range(0..=size.min(MAX_LIST_LEN));
                let label = format!("{field}[]");
                (0..len)
                    .map(|_| self.body_value(items, &label, endpoint, rng, size))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List)
            }
        }
    }

    /// The reproducible request stream for `(seed, schedule)`.
    #[must_use]
    pub fn sequence(&self, seed: u64, schedule: SizeSchedule) -> RequestSequence<'a> {
        RequestSequence {
            generator: *self,
            seed,
            schedule,
            rng: StdRng::seed_from_u64(seed),
            trial: 0,
        }
    }
}

fn missing(ty: &ValueType, field: &str, endpoint: &Endpoint) -> GenerationError {
    GenerationError::MissingGenerator {
        field: field.to_owned(),
        endpoint: endpoint.to_string(),
        ty: ty.clone(),
    }
}

/// Draw a single request from a fresh seed.
///
/// # Errors
///
/// See [`RequestGenerator::generate`].
pub fn generate(
    description: &ApiDescription,
    registry: &Registry,
    seed: u64,
    size: u32,
) -> Result<GeneratedRequest, GenerationError> {
    RequestGenerator::new(description, registry).generate(&mut StdRng::seed_from_u64(seed), size)
}

/// Endless, lazily generated requests; trial `n` uses size `schedule(n)`.
///
/// Two sequences built from the same description, registry, seed and
/// schedule yield identical requests.
pub struct RequestSequence<'a> {
    generator: RequestGenerator<'a>,
    seed: u64,
    schedule: SizeSchedule,
    rng: StdRng,
    trial: u32,
}

impl RequestSequence<'_> {
    /// Rewind to the first request.
    pub fn restart(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.trial = 0;
    }

    /// Seed the sequence was built from.
    #[must_use]
    pub const fn seed(&self) -> u64 { self.seed }

    /// Index of the next request.
    #[must_use]
    pub const fn trial(&self) -> u32 { self.trial }
}

impl Iterator for RequestSequence<'_> {
    type Item = Result<GeneratedRequest, GenerationError>;

    fn next(&mut self) -> Option<Self::Item> {
        let size = (self.schedule)(self.trial);
        let request = self.generator.generate(&mut self.rng, size);
        self.trial = self.trial.saturating_add(1);
        Some(request)
    }
}

#[cfg(test)]
mod tests;
