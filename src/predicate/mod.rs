//! Composable checks over request/response exchanges.
//!
//! A [`Predicate`] is an ordered collection of named [`Check`]s. Composition
//! with [`Predicate::and`] concatenates the collections, so it is associative
//! and [`Predicate::identity`] (no checks) always passes. Evaluating a
//! predicate runs every check and returns every violation rather than
//! stopping at the first.

mod builtin;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
pub use builtin::{
    EntityEquality,
    body_fields_match,
    by_name,
    created_location_retrievable,
    gets_have_cache_control,
    honours_accept_header,
    json_top_level_is_object,
    never_5xx,
    not_allowed_has_allow_header,
    not_longer_than,
    unauthorized_has_www_authenticate,
};
use url::Url;

use crate::{
    generator::GeneratedRequest,
    transport::{Response, Transport, TransportError},
};

/// One request/response pair plus what a check needs for follow-up requests.
#[derive(Clone, Copy)]
pub struct Exchange<'a> {
    /// The request that was sent.
    pub request: &'a GeneratedRequest,
    /// The response the server returned.
    pub response: &'a Response,
    /// Base URL of the server under test.
    pub base_url: &'a Url,
    /// Transport for follow-up requests.
    pub transport: &'a dyn Transport,
}

/// Why a single check did not pass.
#[derive(Debug)]
pub enum CheckFailure {
    /// The exchange breaks the property; carries the explanation.
    Violated(String),
    /// A follow-up request could not be completed.
    Transport(TransportError),
}

impl From<TransportError> for CheckFailure {
    fn from(error: TransportError) -> Self { Self::Transport(error) }
}

/// A named property of one exchange.
#[async_trait]
pub trait Check: Send + Sync {
    /// Name reported alongside violations.
    fn name(&self) -> &str;

    /// Judge `exchange`.
    async fn check(&self, exchange: &Exchange<'_>) -> Result<(), CheckFailure>;
}

struct FnCheck<F> {
    name: String,
    check: F,
}

#[async_trait]
impl<F> Check for FnCheck<F>
where
    F: Fn(&GeneratedRequest, &Response) -> Result<(), String> + Send + Sync,
{
    fn name(&self) -> &str { &self.name }

    async fn check(&self, exchange: &Exchange<'_>) -> Result<(), CheckFailure> {
        (self.check)(exchange.request, exchange.response).map_err(CheckFailure::Violated)
    }
}

/// A violated check together with the exchange that violated it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Name of the violated check.
    pub predicate: String,
    /// Human-readable explanation.
    pub explanation: String,
    /// The offending request.
    pub request: GeneratedRequest,
    /// The response it produced.
    pub response: Response,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.predicate, self.explanation)
    }
}

/// An ordered conjunction of checks.
#[derive(Clone, Default)]
pub struct Predicate {
    checks: Vec<Arc<dyn Check>>,
}

impl Predicate {
    /// The predicate with no checks; it always passes.
    #[must_use]
    pub const fn identity() -> Self { Self { checks: Vec::new() } }

    /// Lift a synchronous check over the request and response.
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&GeneratedRequest, &Response) -> Result<(), String> + Send + Sync + 'static,
    {
        Self::from_check(FnCheck {
            name: name.into(),
            check,
        })
    }

    /// Wrap a custom [`Check`].
    pub fn from_check(check: impl Check + 'static) -> Self {
        Self {
            checks: vec![Arc::new(check)],
        }
    }

    /// Both `self` and `other` must hold.
    #[must_use]
    pub fn and(mut self, other: Self) -> Self {
        self.checks.extend(other.checks);
        self
    }

    /// Conjunction of every predicate in `predicates`.
    pub fn all(predicates: impl IntoIterator<Item = Self>) -> Self {
        predicates.into_iter().fold(Self::identity(), Self::and)
    }

    /// Names of the composed checks, in composition order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> { self.checks.iter().map(|check| check.name()).collect() }

    /// Whether no checks are composed.
    #[must_use]
    pub fn is_identity(&self) -> bool { self.checks.is_empty() }

    /// Run every check against `exchange` and collect all violations.
    ///
    /// # Errors
    ///
    /// Returns the first [`TransportError`] raised by a follow-up request.
    pub async fn evaluate(&self, exchange: &Exchange<'_>) -> Result<Vec<Violation>, TransportError> {
        let mut violations = Vec::new();
        for check in &self.checks {
            match check.check(exchange).await {
                Ok(()) => {}
                Err(CheckFailure::Violated(explanation)) => violations.push(Violation {
                    predicate: check.name().to_owned(),
                    explanation,
                    request: exchange.request.clone(),
                    response: exchange.response.clone(),
                }),
                Err(CheckFailure::Transport(error)) => return Err(error),
            }
        }
        Ok(violations)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.names()).finish()
    }
}

#[cfg(test)]
mod tests;
