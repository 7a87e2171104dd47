//! Differential checking of two servers.
//!
//! Each trial sends the same generated request to both servers and compares
//! the responses with a [`ResponseEquality`]. The first divergence is shrunk
//! against both servers at once: a candidate is kept only while the two
//! responses still differ.

use std::{collections::BTreeSet, fmt, sync::Arc};

use tracing::{debug, info};
use url::Url;

use crate::{
    api::ApiDescription,
    error::CheckError,
    generator::{GeneratedRequest, RequestGenerator},
    runner::CheckOptions,
    shrink::Shrinker,
    transport::{Response, Transport},
};

/// Decides whether two responses to the same request are equivalent.
pub trait ResponseEquality: Send + Sync {
    /// `Ok` when equivalent, otherwise an explanation of the difference.
    ///
    /// # Errors
    ///
    /// Returns the explanation when the responses differ.
    fn compare(&self, left: &Response, right: &Response) -> Result<(), String>;
}

impl<F> ResponseEquality for F
where
    F: Fn(&Response, &Response) -> Result<(), String> + Send + Sync,
{
    fn compare(&self, left: &Response, right: &Response) -> Result<(), String> { self(left, right) }
}

fn same_status(left: &Response, right: &Response) -> Result<(), String> {
    if left.status == right.status {
        Ok(())
    } else {
        Err(format!("status {} vs {}", left.status, right.status))
    }
}

fn same_body(left: &Response, right: &Response) -> Result<(), String> {
    if left.body == right.body {
        Ok(())
    } else {
        Err(format!(
            "body {:?} vs {:?}",
            String::from_utf8_lossy(&left.body),
            String::from_utf8_lossy(&right.body)
        ))
    }
}

/// Status codes and body bytes match exactly; headers are not compared.
#[must_use]
pub fn byte_equal() -> impl ResponseEquality {
    |left: &Response, right: &Response| {
        same_status(left, right)?;
        same_body(left, right)
    }
}

/// Status codes match.
#[must_use]
pub fn status_equal() -> impl ResponseEquality {
    |left: &Response, right: &Response| same_status(left, right)
}

/// Status codes match and bodies are structurally equal JSON; bodies that
/// are not JSON are compared byte for byte.
#[must_use]
pub fn json_equal() -> impl ResponseEquality {
    |left: &Response, right: &Response| {
        same_status(left, right)?;
        match (left.json(), right.json()) {
            (Some(a), Some(b)) if a == b => Ok(()),
            (Some(a), Some(b)) => Err(format!("JSON {a} vs {b}")),
            _ => same_body(left, right),
        }
    }
}

/// Status, body and headers match, except the headers named in `ignored`
/// (compared case-insensitively).
pub fn ignoring_headers<I, S>(ignored: I) -> impl ResponseEquality
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let ignored: BTreeSet<String> = ignored
        .into_iter()
        .map(|name| name.as_ref().to_ascii_lowercase())
        .collect();
    move |left: &Response, right: &Response| {
        same_status(left, right)?;
        same_body(left, right)?;
        let kept = |response: &Response| -> BTreeSet<(String, String)> {
            response
                .headers
                .iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
                .filter(|(name, _)| !ignored.contains(name))
                .collect()
        };
        let (a, b) = (kept(left), kept(right));
        match a.symmetric_difference(&b).next() {
            None => Ok(()),
            Some((name, _)) => Err(format!("header {name} differs")),
        }
    }
}

/// Built-in equality selected by its command-line name.
#[must_use]
pub fn equality_by_name(name: &str) -> Option<Box<dyn ResponseEquality>> {
    match name {
        "bytes" => Some(Box::new(byte_equal())),
        "json" => Some(Box::new(json_equal())),
        "status" => Some(Box::new(status_equal())),
        _ => None,
    }
}

/// A minimal request on which the two servers diverge.
#[derive(Debug, Clone)]
pub struct Mismatch {
    /// The shrunk request.
    pub request: GeneratedRequest,
    /// Response of the first server.
    pub left: Response,
    /// Response of the second server.
    pub right: Response,
    /// Why the responses are not equivalent.
    pub explanation: String,
    /// The first diverging request, before shrinking.
    pub original: GeneratedRequest,
    /// Zero-based trial index of the first divergence.
    pub trial: u32,
    /// Number of accepted shrink steps.
    pub shrink_steps: u32,
    /// Seed that reproduces the run.
    pub seed: u64,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "servers diverge at trial {} after {} shrink steps (seed {})",
            self.trial, self.shrink_steps, self.seed
        )?;
        writeln!(f, "  request: {}", self.request)?;
        writeln!(f, "  status:  {} vs {}", self.left.status, self.right.status)?;
        write!(f, "  - {}", self.explanation)
    }
}

/// Verdict of an equivalence run.
#[derive(Debug, Clone)]
pub enum EquivalenceResult {
    /// No trial distinguished the servers.
    Equivalent {
        /// Trials executed.
        trials: u32,
        /// Seed that reproduces the run.
        seed: u64,
    },
    /// The servers answered some request differently.
    Mismatch(Box<Mismatch>),
}

impl EquivalenceResult {
    /// Whether the servers were indistinguishable.
    #[must_use]
    pub const fn is_equivalent(&self) -> bool { matches!(self, Self::Equivalent { .. }) }

    /// The divergence, if any.
    #[must_use]
    pub fn mismatch(&self) -> Option<&Mismatch> {
        match self {
            Self::Equivalent { .. } => None,
            Self::Mismatch(mismatch) => Some(&**mismatch),
        }
    }
}

impl fmt::Display for EquivalenceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equivalent { trials, seed } => {
                write!(f, "equivalent over {trials} trials (seed {seed})")
            }
            Self::Mismatch(mismatch) => write!(f, "{mismatch}"),
        }
    }
}

/// Sends shared requests to two servers and compares the answers.
pub struct EquivalenceChecker<'a> {
    description: &'a ApiDescription,
    options: &'a CheckOptions,
    transport: &'a dyn Transport,
}

impl<'a> EquivalenceChecker<'a> {
    /// Checker over `description` sending through `transport`.
    #[must_use]
    pub const fn new(
        description: &'a ApiDescription,
        options: &'a CheckOptions,
        transport: &'a dyn Transport,
    ) -> Self {
        Self {
            description,
            options,
            transport,
        }
    }

    async fn exchange(
        &self,
        left: &Url,
        right: &Url,
        request: &GeneratedRequest,
    ) -> Result<(Response, Response), CheckError> {
        Ok(tokio::try_join!(
            self.transport.send(left, request),
            self.transport.send(right, request)
        )?)
    }

    /// Compare the servers at `left` and `right`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError`] when a request cannot be generated or either
    /// server cannot be reached.
    pub async fn compare(
        &self,
        left: &Url,
        right: &Url,
        equality: &dyn ResponseEquality,
    ) -> Result<EquivalenceResult, CheckError> {
        let generator = RequestGenerator::new(self.description, &self.options.registry);
        generator.validate()?;
        let seed = self.options.resolved_seed();
        info!(seed, trials = self.options.trial_count, %left, %right, "starting equivalence run");
        let mut sequence = generator.sequence(seed, Arc::clone(&self.options.size_schedule));
        let mut trials = 0;
        for trial in 0..self.options.trial_count {
            let Some(generated) = sequence.next() else {
                break;
            };
            let request = generated?;
            let (left_response, right_response) = self.exchange(left, right, &request).await?;
            trials = trial + 1;
            if let Err(explanation) = equality.compare(&left_response, &right_response) {
                info!(trial, request = %request, %explanation, "servers diverge; shrinking");
                let divergence = Divergence {
                    request,
                    left: left_response,
                    right: right_response,
                    explanation,
                };
                let mismatch = self
                    .shrink(left, right, equality, divergence, trial, seed)
                    .await?;
                return Ok(EquivalenceResult::Mismatch(Box::new(mismatch)));
            }
        }
        Ok(EquivalenceResult::Equivalent { trials, seed })
    }

    async fn shrink(
        &self,
        left: &Url,
        right: &Url,
        equality: &dyn ResponseEquality,
        first: Divergence,
        trial: u32,
        seed: u64,
    ) -> Result<Mismatch, CheckError> {
        let shrinker = Shrinker::new(&self.options.registry);
        let original = first.request.clone();
        let mut current = first;
        let mut steps: u32 = 0;
        'steps: while steps < self.options.max_shrink_steps {
            for candidate in shrinker.candidates(&current.request) {
                let (left_response, right_response) = self.exchange(left, right, &candidate).await?;
                if let Err(explanation) = equality.compare(&left_response, &right_response) {
                    steps += 1;
                    debug!(step = steps, size = candidate.size(), request = %candidate, "accepted shrink step");
                    current = Divergence {
                        request: candidate,
                        left: left_response,
                        right: right_response,
                        explanation,
                    };
                    continue 'steps;
                }
            }
            break;
        }
        Ok(Mismatch {
            request: current.request,
            left: current.left,
            right: current.right,
            explanation: current.explanation,
            original,
            trial,
            shrink_steps: steps,
            seed,
        })
    }
}

struct Divergence {
    request: GeneratedRequest,
    left: Response,
    right: Response,
    explanation: String,
}

/// Check that the servers at `left` and `right` answer every generated
/// request equivalently under `equality`.
///
/// # Errors
///
/// See [`EquivalenceChecker::compare`]; also fails if the HTTP client cannot
/// be built.
pub async fn servers_equal(
    description: &ApiDescription,
    left: &Url,
    right: &Url,
    options: &CheckOptions,
    equality: &dyn ResponseEquality,
) -> Result<EquivalenceResult, CheckError> {
    let transport = options.transport()?;
    EquivalenceChecker::new(description, options, &transport)
        .compare(left, right, equality)
        .await
}
