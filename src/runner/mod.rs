//! The property runner: generate, send, evaluate, shrink.
//!
//! Trials run sequentially. Each trial draws the next request from the
//! seeded [`RequestSequence`](crate::generator::RequestSequence), sends it and
//! evaluates the predicate. The first violation is shrunk to a minimal
//! counterexample; in exhaustive mode the run continues and one shrunk
//! failure is kept per distinct set of violated predicates.

use std::{collections::BTreeSet, fmt, sync::Arc, time::Duration};

use tracing::{debug, info};
use url::Url;

use crate::{
    api::ApiDescription,
    error::CheckError,
    generator::{GeneratedRequest, RequestGenerator, SizeSchedule, cycling_sizes},
    predicate::{Exchange, Predicate, Violation},
    server::ServerHandle,
    shrink::Shrinker,
    transport::{HttpTransport, Response, Transport},
    value::Registry,
};

/// Largest size used by the default schedule.
pub const DEFAULT_MAX_SIZE: u32 = 100;

/// Options shared by property and equivalence runs.
#[derive(Clone)]
pub struct CheckOptions {
    /// Number of generated requests per run.
    pub trial_count: u32,
    /// Upper bound on accepted shrink steps per failure.
    pub max_shrink_steps: u32,
    /// Size parameter for each trial index.
    pub size_schedule: SizeSchedule,
    /// Fixed seed; a random one is drawn and logged when absent.
    pub seed: Option<u64>,
    /// Stop at the first failure instead of collecting every category.
    pub stop_on_first_failure: bool,
    /// Generators for the value types used by the API.
    pub registry: Registry,
    /// Per-request transport timeout.
    pub timeout: Duration,
    /// Bounded retries of refused connections; zero disables retrying.
    pub retries: u32,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            trial_count: 100,
            max_shrink_steps: 1000,
            size_schedule: cycling_sizes(DEFAULT_MAX_SIZE),
            seed: None,
            stop_on_first_failure: true,
            registry: Registry::with_builtins(),
            timeout: Duration::from_secs(10),
            retries: 0,
        }
    }
}

impl fmt::Debug for CheckOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckOptions")
            .field("trial_count", &self.trial_count)
            .field("max_shrink_steps", &self.max_shrink_steps)
            .field("seed", &self.seed)
            .field("stop_on_first_failure", &self.stop_on_first_failure)
            .field("registry", &self.registry)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

impl CheckOptions {
    /// The configured seed, or a fresh random one.
    #[must_use]
    pub fn resolved_seed(&self) -> u64 { self.seed.unwrap_or_else(rand::random) }

    /// HTTP transport configured with this run's timeout and retries.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`](crate::TransportError) if the client
    /// cannot be built.
    pub fn transport(&self) -> Result<HttpTransport, crate::TransportError> {
        HttpTransport::new(self.timeout, self.retries)
    }
}

/// A minimal failing request with the violations it triggers.
#[derive(Debug, Clone)]
pub struct Failure {
    /// The shrunk request.
    pub counterexample: GeneratedRequest,
    /// The response to the shrunk request.
    pub response: Response,
    /// Violations triggered by the shrunk request.
    pub violations: Vec<Violation>,
    /// The request that failed first, before shrinking.
    pub original: GeneratedRequest,
    /// Zero-based trial index of the original failure.
    pub trial: u32,
    /// Number of accepted shrink steps.
    pub shrink_steps: u32,
}

impl Failure {
    /// Names of the violated predicates.
    #[must_use]
    pub fn predicates(&self) -> Vec<&str> {
        self.violations
            .iter()
            .map(|violation| violation.predicate.as_str())
            .collect()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "falsified at trial {} after {} shrink steps",
            self.trial, self.shrink_steps
        )?;
        writeln!(f, "  request: {}", self.counterexample)?;
        write!(f, "  status:  {}", self.response.status)?;
        for violation in &self.violations {
            write!(f, "\n  - {violation}")?;
        }
        Ok(())
    }
}

/// Verdict of a property run.
#[derive(Debug, Clone)]
pub enum RunResult {
    /// Every trial passed.
    Passed {
        /// Trials executed.
        trials: u32,
        /// Seed that reproduces the run.
        seed: u64,
    },
    /// At least one trial failed.
    Failed {
        /// One shrunk failure per category; a single entry when stopping at
        /// the first failure.
        failures: Vec<Failure>,
        /// Trials executed.
        trials: u32,
        /// Seed that reproduces the run.
        seed: u64,
    },
}

impl RunResult {
    /// Whether every trial passed.
    #[must_use]
    pub const fn is_passed(&self) -> bool { matches!(self, Self::Passed { .. }) }

    /// Collected failures; empty when the run passed.
    #[must_use]
    pub fn failures(&self) -> &[Failure] {
        match self {
            Self::Passed { .. } => &[],
            Self::Failed { failures, .. } => failures,
        }
    }

    /// Seed that reproduces the run.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        match self {
            Self::Passed { seed, .. } | Self::Failed { seed, .. } => *seed,
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed { trials, seed } => {
                write!(f, "passed {trials} trials (seed {seed})")
            }
            Self::Failed {
                failures,
                trials,
                seed,
            } => {
                write!(f, "failed after {trials} trials (seed {seed})")?;
                for failure in failures {
                    write!(f, "\n{failure}")?;
                }
                Ok(())
            }
        }
    }
}

/// Result log owned by a single run.
#[derive(Default)]
struct RunLog {
    trials: u32,
    categories: BTreeSet<Vec<String>>,
    failures: Vec<Failure>,
}

impl RunLog {
    fn is_new(&self, category: &[String]) -> bool { !self.categories.contains(category) }

    fn record(&mut self, category: Vec<String>, failure: Failure) {
        self.categories.insert(category);
        self.failures.push(failure);
    }

    fn finish(self, seed: u64) -> RunResult {
        if self.failures.is_empty() {
            RunResult::Passed {
                trials: self.trials,
                seed,
            }
        } else {
            RunResult::Failed {
                failures: self.failures,
                trials: self.trials,
                seed,
            }
        }
    }
}

fn category_of(violations: &[Violation]) -> Vec<String> {
    violations
        .iter()
        .map(|violation| violation.predicate.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Drives trials against one server through a [`Transport`].
pub struct PropertyRunner<'a> {
    description: &'a ApiDescription,
    options: &'a CheckOptions,
    transport: &'a dyn Transport,
}

impl<'a> PropertyRunner<'a> {
    /// Runner over `description` sending through `transport`.
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

    /// Check `predicate` against the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError`] when a request cannot be generated or a
    /// response cannot be obtained; no partial verdict is returned.
    pub async fn run(&self, base_url: &Url, predicate: &Predicate) -> Result<RunResult, CheckError> {
        let generator = RequestGenerator::new(self.description, &self.options.registry);
        generator.validate()?;
        let seed = self.options.resolved_seed();
        info!(
            seed,
            trials = self.options.trial_count,
            %base_url,
            "starting property run"
        );
        let mut log = RunLog::default();
        let mut sequence = generator.sequence(seed, Arc::clone(&self.options.size_schedule));
        for trial in 0..self.options.trial_count {
            let Some(generated) = sequence.next() else {
                break;
            };
            let request = generated?;
            let response = self.transport.send(base_url, &request).await?;
            let violations = self.evaluate(base_url, predicate, &request, &response).await?;
            log.trials = trial + 1;
            if violations.is_empty() {
                continue;
            }
            let category = category_of(&violations);
            if !log.is_new(&category) {
                continue;
            }
            info!(trial, request = %request, violated = ?category, "property violated; shrinking");
            let failure = self
                .shrink(base_url, predicate, request, response, violations, trial)
                .await?;
            log.record(category, failure);
            if self.options.stop_on_first_failure {
                break;
            }
        }
        Ok(log.finish(seed))
    }

    async fn evaluate(
        &self,
        base_url: &Url,
        predicate: &Predicate,
        request: &GeneratedRequest,
        response: &Response,
    ) -> Result<Vec<Violation>, CheckError> {
        let exchange = Exchange {
            request,
            response,
            base_url,
            transport: self.transport,
        };
        Ok(predicate.evaluate(&exchange).await?)
    }

    async fn shrink(
        &self,
        base_url: &Url,
        predicate: &Predicate,
        original: GeneratedRequest,
        response: Response,
        violations: Vec<Violation>,
        trial: u32,
    ) -> Result<Failure, CheckError> {
        let targets = category_of(&violations);
        let shrinker = Shrinker::new(&self.options.registry);
        let mut current = original.clone();
        let mut current_response = response;
        let mut current_violations = violations;
        let mut steps: u32 = 0;
        'steps: while steps < self.options.max_shrink_steps {
            for candidate in shrinker.candidates(&current) {
                let observed = self.transport.send(base_url, &candidate).await?;
                let found = self.evaluate(base_url, predicate, &candidate, &observed).await?;
                if found.iter().any(|violation| targets.contains(&violation.predicate)) {
                    steps += 1;
                    debug!(step = steps, size = candidate.size(), request = %candidate, "accepted shrink step");
                    current = candidate;
                    current_response = observed;
                    current_violations = found;
                    continue 'steps;
                }
            }
            break;
        }
        Ok(Failure {
            counterexample: current,
            response: current_response,
            violations: current_violations,
            original,
            trial,
            shrink_steps: steps,
        })
    }
}

/// Check that the server at `base_url` satisfies `predicate`.
///
/// # Errors
///
/// See [`PropertyRunner::run`]; also fails if the HTTP client cannot be
/// built.
pub async fn server_satisfies(
    description: &ApiDescription,
    base_url: &Url,
    options: &CheckOptions,
    predicate: &Predicate,
) -> Result<RunResult, CheckError> {
    let transport = options.transport()?;
    PropertyRunner::new(description, options, &transport)
        .run(base_url, predicate)
        .await
}

/// Check `predicate` against a server started by
/// [`with_servant_server`](crate::with_servant_server).
///
/// # Errors
///
/// See [`server_satisfies`].
pub async fn run(
    description: &ApiDescription,
    handle: &ServerHandle,
    options: &CheckOptions,
    predicate: &Predicate,
) -> Result<RunResult, CheckError> {
    server_satisfies(description, handle.base_url(), options, predicate).await
}
