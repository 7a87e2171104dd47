//! Whole-API property checks for HTTP servers.
//!
//! `servecheck` generates structurally valid requests from a runtime
//! [`api::ApiDescription`], sends them to running servers, evaluates
//! composable [`predicate::Predicate`]s over each exchange and shrinks any
//! failure to a minimal counterexample. Two servers can also be compared for
//! equivalence under a caller-supplied [`equivalence::ResponseEquality`].
//!
//! The three public entry points are [`server_satisfies`], [`servers_equal`]
//! and [`with_servant_server`].

pub mod api;
pub mod cli;
pub mod equivalence;
pub mod error;
pub mod generator;
pub mod predicate;
pub mod runner;
pub mod server;
pub mod shrink;
pub mod transport;
pub mod value;

pub use api::{ApiDescription, ApiNode, Endpoint, Method, ReflectApi, TranslationError, route};
pub use equivalence::{EquivalenceResult, Mismatch, ResponseEquality, servers_equal};
pub use error::CheckError;
pub use generator::{GeneratedRequest, GenerationError, RequestGenerator, SizeSchedule};
pub use predicate::{Check, Exchange, Predicate, Violation};
pub use runner::{CheckOptions, Failure, RunResult, server_satisfies};
pub use server::{
    CommandServer,
    Readiness,
    RunningServer,
    ServerFactory,
    ServerHandle,
    ServerOptions,
    ServerStartError,
    TaskServer,
    with_servant_server,
};
pub use transport::{HttpTransport, Response, Transport, TransportError};
pub use value::{Registry, Value, ValueGenerator, ValueType};
