//! API descriptions shared by the integration suites.
//!
//! Each description matches one of the routers in [`crate::server`].

use servecheck::{
    ApiDescription,
    TranslationError,
    ValueType,
    api::{BodySchema, FieldSpec},
    route,
};

/// `GET /items/{id}` with an integer id, answering JSON.
///
/// # Errors
///
/// Propagates translation failures.
pub fn items_api() -> Result<ApiDescription, TranslationError> {
    ApiDescription::build(
        &route()
            .segment("items")
            .capture("id", ValueType::Integer)
            .get(["application/json"]),
    )
}

/// `GET /items/{id}?name=` with a required text query parameter.
///
/// # Errors
///
/// Propagates translation failures.
pub fn named_items_api() -> Result<ApiDescription, TranslationError> {
    ApiDescription::build(
        &route()
            .segment("items")
            .capture("id", ValueType::Integer)
            .required_query("name", ValueType::Text)
            .get(["application/json"]),
    )
}

/// A note catalogue: `GET /health`, `POST /notes` with a JSON body holding a
/// required `title` and an optional `tag`, and `GET /notes/{id}`.
///
/// # Errors
///
/// Propagates translation failures.
pub fn catalogue_api() -> Result<ApiDescription, TranslationError> {
    let note = BodySchema::object([
        FieldSpec::required("title", BodySchema::scalar(ValueType::Text)),
        FieldSpec::optional("tag", BodySchema::scalar(ValueType::Text)),
    ]);
    ApiDescription::build(&route().routes([
        route().segment("health").get(["text/plain"]),
        route()
            .segment("notes")
            .body(note, ["application/json"])
            .post(["application/json"]),
        route()
            .segment("notes")
            .capture("id", ValueType::Integer)
            .get(["application/json"]),
    ]))
}
