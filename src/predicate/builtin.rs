//! Built-in predicates: status, content and HTTP-semantics families.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::debug;

use super::{Check, CheckFailure, Exchange, Predicate};
use crate::{
    api::Method,
    generator::GeneratedRequest,
    transport::Response,
};

/// Decides whether a retrieved resource represents the entity a request
/// created. Receives the creating request and the follow-up `GET` response.
pub type EntityEquality =
    Arc<dyn Fn(&GeneratedRequest, &Response) -> Result<(), String> + Send + Sync>;

/// The server never answers with a 5xx status.
#[must_use]
pub fn never_5xx() -> Predicate {
    Predicate::new("never_5xx", |_, response| {
        if response.is_server_error() {
            Err(format!("server answered {}", response.status))
        } else {
            Ok(())
        }
    })
}

fn is_json(response: &Response) -> bool {
    response
        .content_type()
        .is_some_and(|essence| essence == "application/json" || essence.ends_with("+json"))
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// JSON responses carry an object at the top level, never a bare scalar or
/// array.
#[must_use]
pub fn json_top_level_is_object() -> Predicate {
    Predicate::new("json_top_level_is_object", |_, response| {
        if !is_json(response) || response.body.is_empty() {
            return Ok(());
        }
        match response.json() {
            Some(serde_json::Value::Object(_)) => Ok(()),
            Some(other) => Err(format!("top-level JSON value is a {}", json_kind(&other))),
            None => Err("body is not valid JSON".to_owned()),
        }
    })
}

/// Responses with status 405 carry an `Allow` header.
#[must_use]
pub fn not_allowed_has_allow_header() -> Predicate {
    Predicate::new("not_allowed_has_allow_header", |_, response| {
        if response.status == 405 && response.header("allow").is_none() {
            Err("405 response without an Allow header".to_owned())
        } else {
            Ok(())
        }
    })
}

/// Responses with status 401 carry a `WWW-Authenticate` header.
#[must_use]
pub fn unauthorized_has_www_authenticate() -> Predicate {
    Predicate::new("unauthorized_has_www_authenticate", |_, response| {
        if response.status == 401 && response.header("www-authenticate").is_none() {
            Err("401 response without a WWW-Authenticate header".to_owned())
        } else {
            Ok(())
        }
    })
}

/// Successful `GET` responses carry a `Cache-Control` header.
#[must_use]
pub fn gets_have_cache_control() -> Predicate {
    Predicate::new("gets_have_cache_control", |request, response| {
        let success = (200..300).contains(&response.status);
        if request.method() == Method::Get && success && response.header("cache-control").is_none()
        {
            Err("successful GET without a Cache-Control header".to_owned())
        } else {
            Ok(())
        }
    })
}

/// Non-empty responses use one of the endpoint's declared content types.
#[must_use]
pub fn honours_accept_header() -> Predicate {
    Predicate::new("honours_accept_header", |request, response| {
        let produces = &request.endpoint().produces;
        if produces.is_empty() || response.body.is_empty() {
            return Ok(());
        }
        let Some(actual) = response.content_type() else {
            return Err("response body without a Content-Type header".to_owned());
        };
        let declared = produces.iter().any(|mime| {
            mime.split(';')
                .next()
                .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(&actual))
        });
        if declared {
            Ok(())
        } else {
            Err(format!(
                "content type {actual} is not one of {}",
                produces.join(", ")
            ))
        }
    })
}

/// The full response arrives within `limit`.
#[must_use]
pub fn not_longer_than(limit: Duration) -> Predicate {
    Predicate::new("not_longer_than", move |_, response| {
        if response.elapsed > limit {
            Err(format!("took {:?}, limit {limit:?}", response.elapsed))
        } else {
            Ok(())
        }
    })
}

/// Entity equality that requires every field of a JSON object request body
/// to appear with the same value in the retrieved JSON object.
#[must_use]
pub fn body_fields_match() -> EntityEquality {
    Arc::new(|request: &GeneratedRequest, retrieved: &Response| {
        let Ok(sent) = serde_json::from_slice::<serde_json::Value>(request.body()) else {
            return Ok(());
        };
        let Some(sent_fields) = sent.as_object() else {
            return Ok(());
        };
        let Some(found) = retrieved.json() else {
            return Err("retrieved resource is not JSON".to_owned());
        };
        for (name, value) in sent_fields {
            match found.get(name) {
                Some(actual) if actual == value => {}
                Some(actual) => {
                    return Err(format!("field {name}: sent {value}, retrieved {actual}"));
                }
                None => return Err(format!("field {name} missing from retrieved resource")),
            }
        }
        Ok(())
    })
}

struct CreatedLocation {
    equality: EntityEquality,
}

#[async_trait]
impl Check for CreatedLocation {
    fn name(&self) -> &str { "created_location_retrievable" }

    async fn check(&self, exchange: &Exchange<'_>) -> Result<(), CheckFailure> {
        if exchange.request.method() != Method::Post || exchange.response.status != 201 {
            return Ok(());
        }
        let Some(location) = exchange.response.header("location") else {
            return Ok(());
        };
        let url = exchange.base_url.join(location).map_err(|error| {
            CheckFailure::Violated(format!("Location {location:?} is not a valid URL: {error}"))
        })?;
        debug!(%url, "following created resource location");
        let retrieved = exchange.transport.get(&url).await?;
        if !(200..300).contains(&retrieved.status) {
            return Err(CheckFailure::Violated(format!(
                "GET {location} answered {}",
                retrieved.status
            )));
        }
        (self.equality)(exchange.request, &retrieved).map_err(CheckFailure::Violated)
    }
}

/// A `201 Created` response to a `POST` that advertises a `Location` must be
/// retrievable there, and the retrieved resource must represent the created
/// entity according to `equality`.
#[must_use]
pub fn created_location_retrievable(equality: EntityEquality) -> Predicate {
    Predicate::from_check(CreatedLocation { equality })
}

/// Built-in predicate selected by its command-line name.
#[must_use]
pub fn by_name(name: &str) -> Option<Predicate> {
    match name {
        "never-5xx" => Some(never_5xx()),
        "json-objects" => Some(json_top_level_is_object()),
        "allow-header" => Some(not_allowed_has_allow_header()),
        "www-authenticate" => Some(unauthorized_has_www_authenticate()),
        "cache-control" => Some(gets_have_cache_control()),
        "honours-accept" => Some(honours_accept_header()),
        "created-location" => Some(created_location_retrievable(body_fields_match())),
        _ => None,
    }
}
