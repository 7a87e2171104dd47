//! Simplification of failing requests.
//!
//! Candidates are derived field by field in declaration order (path
//! captures, query parameters, headers, then the body). Optional values are
//! first dropped, then shrunk through the registry. Every candidate targets
//! the same endpoint as its source and is strictly smaller under
//! [`RequestInputs::size`]. Candidates that no longer assemble, such as a
//! capture shrunk to `.`, are discarded.

use std::sync::Arc;

use crate::{
    api::{BodySchema, ParamSpec},
    generator::{BodyInput, GeneratedRequest, RequestInputs},
    value::{Registry, Value, ValueType},
};

/// Produces shrink candidates using the generators of a [`Registry`].
#[derive(Debug, Clone, Copy)]
pub struct Shrinker<'a> {
    registry: &'a Registry,
}

impl<'a> Shrinker<'a> {
    /// Shrinker backed by `registry`.
    #[must_use]
    pub const fn new(registry: &'a Registry) -> Self { Self { registry } }

    /// Strictly smaller variants of `request`, for the same endpoint.
    #[must_use]
    pub fn candidates(&self, request: &GeneratedRequest) -> Vec<GeneratedRequest> {
        let endpoint = request.endpoint();
        let inputs = request.inputs();
        let mut out: Vec<RequestInputs> = Vec::new();

        for (index, ((_, ty), value)) in endpoint.captures().zip(&inputs.captures).enumerate() {
            for smaller in self.scalar(ty, value) {
                let mut next = inputs.clone();
                if let Some(slot) = next.captures.get_mut(index) {
                    *slot = smaller;
                }
                out.push(next);
            }
        }
        for query in self.params(&endpoint.query, &inputs.query) {
            out.push(RequestInputs {
                query,
                ..inputs.clone()
            });
        }
        for headers in self.params(&endpoint.headers, &inputs.headers) {
            out.push(RequestInputs {
                headers,
                ..inputs.clone()
            });
        }
        if let (Some(spec), Some(body)) = (&endpoint.body, &inputs.body) {
            for value in self.value(&spec.schema, &body.value) {
                out.push(RequestInputs {
                    body: Some(BodyInput {
                        value,
                        content_type: body.content_type,
                    }),
                    ..inputs.clone()
                });
            }
        }

        let original = inputs.size();
        out.into_iter()
            .filter(|candidate| candidate.size() < original)
            .filter_map(|candidate| GeneratedRequest::assemble(Arc::clone(endpoint), candidate).ok())
            .collect()
    }

    fn scalar(&self, ty: &ValueType, value: &Value) -> Vec<Value> {
        self.registry
            .get(ty)
            .map(|generator| generator.shrink(value))
            .unwrap_or_default()
    }

    fn params(&self, specs: &[ParamSpec], values: &[Option<Value>]) -> Vec<Vec<Option<Value>>> {
        let mut out = Vec::new();
        for (index, (spec, value)) in specs.iter().zip(values).enumerate() {
            let Some(present) = value else { continue };
            if !spec.required {
                out.push(replaced(values, index, None));
            }
            for smaller in self.scalar(&spec.ty, present) {
                out.push(replaced(values, index, Some(smaller)));
            }
        }
        out
    }

    fn value(&self, schema: &BodySchema, value: &Value) -> Vec<Value> {
        match (schema, value) {
            (BodySchema::Scalar { ty }, _) => self.scalar(ty, value),
            (BodySchema::Object { fields }, Value::Object(present)) => {
                let mut out = Vec::new();
                for (index, (spec, (_, slot))) in fields.iter().zip(present).enumerate() {
                    if !spec.required && slot.is_some() {
                        out.push(Value::Object(replace_field(present, index, None)));
                    }
                }
                for (index, (spec, (_, slot))) in fields.iter().zip(present).enumerate() {
                    let Some(inner) = slot else { continue };
                    for smaller in self.value(&spec.schema, inner) {
                        out.push(Value::Object(replace_field(present, index, Some(smaller))));
                    }
                }
                out
            }
            (BodySchema::List { items }, Value::List(elements)) => self.list(items, elements),
            _ => Vec::new(),
        }
    }

    fn list(&self, items: &BodySchema, elements: &[Value]) -> Vec<Value> {
        if elements.is_empty() {
            return Vec::new();
        }
        let mut out = vec![Value::List(Vec::new())];
        #[expect(clippy::integer_division, reason = "halving rounds down")]
        let half = elements.len() / 2;
        if half > 0 {
            out.push(Value::List(elements.iter().take(half).cloned().collect()));
        }
        if elements.len() > 1 {
            for skip in 0..elements.len() {
                out.push(Value::List(
                    elements
                        .iter()
                        .enumerate()
                        .filter(|(index, _)| *index != skip)
                        .map(|(_, element)| element.clone())
                        .collect(),
                ));
            }
        }
        for (index, element) in elements.iter().enumerate() {
            for smaller in self.value(items, element) {
                let mut next = elements.to_vec();
                if let Some(slot) = next.get_mut(index) {
                    *slot = smaller;
                }
                out.push(Value::List(next));
            }
        }
        out
    }
}

fn replaced(values: &[Option<Value>], index: usize, with: Option<Value>) -> Vec<Option<Value>> {
    let mut next = values.to_vec();
    if let Some(slot) = next.get_mut(index) {
        *slot = with;
    }
    next
}

fn replace_field(
    fields: &[(String, Option<Value>)],
    index: usize,
    with: Option<Value>,
) -> Vec<(String, Option<Value>)> {
    let mut next = fields.to_vec();
    if let Some((_, slot)) = next.get_mut(index) {
        *slot = with;
    }
    next
}

/// Shrink candidates for `request` using `registry`.
#[must_use]
pub fn shrink(request: &GeneratedRequest, registry: &Registry) -> Vec<GeneratedRequest> {
    Shrinker::new(registry).candidates(request)
}

#[cfg(test)]
mod tests;
