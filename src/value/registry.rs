//! Generator/shrinker pairs keyed by [`ValueType`].

use std::{collections::BTreeMap, fmt, sync::Arc};

use rand::{Rng, rngs::StdRng};

use super::{Value, ValueType};

/// Produces and shrinks values of one semantic type.
///
/// Generation must only draw randomness from `rng` so that a fixed seed
/// reproduces the same values. Every shrink candidate must be strictly
/// smaller than its input under [`Value::size`].
pub trait ValueGenerator: Send + Sync {
    /// Draw a value whose magnitude or length is bounded by `size`.
    fn generate(&self, rng: &mut StdRng, size: u32) -> Value;

    /// Simpler variants of `value`, most aggressive first.
    fn shrink(&self, value: &Value) -> Vec<Value>;
}

/// Uniform integers in `-size..=size`, shrinking toward zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerGenerator;

impl ValueGenerator for IntegerGenerator {
    fn generate(&self, rng: &mut StdRng, size: u32) -> Value {
        let bound = i64::from(size);
        Value::Integer(rng.gen_range(-bound..=bound))
    }

    fn shrink(&self, value: &Value) -> Vec<Value> {
        value
            .as_integer()
            .map(|n| shrink_integer(n).into_iter().map(Value::Integer).collect())
            .unwrap_or_default()
    }
}

/// Candidates for `n`: zero, half of `n`, then one step toward zero.
#[must_use]
pub fn shrink_integer(n: i64) -> Vec<i64> {
    if n == 0 {
        return Vec::new();
    }
    let mut out = vec![0];
    #[expect(clippy::integer_division, reason = "halving rounds toward zero")]
    let half = n / 2;
    if half != 0 {
        out.push(half);
    }
    let step = n - n.signum();
    if step != 0 && step != half {
        out.push(step);
    }
    out
}

/// Printable ASCII text of length `0..=size`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextGenerator;

impl ValueGenerator for TextGenerator {
    fn generate(&self, rng: &mut StdRng, size: u32) -> Value {
        let len = rng.gen_range(0..=size);
        Value::Text((0..len).map(|_| rng.gen_range(' '..='~')).collect())
    }

    fn shrink(&self, value: &Value) -> Vec<Value> {
        value
            .as_text()
            .map(|text| shrink_text(text).into_iter().map(Value::Text).collect())
            .unwrap_or_default()
    }
}

/// Candidates for `text` in a fixed order: empty, first half, without the
/// last character, first non-`a` character replaced by `a`, then without
/// each remaining character from the front.
#[must_use]
pub fn shrink_text(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }
    let mut out: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if candidate != text && !out.contains(&candidate) {
            out.push(candidate);
        }
    };
    push(String::new());
    #[expect(clippy::integer_division, reason = "halving rounds down")]
    let half = len / 2;
    push(chars.iter().take(half).collect());
    push(chars.iter().take(len - 1).collect());
    if let Some(pos) = chars.iter().position(|c| *c != 'a') {
        push(
            chars
                .iter()
                .enumerate()
                .map(|(idx, c)| if idx == pos { 'a' } else { *c })
                .collect(),
        );
    }
    for skip in 0..len - 1 {
        push(
            chars
                .iter()
                .enumerate()
                .filter(|(idx, _)| *idx != skip)
                .map(|(_, c)| *c)
                .collect(),
        );
    }
    out
}

/// Fair coin flips, shrinking `true` to `false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanGenerator;

impl ValueGenerator for BooleanGenerator {
    fn generate(&self, rng: &mut StdRng, _size: u32) -> Value { Value::Boolean(rng.gen_bool(0.5)) }

    fn shrink(&self, value: &Value) -> Vec<Value> {
        match value {
            Value::Boolean(true) => vec![Value::Boolean(false)],
            _ => Vec::new(),
        }
    }
}

struct FnGenerator<G, S> {
    generate: G,
    shrink: S,
}

impl<G, S> ValueGenerator for FnGenerator<G, S>
where
    G: Fn(&mut StdRng, u32) -> Value + Send + Sync,
    S: Fn(&Value) -> Vec<Value> + Send + Sync,
{
    fn generate(&self, rng: &mut StdRng, size: u32) -> Value { (self.generate)(rng, size) }

    fn shrink(&self, value: &Value) -> Vec<Value> { (self.shrink)(value) }
}

/// Build a generator from a pair of closures.
pub fn generator_fn<G, S>(generate: G, shrink: S) -> impl ValueGenerator
where
    G: Fn(&mut StdRng, u32) -> Value + Send + Sync,
    S: Fn(&Value) -> Vec<Value> + Send + Sync,
{
    FnGenerator { generate, shrink }
}

/// Mapping from type tags to generator/shrinker pairs.
#[derive(Clone)]
pub struct Registry {
    generators: BTreeMap<ValueType, Arc<dyn ValueGenerator>>,
}

impl Registry {
    /// A registry with no generators at all.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            generators: BTreeMap::new(),
        }
    }

    /// A registry holding the integer, text and boolean generators.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry
            .register(ValueType::Integer, IntegerGenerator)
            .register(ValueType::Text, TextGenerator)
            .register(ValueType::Boolean, BooleanGenerator);
        registry
    }

    /// Register (or replace) the generator for `ty`.
    pub fn register(
        &mut self,
        ty: ValueType,
        generator: impl ValueGenerator + 'static,
    ) -> &mut Self {
        self.generators.insert(ty, Arc::new(generator));
        self
    }

    /// The generator registered for `ty`.
    #[must_use]
    pub fn get(&self, ty: &ValueType) -> Option<&dyn ValueGenerator> {
        self.generators.get(ty).map(|generator| &**generator)
    }

    /// Whether a generator is registered for `ty`.
    #[must_use]
    pub fn contains(&self, ty: &ValueType) -> bool { self.generators.contains_key(ty) }
}

impl Default for Registry {
    fn default() -> Self { Self::with_builtins() }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.generators.keys()).finish()
    }
}
