//! Host bindings
//!
//! Values and callables the host exposes to templates. A [`Bindings`] set is
//! assembled once per execution and turned into the scope table the template
//! function runs under. Bound functions receive an explicit
//! [`ScopeContext`] handle as their first argument rather than an implicit
//! receiver, so a callable can read sibling values and call sibling
//! functions without the engine threading any hidden state.
//!
//! Values cross the boundary as `serde_json::Value`. The engine converts
//! them to evaluator values on scope construction and converts call
//! arguments and results back on each invocation.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

/// Error raised inside a host-bound callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingError(pub String);

impl BindingError {
    pub fn new(message: impl Into<String>) -> Self {
        BindingError(message.into())
    }
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BindingError {}

pub type BoundFuture =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, BindingError>>>>;

/// A host callable exposed to templates.
pub type BoundFn = Rc<dyn Fn(Rc<ScopeContext>, Vec<serde_json::Value>) -> BoundFuture>;

/// The read side of a bindings set, handed to every bound callable.
pub struct ScopeContext {
    values: HashMap<String, serde_json::Value>,
    functions: HashMap<String, BoundFn>,
}

impl ScopeContext {
    /// Look up a bound value by name.
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.values.get(name)
    }

    /// Call a sibling bound function.
    pub async fn invoke(
        self: &Rc<Self>,
        name: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, BindingError> {
        let func = self
            .functions
            .get(name)
            .ok_or_else(|| BindingError::new(format!("no bound function named '{}'", name)))?;
        func(Rc::clone(self), args).await
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn functions(&self) -> impl Iterator<Item = (&str, &BoundFn)> {
        self.functions.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Builder for the values, callables, and lifecycle hooks of one execution.
#[derive(Default)]
pub struct Bindings {
    values: HashMap<String, serde_json::Value>,
    functions: HashMap<String, BoundFn>,
    on_close: Option<Rc<dyn Fn()>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose a data value under `name`.
    pub fn value(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Expose an async callable under `name`. Templates call it like any
    /// other function; the engine awaits it transparently.
    pub fn function<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Rc<ScopeContext>, Vec<serde_json::Value>) -> BoundFuture + 'static,
    {
        self.functions.insert(name.into(), Rc::new(func));
        self
    }

    /// Register a hook fired at most once if the output sink closes before
    /// the template finishes.
    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: Fn() + 'static,
    {
        self.on_close = Some(Rc::new(hook));
        self
    }

    pub(crate) fn into_parts(self) -> (Rc<ScopeContext>, Option<Rc<dyn Fn()>>) {
        (
            Rc::new(ScopeContext {
                values: self.values,
                functions: self.functions,
            }),
            self.on_close,
        )
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn bound_function_reads_sibling_values() {
        let bindings = Bindings::new()
            .value("greeting", "hello")
            .function("greet", |ctx, args| {
                Box::pin(async move {
                    let greeting = ctx
                        .get("greeting")
                        .and_then(|v| v.as_str())
                        .unwrap_or("?");
                    let name = args
                        .first()
                        .and_then(|v| v.as_str())
                        .unwrap_or("stranger");
                    Ok(json!(format!("{greeting} {name}")))
                })
            });
        let (ctx, hook) = bindings.into_parts();
        assert!(hook.is_none());
        let out = ctx.invoke("greet", vec![json!("ada")]).await.unwrap();
        assert_eq!(out, json!("hello ada"));
    }

    #[tokio::test]
    async fn bound_function_calls_siblings() {
        let bindings = Bindings::new()
            .function("inner", |_ctx, _args| Box::pin(async { Ok(json!(21)) }))
            .function("outer", |ctx, _args| {
                Box::pin(async move {
                    let inner = ctx.invoke("inner", Vec::new()).await?;
                    Ok(json!(inner.as_i64().unwrap_or(0) * 2))
                })
            });
        let (ctx, _) = bindings.into_parts();
        let out = ctx.invoke("outer", Vec::new()).await.unwrap();
        assert_eq!(out, json!(42));
    }

    #[tokio::test]
    async fn unknown_function_is_an_error() {
        let (ctx, _) = Bindings::new().into_parts();
        let err = ctx.invoke("missing", Vec::new()).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
