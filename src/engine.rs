//! Template engine
//!
//! Ties the pipeline together: load, lex, generate, evaluate, cache,
//! execute. One engine owns one evaluator state and one artifact cache; it
//! is single-threaded by construction (the evaluator is not `Send`) and
//! relies on cooperative scheduling for concurrency, so many renders can be
//! in flight on one engine at once.
//!
//! Compilation
//!
//!     `compile` resolves the input to a cache key and asks the cache for
//!     the artifact, compiling on a miss. The generated chunk is evaluated
//!     exactly once; the resulting template function is parked in the
//!     evaluator registry and re-fetched for every execution. Each execution
//!     binds a fresh scope table as the function's environment, which is
//!     what keeps concurrent executions of one artifact independent.
//!
//! Error policy
//!
//!     In `Development` mode a failure that carries a diagnostic is rendered
//!     into the output stream itself, escaped inside a `<pre>` block, and
//!     the render reports completion; load failures and evaluator faults
//!     still propagate. In `Production` mode every failure propagates to the
//!     caller and nothing about it reaches the stream.

use crate::artifact::CompiledArtifact;
use crate::cache::{ArtifactCache, CachePolicy};
use crate::codegen;
use crate::diagnostics::{self, Diagnostic};
use crate::error::TemplateError;
use crate::lexer::{self, DelimiterError, Delimiters};
use crate::scope::{Bindings, ScopeContext};
use crate::sink::{MemorySink, OutputSink, SinkError};
use crate::source::TemplateSource;
use mlua::{Function, Lua, LuaSerdeExt, MultiValue, Table, Value as LuaValue};
use serde::Deserialize;
use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::rc::Rc;

/// How failures are reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorMode {
    /// Stream the diagnostic into the output, escaped in a `<pre>` block.
    Development,
    /// Propagate the failure to the caller; the stream stays clean.
    Production,
}

/// Engine construction options.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub delimiters: Delimiters,
    pub cache: CachePolicy,
    pub errors: ErrorMode,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            delimiters: Delimiters::default(),
            cache: CachePolicy::Disabled,
            errors: ErrorMode::Development,
        }
    }
}

/// A template to compile: a file on disk or an in-memory string.
#[derive(Debug, Clone)]
pub enum TemplateInput {
    File(PathBuf),
    Inline { name: String, text: String },
}

impl TemplateInput {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        TemplateInput::File(path.into())
    }

    pub fn inline(name: impl Into<String>, text: impl Into<String>) -> Self {
        TemplateInput::Inline {
            name: name.into(),
            text: text.into(),
        }
    }

    /// The key this input caches under. Files key by path; inline templates
    /// key by a fingerprint of their text, so equal text shares an artifact.
    pub fn cache_key(&self) -> String {
        match self {
            TemplateInput::File(path) => path.display().to_string(),
            TemplateInput::Inline { text, .. } => {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                format!("inline:{:016x}", hasher.finish())
            }
        }
    }
}

/// How a render ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// The template ran to completion.
    Completed,
    /// The sink closed before the template finished; output already written
    /// was delivered, the rest was abandoned.
    SinkClosed,
}

#[derive(Debug)]
pub struct Engine {
    lua: Lua,
    cache: ArtifactCache,
    options: EngineOptions,
}

impl Engine {
    /// Build an engine. Rejects delimiter configurations the lexer cannot
    /// scan with (empty open or close sequences).
    pub fn new(options: EngineOptions) -> Result<Self, DelimiterError> {
        options.delimiters.validate()?;
        let cache = ArtifactCache::new(options.cache);
        Ok(Engine {
            lua: Lua::new(),
            cache,
            options,
        })
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Drop the cached artifact for one input.
    pub fn invalidate(&self, input: &TemplateInput) {
        self.cache.remove(&input.cache_key());
    }

    pub fn clear_cache(&self) {
        self.cache.reset();
    }

    /// Compile an input to an artifact, reusing the cache when enabled.
    pub async fn compile(
        &self,
        input: &TemplateInput,
    ) -> Result<Rc<CompiledArtifact>, TemplateError> {
        let key = input.cache_key();
        self.cache
            .get_or_compile(&key, || self.compile_uncached(input, &key))
            .await
    }

    async fn compile_uncached(
        &self,
        input: &TemplateInput,
        key: &str,
    ) -> Result<Rc<CompiledArtifact>, TemplateError> {
        let source = match input {
            TemplateInput::File(path) => TemplateSource::from_file(path).await?,
            TemplateInput::Inline { name, text } => {
                TemplateSource::from_text(name.clone(), text.clone())
            }
        };
        tracing::debug!(key, template = %source.filename, "compiling template");
        let spans = lexer::tokenize(&source.text, &self.options.delimiters).map_err(|err| {
            TemplateError::Lex(Diagnostic::new(
                err.to_string(),
                err.line,
                &source.lines,
                source.filename.as_str(),
            ))
        })?;
        let generated = codegen::generate(&spans, &source, &self.options.delimiters);
        let artifact = self.instantiate(&source, generated, key)?;
        Ok(Rc::new(artifact))
    }

    /// Evaluate the generated chunk once and park the template function in
    /// the evaluator registry.
    fn instantiate(
        &self,
        source: &TemplateSource,
        generated: String,
        key: &str,
    ) -> Result<CompiledArtifact, TemplateError> {
        let chunk = self
            .lua
            .load(generated.as_str())
            .set_name(source.filename.as_str());
        let function = chunk.eval::<Function>().map_err(|err| match err {
            mlua::Error::SyntaxError { message, .. } => {
                let line = diagnostics::evaluator_line(&message).unwrap_or(0);
                TemplateError::Validation(Diagnostic::new(
                    diagnostics::strip_location(&message),
                    line,
                    &source.lines,
                    source.filename.as_str(),
                ))
            }
            other => TemplateError::Internal(other),
        })?;
        let callable = self
            .lua
            .create_registry_value(function)
            .map_err(TemplateError::Internal)?;
        Ok(CompiledArtifact {
            key: key.to_string(),
            filename: source.filename.clone(),
            generated_source: generated,
            source_lines: source.lines.clone(),
            callable,
        })
    }

    /// Run a compiled artifact against a bindings set and a sink.
    pub async fn execute(
        &self,
        artifact: &CompiledArtifact,
        bindings: Bindings,
        sink: Rc<dyn OutputSink>,
    ) -> Result<RenderStatus, TemplateError> {
        let (context, on_close) = bindings.into_parts();
        let scope = self
            .build_scope(&context, sink)
            .map_err(TemplateError::Internal)?;
        let function: Function = self
            .lua
            .registry_value(&artifact.callable)
            .map_err(TemplateError::Internal)?;
        tracing::debug!(template = %artifact.filename, "executing template");
        match function.call_async::<()>(scope.clone()).await {
            Ok(()) => Ok(RenderStatus::Completed),
            Err(err) => {
                if diagnostics::find_sink_error(&err).is_some() {
                    tracing::debug!(
                        template = %artifact.filename,
                        "sink closed before template finished"
                    );
                    if let Some(hook) = on_close {
                        hook();
                    }
                    return Ok(RenderStatus::SinkClosed);
                }
                let marker_line = scope.get::<u32>("__line").unwrap_or(0);
                let line = diagnostics::evaluator_line(&err.to_string()).unwrap_or(marker_line);
                let message = diagnostics::root_message(&err);
                Err(TemplateError::Runtime(Diagnostic::new(
                    message,
                    line,
                    &artifact.source_lines,
                    artifact.filename.as_str(),
                )))
            }
        }
    }

    /// Compile and execute in one step, applying the engine's error policy.
    pub async fn render(
        &self,
        input: &TemplateInput,
        bindings: Bindings,
        sink: Rc<dyn OutputSink>,
    ) -> Result<RenderStatus, TemplateError> {
        let artifact = match self.compile(input).await {
            Ok(artifact) => artifact,
            Err(err) => return self.report(err, sink).await,
        };
        match self.execute(&artifact, bindings, Rc::clone(&sink)).await {
            Ok(status) => Ok(status),
            Err(err) => self.report(err, sink).await,
        }
    }

    /// Render into an in-memory buffer.
    pub async fn render_to_string(
        &self,
        input: &TemplateInput,
        bindings: Bindings,
    ) -> Result<String, TemplateError> {
        let sink = Rc::new(MemorySink::new());
        self.render(input, bindings, Rc::clone(&sink) as Rc<dyn OutputSink>)
            .await?;
        Ok(sink.contents())
    }

    async fn report(
        &self,
        err: TemplateError,
        sink: Rc<dyn OutputSink>,
    ) -> Result<RenderStatus, TemplateError> {
        if self.options.errors == ErrorMode::Development {
            if let Some(diag) = err.diagnostic() {
                tracing::error!(%diag, "template failed");
                let body = diag.to_string().replace('<', "&lt;");
                let _ = sink.write(format!("<pre>{}</pre>", body)).await;
                return Ok(RenderStatus::Completed);
            }
        }
        Err(err)
    }

    /// Assemble the scope table one execution runs under: bound values,
    /// async-wrapped bound callables, the `print` primitive, the `__line`
    /// marker slot, and a metatable falling through to the evaluator
    /// globals.
    fn build_scope(
        &self,
        context: &Rc<ScopeContext>,
        sink: Rc<dyn OutputSink>,
    ) -> mlua::Result<Table> {
        let scope = self.lua.create_table()?;
        for (name, value) in context.values() {
            scope.set(name, self.lua.to_value(value)?)?;
        }
        for (name, func) in context.functions() {
            let func = Rc::clone(func);
            let ctx = Rc::clone(context);
            let bound = self
                .lua
                .create_async_function(move |lua, args: MultiValue| {
                    let func = Rc::clone(&func);
                    let ctx = Rc::clone(&ctx);
                    async move {
                        let mut call_args = Vec::with_capacity(args.len());
                        for arg in args {
                            call_args.push(lua.from_value::<serde_json::Value>(arg)?);
                        }
                        let result = func(ctx, call_args)
                            .await
                            .map_err(mlua::Error::external)?;
                        lua.to_value(&result)
                    }
                })?;
            scope.set(name, bound)?;
        }

        // Once the sink has reported closure, every later write fails fast
        // without touching it again.
        let closed = Rc::new(Cell::new(false));
        let print = self.lua.create_async_function(move |_lua, value: LuaValue| {
            let sink = Rc::clone(&sink);
            let closed = Rc::clone(&closed);
            async move {
                if closed.get() {
                    return Err(mlua::Error::external(SinkError::Closed));
                }
                let chunk = stringify(&value)?;
                if chunk.is_empty() {
                    return Ok(());
                }
                if let Err(err) = sink.write(chunk).await {
                    closed.set(true);
                    return Err(mlua::Error::external(err));
                }
                Ok(())
            }
        })?;
        scope.set("print", print)?;
        scope.set("__line", 0u32)?;

        let meta = self.lua.create_table()?;
        meta.set("__index", self.lua.globals())?;
        scope.set_metatable(Some(meta));
        Ok(scope)
    }
}

impl Default for Engine {
    fn default() -> Self {
        // The built-in options always pass validation.
        let options = EngineOptions::default();
        Engine {
            lua: Lua::new(),
            cache: ArtifactCache::new(options.cache),
            options,
        }
    }
}

/// Turn a printed value into output text. Nil prints nothing; scalars print
/// their usual textual form; anything else is a template error.
fn stringify(value: &LuaValue) -> mlua::Result<String> {
    match value {
        LuaValue::Nil => Ok(String::new()),
        LuaValue::Boolean(b) => Ok(b.to_string()),
        LuaValue::Integer(n) => Ok(n.to_string()),
        LuaValue::Number(n) => Ok(n.to_string()),
        LuaValue::String(s) => Ok(s.to_str()?.to_owned()),
        other => Err(mlua::Error::RuntimeError(format!(
            "cannot print a {} value",
            other.type_name()
        ))),
    }
}
