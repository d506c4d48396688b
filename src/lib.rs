//! # weft
//!
//! A server-side streaming template engine. Templates are ordinary markup
//! with embedded code between configurable delimiters; they compile to a
//! single evaluator chunk that is line-aligned with the template source, so
//! every failure can be reported against the original file. Output is
//! written incrementally through an async sink, which gives slow consumers
//! backpressure and lets a closed connection terminate a render early.
//!
//! The typical flow is [`engine::Engine::render`]: load, lex, generate,
//! compile (through the artifact cache), then execute against a
//! [`scope::Bindings`] set and an [`sink::OutputSink`].

pub mod artifact;
pub mod cache;
pub mod codegen;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod lexer;
pub mod scope;
pub mod settings;
pub mod sink;
pub mod source;

pub use artifact::CompiledArtifact;
pub use cache::{ArtifactCache, CachePolicy};
pub use diagnostics::Diagnostic;
pub use engine::{Engine, EngineOptions, ErrorMode, RenderStatus, TemplateInput};
pub use error::TemplateError;
pub use lexer::{DelimiterError, Delimiters};
pub use scope::{Bindings, BindingError, ScopeContext};
pub use sink::{ChannelSink, MemorySink, OutputSink, SinkError};
pub use source::{LoadError, TemplateSource};
