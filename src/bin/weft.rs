//! Command-line interface for weft
//! This binary renders template files through the streaming engine, or checks
//! that they compile without executing them.
//!
//! Usage:
//!   weft render `<path>` [--context `<json>`] [--out `<file>`]   - Render a template
//!   weft check `<path>`                                          - Compile only

use clap::{Arg, ArgAction, Command};
use std::rc::Rc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use weft::engine::{Engine, TemplateInput};
use weft::scope::Bindings;
use weft::settings::Loader;
use weft::sink::ChannelSink;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("weft")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A streaming template engine")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .help("Path to a settings file layered over the built-in defaults"),
        )
        .subcommand(
            Command::new("render")
                .about("Render a template to stdout or a file")
                .arg(
                    Arg::new("path")
                        .help("Path to the template file")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("context")
                        .long("context")
                        .help("JSON object whose fields are bound into the template scope"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .help("Write rendered output to a file instead of stdout"),
                )
                .arg(
                    Arg::new("production")
                        .long("production")
                        .help("Propagate failures instead of streaming diagnostics")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Compile a template without executing it")
                .arg(
                    Arg::new("path")
                        .help("Path to the template file")
                        .required(true)
                        .index(1),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("render", sub)) => {
            let engine = build_engine(
                matches.get_one::<String>("config"),
                sub.get_flag("production"),
            );
            let path = sub.get_one::<String>("path").expect("path is required");
            handle_render_command(
                &engine,
                path,
                sub.get_one::<String>("context"),
                sub.get_one::<String>("out"),
            )
            .await;
        }
        Some(("check", sub)) => {
            let engine = build_engine(matches.get_one::<String>("config"), false);
            let path = sub.get_one::<String>("path").expect("path is required");
            handle_check_command(&engine, path).await;
        }
        _ => unreachable!("arg_required_else_help guarantees a subcommand"),
    }
}

fn build_engine(config: Option<&String>, production: bool) -> Engine {
    let mut loader = Loader::new();
    if let Some(path) = config {
        loader = loader.with_file(path);
    }
    if production {
        loader = loader
            .set_override("engine.errors", "production")
            .unwrap_or_else(|e| {
                eprintln!("Settings error: {}", e);
                std::process::exit(1);
            });
    }
    let settings = loader.build().unwrap_or_else(|e| {
        eprintln!("Settings error: {}", e);
        std::process::exit(1);
    });
    Engine::new(settings.into()).unwrap_or_else(|e| {
        eprintln!("Settings error: {}", e);
        std::process::exit(1);
    })
}

/// Handle the render command
async fn handle_render_command(
    engine: &Engine,
    path: &str,
    context: Option<&String>,
    out: Option<&String>,
) {
    let bindings = context_bindings(context);

    let mut writer: Box<dyn AsyncWrite + Unpin + Send> = match out {
        Some(path) => {
            let file = tokio::fs::File::create(path).await.unwrap_or_else(|e| {
                eprintln!("Cannot create output file {}: {}", path, e);
                std::process::exit(1);
            });
            Box::new(file)
        }
        None => Box::new(tokio::io::stdout()),
    };

    let (sink, mut rx) = ChannelSink::new(64);
    let drain = tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if writer.write_all(chunk.as_bytes()).await.is_err() {
                break;
            }
        }
        let _ = writer.flush().await;
    });

    let result = engine
        .render(&TemplateInput::file(path), bindings, Rc::new(sink))
        .await;
    // Render dropped its sink handle; the drain task finishes once the
    // channel empties.
    let _ = drain.await;

    if let Err(e) = result {
        eprintln!("Render error: {}", e);
        std::process::exit(1);
    }
}

/// Handle the check command
async fn handle_check_command(engine: &Engine, path: &str) {
    match engine.compile(&TemplateInput::file(path)).await {
        Ok(artifact) => {
            println!("{}: ok ({} lines)", path, artifact.source_lines.len());
        }
        Err(e) => {
            eprintln!("Check error: {}", e);
            std::process::exit(1);
        }
    }
}

fn context_bindings(context: Option<&String>) -> Bindings {
    let Some(raw) = context else {
        return Bindings::new();
    };
    let value: serde_json::Value = serde_json::from_str(raw).unwrap_or_else(|e| {
        eprintln!("Invalid context JSON: {}", e);
        std::process::exit(1);
    });
    let serde_json::Value::Object(fields) = value else {
        eprintln!("Context must be a JSON object");
        std::process::exit(1);
    };
    let mut bindings = Bindings::new();
    for (name, value) in fields {
        bindings = bindings.value(name, value);
    }
    bindings
}
