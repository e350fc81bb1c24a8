//! Trellis CLI
//!
//! Usage:
//!   trellis [OPTIONS] [FILE]
//!
//! Options:
//!   -c, --config <FILE>     Settings and `[[component]]` declarations (TOML format)
//!   -d, --deps <STRATEGY>   Dependency placement: document, simple, fragment, prepend, append, ignore, raw
//!   -x, --context <FILE>    Template context (JSON or TOML)
//!   -t, --tokens            Print the token stream instead of rendering
//!   --check                 Parse only; report syntax errors
//!   -h, --help              Print help

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use trellis::{
    parse_with, tokenize, ComponentManifest, DepsStrategy, Engine, Map, RenderError, Settings,
    TemplateSource, Value,
};

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Render component templates to HTML")]
struct Cli {
    /// Template file (reads from stdin if not provided)
    input: Option<PathBuf>,

    /// Settings and component declarations (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dependency placement strategy
    #[arg(short, long)]
    deps: Option<DepsStrategy>,

    /// Template context file (JSON or TOML)
    #[arg(short = 'x', long)]
    context: Option<PathBuf>,

    /// Print the token stream instead of rendering
    #[arg(short, long)]
    tokens: bool,

    /// Parse the template and report syntax errors without rendering
    #[arg(long)]
    check: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.input.is_none() && io::stdin().is_terminal() {
        print_intro();
        return;
    }

    let settings = match &cli.config {
        Some(path) => match Settings::from_file(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Settings::default(),
    };

    let source = match &cli.input {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error reading file '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            let mut buffer = String::new();
            match io::stdin().read_to_string(&mut buffer) {
                Ok(_) => buffer,
                Err(e) => {
                    eprintln!("Error reading from stdin: {}", e);
                    std::process::exit(1);
                }
            }
        }
    };
    let filename = cli
        .input
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<stdin>".to_string());

    if cli.tokens {
        match tokenize(&source, settings.multiline_tags) {
            Ok(tokens) => {
                for token in tokens {
                    println!("{:?} {:?}", token.span, token.node);
                }
            }
            Err(e) => {
                eprint!("{}", e.format(&source, &filename));
                std::process::exit(1);
            }
        }
        return;
    }

    if cli.check {
        match parse_with(&source, settings.parse_options()) {
            Ok(_) => println!("{}: ok", filename),
            Err(e) => {
                eprint!("{}", e.format(&source, &filename));
                std::process::exit(1);
            }
        }
        return;
    }

    let context = match &cli.context {
        Some(path) => match load_context(path) {
            Ok(map) => map,
            Err(e) => {
                eprintln!("Error loading context '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Map::new(),
    };

    let engine = Engine::new(settings);
    if let Some(path) = &cli.config {
        let manifest = ComponentManifest::from_file(path).map_err(RenderError::from);
        if let Err(e) = manifest.and_then(|m| engine.register_manifest(&m)) {
            eprintln!("Error registering components: {}", e);
            std::process::exit(1);
        }
    }

    let template = TemplateSource::inline(source);
    match engine.render_template(&template, context, cli.deps) {
        Ok(html) => {
            println!("{}", html);
        }
        Err(e) => {
            eprint!("{}", with_filename(e, &filename).report());
            std::process::exit(1);
        }
    }
}

/// Read a context map from a `.json` or `.toml` file
fn load_context(path: &Path) -> Result<Map, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let value = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => {
            Value::from(toml::from_str::<toml::Value>(&content).map_err(|e| e.to_string())?)
        }
        _ => Value::from(
            serde_json::from_str::<serde_json::Value>(&content).map_err(|e| e.to_string())?,
        ),
    };
    match value {
        Value::Map(map) => Ok(map),
        other => Err(format!("expected a table, got {}", other.type_name())),
    }
}

/// Name syntax errors in the top-level template after the input file
fn with_filename(error: RenderError, filename: &str) -> RenderError {
    match error {
        RenderError::Syntax { template, text, error } if template == "<inline>" => {
            RenderError::Syntax {
                template: filename.to_string(),
                text,
                error,
            }
        }
        other => other,
    }
}

fn print_intro() {
    println!(
        r#"Trellis - render component templates to HTML

USAGE:
    trellis [OPTIONS] [FILE]
    echo '<template>' | trellis

OPTIONS:
    -c, --config     Settings and [[component]] declarations (TOML file)
    -d, --deps       Dependency placement strategy (default: document)
    -x, --context    Template context (JSON or TOML file)
    -t, --tokens     Print the token stream
    --check          Parse only and report syntax errors
    -h, --help       Print help

QUICK START:
    echo '{{% lorem 2 w %}}' | trellis

Set RUST_LOG=trellis=debug to trace component renders."#
    );
}
