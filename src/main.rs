//! sheaf CLI
//!
//! Usage:
//!   sheaf [OPTIONS] [TEMPLATE]
//!
//! Options:
//!   -r, --root <DIR>        Directory template names are resolved against
//!   -c, --context <FILE>    JSON file with the render context
//!       --config <FILE>     Renderer configuration (TOML format)
//!       --no-cache          Disable the resolved-template cache
//!       --label <NAME>      Name for a template read from stdin
//!       --print-ast         Print the resolved AST instead of rendering
//!   -h, --help              Print help

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sheaf::{data, RenderError, Renderer, RendererConfig, Storage, TemplateData, INLINE_LABEL};

#[derive(Parser)]
#[command(name = "sheaf")]
#[command(about = "Render sheaf templates with #extend / #export / #import composition")]
struct Cli {
    /// Template name relative to the root (reads template source from stdin if not provided)
    template: Option<String>,

    /// Directory template names are resolved against
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// JSON file with the render context
    #[arg(short, long)]
    context: Option<PathBuf>,

    /// Renderer configuration file (TOML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disable the resolved-template cache
    #[arg(long)]
    no_cache: bool,

    /// Name for a template read from stdin, used in diagnostics
    #[arg(long)]
    label: Option<String>,

    /// Print the resolved AST instead of rendering
    #[arg(long)]
    print_ast: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("SHEAF_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.template.is_none() && io::stdin().is_terminal() {
        print_intro();
        return ExitCode::SUCCESS;
    }

    // Load renderer configuration
    let mut config = match &cli.config {
        Some(path) => match RendererConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => RendererConfig::default(),
    };
    if let Some(root) = &cli.root {
        config = config.with_root(root);
    }
    if cli.no_cache {
        config = config.with_cache(false);
    }

    // Load context
    let context = match &cli.context {
        Some(path) => match load_context(path) {
            Ok(context) => context,
            Err(e) => {
                eprintln!("Error loading context '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => TemplateData::Dictionary(Default::default()),
    };

    let renderer = Renderer::new(config);
    let storage = Storage::new();

    let (result, inline) = match &cli.template {
        Some(name) => {
            let result = if cli.print_ast {
                renderer.resolve_path(name).await.map(|ast| format!("{:#?}", ast))
            } else {
                renderer.render(name, &context, &storage).await
            };
            (result, None)
        }
        None => {
            let mut source = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut source) {
                eprintln!("Error reading from stdin: {}", e);
                return ExitCode::FAILURE;
            }
            let label = cli.label.as_deref();
            let result = if cli.print_ast {
                renderer
                    .resolve_inline(source.as_bytes(), label)
                    .await
                    .map(|ast| format!("{:#?}", ast))
            } else {
                renderer
                    .render_inline(source.as_bytes(), &context, label, &storage)
                    .await
            };
            let label = label.unwrap_or(INLINE_LABEL).to_string();
            (result, Some((label, source)))
        }
    };

    match result {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", report(&e, inline.as_ref()));
            ExitCode::FAILURE
        }
    }
}

fn load_context(path: &Path) -> Result<TemplateData, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    Ok(data::encode(&value)?)
}

/// Annotated report when the offending source is at hand, plain reason otherwise
fn report(err: &RenderError, inline: Option<&(String, String)>) -> String {
    let Some(span) = err.span() else {
        return format!("Error [{}]: {}", err.identifier(), err.reason());
    };
    let source = match inline {
        Some((label, source)) if **label == *span.file => Some(source.clone()),
        _ => fs::read_to_string(&*span.file).ok(),
    };
    match source {
        Some(source) => err.report(&source),
        None => format!("Error [{}] {}: {}", err.identifier(), span, err.reason()),
    }
}

fn print_intro() {
    println!(
        r#"sheaf - template rendering with static extend/import composition

USAGE:
    sheaf [OPTIONS] [TEMPLATE]
    echo '<template>' | sheaf -c context.json

OPTIONS:
    -r, --root <DIR>       Directory template names are resolved against
    -c, --context <FILE>   JSON render context
    --config <FILE>        Renderer configuration (TOML)
    --no-cache             Disable the resolved-template cache
    --label <NAME>         Name for stdin templates in diagnostics
    --print-ast            Print the resolved AST instead of rendering
    -h, --help             Print help

Set SHEAF_LOG=debug to trace cache and extend activity."#
    );
}
