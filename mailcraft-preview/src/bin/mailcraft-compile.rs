use mailcraft_blocks::{BlockTree, CompileError, EditorConfig};
use mailcraft_preview::{LocalRenderer, PreviewPipeline, SampleData};
use std::env;
use std::fs;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct Args {
    tree: String,
    sample: Option<String>,
    config: Option<String>,
    html: bool,
}

fn usage() -> ! {
    eprintln!("Usage: mailcraft-compile <tree.json> [--sample data.json] [--config mailcraft.yaml] [--html]");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  mailcraft-compile welcome.json");
    eprintln!("  mailcraft-compile welcome.json --sample user.json --html");
    process::exit(1);
}

fn parse_args() -> Args {
    let mut args = env::args().skip(1);
    let mut tree = None;
    let mut sample = None;
    let mut config = None;
    let mut html = false;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--sample" => sample = Some(args.next().unwrap_or_else(|| usage())),
            "--config" => config = Some(args.next().unwrap_or_else(|| usage())),
            "--html" => html = true,
            "-h" | "--help" => usage(),
            _ if tree.is_none() && !arg.starts_with("--") => tree = Some(arg),
            _ => {
                eprintln!("Unexpected argument '{}'", arg);
                usage();
            }
        }
    }
    Args {
        tree: tree.unwrap_or_else(|| usage()),
        sample,
        config,
        html,
    }
}

fn read(path: &str) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    match run(&args).await {
        Ok(fatal) => process::exit(i32::from(fatal)),
        Err(message) => {
            eprintln!("✗ {}", message);
            process::exit(1);
        }
    }
}

/// Returns whether the output had fatal errors.
async fn run(args: &Args) -> Result<bool, String> {
    let config = match &args.config {
        Some(path) => EditorConfig::from_file(path).map_err(|e| e.to_string())?,
        None => EditorConfig::default(),
    };
    let registry = config.registry().map_err(|e| e.to_string())?;
    let tree = BlockTree::from_json(&read(&args.tree)?).map_err(|e| format!("{}: {}", args.tree, e))?;
    let sample = match &args.sample {
        Some(path) => SampleData::from_text(&read(path)?),
        None => SampleData::default(),
    };
    if let SampleData::Invalid(reason) = &sample {
        eprintln!("! sample data ignored: {}", reason);
    }

    let pipeline = PreviewPipeline::new(Arc::new(registry), LocalRenderer::new())
        .with_link_params(config.link_params.clone());
    let response = pipeline.compile(&tree, &sample).await;

    match (&response.html, args.html) {
        (Some(html), true) => println!("{}", html),
        _ => println!("{}", response.mjml_source),
    }
    for error in &response.errors {
        print_error(error);
    }
    Ok(response.has_fatal())
}

fn print_error(error: &CompileError) {
    let marker = if error.fatal { "✗" } else { "!" };
    match &error.block_id {
        Some(id) => eprintln!("{} [{}] {}", marker, id.as_str(), error),
        None => eprintln!("{} {}", marker, error),
    }
}
