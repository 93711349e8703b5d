use clap::{ArgGroup, Parser, Subcommand};
use cli::PanelKitConfig;
use color_eyre::eyre::{Result, eyre};
use compositing::{BackgroundLayer, OutputFormat};
use layering::{Pipeline, PipelineError, SourceOrigin};
use std::path::{Path, PathBuf};
use storyboard::{ReferenceImage, StoryboardRequest, WebhookClient};
use tracing::{error, info};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a comic page into panels and write a layered file
    #[command(group(ArgGroup::new("source").required(true).args(["input", "url", "base64_file"])))]
    Process {
        /// Page image on disk
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Page image to download
        #[arg(long)]
        url: Option<String>,
        /// File holding a base64 (or data URI) encoded page image
        #[arg(long)]
        base64_file: Option<PathBuf>,
        /// Layered output file; extension defaults to the configured format
        #[arg(short, long)]
        output: PathBuf,
        /// Path to a .toml or .json configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override how the background layer is flattened
        #[arg(long)]
        background: Option<BackgroundLayer>,
        /// Override the layered container format
        #[arg(long)]
        format: Option<OutputFormat>,
    },
    /// Generate a page through the storyboard webhook, then layer it
    Storyboard {
        /// Story prompt
        prompt: String,
        /// Number of panels to request
        #[arg(long, default_value = "4")]
        panels: String,
        /// Art style tag
        #[arg(long, default_value = "comic")]
        style: String,
        /// Reference image (repeatable)
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// Layered output file
        #[arg(short, long)]
        output: PathBuf,
        /// Path to a .toml or .json configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the JSON Schema of the configuration file
    Schema,
    /// Write a configuration file with every default filled in
    InitConfig {
        /// Destination (.toml or .json)
        #[arg(default_value = "panel_kit.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input,
            url,
            base64_file,
            output,
            config,
            background,
            format,
        } => {
            let mut config = PanelKitConfig::load(config.as_deref())?;
            if let Some(background) = background {
                config.pipeline.background = background;
            }
            if let Some(format) = format {
                config.pipeline.output_format = format;
            }
            let origin = read_origin(input, url, base64_file).await?;
            process(&config, origin, &output).await?;
        }
        Commands::Storyboard {
            prompt,
            panels,
            style,
            images,
            output,
            config,
        } => {
            let config = PanelKitConfig::load(config.as_deref())?;
            storyboard(&config, prompt, panels, style, &images, &output).await?;
        }
        Commands::Schema => {
            println!("{}", PanelKitConfig::schema()?);
        }
        Commands::InitConfig { path, force } => {
            if path.exists() && !force {
                return Err(eyre!("{} already exists, pass --force to overwrite", path.display()));
            }
            PanelKitConfig::default().to_file(&path)?;
            info!("Configuration written to {}", path.display());
        }
    }

    Ok(())
}

async fn read_origin(input: Option<PathBuf>, url: Option<String>, base64_file: Option<PathBuf>) -> Result<SourceOrigin> {
    if let Some(path) = input {
        let bytes = tokio::fs::read(&path).await?;
        let filename = path.file_name().map(|name| name.to_string_lossy().into_owned());
        return Ok(SourceOrigin::Upload { bytes, filename });
    }
    if let Some(url) = url {
        return Ok(SourceOrigin::Url(url));
    }
    if let Some(path) = base64_file {
        return Ok(SourceOrigin::InlineBase64(tokio::fs::read_to_string(&path).await?));
    }
    Err(eyre!("One of --input, --url or --base64-file is required"))
}

fn build_pipeline(config: &PanelKitConfig) -> Result<Pipeline> {
    let pipeline = Pipeline::builder()
        .kumiko(config.segmentation.clone())
        .magick(config.compositing.clone())
        .settings(config.pipeline.clone())
        .build()?;
    info!("{}", pipeline.info());
    Ok(pipeline)
}

/// Give `output` the configured extension when it has none
fn output_path(config: &PanelKitConfig, output: &Path) -> PathBuf {
    match output.extension() {
        Some(_) => output.to_path_buf(),
        None => output.with_extension(config.pipeline.output_format.extension()),
    }
}

async fn process(config: &PanelKitConfig, origin: SourceOrigin, output: &Path) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let output = output_path(config, output);

    match pipeline.run(origin, &output).await {
        Ok(delivery) => {
            info!(
                "✅ {} panels layered into {} ({} layers) in {}ms",
                delivery.panel_count,
                delivery.artifact.display(),
                delivery.layer_count,
                delivery.elapsed().num_milliseconds()
            );
            println!("{}", serde_json::to_string_pretty(&delivery)?);
            Ok(())
        }
        Err(err) => Err(report_failure(err)),
    }
}

fn report_failure(err: PipelineError) -> color_eyre::Report {
    error!("Pipeline failed during {}: {}", err.stage(), err);
    match serde_json::to_string_pretty(&err.report()) {
        Ok(report) => println!("{}", report),
        Err(e) => error!("Failed to serialise error report: {}", e),
    }
    err.into()
}

async fn storyboard(
    config: &PanelKitConfig,
    prompt: String,
    panels: String,
    style: String,
    images: &[PathBuf],
    output: &Path,
) -> Result<()> {
    let client = WebhookClient::new(&config.webhook)?;

    let mut references = Vec::with_capacity(images.len());
    for path in images {
        references.push(ReferenceImage::from_path(path).await?);
    }

    let request = StoryboardRequest {
        prompt,
        panels,
        style,
        images: references,
    };
    info!("Posting storyboard request to {}", client.url());
    let image = client.post(request).await?;
    info!("Webhook returned {:?}", image);

    process(config, image.into_source_origin(), output).await
}
