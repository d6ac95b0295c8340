//! `landing-pipeline` command-line driver

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use landing_pipeline::copy::CopySettings;
use landing_pipeline::pipeline::MergedProductDetail;
use landing_pipeline::{
    ChromeSessionProvider, Config, CopyGenerator, MemoryLandingPageStore, ModelError,
    OpenAiClient, ProductPipeline, ScrapeOrchestrator, load_yaml_config, unique_slug,
};

#[derive(Parser)]
#[command(
    name = "landing-pipeline",
    about = "Scrape a product page and turn it into landing-page copy",
    version
)]
struct Cli {
    /// YAML config file (defaults to config.yaml in the package root)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract title, price, images and reviews from a product page
    Scrape { url: String },

    /// Scrape, generate copy and assign a slug
    Generate { url: String },

    /// Print a landing-page record built from defaults
    Default,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_yaml_config(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Commands::Scrape { url } => {
            landing_pipeline::pipeline::validate_product_url(&url)?;
            let scraper = scraper(&config);
            let facts = scraper.scrape(&url).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(facts.as_ref())?);
            } else {
                println!("title: {}", facts.title);
                println!("price: {}", facts.price);
                println!("image_urls: {}", facts.image_urls.join(" "));
                for review in &facts.review_snippets {
                    println!("review: {review}");
                }
                if let Some(error) = &facts.error {
                    println!("error: {error}");
                }
            }
        }
        Commands::Generate { url } => {
            let client = OpenAiClient::from_config(&config.model)?;
            let pipeline = pipeline(&config, Arc::new(client));
            let detail = pipeline.process(&url).await?;
            print_detail(&detail, cli.json)?;
        }
        Commands::Default => {
            let detail = match OpenAiClient::from_config(&config.model) {
                Ok(client) => pipeline(&config, Arc::new(client)).default_detail().await?,
                Err(ModelError::MissingApiKey(var)) => {
                    warn!("{} is not set; using fixed defaults", var);
                    let store = MemoryLandingPageStore::new();
                    let mut detail = MergedProductDetail::with_defaults(None);
                    detail.slug = unique_slug(&store, &detail.copy.headline).await?;
                    detail
                }
                Err(e) => return Err(e.into()),
            };
            print_detail(&detail, cli.json)?;
        }
    }

    Ok(())
}

fn scraper(config: &Config) -> ScrapeOrchestrator {
    let provider = Arc::new(ChromeSessionProvider::new(config.browser.clone()));
    ScrapeOrchestrator::from_config(provider, config)
}

fn pipeline(config: &Config, client: Arc<OpenAiClient>) -> ProductPipeline {
    let generator = CopyGenerator::new(client, CopySettings::from(&config.model));
    ProductPipeline::new(
        scraper(config),
        generator,
        Arc::new(MemoryLandingPageStore::new()),
    )
}

fn print_detail(detail: &MergedProductDetail, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(detail)?);
    } else {
        for (key, value) in detail.to_key_values() {
            println!("{key}: {value}");
        }
    }
    Ok(())
}
