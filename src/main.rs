use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tienda_scraper::{ScrapeReport, Scraper, ScraperConfig, SourceId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tienda-scraper", about = "Search products across online stores")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search every enabled store for a product
    Products {
        term: String,
        /// Upper bound on listings per store
        #[arg(short, long, default_value_t = 10)]
        amount: usize,
        #[arg(long)]
        json: bool,
    },
    /// List the filter facets offered for a search
    Filters {
        term: String,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tienda_scraper=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = ScraperConfig::from_env().context("Failed to load configuration")?;
    let scraper = Scraper::from_config(&config);

    if let Err(err) = scraper.navigator().check_ready().await {
        bail!(
            "WebDriver at {} is not available ({err}); start chromedriver or set WEBDRIVER_URL",
            config.browser.webdriver_url
        );
    }

    match cli.command {
        Command::Products { term, amount, json } => {
            let report = scraper
                .scrape_products(&term, amount)
                .await
                .context("Product search failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report, &scraper.enabled_sources());
            }
        }
        Command::Filters { term, json } => {
            let facets = scraper
                .scrape_filters(&term)
                .await
                .context("Filter search failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&facets)?);
            } else {
                println!("🔎 Filters for \"{term}\"\n");
                for facet in &facets {
                    println!("{}", facet.title);
                    for option in &facet.options {
                        println!("   • {option}");
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_report(report: &ScrapeReport, sources: &[SourceId]) {
    println!("🛒 Product search: \"{}\"\n", report.search_term);
    println!("{}", "=".repeat(60));

    for &site in sources {
        let listings: Vec<_> = report.listings_from(site).collect();
        if listings.is_empty() && report.failures.iter().any(|f| f.source_name == site) {
            continue;
        }

        println!("\n{}", "-".repeat(60));
        println!("{} PRODUCTS ({})", site.display_name().to_uppercase(), listings.len());
        println!("{}", "-".repeat(60));

        for (i, product) in listings.iter().enumerate() {
            println!("\n{}. {}", i + 1, product.title);
            println!("   💰 Price: {}", product.price);
            println!("   ⭐ Rating: {} ({})", product.rating, product.rating_count);
            println!("   🔗 {}", product.purchase_link);
        }
    }

    println!("\n\n{}", "=".repeat(60));
    println!("📊 SUMMARY");
    println!("{}", "=".repeat(60));
    for count in &report.per_source {
        println!("{} products found: {}", count.source_name, count.listings);
    }
    for failure in &report.failures {
        println!("⚠️  {} failed ({:?}): {}", failure.source_name, failure.kind, failure.detail);
    }
    println!("Total products: {}", report.listings.len());
}
