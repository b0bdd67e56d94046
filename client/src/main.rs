use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use client::config::DEFAULT_ENDPOINT;
use client::{ClientConfig, RetryDriver, encode_image_file};
use shared::ClassificationResult;

#[derive(Parser, Debug)]
#[command(author, version, about = "Classify an image with a running backend", long_about = None)]
struct Cli {
    /// Image file to classify
    #[arg(value_name = "IMAGE", required_unless_present = "health_only")]
    image: Option<PathBuf>,

    /// Minimum confidence for a prediction to be shown (clamped to 0.1..=0.9)
    #[arg(short, long, env = "DEFAULT_THRESHOLD", default_value_t = 0.3)]
    threshold: f32,

    /// Session endpoint
    #[arg(short, long, env = "WEBSOCKET_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Origin header presented on the handshake
    #[arg(long, env = "WEBSOCKET_ORIGIN")]
    origin: Option<String>,

    /// Seconds to wait for a reply (clamped to 10..=60)
    #[arg(long, env = "WEBSOCKET_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Largest accepted image file in MB (clamped to 1..=10)
    #[arg(long, env = "MAX_FILE_SIZE_MB", default_value_t = 5)]
    max_file_size_mb: u64,

    /// Only report backend health
    #[arg(long)]
    health_only: bool,
}

#[actix_rt::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let mut config = ClientConfig::new(&cli.endpoint).map_err(|e| e.to_string())?;
    config.origin = cli.origin;
    config.response_timeout = Duration::from_secs(cli.timeout.clamp(10, 60));
    let driver = RetryDriver::new(config).map_err(|e| e.to_string())?;

    if cli.health_only {
        return match driver.check_health().await {
            Some(status) => {
                println!(
                    "Backend is {} (model loaded: {}, at {})",
                    status.status, status.model_loaded, status.timestamp
                );
                Ok(())
            }
            None => Err("Backend service is not healthy".to_string()),
        };
    }

    let Some(path) = cli.image else {
        return Err("No image given".to_string());
    };
    let max_bytes = cli.max_file_size_mb.clamp(1, 10) * 1024 * 1024;
    let encoded = encode_image_file(&path, max_bytes).map_err(|e| e.to_string())?;
    let (width, height) = encoded.original_size;
    println!("{} ({}x{})", path.display(), width, height);

    let threshold = cli.threshold.clamp(0.1, 0.9);
    let result = driver
        .classify(&encoded.data_uri, threshold)
        .await
        .map_err(|e| e.to_string())?;
    print!("{}", render(&result, threshold));
    Ok(())
}

fn confidence_marker(score: f32) -> &'static str {
    let percent = score * 100.0;
    if percent >= 80.0 {
        "high"
    } else if percent >= 50.0 {
        "medium"
    } else {
        "low"
    }
}

fn render(result: &ClassificationResult, threshold: f32) -> String {
    if result.predictions.is_empty() {
        return format!(
            "No predictions above the {:.0}% confidence threshold.\n",
            threshold * 100.0
        );
    }
    let mut out = format!(
        "Found {} predictions above threshold out of {}\n",
        result.filtered_predictions, result.total_predictions
    );
    for (rank, item) in result.predictions.iter().enumerate() {
        out.push_str(&format!(
            "{:>2}. {:<30} {:>6.1}%  [{}]\n",
            rank + 1,
            item.label,
            item.score * 100.0,
            confidence_marker(item.score)
        ));
    }
    out
}
