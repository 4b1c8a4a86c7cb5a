use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "webserver-ctl")]
#[command(about = "Management CLI for a running webserver", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:4446")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server answers
    Liveness,
    /// Check that the server is ready for traffic
    Readiness,
    /// Show server info and published vars
    Vars,
    /// Dump Prometheus metrics
    Metrics,
    /// Ask the server to shut down gracefully
    Stop,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let url = cli.url.trim_end_matches('/');

    let path = match cli.command {
        Commands::Liveness => "/liveness",
        Commands::Readiness => "/readiness",
        Commands::Vars => "/debug/vars",
        Commands::Metrics => "/metrics",
        Commands::Stop => "/stop",
    };

    let res = client.get(format!("{}{}", url, path)).send().await?;
    let ok = print_response(res).await?;
    if !ok {
        std::process::exit(1);
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<bool, Box<dyn std::error::Error>> {
    let status = res.status();
    let is_json = res
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        eprintln!("Response: {}", text.trim_end());
        return Ok(false);
    }

    if is_json {
        let json: Value = serde_json::from_str(&text)?;
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        print!("{}", text);
    }
    Ok(true)
}
