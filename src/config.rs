use clap::{ArgAction, Parser};
use env_logger::{Builder, Env};
use log::LevelFilter;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Stroke risk prediction API", long_about = None)]
pub struct ServiceArgs {
    #[arg(long, env = "STROKE_HOST", default_value = "0.0.0.0", help = "Address to bind")]
    pub host: String,
    #[arg(short, long, env = "STROKE_PORT", default_value_t = 5000, help = "Port to listen on")]
    pub port: u16,
    #[arg(
        short,
        long,
        env = "STROKE_MODEL_PATH",
        default_value = "models/stroke_model.json",
        help = "Frozen classifier artifact"
    )]
    pub model_path: PathBuf,
    #[arg(
        short,
        long,
        env = "STROKE_DATABASE",
        default_value = "stroke_predictions.db",
        help = "SQLite file holding the predictions table"
    )]
    pub database: PathBuf,
    #[arg(long, default_value_t = 2000, help = "Give up on a database insert after this many ms")]
    pub db_timeout_ms: u64,
    #[arg(long, default_value_t = 1000, help = "Give up on model inference after this many ms")]
    pub inference_timeout_ms: u64,
    #[arg(short, long, action = ArgAction::Count, help = "Verbose level")]
    pub verbose: u8,
}

impl ServiceArgs {
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_millis(self.db_timeout_ms)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

/// `STROKE_LOG` takes env_logger filter syntax and wins over `-v`.
pub fn init_logging(args: &ServiceArgs) {
    let env = Env::new().filter("STROKE_LOG");
    Builder::new()
        .filter(Some("stroke_risk_service"), args.log_level())
        .parse_env(env)
        .init();
}
