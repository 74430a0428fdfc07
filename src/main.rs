//! Tennis match prediction CLI
//!
//! Builds the point-in-time training corpus, trains the classifier, and
//! serves single-match predictions.

use clap::{Parser, Subcommand};
use tennis::{Config, Result};

#[derive(Parser)]
#[command(name = "tennis")]
#[command(about = "Tennis match prediction from point-in-time player statistics", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Data management commands
    Data {
        #[command(subcommand)]
        action: DataCommands,
    },
    /// Train the model from the corpus
    Train {
        /// Corpus CSV (defaults to data.corpus_path)
        #[arg(long)]
        corpus: Option<String>,
        /// Number of epochs (overrides config)
        #[arg(short, long)]
        epochs: Option<usize>,
    },
    /// Predict a match outcome
    Predict {
        /// First player name
        player1: String,
        /// Second player name
        player2: String,
        /// Court surface: Hard, Clay or Grass
        #[arg(short, long)]
        surface: String,
        /// Match date YYYY-MM-DD (defaults to today)
        #[arg(short, long)]
        date: Option<String>,
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
    /// Answer a JSON prediction request with a JSON response
    Respond {
        /// Request file (reads stdin when omitted)
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Model management
    Model {
        #[command(subcommand)]
        action: ModelCommands,
    },
    /// Initialize configuration file
    Init,
}

#[derive(Subcommand)]
enum DataCommands {
    /// Show database statistics
    Status,
    /// Build the balanced training corpus and write it as CSV
    Export {
        /// Output path (overrides data.corpus_path)
        #[arg(short, long)]
        output: Option<String>,
        /// Seed for the role-swap coin (overrides dataset.seed)
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ModelCommands {
    /// Show model information
    Info,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use table or json.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command {
        Commands::Data { action } => match action {
            DataCommands::Status => commands::data_status(&config),
            DataCommands::Export { output, seed } => commands::data_export(&config, output, seed),
        },
        Commands::Train { corpus, epochs } => commands::train(&config, corpus, epochs),
        Commands::Predict {
            player1,
            player2,
            surface,
            date,
            format,
        } => commands::predict(&config, player1, player2, surface, date, format),
        Commands::Respond { input } => commands::respond(&config, input),
        Commands::Model { action } => match action {
            ModelCommands::Info => commands::model_info(&config),
        },
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use std::io::Read;
    use tennis::data::{export_corpus, Database};
    use tennis::model::ModelArtifact;
    use tennis::predict::{format_prediction, PredictionRequest, PredictionResponse, Predictor};
    use tennis::training::train_from_corpus;
    use tennis::TennisError;

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data")?;
        std::fs::create_dir_all(&config.data.model_dir)?;
        println!("Created data/ and {}/ directories", config.data.model_dir);

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Run 'tennis data export' to build the training corpus");
        println!("  3. Run 'tennis train' to train the model");
        println!("  4. Run 'tennis predict \"Player A\" \"Player B\" --surface Hard' to make predictions");

        Ok(())
    }

    fn open_database(config: &Config) -> Result<Database> {
        let path = &config.data.database_path;
        if !std::path::Path::new(path).exists() {
            return Err(TennisError::Config(format!("Database not found at {}", path)));
        }
        Ok(Database::open_read_only(path)?.with_rating_system(&config.data.rating_system))
    }

    pub fn data_status(config: &Config) -> Result<()> {
        let db = open_database(config)?;
        let stats = db.get_stats()?;

        println!("Database Status");
        println!("───────────────────────────────");
        println!("  Path:         {}", config.data.database_path);
        println!("  Players:      {}", stats.player_count);
        println!("  Tournaments:  {}", stats.tournament_count);
        println!("  Matches:      {} ({} decided)", stats.match_count, stats.decided_count);
        println!("  Ratings:      {} ({})", stats.rating_count, config.data.rating_system);
        if let (Some(earliest), Some(latest)) = (stats.earliest_match, stats.latest_match) {
            println!("  Range:        {} to {}", earliest, latest);
        }

        Ok(())
    }

    pub fn data_export(config: &Config, output: Option<String>, seed: Option<u64>) -> Result<()> {
        let mut export_config = config.clone();
        if let Some(path) = output {
            export_config.data.corpus_path = path;
        }
        if seed.is_some() {
            export_config.dataset.seed = seed;
        }

        let db = open_database(&export_config)?;
        let stats = db.get_stats()?;
        if stats.decided_count == 0 {
            return Err(TennisError::Config(format!(
                "No decided matches in {}",
                export_config.data.database_path
            )));
        }

        let report = export_corpus(&db, &export_config)?;
        println!("Corpus written to {}", export_config.data.corpus_path);
        println!("  Rows:          {}", report.built);
        println!("  Skipped:       {}", report.skipped);
        println!("  Player 1 wins: {:.1}%", report.positive_rate() * 100.0);
        Ok(())
    }

    pub fn train(config: &Config, corpus: Option<String>, epochs: Option<usize>) -> Result<()> {
        let mut training_config = config.clone();
        if let Some(e) = epochs {
            training_config.training.epochs = e;
        }

        println!("Training...");
        let artifact = train_from_corpus(&training_config, corpus.as_deref())?;
        let samples = artifact.metadata.samples;
        println!(
            "\nTrained on {} rows ({} train / {} test)",
            samples.total, samples.train, samples.test
        );
        println!("{}", artifact.metadata.metrics);
        println!("Model saved to {}", training_config.data.model_dir);
        Ok(())
    }

    pub fn predict(
        config: &Config,
        player1: String,
        player2: String,
        surface: String,
        date: Option<String>,
        format: OutputFormat,
    ) -> Result<()> {
        let request = PredictionRequest {
            player1_name: Some(player1),
            player2_name: Some(player2),
            surface: Some(surface),
            match_date: date,
        };
        let valid = request.validate()?;
        let predictor = Predictor::load(config)?;

        match format {
            OutputFormat::Table => {
                let prediction = predictor.predict(&valid)?;
                println!("{}", format_prediction(&prediction));
            }
            OutputFormat::Json => {
                let response = predictor.respond(&request);
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
        }
        Ok(())
    }

    pub fn respond(config: &Config, input: Option<String>) -> Result<()> {
        let body = match input {
            Some(path) => std::fs::read_to_string(path)?,
            None => {
                let mut body = String::new();
                std::io::stdin().read_to_string(&mut body)?;
                body
            }
        };

        let response = match serde_json::from_str::<PredictionRequest>(&body) {
            Err(e) => PredictionResponse::failure(&TennisError::InvalidInput(format!(
                "Invalid JSON body: {}",
                e
            ))),
            Ok(request) => match Predictor::load(config) {
                Ok(predictor) => predictor.respond(&request),
                Err(e) => PredictionResponse::failure(&e),
            },
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
        Ok(())
    }

    pub fn model_info(config: &Config) -> Result<()> {
        let artifact = ModelArtifact::load(&config.data.model_dir)?;
        let meta = &artifact.metadata;

        println!("Model Information");
        println!("───────────────────────────────");
        println!("  Path:        {}", config.data.model_dir);
        println!("  Type:        {}", meta.model_type);
        println!("  Version:     {}", meta.version);
        println!("  Trained at:  {}", meta.trained_at);
        println!(
            "  Samples:     {} ({} train / {} test)",
            meta.samples.total, meta.samples.train, meta.samples.test
        );
        if let (Some(first), Some(last)) = (meta.first_match, meta.last_match) {
            println!("  Matches:     {} to {}", first, last);
        }
        println!("  Features:    {}", meta.feature_names.len());
        println!();
        println!("{}", meta.metrics);

        Ok(())
    }
}
