use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{DEFAULT_CONFIG_PATH, DEFAULT_DATABASE_PATH};

#[derive(Parser, Debug)]
#[command(name = "leafid")]
#[command(
    author,
    version,
    about = "Real-time medicinal leaf identification server"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the web server
    Serve(ServeArgs),

    /// Create the plant database and seed the sample records
    InitDb {
        /// Plant metadata database path
        #[arg(long, env = "LEAFID_DATABASE", default_value = DEFAULT_DATABASE_PATH)]
        database: PathBuf,

        /// Create the schema only
        #[arg(long)]
        no_seed: bool,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Upsert plant records from a YAML or JSON file
    Import {
        /// Plant metadata database path
        #[arg(long, env = "LEAFID_DATABASE", default_value = DEFAULT_DATABASE_PATH)]
        database: PathBuf,

        /// Record file (list of label/scientific_name/uses/precautions)
        file: PathBuf,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Report classifier labels that have no plant record
    CheckLabels {
        /// Configuration file path
        #[arg(short, long, env = "LEAFID_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Label file (overrides the configuration)
        #[arg(long)]
        labels: Option<PathBuf>,

        /// Plant metadata database path (overrides the configuration)
        #[arg(long)]
        database: Option<PathBuf>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

/// Options for `leafid serve`; every value overrides the configuration file
#[derive(Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Configuration file path
    #[arg(short, long, env = "LEAFID_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Listen address
    #[arg(short = 'l', long, env = "LEAFID_LISTEN")]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long, env = "LEAFID_PORT")]
    pub port: Option<u16>,

    /// Classifier weight file (replaces the configured artifacts)
    #[arg(short, long, env = "LEAFID_MODEL")]
    pub model: Option<PathBuf>,

    /// Label file (`class_indices.json`)
    #[arg(long, env = "LEAFID_LABELS")]
    pub labels: Option<PathBuf>,

    /// Inference device: cpu, cuda:N or metal:N
    #[arg(long, env = "LEAFID_DEVICE")]
    pub device: Option<String>,

    /// Plant metadata database path
    #[arg(short, long, env = "LEAFID_DATABASE")]
    pub database: Option<PathBuf>,

    /// Prediction history database path
    #[arg(long, env = "LEAFID_HISTORY")]
    pub history: Option<PathBuf>,

    /// Do not record prediction history
    #[arg(long)]
    pub no_history: bool,

    /// Directory for saved uploads
    #[arg(long, env = "LEAFID_UPLOADS")]
    pub uploads: Option<PathBuf>,

    /// Do not keep uploaded images
    #[arg(long)]
    pub no_save_uploads: bool,

    /// Crop photos to the leaf before classification
    #[arg(long)]
    pub crop_to_leaf: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::try_parse_from([
            "leafid",
            "serve",
            "--port",
            "8080",
            "--model",
            "models/leaf.safetensors",
            "--no-history",
        ])
        .unwrap();

        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.port, Some(8080));
        assert_eq!(args.model, Some(PathBuf::from("models/leaf.safetensors")));
        assert!(args.no_history);
        assert!(args.listen.is_none());
    }

    #[test]
    fn test_import_requires_file() {
        assert!(Cli::try_parse_from(["leafid", "import"]).is_err());

        let cli = Cli::try_parse_from(["leafid", "import", "--database", "x.db", "plants.yaml"])
            .unwrap();
        match cli.command {
            Commands::Import { database, file, .. } => {
                assert_eq!(database, PathBuf::from("x.db"));
                assert_eq!(file, PathBuf::from("plants.yaml"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
