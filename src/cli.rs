//! Command-line interface definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Queue-driven batch media transcoder built around ffmpeg.
#[derive(Parser, Debug)]
#[command(name = "transcoderd", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "/config/transcoder.yaml", env = "CONFIG_PATH", global = true)]
    pub config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level based on verbosity flags.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the worker and the metrics endpoint.
    Run(RunArgs),

    /// Submit files as a new batch.
    Submit(SubmitArgs),

    /// Transcode files in-process without Redis and wait for the result.
    Transcode(TranscodeArgs),

    /// Show a batch and its jobs.
    Status {
        /// The batch ID.
        batch_id: String,
    },

    /// List an owner's batches, newest first.
    Batches {
        /// Owner whose batches to list.
        #[arg(long, default_value = "cli")]
        owner: String,

        /// Page number, starting at 1.
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Batches per page.
        #[arg(long, default_value_t = 20)]
        per_page: usize,
    },

    /// Copy a finished job's output to a directory.
    Download {
        /// The job ID.
        job_id: String,

        /// Destination directory.
        #[arg(long, default_value = ".")]
        dest: PathBuf,
    },

    /// Ask the running worker to abort a job.
    Abort {
        /// The job ID.
        job_id: String,
    },

    /// List waiting and active queue items.
    #[command(name = "queue-list")]
    QueueList,

    /// Drop every queue item.
    #[command(name = "queue-reset")]
    QueueReset,

    /// Fail jobs left processing by a stopped worker.
    Reconcile,

    /// Print the supported formats and codecs.
    Formats,

    /// Validate the configuration file without starting.
    #[command(name = "config-validate")]
    ConfigValidate,

    /// Display the parsed configuration.
    #[command(name = "config-show")]
    ConfigShow,
}

/// Arguments for the run subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Skip failing jobs left processing by a previous worker.
    #[arg(long, default_value = "false")]
    pub no_reconcile: bool,
}

/// Arguments for the submit subcommand.
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Input files, one job each.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output options as JSON, e.g. '{"format":"mp3","stream":{"audio":{"codec":"mp3"}}}'.
    #[arg(short, long)]
    pub options: String,

    /// Owner recorded on the batch.
    #[arg(long, default_value = "cli")]
    pub owner: String,
}

/// Arguments for the transcode subcommand.
#[derive(Args, Debug)]
pub struct TranscodeArgs {
    /// Input files, one job each.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output options as JSON.
    #[arg(short, long)]
    pub options: String,

    /// Directory to copy finished outputs into.
    #[arg(long, default_value = ".")]
    pub dest: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_submit() {
        let cli = Cli::try_parse_from([
            "transcoderd",
            "-vv",
            "submit",
            "a.wav",
            "b.wav",
            "--options",
            r#"{"format":"mp3"}"#,
        ])
        .unwrap();

        assert_eq!(cli.log_level(), "trace");
        match cli.command {
            Commands::Submit(args) => {
                assert_eq!(args.files.len(), 2);
                assert_eq!(args.owner, "cli");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn submit_requires_files() {
        assert!(Cli::try_parse_from(["transcoderd", "submit", "--options", "{}"]).is_err());
    }

    #[test]
    fn batches_defaults() {
        let cli = Cli::try_parse_from(["transcoderd", "batches"]).unwrap();
        match cli.command {
            Commands::Batches { page, per_page, .. } => assert_eq!((page, per_page), (1, 20)),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
