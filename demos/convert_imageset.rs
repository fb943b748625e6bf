//! Converts an image list into a record store.
//!
//! Usage:
//!
//! ```text
//! convert_imageset ROOTFOLDER/ LISTFILE NUM_LABELS DB_NAME [--shuffle] [--gray] [--resize HxW]
//! ```
//!
//! `LISTFILE` holds `subfolder/file.jpg label_1 ... label_K` entries.

use softmax_vector_loss::records::ingest::{IngestConfig, convert_imageset};
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_target(false).init();

    let config = match IngestConfig::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    match convert_imageset(&config) {
        Ok(summary) => {
            info!(written = summary.written, skipped = summary.skipped, "done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, "conversion failed");
            ExitCode::FAILURE
        }
    }
}
