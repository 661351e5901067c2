use std::path::PathBuf;
use std::process;

use ecovision::train::{train, TrainingConfig};

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let (dataset, out) = match (args.next(), args.next()) {
        (Some(dataset), Some(out)) => (PathBuf::from(dataset), PathBuf::from(out)),
        _ => {
            eprintln!("Usage: train <dataset-dir> <artifact-dir>");
            eprintln!();
            eprintln!("The dataset directory holds one folder per class:");
            eprintln!("  <dataset-dir>/incident/    positive examples");
            eprintln!("  <dataset-dir>/background/  negative examples");
            process::exit(2);
        }
    };

    let config = TrainingConfig::default();
    let model = match train(&dataset, &config) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("training failed: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = model.save(&out) {
        eprintln!("failed to write artifacts: {}", e);
        process::exit(1);
    }
    println!(
        "Trained {:?} model; artifacts written to {}",
        model.vocabulary, out.display()
    );
}
