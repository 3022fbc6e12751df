use std::path::PathBuf;
use std::time::Duration;

use speechgen_rs::{
    generator::{BatchOptionsBuilder, DatasetGenerator},
    provider::{ProviderConfig, ProviderFactory},
    BackendConfig, OperationType, TextItem,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let output_dir = PathBuf::from("dataset_out");
    let mut generator = DatasetGenerator::new(&output_dir)?;

    let factory = ProviderFactory::new();
    let provider = factory.create("tone", ProviderConfig::default())?;
    generator.register_provider("tone", provider);

    let items = vec![
        TextItem::new("1", "Hello from the batch generator."),
        TextItem::new("2", "Each line becomes one WAV file."),
        TextItem::new("3", "Re-running skips everything already on disk."),
    ];
    let backend = BackendConfig::new("tone", "default", "mid");
    let options = BatchOptionsBuilder::default()
        .delay_between_requests(Duration::from_millis(100))
        .build()?;

    let summary = generator.generate(&items, &backend, OperationType::Synthesize, &options)?;
    println!(
        "Generated {} of {} items in {:.2}s ({} failed)",
        summary.successful, summary.total_texts, summary.total_duration, summary.failed
    );
    for error in &summary.errors {
        eprintln!("  {error}");
    }

    let audit = generator
        .ledger()
        .audit("tone", "default", "mid", OperationType::Synthesize);
    println!(
        "Ledger holds {} entries, {} orphaned audio files",
        audit.total_entries,
        audit.orphaned_audio_files.len()
    );

    Ok(())
}
