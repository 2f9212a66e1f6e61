use std::io;

use log::info;
use tokio::signal;

use trainer::{Trainer, TrainingConfig};

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let cfg = TrainingConfig::from_env()?;
    info!(
        "training for {} steps on {}",
        cfg.training_steps,
        cfg.dataset_path.display()
    );

    let trainer = Trainer::new(cfg)?;

    tokio::select! {
        ret = trainer.run() => {
            let metrics = ret?;
            info!(
                steps = metrics.steps,
                sequences = metrics.sequences,
                skipped = metrics.skipped;
                "training finished in {:.2?}, last total_loss {:?}",
                metrics.elapsed,
                metrics.last_loss
            );
        }
        _ = signal::ctrl_c() => {
            info!("received SIGINT");
        }
    }

    Ok(())
}
