use std::{
    fs::{self, File},
    io::{self, BufWriter},
    num::NonZeroUsize,
    path::PathBuf,
};

use records::{MelodySequence, RecordWriter, SequenceSpec, encode_sequence_example};
use trainer::{Trainer, TrainerErr, TrainingConfig};

const INPUT: usize = 6;

fn nz(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

/// An ascending scale over every event class, starting at `start`.
fn scale(start: usize, len: usize) -> MelodySequence {
    let labels: Vec<i64> = (0..len).map(|t| ((start + t) % INPUT) as i64).collect();
    let inputs = labels
        .iter()
        .flat_map(|&l| (0..INPUT).map(move |i| (i as i64 == l) as u32 as f32))
        .collect();

    MelodySequence {
        labels,
        inputs,
        input_size: INPUT,
    }
}

/// Writes `melodies` as a record file under the temp dir.
fn write_melodies(name: &str, melodies: &[MelodySequence]) -> io::Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("melody_{}_{name}.tfrecord", std::process::id()));
    let spec = SequenceSpec::new(INPUT);

    let mut writer = RecordWriter::new(BufWriter::new(File::create(&path)?));
    for melody in melodies {
        writer.write_record(&encode_sequence_example(melody, &spec))?;
    }
    writer.flush()?;

    Ok(path)
}

fn config(path: PathBuf) -> TrainingConfig {
    TrainingConfig {
        dataset_path: path,
        input_size: nz(INPUT),
        num_units: nz(12),
        time_len: nz(8),
        batch_size: nz(2),
        training_steps: 10,
        repeat: Some(nz(1)),
        seed: Some(11),
        queue_capacity: nz(4),
        init_scale: 0.1,
        learning_rate: 0.1,
        log_every: nz(10),
        ..TrainingConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn loss_decreases_on_repeated_scales() -> io::Result<()> {
    let melodies: Vec<_> = (0..INPUT).map(|start| scale(start, 12)).collect();
    let path = write_melodies("decreases", &melodies)?;

    let cfg = TrainingConfig {
        training_steps: 150,
        repeat: None,
        ..config(path.clone())
    };

    let metrics = Trainer::new(cfg)?.run().await?;
    fs::remove_file(&path)?;

    assert_eq!(metrics.steps, 150);
    assert_eq!(metrics.sequences, 300);
    assert_eq!(metrics.skipped, 0);

    let (first, last) = (metrics.first_loss.unwrap(), metrics.last_loss.unwrap());
    assert!(last < first * 0.7, "total loss went from {first} to {last}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn training_ends_early_when_the_data_runs_out() -> io::Result<()> {
    let melodies: Vec<_> = (0..3).map(|start| scale(start, 10)).collect();
    let path = write_melodies("runs_out", &melodies)?;

    let metrics = Trainer::new(config(path.clone()))?.run().await?;
    fs::remove_file(&path)?;

    assert_eq!(metrics.steps, 1);
    assert_eq!(metrics.sequences, 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn short_melodies_are_skipped() -> io::Result<()> {
    let mut melodies: Vec<_> = (0..4).map(|start| scale(start, 9)).collect();
    melodies.extend((0..3).map(|start| scale(start, 8)));
    let path = write_melodies("short", &melodies)?;

    let cfg = TrainingConfig {
        training_steps: 3,
        ..config(path.clone())
    };

    let metrics = Trainer::new(cfg)?.run().await?;
    fs::remove_file(&path)?;

    assert_eq!(metrics.steps, 2);
    assert_eq!(metrics.sequences, 4);
    assert_eq!(metrics.skipped, 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn corrupted_records_fail_the_run() -> io::Result<()> {
    let melodies: Vec<_> = (0..4).map(|start| scale(start, 10)).collect();
    let path = write_melodies("corrupted", &melodies)?;

    let mut bytes = fs::read(&path)?;
    let last = bytes.len() - 10;
    bytes[last] ^= 0xff;
    fs::write(&path, bytes)?;

    let ret = Trainer::new(config(path.clone()))?.run().await;
    fs::remove_file(&path)?;

    assert!(
        matches!(ret, Err(TrainerErr::Record(_))),
        "expected a record error, got {ret:?}"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_dataset_fails_the_run() -> io::Result<()> {
    let path = std::env::temp_dir().join("melody_does_not_exist.tfrecord");

    let ret = Trainer::new(config(path))?.run().await;

    match ret {
        Err(TrainerErr::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
        other => panic!("expected a not found error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trains_from_any_source() -> io::Result<()> {
    let melodies: Vec<trainer::Result<_>> = (0..8).map(|start| Ok(scale(start, 9))).collect();
    let cfg = TrainingConfig {
        training_steps: 4,
        ..config(PathBuf::new())
    };

    let metrics = Trainer::new(cfg)?.run_with(melodies.into_iter()).await?;

    assert_eq!(metrics.steps, 4);
    assert_eq!(metrics.sequences, 8);
    assert!(metrics.last_loss.is_some_and(f32::is_finite));
    Ok(())
}
