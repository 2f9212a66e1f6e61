use std::{cell::RefCell, rc::Rc, time::Instant};

use log::{debug, info, warn};
use machine_learning::{
    MelodyRnn,
    arch::LstmShape,
    initialization::{ChainedParamGen, ConstParamGen, ParamGen, RandParamGen},
    optimization::{Adagrad, GradientDescent, Optimizer},
};
use ndarray::Array3;
use rand::{SeedableRng, rngs::StdRng};
use records::MelodySequence;
use tokio::task;

use crate::{
    OptimizerKind, Result, TrainMetrics, TrainingConfig,
    data::{Batcher, SequenceSource},
    queue::{self, Coordinator, Dequeuer, QueueRunner},
};

type BoxedOptimizer = Box<dyn Optimizer + Send>;

/// Owns a training run: the model, its optimizers and the input queue.
///
/// Concurrency note:
/// - A `QueueRunner` reads and parses melodies on the blocking pool, the training loop dequeues.
/// - Every step is CPU-bound and runs via `spawn_blocking`, moving the model and optimizers in
///   and out of the task without copying them.
#[derive(Debug, Clone)]
pub struct Trainer {
    cfg: TrainingConfig,
}

impl Trainer {
    /// Creates a new `Trainer`.
    ///
    /// # Returns
    /// An error if the configuration is invalid.
    pub fn new(cfg: TrainingConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.cfg
    }

    /// Trains on the record file of the configuration.
    pub async fn run(self) -> Result<TrainMetrics> {
        let source = SequenceSource::from_config(&self.cfg);
        self.run_with(source).await
    }

    /// Trains on the melodies yielded by `source`.
    ///
    /// # Arguments
    /// * `source` - The melodies to train on, read from a blocking task.
    ///
    /// # Returns
    /// The metrics of the run, or the first error of either the training loop or the source.
    pub async fn run_with<I>(self, source: I) -> Result<TrainMetrics>
    where
        I: Iterator<Item = Result<MelodySequence>> + Send + 'static,
    {
        let start = Instant::now();
        let (model, optimizers) = build_model(&self.cfg)?;
        info!(
            params = model.num_params(),
            layers = self.cfg.num_layers.get(),
            units = self.cfg.num_units.get();
            "model initialized"
        );

        let coordinator = Coordinator::new();
        let (tx, mut rx) = queue::fifo(self.cfg.queue_capacity.get());
        QueueRunner::start(source, tx, &coordinator);

        let ret = self.train(model, optimizers, &mut rx, &coordinator).await;

        coordinator.request_stop();
        rx.close();
        let joined = coordinator.join().await;

        let mut metrics = ret?;
        joined?;

        metrics.elapsed = start.elapsed();
        Ok(metrics)
    }

    async fn train(
        &self,
        mut model: MelodyRnn,
        mut optimizers: Vec<BoxedOptimizer>,
        rx: &mut Dequeuer<MelodySequence>,
        coordinator: &Coordinator,
    ) -> Result<TrainMetrics> {
        let cfg = &self.cfg;
        let (batch_size, time_len) = (cfg.batch_size.get(), cfg.time_len.get());
        let state_dim = (cfg.num_layers.get(), batch_size, cfg.num_units.get());

        let mut metrics = TrainMetrics::default();
        let mut batcher = Batcher::new(time_len, batch_size, cfg.input_size.get());

        for step in 0..cfg.training_steps {
            let wait = Instant::now();

            while !batcher.is_full() {
                let Some(sequence) = rx.dequeue().await else {
                    if !coordinator.should_stop() {
                        warn!(
                            step = step;
                            "ran out of melodies after {step} of {} steps",
                            cfg.training_steps
                        );
                    }

                    return Ok(metrics);
                };

                match batcher.accept(&sequence) {
                    Ok(()) => metrics.add_sequences(1),
                    Err(e) => {
                        metrics.bump_skipped();
                        warn!("skipping melody: {e}");
                    }
                }
            }

            metrics.wait_time += wait.elapsed();

            let Some(batch) = batcher.take() else {
                continue;
            };

            let compute = Instant::now();
            let (model_back, optimizers_back, out) = task::spawn_blocking(move || {
                // Every step starts from zero states.
                let h0 = Array3::zeros(state_dim);
                let c0 = Array3::zeros(state_dim);

                let out = model.train_step(
                    batch.x.view(),
                    batch.y.view(),
                    h0.view(),
                    c0.view(),
                    &mut optimizers,
                );

                (model, optimizers, out)
            })
            .await?;

            model = model_back;
            optimizers = optimizers_back;
            let out = out?;
            metrics.compute_time += compute.elapsed();

            let total_loss = out.total_loss();
            metrics.bump_step(total_loss);

            if step % cfg.log_every.get() == 0 {
                info!(step = step, total_loss = total_loss; "training");
            } else {
                debug!(step = step, total_loss = total_loss; "training");
            }
        }

        Ok(metrics)
    }
}

/// Builds the model and one optimizer per parameter group.
///
/// Every LSTM weight and bias and the projection weights are drawn from `N(0, init_scale²)`,
/// the projection biases start at zero.
fn build_model(cfg: &TrainingConfig) -> Result<(MelodyRnn, Vec<BoxedOptimizer>)> {
    let shape = LstmShape::new(
        cfg.num_layers.get(),
        cfg.num_units.get(),
        cfg.input_size.get(),
    );

    let rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let classes = shape.input_size;
    let weights = machine_learning::arch::params::params_size(&shape) + classes * shape.num_units;
    let param_gens: Vec<Box<dyn ParamGen>> = vec![
        Box::new(RandParamGen::scaled_normal(
            Rc::new(RefCell::new(rng)),
            weights,
            cfg.init_scale,
        )?),
        Box::new(ConstParamGen::zeros(classes)),
    ];

    let model = MelodyRnn::new(shape, &mut ChainedParamGen::new(param_gens))?;

    let optimizers = model
        .groups()
        .iter()
        .map(|group| -> BoxedOptimizer {
            match cfg.optimizer {
                OptimizerKind::Adagrad => Box::new(Adagrad::new(group.len(), cfg.learning_rate)),
                OptimizerKind::GradientDescent => Box::new(GradientDescent::new(cfg.learning_rate)),
            }
        })
        .collect();

    Ok((model, optimizers))
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            num_units: NonZeroUsize::new(4).unwrap(),
            input_size: NonZeroUsize::new(3).unwrap(),
            num_layers: NonZeroUsize::new(2).unwrap(),
            seed: Some(5),
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn one_optimizer_per_group() {
        let (model, optimizers) = build_model(&small_config()).unwrap();

        assert_eq!(optimizers.len(), MelodyRnn::GROUPS);
        assert_eq!(model.groups()[2].params(), &[0., 0., 0.]);
    }

    #[test]
    fn seeded_models_are_equal() {
        let (a, _) = build_model(&small_config()).unwrap();
        let (b, _) = build_model(&small_config()).unwrap();

        assert_eq!(a.groups()[0].params(), b.groups()[0].params());
        assert_eq!(a.groups()[1].params(), b.groups()[1].params());
    }

    #[test]
    fn weights_follow_the_init_scale() {
        let (model, _) = build_model(&small_config()).unwrap();
        let lstm = model.groups()[0].params();

        assert!(lstm.iter().all(|w| w.abs() < 0.1));
        assert!(lstm.iter().any(|&w| w != 0.));
    }
}
