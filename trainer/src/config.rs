use std::{env, num::NonZeroUsize, path::PathBuf, str::FromStr};

use crate::{Result, TrainerErr};

/// The optimization algorithm used for every parameter group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Adagrad,
    GradientDescent,
}

impl FromStr for OptimizerKind {
    type Err = &'static str;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adagrad" => Ok(Self::Adagrad),
            "sgd" | "gradient_descent" => Ok(Self::GradientDescent),
            _ => Err("expected adagrad or sgd"),
        }
    }
}

/// Every knob of a training run.
///
/// The defaults are the melody model's reference setup, and each field can be overridden
/// through a `MELODY_*` environment variable.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub dataset_path: PathBuf,
    /// The capacity of the record file's read buffer, in bytes.
    pub read_buffer_size: NonZeroUsize,
    pub verify_checksums: bool,
    pub shuffle_buffer: NonZeroUsize,
    /// The amount of passes over the dataset, `None` repeats forever.
    pub repeat: Option<NonZeroUsize>,
    /// Seeds both shuffling and initialization, `None` draws from the OS.
    pub seed: Option<u64>,
    pub queue_capacity: NonZeroUsize,
    pub num_layers: NonZeroUsize,
    pub num_units: NonZeroUsize,
    pub time_len: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    pub training_steps: usize,
    /// The width of every input step, which is also the amount of event classes.
    pub input_size: NonZeroUsize,
    /// The standard deviation of the initial weights.
    pub init_scale: f32,
    pub learning_rate: f32,
    pub optimizer: OptimizerKind,
    pub log_every: NonZeroUsize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("/tmp/data/training_melodies.tfrecord"),
            read_buffer_size: nonzero(1024),
            verify_checksums: true,
            shuffle_buffer: nonzero(5),
            repeat: Some(nonzero(10)),
            seed: None,
            queue_capacity: nonzero(32),
            num_layers: nonzero(1),
            num_units: nonzero(64),
            time_len: nonzero(20),
            batch_size: nonzero(4),
            training_steps: 10000,
            input_size: nonzero(38),
            init_scale: 0.01,
            learning_rate: 0.03,
            optimizer: OptimizerKind::Adagrad,
            log_every: nonzero(100),
        }
    }
}

impl TrainingConfig {
    /// Loads the configuration from the process' environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads the configuration from any key-value source, starting from the defaults.
    ///
    /// # Arguments
    /// * `lookup` - Returns the raw value of a `MELODY_*` key, if set.
    ///
    /// # Returns
    /// The validated configuration or an error naming the first invalid key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let source = Lookup(lookup);

        if let Some(path) = source.raw("MELODY_DATASET") {
            cfg.dataset_path = PathBuf::from(path);
        }

        source.set("MELODY_READ_BUFFER", &mut cfg.read_buffer_size)?;
        source.set("MELODY_VERIFY_CRC", &mut cfg.verify_checksums)?;
        source.set("MELODY_SHUFFLE_BUFFER", &mut cfg.shuffle_buffer)?;
        source.set("MELODY_QUEUE_CAPACITY", &mut cfg.queue_capacity)?;
        source.set("MELODY_NUM_LAYERS", &mut cfg.num_layers)?;
        source.set("MELODY_NUM_UNITS", &mut cfg.num_units)?;
        source.set("MELODY_TIME_LEN", &mut cfg.time_len)?;
        source.set("MELODY_BATCH_SIZE", &mut cfg.batch_size)?;
        source.set("MELODY_TRAINING_STEPS", &mut cfg.training_steps)?;
        source.set("MELODY_INPUT_SIZE", &mut cfg.input_size)?;
        source.set("MELODY_INIT_SCALE", &mut cfg.init_scale)?;
        source.set("MELODY_LEARNING_RATE", &mut cfg.learning_rate)?;
        source.set("MELODY_OPTIMIZER", &mut cfg.optimizer)?;
        source.set("MELODY_LOG_EVERY", &mut cfg.log_every)?;

        if let Some(seed) = source.parse("MELODY_SEED")? {
            cfg.seed = Some(seed);
        }

        if let Some(repeat) = source.raw("MELODY_REPEAT") {
            cfg.repeat = match repeat.trim() {
                "-1" | "inf" | "forever" => None,
                n => Some(n.parse().map_err(|_| TrainerErr::InvalidConfig {
                    key: "MELODY_REPEAT",
                    value: repeat.clone(),
                    reason: "expected a positive count, -1 or inf",
                })?),
            };
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks the values the types alone can't guarantee.
    pub fn validate(&self) -> Result<()> {
        if !self.init_scale.is_finite() || self.init_scale <= 0. {
            return Err(TrainerErr::InvalidConfig {
                key: "init_scale",
                value: self.init_scale.to_string(),
                reason: "must be finite and positive",
            });
        }

        if !self.learning_rate.is_finite() || self.learning_rate <= 0. {
            return Err(TrainerErr::InvalidConfig {
                key: "learning_rate",
                value: self.learning_rate.to_string(),
                reason: "must be finite and positive",
            });
        }

        Ok(())
    }
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn parse<T: FromStr>(&self, key: &'static str) -> Result<Option<T>> {
        let Some(value) = self.raw(key) else {
            return Ok(None);
        };

        value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| TrainerErr::InvalidConfig {
                key,
                value,
                reason: "could not be parsed",
            })
    }

    fn set<T: FromStr>(&self, key: &'static str, field: &mut T) -> Result<()> {
        if let Some(value) = self.parse(key)? {
            *field = value;
        }

        Ok(())
    }
}

fn nonzero(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}
