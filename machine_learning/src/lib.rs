pub mod arch;
pub mod error;
pub mod initialization;
mod model;
pub mod optimization;

pub use error::{MlErr, Result};
pub use model::{MelodyRnn, ParamGroup, StepOutput};
