pub mod layers;
pub mod loss;
mod lstm;
pub mod params;

pub use lstm::{Lstm, LstmGrads, LstmOutput};
pub use params::LstmShape;
