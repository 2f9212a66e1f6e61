mod lstm;

pub use lstm::{LayerGrads, LayerOutput, LstmLayer};
