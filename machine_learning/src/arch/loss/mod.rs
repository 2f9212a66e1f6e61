mod softmax;

pub use softmax::{SoftmaxLoss, SoftmaxOutput, total_loss};
