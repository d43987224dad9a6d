mod emitter;
mod predictor;

pub use emitter::*;
pub use predictor::*;
