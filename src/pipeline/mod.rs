pub mod batch;
pub mod builder;
#[cfg(feature = "candle")]
pub mod candle_scorer;
pub mod defaults;
pub mod runtime;
pub mod traits;
