pub mod emitter;
pub mod engine;
pub mod frames;
pub mod language;
pub mod report;
pub mod segmentation;
pub mod singing;
pub(crate) mod viterbi;
pub mod vocabulary;
