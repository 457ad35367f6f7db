//! File sources and sinks for datasets.

#[cfg(feature = "io-jsonl")]
pub mod jsonl;
