// Analyzer module: the glucose statistics core.

pub mod glucose;

pub use glucose::{Analyzer, GlucoseAnalyzer};
