//! Result types returned by safe calls.

mod generation;
mod report;

pub use generation::Generation;
pub use report::CallReport;
