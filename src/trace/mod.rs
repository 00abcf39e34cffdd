pub mod cycle;
pub mod mtr;

pub use cycle::CycleReport;
pub use mtr::*;
