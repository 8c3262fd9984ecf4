pub mod lawyer;
pub mod lead;
pub mod step;
