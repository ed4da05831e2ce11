pub mod csv;
pub mod mdd;
