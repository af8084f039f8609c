pub mod row;
pub mod bsi;
