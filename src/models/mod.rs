pub mod bid;
pub mod delivery;
pub mod position;
pub mod principal;
