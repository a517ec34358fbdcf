pub mod attribution;
pub mod listing;
pub mod stats;
