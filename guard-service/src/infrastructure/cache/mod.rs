pub mod client;
pub mod roster;
