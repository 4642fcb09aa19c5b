pub mod assignment;
pub mod attribution;
pub mod availability;
pub mod parameters;
pub mod replacement;
