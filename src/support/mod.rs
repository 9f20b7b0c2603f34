pub mod clock;
pub mod numbers;
pub mod validate;
