pub mod ports;
pub mod validation_use_case;

pub use validation_use_case::{RunOutcome, ValidationUseCase};
