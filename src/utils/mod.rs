pub use cancel_token::*;
pub use join::*;

mod cancel_token;
mod join;
pub mod logger;
