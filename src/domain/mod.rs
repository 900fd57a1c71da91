mod account;
mod clock;
pub mod date_format;
mod query;
mod statement;

pub use account::*;
pub use clock::*;
pub use query::*;
pub use statement::*;
