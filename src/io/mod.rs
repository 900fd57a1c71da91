// Moving ledger data in and out of the process

mod export;

pub use export::*;
