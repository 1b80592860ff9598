//! Core engine: the shared ledger, the venue scanner, execution, the
//! strategy loops and end-of-run accounting.

pub mod accountant;
pub mod executor;
pub mod ledger;
pub mod runner;
pub mod scanner;
