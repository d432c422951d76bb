pub mod session;
pub mod worker;

pub use session::{SessionActor, SessionArguments, SessionMsg};
pub use worker::{WorkerActor, WorkerArguments};
