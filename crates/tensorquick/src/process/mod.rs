pub mod runner;

pub use runner::{start, CommandSpec, OutputLine, RunningProcess, Termination, STDERR_TAIL_LINES};
