//! CLI module for headless DDAS operation.
//!
//! The CLI drives the same `Orchestrator` a GUI host would. Instead of a GUI
//! event bridge it uses a `ChannelRuntime`: events flow through a channel
//! into the output handler, and consent requests wait until the REPL
//! answers them.
//!
//! ```text
//! +--------------+     +----------------+     +---------------+
//! | Orchestrator | --> | ChannelRuntime | --> | output.rs     |
//! |              |     | (emit())       |     | (print/JSON)  |
//! +--------------+     +----------------+     +---------------+
//!        ^                     ^
//!        |  /intake            |  /accept, /skip
//!        +------- repl.rs -----+
//! ```

mod args;
mod bootstrap;
mod output;
mod repl;

pub use args::Args;
pub use bootstrap::{initialize, CliContext};
pub use output::{print_history, print_pending, run_event_loop};
pub use repl::run_repl;
