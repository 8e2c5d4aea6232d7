//! Interactive session
//!
//! A command loop over the crew. It reads from the same console as the
//! approval gate, so prompts from a running workflow and the session prompt
//! never compete for the terminal.

mod session;

pub use session::{ReplCommand, ReplSession, config_table, parse_command};

use std::sync::Arc;

use eyre::Result;

use crate::console::LineSource;
use crate::crew::Crew;

/// Run the session until `exit` or end of input
pub async fn run_interactive(crew: &Crew, input: Arc<dyn LineSource>) -> Result<()> {
    let mut session = ReplSession::new(crew, input);
    session.run().await
}
