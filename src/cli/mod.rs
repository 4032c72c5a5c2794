mod args;
mod meeting;

pub use args::{Cli, CliCommand};
pub use meeting::{handle_meeting_command, handle_relay_command};
