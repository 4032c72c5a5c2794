use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "meet-agent")]
#[command(about = "Google Meet bridge for conversational agents", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Print version information
    Version,
    /// Ask the running service to join a meeting
    Join(JoinCliArgs),
    /// Leave the current meeting
    Leave,
    /// Show the current meeting
    Status,
    /// List meetings seen since the service started
    Meetings,
    /// List participants of the current meeting
    Participants,
    /// Print the current meeting's transcript
    Transcripts,
    /// Summarize the current meeting
    Summary,
    /// Print a report for the current meeting
    Report(ReportCliArgs),
    /// Create a new meeting space (api backend)
    Create(CreateCliArgs),
    /// Drive the microphone, camera or recording (extension backend)
    Control(ControlCliArgs),
    /// Run the browser-side relay, speaking JSON lines on stdin/stdout
    Relay(RelayCliArgs),
}

#[derive(ClapArgs, Debug)]
pub struct JoinCliArgs {
    /// Meeting link, e.g. https://meet.google.com/abc-defg-hij
    pub url: String,
    /// Name to join with (default: agent.display_name from config)
    #[arg(short, long)]
    pub name: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct ReportCliArgs {
    /// Include every transcript segment
    #[arg(long)]
    pub transcript: bool,
}

#[derive(ClapArgs, Debug)]
pub struct CreateCliArgs {
    #[arg(short, long)]
    pub title: Option<String>,
    /// OPEN, TRUSTED or RESTRICTED
    #[arg(short, long)]
    pub access: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct ControlCliArgs {
    /// mute, unmute, camera-on, camera-off, start-recording, stop-recording or participants
    pub action: String,
}

#[derive(ClapArgs, Debug)]
pub struct RelayCliArgs {
    /// Hub port (default: extension.ws_port from config)
    #[arg(short, long)]
    pub port: Option<u16>,
}
