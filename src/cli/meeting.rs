//! CLI handlers for meeting commands.
//!
//! All commands talk to the running service over its HTTP API.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bridge::relay::{run_stdio, RelaySettings};
use crate::cli::args::{CliCommand, RelayCliArgs};
use crate::config::Config;

struct ServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl ServiceClient {
    fn from_config() -> Result<Self> {
        let config = Config::load()?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: format!("http://127.0.0.1:{}", config.service.api_port),
        })
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .context("Failed to connect to meet-agent service. Is it running?")?;
        read_json(response).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .context("Failed to connect to meet-agent service. Is it running?")?;
        read_json(response).await
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let json: Value = response.json().await?;

    if !status.is_success() {
        bail!(
            "{}",
            json.get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown error")
        );
    }
    Ok(json)
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

pub async fn handle_meeting_command(command: CliCommand) -> Result<()> {
    let client = ServiceClient::from_config()?;

    match command {
        CliCommand::Join(args) => {
            let mut body = json!({ "url": args.url });
            if let Some(name) = args.name {
                body["display_name"] = Value::String(name);
            }
            let json = client.post("/meetings/join", body).await?;
            let meeting = &json["meeting"];
            println!(
                "Joined {} ({})",
                str_field(meeting, "meeting_uri"),
                str_field(meeting, "status")
            );
        }
        CliCommand::Leave => {
            let json = client.post("/meetings/leave", json!({})).await?;
            println!(
                "Left meeting {} after {} minutes",
                str_field(&json["meeting"], "meeting_code"),
                json["duration_minutes"].as_i64().unwrap_or(0)
            );
        }
        CliCommand::Status => show_status(&client).await?,
        CliCommand::Meetings => list_meetings(&client).await?,
        CliCommand::Participants => {
            let json = client.get("/meetings/current/participants").await?;
            let participants = json["participants"].as_array().cloned().unwrap_or_default();
            if participants.is_empty() {
                println!("No participants have joined yet.");
            }
            for (i, p) in participants.iter().enumerate() {
                let state = if p["is_active"].as_bool().unwrap_or(false) {
                    "active"
                } else {
                    "left"
                };
                println!("{}. {} [{}]", i + 1, str_field(p, "name"), state);
            }
            println!(
                "\nTotal: {} | Active: {}",
                json["total"].as_u64().unwrap_or(0),
                json["active"].as_u64().unwrap_or(0)
            );
        }
        CliCommand::Transcripts => {
            let json = client.get("/meetings/current/transcripts?format=text").await?;
            let text = str_field(&json, "text");
            if text.is_empty() {
                println!("No transcript yet.");
            } else {
                print!("{}", text);
            }
        }
        CliCommand::Summary => {
            let json = client.post("/actions/summarize_meeting", json!({})).await?;
            println!("{}", str_field(&json, "message"));
        }
        CliCommand::Report(args) => {
            let json = client
                .get(&format!(
                    "/meetings/current/report?include_transcript={}",
                    args.transcript
                ))
                .await?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        CliCommand::Create(args) => {
            let json = client
                .post(
                    "/meetings/create",
                    json!({ "title": args.title, "access_type": args.access }),
                )
                .await?;
            let meeting = &json["meeting"];
            println!("Meeting created: {}", str_field(meeting, "meeting_uri"));
            println!("Code: {}", str_field(meeting, "meeting_code"));
            println!("Access: {}", str_field(&json, "access_type"));
        }
        CliCommand::Control(args) => {
            client
                .post(&format!("/controls/{}", args.action), json!({}))
                .await?;
            println!("Sent {}", args.action);
        }
        CliCommand::Version | CliCommand::Relay(_) => {}
    }

    Ok(())
}

async fn show_status(client: &ServiceClient) -> Result<()> {
    let info = client.get("/").await?;
    println!("Backend: {}", str_field(&info, "backend"));

    if !info["in_meeting"].as_bool().unwrap_or(false) {
        println!("No meeting in progress");
        return Ok(());
    }

    let json = client.get("/meetings/current").await?;
    let meeting = &json["meeting"];
    let participants = meeting["participants"].as_array().map(Vec::len).unwrap_or(0);
    let segments = meeting["transcripts"].as_array().map(Vec::len).unwrap_or(0);

    println!("Meeting: {}", str_field(meeting, "meeting_uri"));
    println!("Status: {}", str_field(meeting, "status"));
    println!("Duration: {} minutes", json["duration_minutes"].as_i64().unwrap_or(0));
    println!("Participants: {}", participants);
    println!("Transcript segments: {}", segments);
    Ok(())
}

async fn list_meetings(client: &ServiceClient) -> Result<()> {
    let json = client.get("/meetings").await?;
    let meetings = json["meetings"].as_array().cloned().unwrap_or_default();

    if meetings.is_empty() {
        println!("No meetings yet.");
        return Ok(());
    }

    for meeting in meetings {
        let marker = if meeting["current"].as_bool().unwrap_or(false) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {} [{}] started {} - {} participants, {} segments",
            marker,
            str_field(&meeting, "meeting_code"),
            str_field(&meeting, "status"),
            str_field(&meeting, "started_at"),
            meeting["participants"].as_u64().unwrap_or(0),
            meeting["transcript_segments"].as_u64().unwrap_or(0)
        );
    }
    Ok(())
}

pub async fn handle_relay_command(args: RelayCliArgs) -> Result<()> {
    let port = match args.port {
        Some(port) => port,
        None => Config::load()?.extension.ws_port,
    };

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping relay");
            ctrl_c.cancel();
        }
    });

    run_stdio(RelaySettings::for_port(port), shutdown).await
}
