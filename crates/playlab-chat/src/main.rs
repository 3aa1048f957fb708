//! Interactive terminal chat with a Playlab app.
//!
//! Credentials come from flags, the environment or a `.env` file. Each input
//! line is sent as a message; lines starting with `/` are commands (`/help`).

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use playlab_client::prelude::*;
use playlab_client::init_observability;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Playlab API key
    #[arg(long, env = "PLAYLAB_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Project (app) to chat with
    #[arg(long, env = "PLAYLAB_PROJECT_ID")]
    project_id: Option<String>,

    /// Override the API root (proxies, local servers)
    #[arg(long, env = "PLAYLAB_BASE_URL")]
    base_url: Option<String>,

    /// Resume an existing conversation instead of starting with a new one
    #[arg(long)]
    conversation: Option<String>,

    /// Instruction variable for the new conversation, as KEY=VALUE (repeatable)
    #[arg(long = "var", value_parser = parse_var)]
    vars: Vec<(String, serde_json::Value)>,

    /// Print replies as they stream in
    #[arg(long)]
    stream: bool,

    /// Display mode: auto, plain or rich
    #[arg(long, default_value = "auto")]
    display: DisplayMode,

    /// Send text messages form-encoded instead of JSON
    #[arg(long)]
    form: bool,

    /// Do not echo the exchange; only print replies
    #[arg(long, short)]
    quiet: bool,
}

/// Parses `KEY=VALUE`; the value is read as a number or boolean when it looks
/// like one and as text otherwise.
fn parse_var(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing variable name in `{raw}`"));
    }
    let value = match serde_json::from_str::<serde_json::Value>(value) {
        Ok(v @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => v,
        _ => serde_json::Value::String(value.to_string()),
    };
    Ok((key.to_string(), value))
}

#[derive(Debug, PartialEq)]
enum Command {
    Send(String),
    Attach { path: PathBuf, message: String },
    Reset,
    System,
    History,
    Help,
    Quit,
    Empty,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Send(line.to_string()));
    };
    let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
    match name {
        "reset" => Ok(Command::Reset),
        "system" => Ok(Command::System),
        "history" => Ok(Command::History),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "attach" => {
            let (path, message) = args
                .trim()
                .split_once(' ')
                .ok_or_else(|| "usage: /attach <path> <message>".to_string())?;
            Ok(Command::Attach {
                path: PathBuf::from(path),
                message: message.trim().to_string(),
            })
        }
        other => Err(format!("unknown command /{other} (try /help)")),
    }
}

const HELP: &str = "\
/attach <path> <message>  send a message with a file
/reset                    start a new conversation
/system                   show the app's instructions
/history                  list the messages so far
/quit                     leave";

fn build_client(cli: &Cli) -> Result<PlaylabClient, PlaylabError> {
    let mut config = ClientConfig::resolve(cli.api_key.clone(), cli.project_id.clone())?
        .verbose(!cli.quiet)
        .display(cli.display);
    if let Some(base_url) = &cli.base_url {
        config = config.base_url(base_url.clone());
    }

    let mut builder = PlaylabClient::builder(config);
    if !cli.vars.is_empty() {
        let object = cli.vars.iter().cloned().collect::<serde_json::Map<_, _>>();
        builder =
            builder.instruction_variables(InstructionVariables::from_json(object.into())?);
    }
    let mut client = builder.connect()?;
    if let Some(id) = &cli.conversation {
        client.load_conversation(id)?;
    }
    Ok(client)
}

fn run_command(
    client: &mut PlaylabClient,
    command: Command,
    options: &SendOptions,
    quiet: bool,
) -> Result<bool, PlaylabError> {
    let print_reply = |reply: &str| {
        if quiet {
            println!("{reply}");
        }
    };
    match command {
        Command::Empty => {}
        Command::Send(text) => print_reply(&client.send_message(&text, options.clone())?),
        Command::Attach { path, message } => {
            let reply = client.send_message(&message, options.clone().attachment(path))?;
            print_reply(&reply);
        }
        Command::Reset => client.reset_chat()?,
        Command::System => client.display_system_prompt()?,
        Command::History => {
            for message in client.list_messages()? {
                println!("[{:?}] {}", message.source, message.content);
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_observability();
    let cli = Cli::parse();
    debug!(display = ?cli.display, stream = cli.stream, quiet = cli.quiet, "starting playlab chat");

    let mut client = build_client(&cli)?;
    if let Some(id) = client.conversation_id() {
        eprintln!("conversation {id} (type /help for commands)");
    }
    let options = SendOptions {
        streaming: cli.stream,
        encoding: if cli.form {
            BodyEncoding::Form
        } else {
            BodyEncoding::Json
        },
        ..SendOptions::default()
    };

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                eprintln!("{message}");
                continue;
            }
        };
        match run_command(&mut client, command, &options, cli.quiet) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => eprintln!("error: {err}"),
        }
    }
    Ok(())
}
