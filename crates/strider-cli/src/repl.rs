//! REPL – operator console for a running [`RobotService`].
//!
//! Supported slash-commands:
//!   /help            – show this list
//!   /status          – mode, autonomy, queue depth, idle, worker health
//!   /move <x> <y>    – joystick vector in [-1, 1]
//!   /head <qx> <qy>  – head pan/tilt in [-100, 100]
//!   /action <name>   – play a named action
//!   /stop            – stop the legs
//!   /auto on|off     – toggle the autonomous routine
//!   /sensor          – read the distance sensor
//!   /quit | /exit    – shut down and exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strider_runtime::RobotService;
use strider_types::{ActionKind, HeadVector, MoveAck, MoveRequest, StriderError};
use tokio::runtime::Handle;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Status,
    Move { x: f32, y: f32 },
    Head { qx: f32, qy: f32 },
    Action(String),
    Stop,
    Auto(bool),
    Sensor,
    Quit,
}

/// Parse one input line.  `Err` carries a usage hint.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".to_string());
    };
    let args: Vec<&str> = words.collect();

    let floats = |usage: &str| -> Result<(f32, f32), String> {
        match args.as_slice() {
            [a, b] => match (a.parse::<f32>(), b.parse::<f32>()) {
                (Ok(a), Ok(b)) => Ok((a, b)),
                _ => Err(format!("usage: {usage}")),
            },
            _ => Err(format!("usage: {usage}")),
        }
    };

    match head {
        "/help" => Ok(Command::Help),
        "/status" => Ok(Command::Status),
        "/move" => floats("/move <x> <y>").map(|(x, y)| Command::Move { x, y }),
        "/head" => floats("/head <qx> <qy>").map(|(qx, qy)| Command::Head { qx, qy }),
        "/action" => match args.as_slice() {
            [name] => Ok(Command::Action((*name).to_string())),
            _ => Err("usage: /action <name>".to_string()),
        },
        "/stop" => Ok(Command::Stop),
        "/auto" => match args.as_slice() {
            ["on"] => Ok(Command::Auto(true)),
            ["off"] => Ok(Command::Auto(false)),
            _ => Err("usage: /auto on|off".to_string()),
        },
        "/sensor" => Ok(Command::Sensor),
        "/quit" | "/exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{other}'")),
    }
}

/// Run until `/quit`, end of input, or `shutdown` is raised.
pub fn run(service: &RobotService, runtime: &Handle, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "strider>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_command(line) {
            Ok(Command::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Ok(command) => execute(command, service, runtime),
            Err(hint) => println!(
                "{} {}. Type {} for available commands.",
                "Error:".red(),
                hint.yellow(),
                "/help".bold()
            ),
        }
    }
}

fn execute(command: Command, service: &RobotService, runtime: &Handle) {
    match command {
        Command::Help => cmd_help(),
        Command::Status => cmd_status(service),
        Command::Move { x, y } => match service.submit_move(MoveRequest::vector(x, y)) {
            Ok(MoveAck::Queued { directive }) => {
                println!("{} {}", "queued".green(), directive.to_string().bold())
            }
            Ok(MoveAck::Cached) => println!("{}", "cached (debounced)".dimmed()),
            Err(err) => report(&err),
        },
        Command::Head { qx, qy } => match service.submit_head(HeadVector { qx, qy }) {
            Ok(()) => println!("{}", "head move queued".green()),
            Err(err) => report(&err),
        },
        Command::Action(name) => match service.submit_action(&name) {
            Ok(kind) => println!("{} {}", "queued".green(), kind.to_string().bold()),
            Err(StriderError::UnknownAction(_)) => {
                println!("{} '{}'", "Unknown action:".red(), name.yellow());
                let known: Vec<&str> = ActionKind::ALL.iter().map(|k| k.as_str()).collect();
                println!("  Known actions: {}", known.join(", "));
            }
            Err(err) => report(&err),
        },
        Command::Stop => match service.submit_stop() {
            Ok(()) => println!("{}", "stop queued".green()),
            Err(err) => report(&err),
        },
        Command::Auto(on) => {
            let enabled = service.set_autonomous(on);
            let label = if enabled { "on".green() } else { "off".yellow() };
            println!("  Autonomous mode: {}", label.bold());
        }
        Command::Sensor => {
            let snapshot = runtime.block_on(service.sensor_snapshot());
            match snapshot.distance_cm {
                Some(cm) => println!("  Distance: {} cm", format!("{cm:.1}").bold()),
                None => println!("  Distance: {}", "no reading".dimmed()),
            }
        }
        Command::Quit => {}
    }
}

fn cmd_help() {
    println!();
    println!("{}", "Strider Commands".bold().underline());
    println!("  {}        – robot status", "/status".bold().cyan());
    println!("  {}   – joystick vector in [-1, 1]", "/move x y".bold().cyan());
    println!("  {} – head pan/tilt in [-100, 100]", "/head qx qy".bold().cyan());
    println!("  {}  – play an action", "/action name".bold().cyan());
    println!("  {}          – stop the legs", "/stop".bold().cyan());
    println!("  {}  – toggle autonomous mode", "/auto on|off".bold().cyan());
    println!("  {}        – read the distance sensor", "/sensor".bold().cyan());
    println!("  {}  – shut down and exit", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_status(service: &RobotService) {
    let status = service.status();
    println!("{}", "Robot Status".bold().underline());
    println!("  Mode        : {}", status.mode.to_string().yellow());
    println!(
        "  Autonomous  : {}",
        if status.autonomous_enabled { "on".green() } else { "off".dimmed() }
    );
    println!("  Queue depth : {}", status.queue_depth);
    println!(
        "  Actuator    : {}",
        if status.idle { "idle".green() } else { "busy".yellow() }
    );
    println!(
        "  Worker      : {}",
        if status.worker_healthy { "healthy".green() } else { "timed out".red() }
    );
}

fn report(err: &StriderError) {
    match err {
        StriderError::QueueFull => println!("{}", "busy – try again".yellow()),
        other => println!("{} {}", format!("{}:", other.kind()).red(), other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_motion_commands() {
        assert_eq!(
            parse_command("/move 0 0.8"),
            Ok(Command::Move { x: 0.0, y: 0.8 })
        );
        assert_eq!(
            parse_command("/head -40 10"),
            Ok(Command::Head { qx: -40.0, qy: 10.0 })
        );
        assert_eq!(parse_command("/stop"), Ok(Command::Stop));
    }

    #[test]
    fn parses_action_and_auto() {
        assert_eq!(
            parse_command("/action wag_tail"),
            Ok(Command::Action("wag_tail".to_string()))
        );
        assert_eq!(parse_command("/auto on"), Ok(Command::Auto(true)));
        assert_eq!(parse_command("/auto off"), Ok(Command::Auto(false)));
    }

    #[test]
    fn quit_aliases() {
        assert_eq!(parse_command("/quit"), Ok(Command::Quit));
        assert_eq!(parse_command("/exit"), Ok(Command::Quit));
    }

    #[test]
    fn bad_arguments_give_usage() {
        assert!(parse_command("/move 1").unwrap_err().contains("usage"));
        assert!(parse_command("/move a b").unwrap_err().contains("usage"));
        assert!(parse_command("/auto maybe").unwrap_err().contains("usage"));
        assert!(parse_command("/action").unwrap_err().contains("usage"));
    }

    #[test]
    fn unknown_command_is_named() {
        assert_eq!(
            parse_command("/dance"),
            Err("unknown command '/dance'".to_string())
        );
    }
}
