//! Line-oriented command reader for the console front-end.

use std::io::BufRead;

use log::warn;
use tokio::sync::broadcast::Sender;

use crate::protocol::{
    Message, PlaylistMessage, SeekBarMessage, SessionMessage, TrackGeometry, TransportMessage,
};

/// Virtual progress track used by `drag`; one unit per percent.
const CONSOLE_TRACK: TrackGeometry = TrackGeometry {
    left: 0.0,
    width: 100.0,
};

pub const HELP_TEXT: &str = "\
commands:
  play | pause | toggle   start the session or flip play/pause
  seek <seconds>          jump to a position
  drag <percent> [...]    drag the progress knob through each percent, then release
  speed <0.5|1|2|5>       change playback speed
  next | prev             switch session
  select <index>          switch to a playlist entry
  playlist                refresh and show the playlist
  stop                    end the session
  quit                    exit";

#[derive(Debug, Clone)]
pub enum ConsoleCommand {
    Send(Vec<Message>),
    Help,
    Quit,
}

fn parse_number<T: std::str::FromStr>(argument: Option<&str>, usage: &str) -> Result<T, String> {
    argument
        .and_then(|value| value.parse::<T>().ok())
        .ok_or_else(|| format!("usage: {usage}"))
}

/// Parses one input line. Empty lines parse to an empty send.
pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(ConsoleCommand::Send(Vec::new()));
    };
    let command = match verb.to_ascii_lowercase().as_str() {
        "play" | "pause" | "toggle" => ConsoleCommand::Send(vec![Message::Transport(
            TransportMessage::TogglePlayPause,
        )]),
        "seek" => {
            let seconds: f64 = parse_number(words.next(), "seek <seconds>")?;
            ConsoleCommand::Send(vec![Message::Transport(TransportMessage::SeekSeconds(
                seconds,
            ))])
        }
        "drag" => {
            let mut points = Vec::new();
            for word in words.by_ref() {
                points.push(parse_number::<f64>(Some(word), "drag <percent> [...]")?);
            }
            let Some((first, rest)) = points.split_first() else {
                return Err("usage: drag <percent> [...]".to_string());
            };
            let mut messages = vec![Message::SeekBar(SeekBarMessage::PointerDown {
                x: *first,
                track: CONSOLE_TRACK,
            })];
            messages.extend(rest.iter().map(|x| {
                Message::SeekBar(SeekBarMessage::PointerMove {
                    x: *x,
                    track: CONSOLE_TRACK,
                })
            }));
            messages.push(Message::SeekBar(SeekBarMessage::PointerUp));
            ConsoleCommand::Send(messages)
        }
        "speed" => {
            let speed: f64 = parse_number(words.next(), "speed <0.5|1|2|5>")?;
            ConsoleCommand::Send(vec![Message::Transport(TransportMessage::SetSpeed(speed))])
        }
        "next" => ConsoleCommand::Send(vec![Message::Playlist(PlaylistMessage::Next)]),
        "prev" | "previous" => {
            ConsoleCommand::Send(vec![Message::Playlist(PlaylistMessage::Previous)])
        }
        "select" => {
            let index: usize = parse_number(words.next(), "select <index>")?;
            ConsoleCommand::Send(vec![Message::Playlist(PlaylistMessage::SelectByIndex(
                index,
            ))])
        }
        "playlist" => ConsoleCommand::Send(vec![Message::Playlist(PlaylistMessage::Refresh)]),
        "stop" => ConsoleCommand::Send(vec![Message::Transport(TransportMessage::Stop)]),
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{other}', type 'help'")),
    };
    Ok(command)
}

/// Reads commands until `quit` or end of input, then asks every component to
/// shut down.
pub fn run_console_input<R: BufRead>(input: R, bus_producer: Sender<Message>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("ConsoleInput: failed to read stdin: {}", err);
                break;
            }
        };
        match parse_command(&line) {
            Ok(ConsoleCommand::Send(messages)) => {
                for message in messages {
                    let _ = bus_producer.send(message);
                }
            }
            Ok(ConsoleCommand::Help) => println!("{HELP_TEXT}"),
            Ok(ConsoleCommand::Quit) => break,
            Err(message) => println!("{message}"),
        }
    }
    let _ = bus_producer.send(Message::Session(SessionMessage::Shutdown));
}
