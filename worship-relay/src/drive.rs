//! Keyboard presenter: reads commands from stdin and broadcasts slide changes.
//!
//! ```text
//! n | next        advance one slide (crosses into the next song at the end)
//! p | prev        step back one slide
//! s <song id>     jump to a song's title slide
//! m <text>        show a live message on every screen
//! q | quit        leave
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use worship_core::SongId;
use worship_live::{
    DriverAction, DriverCapability, Gesture, LiveConfig, NavigationController, PeerInfo,
    SyncChannel,
};

use crate::cli::{load_event, DriveArgs};
use crate::view::describe;

const ECHO_WAIT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Navigate(Gesture),
    Song(SongId),
    Message(String),
    Quit,
}

pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    match head {
        "n" | "next" => Some(Command::Navigate(Gesture::Advance)),
        "p" | "prev" => Some(Command::Navigate(Gesture::Retreat)),
        "s" | "song" => rest.parse().ok().map(Command::Song),
        "m" | "msg" if !rest.is_empty() => Some(Command::Message(rest.to_string())),
        "q" | "quit" => Some(Command::Quit),
        _ => None,
    }
}

pub async fn run_drive(args: DriveArgs, mut config: LiveConfig) -> Result<()> {
    args.connect.apply(&mut config);
    let event = load_event(&args.event_file)?;
    // Running `drive` is the permission decision for this client.
    let capability = DriverCapability::grant(true).context("driving not permitted")?;

    let channel = SyncChannel::connect(
        config.channel,
        event.id,
        PeerInfo::new(args.connect.name.clone()),
        args.connect.token_provider(),
    );
    let navigation = NavigationController::new(&event);
    log::info!(
        "Driving event {} ({}) with {} songs",
        event.id,
        event.title,
        event.songs.len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(command) = parse_command(&line) else {
            if !line.trim().is_empty() {
                eprintln!("unknown command: {}", line.trim());
            }
            continue;
        };

        let state = channel.snapshot();
        let actions = match command {
            Command::Navigate(gesture) => navigation.handle(gesture, &state),
            Command::Song(song_id) => navigation.jump_to_song(song_id),
            Command::Message(text) => vec![DriverAction::LiveMessage(text)],
            Command::Quit => break,
        };
        if actions.is_empty() {
            continue;
        }

        let mut slides = channel.presentation().subscribe();
        drop(slides.borrow_and_update());
        if let Err(e) = channel.send_all(&capability, actions).await {
            log::warn!("Not sent ({:?}): {e}", channel.status());
            continue;
        }
        // The relay echoes our own messages back.
        let _ = tokio::time::timeout(ECHO_WAIT, slides.changed()).await;
        println!("{}", describe(&channel.snapshot(), Some(&event)));
    }

    channel.close();
    Ok(())
}
