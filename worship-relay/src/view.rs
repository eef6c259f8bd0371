//! Read-only screen: prints every slide change for an event.

use anyhow::{bail, Result};
use worship_core::{group_by_structure, Event, Slide};
use worship_live::{LiveConfig, PeerInfo, PresentationState, SyncChannel};

use crate::cli::{load_event, ViewArgs};

pub async fn run_view(args: ViewArgs, mut config: LiveConfig) -> Result<()> {
    args.connect.apply(&mut config);
    let event = args.event_file.as_deref().map(load_event).transpose()?;
    let event_id = match (args.event, &event) {
        (Some(id), _) => id,
        (None, Some(event)) => event.id,
        (None, None) => bail!("pass --event or --event-file"),
    };

    let channel = SyncChannel::connect(
        config.channel,
        event_id,
        PeerInfo::new(args.connect.name.clone()),
        args.connect.token_provider(),
    );
    let mut status = channel.subscribe_status();
    let mut slides = channel.presentation().subscribe();
    log::info!("Following event {event_id}");

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                log::info!("Connection: {current:?}");
                if current.is_terminal() {
                    bail!("connection ended: {current:?}");
                }
            }
            changed = slides.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = slides.borrow_and_update().clone();
                println!("{}", describe(&state, event.as_ref()));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    channel.close();
    Ok(())
}

/// Text rendering of the current slide.
pub fn describe(state: &PresentationState, event: Option<&Event>) -> String {
    let mut out = String::new();
    if let Some(message) = &state.live_message {
        out.push_str(&format!("[{message}]\n"));
    }
    if !state.has_song() {
        out.push_str("(waiting for the presenter)");
        return out;
    }

    let position = state.lyric_position.position;
    let Some(song) = event.and_then(|e| e.song(state.selected_song_id)) else {
        out.push_str(&format!(
            "song {} at {position} ({:?}) by {}",
            state.selected_song_id, state.lyric_position.action, state.driver_name
        ));
        return out;
    };

    match Slide::resolve(song, position) {
        Slide::Title { title, artist } => {
            out.push_str(&format!("== {title} =="));
            if let Some(artist) = artist {
                out.push_str(&format!("\n   {artist}"));
            }
        }
        Slide::Lines(lines) => {
            let sections = group_by_structure(lines);
            for (i, section) in sections.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                out.push_str(&format!("[{}]", section.structure));
                for line in &section.lines {
                    out.push_str(&format!("\n  {}", line.text));
                }
            }
        }
        Slide::End => out.push_str(&format!("(end of {})", song.title)),
    }
    out
}
