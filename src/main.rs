use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;

use amerpire::config::Config;
use amerpire::controller::Notification;
use amerpire::logging;
use amerpire::model::{CatalogEntry, FilePreferences};
use amerpire::storage::DataDirectory;
use amerpire::Library;

/// Amerpire - your downloaded music, from the terminal
#[derive(Parser, Debug)]
#[command(name = "amerpire", version, about)]
struct Args {
    /// Use this config file instead of the default one
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List downloaded songs
    Songs,
    /// List playlists
    Playlists,
    /// List channels (songs grouped by author)
    Channels,
    /// Add a downloaded audio file with its catalog entry (JSON)
    Import { file: PathBuf, metadata: PathBuf },
    /// Create a playlist, optionally with songs
    CreatePlaylist { name: String, songs: Vec<String> },
    DeleteSong { id: String },
    DeletePlaylist { id: String },
    /// Play a song until it ends or Ctrl-C
    Play { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    let _log_guard = match logging::init_logging(&config.log_dir) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: Failed to initialize logging: {}", e);
            None
        }
    };
    tracing::info!(command = ?args.command, "=== Amerpire starting ===");

    let library = Library::new(
        Arc::new(FilePreferences::new(config.preferences_dir())),
        Arc::new(DataDirectory::new(config.songs_dir())),
    );
    library
        .activate()
        .await
        .context("loading the library")?;
    let mut notices = library.notifications();

    let result = run(args.command, &library, &config, &mut notices).await;
    if let Err(e) = &result {
        tracing::error!(error = ?e, "Command failed");
    }
    tracing::info!("Amerpire shutting down");
    result
}

async fn run(
    command: Command,
    library: &Library,
    config: &Config,
    notices: &mut broadcast::Receiver<Notification>,
) -> Result<()> {
    match command {
        Command::Songs => {
            for song in library.songs().get() {
                let init = song.init();
                println!(
                    "{}  {} - {} [{}]",
                    song.id(),
                    song.author(),
                    song.title(),
                    init.time
                );
            }
        }
        Command::Playlists => {
            let songs = library.songs().get();
            for playlist in library.playlists().get() {
                println!("{}  {} ({} songs)", playlist.id(), playlist.name(), playlist.len());
                for song in playlist.songs(&songs) {
                    println!("    {} - {}", song.author(), song.title());
                }
            }
        }
        Command::Channels => {
            for channel in library.channels().get() {
                println!("{} ({} songs)", channel.name(), channel.songs().len());
            }
        }
        Command::Import { file, metadata } => {
            let payload = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let raw = tokio::fs::read_to_string(&metadata)
                .await
                .with_context(|| format!("reading {}", metadata.display()))?;
            let entry: CatalogEntry =
                serde_json::from_str(&raw).context("parsing catalog entry")?;

            let saved = library.song_save(&payload, entry).await;
            print_pending(notices);
            if !saved {
                bail!("import failed");
            }
        }
        Command::CreatePlaylist { name, songs } => {
            let ids = (!songs.is_empty()).then_some(songs);
            let playlist = library.playlist_create(name, ids)?;
            // Saving happens in the background and reports back here
            let outcome = notices.recv().await?;
            println!("{}", outcome);
            println!("{}", playlist.id());
        }
        Command::DeleteSong { id } => {
            let song = library
                .find_song(&id)
                .with_context(|| format!("no song with id {}", id))?;
            let deleted = song.destroy(library).await;
            print_pending(notices);
            if !deleted {
                bail!("could not delete {}", id);
            }
        }
        Command::DeletePlaylist { id } => {
            let playlist = library
                .find_playlist(&id)
                .with_context(|| format!("no playlist with id {}", id))?;
            let deleted = playlist.destroy(library).await;
            print_pending(notices);
            if !deleted {
                bail!("could not delete {}", id);
            }
        }
        Command::Play { id } => play(library, config, &id).await?,
    }
    Ok(())
}

fn print_pending(notices: &mut broadcast::Receiver<Notification>) {
    while let Ok(notice) = notices.try_recv() {
        println!("{}", notice);
    }
}

#[cfg(feature = "rodio")]
async fn play(library: &Library, config: &Config, id: &str) -> Result<()> {
    use amerpire::Player;
    use amerpire::audio::{MediaSession, RodioFactory, TracingSession};

    let song = library
        .find_song(id)
        .with_context(|| format!("no song with id {}", id))?;

    let session: Option<Arc<dyn MediaSession>> = if config.media_session {
        let (session, _actions) = TracingSession::new();
        Some(Arc::new(session))
    } else {
        None
    };
    let player = Player::new(
        library.clone(),
        Arc::new(RodioFactory::new()),
        session,
        config.poll_interval(),
    );

    player.play(&song)?;
    println!("Playing {} - {}", song.author(), song.title());

    let mut playing = player.is_playing().subscribe();
    let mut progress = player.progress_time().subscribe();
    playing.wait_for(|p| *p).await?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = playing.changed() => {
                if changed.is_err() || !*playing.borrow_and_update() {
                    break;
                }
            }
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
                let time = progress.borrow_and_update().clone();
                println!("{} / {}", time, player.duration_time().get());
            }
        }
    }

    let stopped_at = player.progress_time().get();
    player.destroy();
    println!("Stopped at {}", stopped_at);
    Ok(())
}

#[cfg(not(feature = "rodio"))]
async fn play(_library: &Library, _config: &Config, id: &str) -> Result<()> {
    tracing::warn!(song_id = id, "Playback requested without an audio backend");
    bail!("playback needs the `rodio` feature: cargo run --features rodio -- play {}", id)
}
