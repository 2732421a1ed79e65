use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, bail};
use gutterline::config::{Args, Command, Settings, SettingsView, TargetKind};
use gutterline::engine::Engine;
use gutterline::file_host::{FileHost, Update};
use gutterline::git::{Choice, locate};
use gutterline::host::{BufferId, Publication};
use gutterline::logging;
use gutterline::monitor::{FileChange, FileMonitor};
use gutterline::popup::PopupModel;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

include!(concat!(env!("OUT_DIR"), "/build_commit.rs"));

const BUFFER: BufferId = 1;
const UPDATE_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.version {
        println!(
            "gutterline version {} (git: {BUILD_COMMIT})",
            env!("CARGO_PKG_VERSION")
        );
        return Ok(());
    }

    let user_settings = Settings::load_user()?;
    let view_settings = Settings::from_args(&args);

    logging::init_logging(args.debug || user_settings.debug.unwrap_or(false))?;
    color_eyre::install()?;

    let Some(command) = args.command.clone() else {
        bail!("No command given, see `gutterline --help`");
    };
    debug!("Running {command:?}");

    let host = Arc::new(FileHost::new(view_settings.clone()));
    if let Some(encoding) = &args.encoding {
        host.set_encoding(encoding);
    }
    let engine = Engine::new(host.clone(), user_settings.clone())?;
    if !engine.git_available() {
        warn!("git is not available");
    }

    match command {
        Command::Diff { file, json } => {
            let mut updates = open_tracked(&engine, &host, &file)?;
            engine.on_load(BUFFER);
            let publication = next_publication(&mut updates).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&publication)?);
            } else {
                print_regions(&publication);
            }
        }
        Command::Status { file } => {
            let mut updates = open_tracked(&engine, &host, &file)?;
            engine.on_load(BUFFER);
            let publication = next_publication(&mut updates).await?;
            println!("{}", publication.status_text.unwrap_or_default());
        }
        Command::Popup { file, line } => {
            let mut updates = open_tracked(&engine, &host, &file)?;
            host.set_cursor_line(BUFFER, line);
            engine.on_load(BUFFER);
            let publication = next_publication(&mut updates).await?;

            let settings = layered_settings(&file, view_settings, user_settings);
            let change = publication
                .parser
                .line_change(line, settings.next_prev_change_wrap());
            let text = std::fs::read_to_string(&file)
                .wrap_err_with(|| format!("Failed to read {file:?}"))?;
            match PopupModel::build(&change, &text, settings.tab_width()) {
                Some(model) => println!("{}", serde_json::to_string_pretty(&model)?),
                None => println!("Line {line} is unchanged"),
            }
        }
        Command::Targets { file, kind } => {
            let _updates = host.open(BUFFER, &file);
            let choices = match kind {
                TargetKind::Branches => engine.list_branches(BUFFER),
                TargetKind::Tags => engine.list_tags(BUFFER),
                TargetKind::Commits => engine.list_commits(BUFFER),
                TargetKind::FileCommits => engine.list_file_commits(BUFFER),
            }
            .await?;
            print_choices(&choices);
        }
        Command::Watch {
            file,
            poll_interval,
        } => watch_file(&engine, &host, &file, poll_interval).await?,
    }

    engine.cancel_pending();
    Ok(())
}

/// Open `file` as the CLI buffer, refusing files the engine would never track.
fn open_tracked(
    engine: &Engine,
    host: &FileHost,
    file: &Path,
) -> Result<watch::Receiver<Update>> {
    if !file.is_file() {
        bail!("{} is not a file", file.display());
    }
    if locate(file).is_none() {
        bail!("{} is not inside a working tree", file.display());
    }
    let updates = host.open(BUFFER, file);
    if !engine.is_trackable(BUFFER) {
        host.close(BUFFER);
        bail!(
            "Tracking is disabled for {} (check \"enable\" and --encoding)",
            file.display()
        );
    }
    Ok(updates)
}

async fn next_publication(updates: &mut watch::Receiver<Update>) -> Result<Publication> {
    let update = tokio::time::timeout(
        UPDATE_TIMEOUT,
        updates.wait_for(|update| matches!(update, Update::Published(_))),
    )
    .await
    .wrap_err("Timed out waiting for the diff")??;
    match &*update {
        Update::Published(publication) => Ok(publication.as_ref().clone()),
        _ => bail!("No publication received"),
    }
}

fn layered_settings(file: &Path, view: Settings, user: Settings) -> SettingsView {
    let project = locate(file)
        .and_then(|worktree| Settings::load_project(&worktree.root).ok())
        .unwrap_or_default();
    SettingsView::from_layers(view, project, user)
}

fn join_lines(lines: &[usize]) -> String {
    lines
        .iter()
        .map(|line| line.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn print_regions(publication: &Publication) {
    let regions = &publication.regions;
    println!("state: {}", publication.status.state.as_str());
    if regions.is_empty() {
        println!("no changes");
    } else {
        println!("lines {}..{}", regions.first_line, regions.last_line);
        println!("inserted: {}", join_lines(&regions.inserted));
        println!("modified: {}", join_lines(&regions.modified));
        println!("deleted: {}", join_lines(&regions.deleted));
    }
    if let Some(text) = &publication.status_text {
        println!("{text}");
    }
    if let Some(annotation) = &publication.annotation {
        println!("{annotation}");
    }
}

fn print_choices(choices: &[Choice]) {
    for choice in choices {
        if choice.detail.is_empty() {
            println!("{}", choice.title);
        } else {
            println!("{}\t{}", choice.title, choice.detail);
        }
    }
}

async fn watch_file(
    engine: &Engine,
    host: &FileHost,
    file: &Path,
    poll_interval: u64,
) -> Result<()> {
    let mut updates = host.open(BUFFER, file);
    let mut monitor = FileMonitor::new(file, Duration::from_millis(poll_interval.max(10)));
    let mut ticker = tokio::time::interval(monitor.interval());
    engine.on_load(BUFFER);
    info!("Watching {file:?}");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let update = updates.borrow_and_update().clone();
                match update {
                    Update::Published(publication) => {
                        println!("--- {}", chrono::Local::now().format("%H:%M:%S"));
                        print_regions(&publication);
                    }
                    Update::Cleared => println!("--- cleared"),
                    Update::Pending => {}
                }
            }
            _ = ticker.tick() => {
                match monitor.poll() {
                    Some(FileChange::Modified) => engine.on_modified(BUFFER),
                    Some(FileChange::Saved) => engine.on_post_save(BUFFER),
                    Some(FileChange::Removed) => {
                        println!("{} was removed", file.display());
                        engine.on_close(BUFFER);
                        break;
                    }
                    None => {}
                }
            }
        }
    }

    host.close(BUFFER);
    engine.collect_garbage();
    Ok(())
}
