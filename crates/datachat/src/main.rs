use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use datachat_core::{
    config::Config,
    engine::{ChatSession, SubmitOutcome},
    events::ChannelObserver,
    scheduler::TokioScheduler,
};

mod commands;
mod render;

use commands::{Command, Input};
use render::TranscriptView;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    datachat_core::logging::init("datachat")?;

    let cfg = Config::load()?;
    let rules = cfg.rule_set()?;
    match &cfg.rules_file {
        Some(path) => info!("loaded {} rules from {}", rules.rules().len(), path.display()),
        None => info!("using built-in rules"),
    }

    let (observer, mut events) = ChannelObserver::new();
    let session = ChatSession::new(
        cfg.engine.clone(),
        rules,
        Arc::new(TokioScheduler::new()),
        Arc::new(observer),
    )?;

    let mut view = TranscriptView::default();
    println!("{}", commands::BANNER);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut quit = false;
    loop {
        tokio::select! {
          ev = events.recv() => {
            let Some(ev) = ev else { break; };
            view.print(&ev);
          }
          line = lines.next_line() => {
            let Some(line) = line.context("failed to read stdin")? else {
              break;
            };
            match commands::parse(&line) {
              Input::Text(text) => match session.submit(&text) {
                Ok(SubmitOutcome::Accepted(_)) => {}
                Ok(SubmitOutcome::Queued { position }) => {
                  println!("(queued, {position} ahead of you)");
                }
                Err(e) if e.is_recoverable() => println!("! {e}"),
                Err(e) => return Err(e.into()),
              },
              Input::Blank => {}
              Input::Command(Command::Help) => println!("{}", commands::HELP),
              Input::Command(Command::History) => view.print_history(&session.snapshot()),
              Input::Command(Command::Export(path)) => {
                match commands::export_transcript(&session.snapshot(), &path) {
                  Ok(()) => println!("transcript written to {}", path.display()),
                  Err(e) => println!("! export failed: {e:#}"),
                }
              }
              Input::Command(Command::Usage(usage)) => println!("usage: {usage}"),
              Input::Command(Command::Unknown(name)) => {
                println!("! unknown command /{name}, try /help");
              }
              Input::Command(Command::Quit) => {
                quit = true;
                break;
              }
            }
          }
        }
    }

    // On end of input, let a pending reply land before leaving.
    if !quit {
        while session.is_composing() {
            let Some(ev) = events.recv().await else {
                break;
            };
            view.print(&ev);
        }
        while let Ok(ev) = events.try_recv() {
            view.print(&ev);
        }
    }

    session.close();
    Ok(())
}
