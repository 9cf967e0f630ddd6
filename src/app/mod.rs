//! Surfaces: the interactive chat loop, one-shot `ask`, `health` and the
//! thread listing commands.

pub mod ask;
pub mod health;
pub mod threads;

use crate::api::{ChatBackend, OllamaClient};
use crate::config::Config;
use crate::error::{GhostError, Result};
use crate::runtime::{TurnEvent, TURN_CHANNEL_CAPACITY};
use crate::state::{ConversationManager, TurnInput, TurnOutcome, TurnSettings};
use crate::store::ThreadStore;
use crate::terminal::TerminalSession;
use crate::tools::builtin_registry;
use crate::ui::render;
use crate::ui::{ChatView, ViewCommand};
use anyhow::Context;
use crossterm::event::{self, Event, KeyEventKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const TICK_INTERVAL: Duration = Duration::from_millis(50);
const THREAD_LIST_LIMIT: usize = 20;

/// Wire a manager to `backend` with the built-in tools and the configured
/// thread store.
pub fn build_manager(config: &Config, backend: Arc<dyn ChatBackend>) -> Result<ConversationManager> {
    let store = ThreadStore::open(&config.data_dir)?;
    let tools = Arc::new(builtin_registry(config)?);
    info!(tools = tools.len(), data_dir = %config.data_dir.display(), "conversation ready");
    Ok(ConversationManager::new(
        backend,
        tools,
        store,
        TurnSettings::from_config(config),
    ))
}

/// `ghost chat`: run the modal view until the user quits.
pub async fn run_chat(config: Config, thread_id: Option<String>) -> anyhow::Result<()> {
    let backend: Arc<dyn ChatBackend> = Arc::new(OllamaClient::new(&config)?);
    let mut manager = build_manager(&config, backend)?;
    let mut view = ChatView::new(config.model.clone());

    if let Some(id) = thread_id.as_deref() {
        let title = manager
            .open_thread(id)
            .with_context(|| format!("opening thread {id}"))?
            .title
            .clone();
        view.load_history(manager.messages());
        view.set_thread_title(Some(title));
    }

    let mut session = TerminalSession::enter().context("entering the terminal UI")?;
    let app = ChatApp::new(view, manager);
    app.run(&mut session).await
}

struct ActiveTurn {
    events: mpsc::Receiver<TurnEvent>,
    cancel: CancellationToken,
    task: JoinHandle<Option<TurnOutcome>>,
}

/// Owns the view on the UI task. Turns run on a spawned task holding the
/// manager lock and talk back only through the turn's channel.
pub struct ChatApp {
    view: ChatView,
    manager: Arc<Mutex<ConversationManager>>,
    store: ThreadStore,
    turn: Option<ActiveTurn>,
}

impl ChatApp {
    pub fn new(view: ChatView, manager: ConversationManager) -> Self {
        let store = manager.store().clone();
        Self {
            view,
            manager: Arc::new(Mutex::new(manager)),
            store,
            turn: None,
        }
    }

    pub async fn run(mut self, session: &mut TerminalSession) -> anyhow::Result<()> {
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        while !self.view.should_quit() {
            session
                .terminal()
                .draw(|frame| render::draw(frame, &mut self.view))?;
            self.process_terminal_events().await?;
            if self.view.should_quit() {
                break;
            }

            tokio::select! {
                _ = tick.tick() => {}
                event = next_turn_event(&mut self.turn) => {
                    self.handle_turn_event(event).await;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Cancel the running turn, if any, and wait for its task.
    async fn shutdown(&mut self) {
        if let Some(turn) = &self.turn {
            turn.cancel.cancel();
        }
        self.finish_turn().await;
    }

    async fn process_terminal_events(&mut self) -> anyhow::Result<()> {
        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Paste(text) => self.view.handle_paste(&text),
                Event::Key(key)
                    if key.kind == KeyEventKind::Press || key.kind == KeyEventKind::Repeat =>
                {
                    if let Some(command) = self.view.handle_key(key) {
                        self.apply_command(command).await;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn apply_command(&mut self, command: ViewCommand) {
        match command {
            ViewCommand::StartTurn(text) => self.start_turn(text).await,
            ViewCommand::CancelTurn => {
                if let Some(turn) = &self.turn {
                    turn.cancel.cancel();
                }
            }
            ViewCommand::ListThreads => self.list_threads(),
            ViewCommand::NewThread => match self.manager.try_lock() {
                Ok(mut manager) => {
                    manager.start_new_thread();
                    self.view.reset();
                    self.view.push_info("started a new thread");
                }
                Err(_) => self.view.push_error("a turn is still finishing"),
            },
            ViewCommand::Quit => {}
        }
    }

    async fn start_turn(&mut self, text: String) {
        // The previous turn may have reported `Done` without its channel
        // closing yet.
        self.finish_turn().await;
        let (events, receiver) = mpsc::channel(TURN_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let manager = Arc::clone(&self.manager);
        let task = tokio::spawn(async move {
            let mut manager = manager.lock().await;
            manager.run_turn(TurnInput::text(text), events, token).await
        });
        self.turn = Some(ActiveTurn {
            events: receiver,
            cancel,
            task,
        });
    }

    async fn handle_turn_event(&mut self, event: Option<TurnEvent>) {
        match event {
            Some(event) => self.view.handle_turn_event(event),
            // Channel closed: the driver has returned.
            None => {
                self.finish_turn().await;
                if self.view.is_busy() {
                    self.view.handle_turn_event(TurnEvent::Error(GhostError::Cancelled));
                }
            }
        }
    }

    /// Close the turn's channel, join its task and refresh the title.
    async fn finish_turn(&mut self) {
        let Some(ActiveTurn { events, task, .. }) = self.turn.take() else {
            return;
        };
        drop(events);
        match task.await {
            Ok(Some(outcome)) => {
                info!(thread_id = %outcome.thread_id, rounds = outcome.tool_rounds, "turn finished");
            }
            Ok(None) => {}
            Err(error) => {
                warn!(%error, "turn task failed");
                self.view.push_error(format!("turn aborted: {error}"));
            }
        }
        let title = self
            .manager
            .lock()
            .await
            .thread()
            .map(|thread| thread.title.clone());
        self.view.set_thread_title(title);
    }

    fn list_threads(&mut self) {
        match self.store.list_threads() {
            Ok(found) if found.is_empty() => self.view.push_info("no saved threads"),
            Ok(found) => {
                for thread in found.iter().take(THREAD_LIST_LIMIT) {
                    self.view.push_info(threads::summary_line(thread));
                }
            }
            Err(error) => self.view.push_error(error.to_string()),
        }
    }
}

async fn next_turn_event(turn: &mut Option<ActiveTurn>) -> Option<TurnEvent> {
    match turn {
        Some(turn) => turn.events.recv().await,
        None => std::future::pending().await,
    }
}
