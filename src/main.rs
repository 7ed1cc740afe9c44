mod app;
mod cli;
mod domain;
mod infra;
mod ui;

use crate::app::{ActionController, AppCommand, AppError, AppEvent, ChatApp};
use crate::cli::{CliInvocation, GlobalFlags};
use crate::domain::{Conversation, ConversationId};
use crate::infra::{
    ApiClient, ClipboardSink, CopyOutcome, LOG_FILTER_ENV, LoggingError, Settings,
    TransportEvent, WsOptions, WsTransport, init_logging, load_config_file, resolve_settings,
    resolve_state_dir,
};
use crossterm::event::{
    self, DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
    Event, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::terminal::size as terminal_size;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use crossterm::{ExecutableCommand, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::{self, Stdout, Write};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

const MAX_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
enum MainError {
    #[error(transparent)]
    App(#[from] AppError),

    #[error(transparent)]
    Cli(#[from] crate::cli::CliRunError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("no conversations yet; pass --conversation ID once one exists")]
    NoConversation,
}

fn main() {
    if let Err(error) = run_main() {
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "{error}");
        std::process::exit(1);
    }
}

fn run_main() -> Result<(), MainError> {
    let args = std::env::args().collect::<Vec<_>>();
    let invocation = match crate::cli::parse_invocation(&args) {
        Ok(invocation) => invocation,
        Err(error) => {
            let mut err = io::stderr().lock();
            let _ = writeln!(err, "{error}");
            let _ = writeln!(err);
            print_help();
            std::process::exit(2);
        }
    };

    match invocation {
        CliInvocation::PrintHelp => {
            print_help();
            Ok(())
        }
        CliInvocation::PrintVersion => {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliInvocation::Chat {
            flags,
            conversation,
        } => run_chat(&flags, conversation),
        CliInvocation::Command { flags, command } => {
            let state_dir =
                resolve_state_dir(|key| std::env::var(key).ok()).map_err(AppError::from)?;
            crate::cli::run(command, &flags, &state_dir)?;
            Ok(())
        }
    }
}

fn print_help() {
    let mut out = io::stdout().lock();
    let _ = write!(out, "{}", crate::cli::help_text());
}

fn load_settings(flags: &GlobalFlags) -> Result<Settings, AppError> {
    let state_dir = resolve_state_dir(|key| std::env::var(key).ok())?;
    let file = load_config_file(&state_dir).map_err(crate::infra::ConfigError::from)?;
    let settings = resolve_settings(&state_dir, file, |key| {
        flags.lookup(key, |key| std::env::var(key).ok())
    })?;
    Ok(settings)
}

fn run_chat(flags: &GlobalFlags, conversation: Option<String>) -> Result<(), MainError> {
    let settings = load_settings(flags)?;
    let log_path = init_logging(&settings.state_dir, std::env::var(LOG_FILTER_ENV).ok())?;
    info!(log = %log_path.display(), user = %settings.user_id, "starting");

    let api = ApiClient::new(
        settings.api_url.clone(),
        settings.token.clone(),
        settings.request_timeout,
    )
    .map_err(AppError::from)?;

    // Without a known conversation we have to ask the server before the view can open.
    let requested = conversation.or_else(|| settings.default_conversation.clone());
    let (conversation_id, conversations) = match requested {
        Some(id) => (ConversationId::new(id), Vec::new()),
        None => {
            let conversations = api.list_conversations().map_err(AppError::from)?;
            let Some(first) = conversations.first() else {
                return Err(MainError::NoConversation);
            };
            (first.id.clone(), conversations)
        }
    };

    let (transport_tx, transport_rx) = channel::<TransportEvent>();
    let transport = WsTransport::start(
        WsOptions {
            url: settings.ws_url.clone(),
            token: settings.token.clone(),
        },
        transport_tx,
    )
    .map_err(AppError::from)?;

    let needs_conversations = conversations.is_empty();
    let actions = ActionController::new(transport, settings.user_id.clone(), conversation_id);
    let mut model = ChatApp::new(actions, conversations);

    let (signal_tx, signal_rx) = channel::<AppEvent>();
    let backend = Backend {
        api,
        history_limit: settings.history_limit,
        signals: signal_tx,
    };
    if needs_conversations {
        backend.spawn_load_conversations();
    }
    backend.spawn_load_messages(model.conversation_id().clone());

    let mut terminal = setup_terminal()?;
    if let Ok((width, height)) = terminal_size() {
        model.set_terminal_size(width, height);
    }
    let result = run(&mut terminal, model, &transport_rx, &signal_rx, &backend);
    restore_terminal(&mut terminal)?;
    let model = result?;
    info!("exiting");
    model.actions.into_transport().shutdown();
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, AppError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let _ = stdout.execute(EnableBracketedPaste);
    let _ = stdout.execute(EnableMouseCapture);
    let keyboard_flags = KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
        | KeyboardEnhancementFlags::REPORT_EVENT_TYPES;
    let _ = stdout.execute(PushKeyboardEnhancementFlags(keyboard_flags));
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), AppError> {
    disable_raw_mode()?;
    let _ = execute!(
        terminal.backend_mut(),
        DisableBracketedPaste,
        DisableMouseCapture,
        PopKeyboardEnhancementFlags
    );
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Blocking REST work, run on short-lived threads that report back as `AppEvent`s.
struct Backend {
    api: ApiClient,
    history_limit: usize,
    signals: Sender<AppEvent>,
}

impl Backend {
    fn spawn_load_conversations(&self) {
        let api = self.api.clone();
        let tx = self.signals.clone();
        std::thread::spawn(move || {
            let result: Result<Vec<Conversation>, String> =
                api.list_conversations().map_err(|error| error.to_string());
            if let Err(error) = &result {
                warn!(%error, "loading conversations failed");
            }
            let _ = tx.send(AppEvent::ConversationsLoaded(result));
        });
    }

    fn spawn_load_messages(&self, conversation_id: ConversationId) {
        let api = self.api.clone();
        let tx = self.signals.clone();
        let limit = self.history_limit;
        std::thread::spawn(move || {
            let result = api
                .list_messages(&conversation_id, limit)
                .map_err(|error| error.to_string());
            if let Err(error) = &result {
                warn!(%error, conversation = %conversation_id, "loading messages failed");
            }
            let _ = tx.send(AppEvent::MessagesLoaded {
                conversation_id,
                result,
            });
        });
    }

    fn spawn_delete_for_me(
        &self,
        conversation_id: ConversationId,
        message_id: crate::domain::MessageId,
    ) {
        let api = self.api.clone();
        let tx = self.signals.clone();
        std::thread::spawn(move || {
            let result = api
                .delete_message(&conversation_id, &message_id, true)
                .map_err(|error| error.to_string());
            if let Err(error) = &result {
                warn!(%error, message = %message_id, "delete for me failed");
            }
            let _ = tx.send(AppEvent::DeleteFinished {
                conversation_id,
                message_id,
                result,
            });
        });
    }
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut model: ChatApp<WsTransport>,
    transport_rx: &Receiver<TransportEvent>,
    signal_rx: &Receiver<AppEvent>,
    backend: &Backend,
) -> Result<ChatApp<WsTransport>, AppError> {
    let mut clipboard = ClipboardSink::new();

    loop {
        while let Ok(event) = transport_rx.try_recv() {
            let (next, _command) = app::update(model, AppEvent::Transport(event), Instant::now());
            model = next;
        }
        while let Ok(event) = signal_rx.try_recv() {
            let (next, _command) = app::update(model, event, Instant::now());
            model = next;
        }
        let (next, _command) = app::update(model, AppEvent::Tick, Instant::now());
        model = next;

        let mut report = ui::RenderReport::default();
        terminal.draw(|frame| report = ui::render(frame, &model))?;
        if let Some(size) = report.menu_size {
            // The estimate was off; redraw at the corrected origin before waiting for input.
            if model.actions.correct_menu_position(size) {
                continue;
            }
        }

        let timeout = model
            .actions
            .long_press_remaining(Instant::now())
            .map_or(MAX_POLL, |remaining| remaining.min(MAX_POLL));
        if !event::poll(timeout)? {
            continue;
        }

        let event = match event::read()? {
            Event::Key(key) => {
                if key.kind == KeyEventKind::Release {
                    continue;
                }
                AppEvent::Key(key)
            }
            Event::Paste(text) => AppEvent::Paste(text),
            Event::Mouse(mouse) => AppEvent::Mouse(mouse),
            Event::Resize(width, height) => {
                model.set_terminal_size(width, height);
                continue;
            }
            _ => continue,
        };

        let (next, command) = app::update(model, event, Instant::now());
        model = next;
        match command {
            AppCommand::None => {}
            AppCommand::Quit => return Ok(model),
            AppCommand::CopyToClipboard { text } => {
                model.notice = copy_to_clipboard(&mut clipboard, &text);
            }
            AppCommand::DeleteForMe {
                conversation_id,
                message_id,
            } => backend.spawn_delete_for_me(conversation_id, message_id),
            AppCommand::LoadMessages { conversation_id } => {
                backend.spawn_load_messages(conversation_id);
            }
        }
    }
}

/// Copy failures are only logged.
fn copy_to_clipboard(clipboard: &mut ClipboardSink, text: &str) -> Option<String> {
    let mut stdout = io::stdout();
    match clipboard.copy(text, &mut stdout) {
        Ok(CopyOutcome::SystemClipboard) => Some("Copied.".to_string()),
        Ok(CopyOutcome::TerminalEscape) => Some("Copied via terminal.".to_string()),
        Err(error) => {
            warn!(%error, "copy failed");
            None
        }
    }
}
