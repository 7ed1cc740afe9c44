mod actions;
mod composer;
mod mouse;

use crate::domain::{
    CellPoint, Conversation, ConversationId, Message, MessageId, MessageLog, Viewport,
};
use crate::infra::{
    ApiError, ChatTransport, ConfigError, ResolveStateDirError, TransportError, TransportEvent,
};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use std::time::Instant;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

pub use actions::*;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("terminal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    ResolveStateDir(#[from] ResolveStateDirError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConnectionStatus {
    Connecting,
    Online,
    Offline { reason: String },
}

/// Model for the single-conversation chat screen.
pub struct ChatApp<T> {
    pub conversations: Vec<Conversation>,
    pub log: MessageLog,
    pub actions: ActionController<T>,
    /// Index into the visible (not hidden) messages.
    pub selected: usize,
    pub terminal_size: (u16, u16),
    pub notice: Option<String>,
    pub connection: ConnectionStatus,
    pub help_open: bool,
    pub loading: bool,
    pub load_error: Option<String>,
}

impl<T: ChatTransport> ChatApp<T> {
    pub fn new(actions: ActionController<T>, conversations: Vec<Conversation>) -> Self {
        Self {
            conversations,
            log: MessageLog::default(),
            actions,
            selected: 0,
            terminal_size: (0, 0),
            notice: None,
            connection: ConnectionStatus::Connecting,
            help_open: false,
            loading: true,
            load_error: None,
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        self.actions.conversation_id()
    }

    pub fn current_conversation(&self) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| &conversation.id == self.conversation_id())
    }

    pub fn selected_message(&self) -> Option<&Message> {
        self.log.visible_at(self.selected)
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(0, 0, self.terminal_size.0, self.terminal_size.1)
    }

    pub fn set_terminal_size(&mut self, width: u16, height: u16) {
        self.terminal_size = (width, height);
        self.actions.resize_viewport(self.viewport());
    }

    fn clamp_selection(&mut self) {
        self.selected = self.selected.min(self.log.visible_len().saturating_sub(1));
    }

    fn select_last(&mut self) {
        self.selected = self.log.visible_len().saturating_sub(1);
    }

    fn select_message(&mut self, message_id: &MessageId) {
        if let Some(index) = self.log.visible_index_of(message_id) {
            self.selected = index;
        }
    }

    fn is_at_tail(&self) -> bool {
        self.selected + 1 >= self.log.visible_len()
    }

    /// Screen anchor for a menu opened from the keyboard on the selected row.
    fn selected_anchor(&self) -> CellPoint {
        let list = message_list_inner(self.terminal_size);
        let offset = list_offset(self.selected, usize::from(list.height), self.log.visible_len());
        let row_in_view = u16::try_from(self.selected.saturating_sub(offset)).unwrap_or(0);
        CellPoint::new(
            list.x.saturating_add(2),
            list.y.saturating_add(row_in_view).saturating_add(1),
        )
    }
}

pub enum AppEvent {
    Key(KeyEvent),
    Paste(String),
    Mouse(MouseEvent),
    Tick,
    Transport(TransportEvent),
    DeleteFinished {
        conversation_id: ConversationId,
        message_id: MessageId,
        result: Result<(), String>,
    },
    MessagesLoaded {
        conversation_id: ConversationId,
        result: Result<Vec<Message>, String>,
    },
    ConversationsLoaded(Result<Vec<Conversation>, String>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AppCommand {
    None,
    Quit,
    CopyToClipboard {
        text: String,
    },
    DeleteForMe {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    LoadMessages {
        conversation_id: ConversationId,
    },
}

impl From<ActionCommand> for AppCommand {
    fn from(command: ActionCommand) -> Self {
        match command {
            ActionCommand::None => Self::None,
            ActionCommand::Copy { text } => Self::CopyToClipboard { text },
            ActionCommand::DeleteForMe {
                conversation_id,
                message_id,
            } => Self::DeleteForMe {
                conversation_id,
                message_id,
            },
        }
    }
}

pub fn update<T: ChatTransport>(
    model: ChatApp<T>,
    event: AppEvent,
    now: Instant,
) -> (ChatApp<T>, AppCommand) {
    match event {
        AppEvent::Key(key) => update_on_key(model, key),
        AppEvent::Paste(text) => update_on_paste(model, text),
        AppEvent::Mouse(mouse) => mouse::update_on_mouse(model, mouse, now),
        AppEvent::Tick => update_on_tick(model, now),
        AppEvent::Transport(event) => (update_on_transport(model, event), AppCommand::None),
        AppEvent::DeleteFinished {
            conversation_id,
            message_id,
            result,
        } => (
            update_on_delete_finished(model, conversation_id, message_id, result),
            AppCommand::None,
        ),
        AppEvent::MessagesLoaded {
            conversation_id,
            result,
        } => (
            update_on_messages_loaded(model, conversation_id, result),
            AppCommand::None,
        ),
        AppEvent::ConversationsLoaded(result) => {
            let mut model = model;
            match result {
                Ok(conversations) => model.conversations = conversations,
                Err(error) => model.notice = Some(format!("Conversations unavailable: {error}")),
            }
            (model, AppCommand::None)
        }
    }
}

fn update_on_tick<T: ChatTransport>(
    mut model: ChatApp<T>,
    now: Instant,
) -> (ChatApp<T>, AppCommand) {
    let viewport = model.viewport();
    if model.actions.tick(&model.log, viewport, now) {
        if let Some(message_id) = model.actions.menu().map(|menu| menu.message_id.clone()) {
            model.select_message(&message_id);
        }
    }
    (model, AppCommand::None)
}

fn update_on_key<T: ChatTransport>(
    mut model: ChatApp<T>,
    key: KeyEvent,
) -> (ChatApp<T>, AppCommand) {
    model.notice = None;
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    if ctrl && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q')) {
        return (model, AppCommand::Quit);
    }

    // Allowed from any menu or dialog; switching resets them.
    if ctrl && key.code == KeyCode::Char('n') {
        return switch_conversation(model, 1);
    }
    if ctrl && key.code == KeyCode::Char('p') {
        return switch_conversation(model, -1);
    }

    if model.help_open {
        if matches!(key.code, KeyCode::Esc | KeyCode::F(1) | KeyCode::Char('?')) {
            model.help_open = false;
        }
        return (model, AppCommand::None);
    }
    if key.code == KeyCode::F(1) {
        model.help_open = true;
        return (model, AppCommand::None);
    }

    if model.actions.menu().is_some() {
        return update_menu(model, key);
    }
    if model.actions.delete_dialog().is_some() {
        return update_delete_dialog(model, key);
    }
    if model.actions.forward_dialog().is_some() {
        return update_forward_dialog(model, key);
    }

    if ctrl {
        return update_on_ctrl_key(model, key);
    }

    match key.code {
        KeyCode::F(2) => {
            open_menu_on_selected(&mut model);
            return (model, AppCommand::None);
        }
        KeyCode::Up => model.selected = model.selected.saturating_sub(1),
        KeyCode::Down => {
            model.selected = model.selected.saturating_add(1);
            model.clamp_selection();
        }
        KeyCode::PageUp => {
            model.selected = model.selected.saturating_sub(page_step(model.terminal_size));
        }
        KeyCode::PageDown => {
            model.selected = model.selected.saturating_add(page_step(model.terminal_size));
            model.clamp_selection();
        }
        _ => {}
    }

    if model.actions.selection().is_some() {
        return update_selection_mode(model, key);
    }

    match key.code {
        KeyCode::Esc => {
            if model.actions.editing().is_some() {
                model.actions.cancel_edit();
            }
        }
        KeyCode::Enter => {
            if model.actions.editing().is_some() {
                if !model.actions.submit_edit(&mut model.log) {
                    model.notice = Some("Edit cancelled".to_string());
                }
            } else if model
                .actions
                .send_composed(&mut model.log, OffsetDateTime::now_utc())
                .is_some()
            {
                model.select_last();
            }
        }
        KeyCode::Delete if model.actions.composer().text.is_empty() => {
            if let Some(message_id) = model.selected_message().map(|m| m.id.clone()) {
                model.actions.open_delete_dialog(&model.log, &message_id);
            }
        }
        KeyCode::Backspace => model.actions.composer_mut().backspace(),
        KeyCode::Delete => model.actions.composer_mut().delete_forward(),
        KeyCode::Left => model.actions.composer_mut().move_left(),
        KeyCode::Right => model.actions.composer_mut().move_right(),
        KeyCode::Home => model.actions.composer_mut().move_home(),
        KeyCode::End => model.actions.composer_mut().move_end(),
        KeyCode::Char(ch) if is_text_input_char(ch) => {
            model.actions.composer_mut().insert_char(ch);
        }
        _ => {}
    }
    (model, AppCommand::None)
}

fn update_on_ctrl_key<T: ChatTransport>(
    mut model: ChatApp<T>,
    key: KeyEvent,
) -> (ChatApp<T>, AppCommand) {
    let selected_id = model.selected_message().map(|message| message.id.clone());
    match key.code {
        KeyCode::Char('s') => model.actions.toggle_selection_mode(),
        KeyCode::Char('w') => model.actions.composer_mut().delete_word_back(),
        KeyCode::Char('y') => {
            if let Some(message_id) = selected_id {
                let command = model.actions.copy(&model.log, &message_id);
                return (model, command.into());
            }
        }
        KeyCode::Char('e') => {
            if let Some(message_id) = selected_id {
                if !model.actions.start_edit(&model.log, &message_id) {
                    model.notice = Some("Only your own messages can be edited".to_string());
                }
            }
        }
        KeyCode::Char('f') => {
            if let Some(message_id) = selected_id {
                if !model.actions.forward_message(&model.log, &message_id) {
                    model.notice = Some("Message cannot be forwarded yet".to_string());
                }
            }
        }
        _ => {}
    }
    (model, AppCommand::None)
}

fn update_menu<T: ChatTransport>(mut model: ChatApp<T>, key: KeyEvent) -> (ChatApp<T>, AppCommand) {
    match key.code {
        KeyCode::Esc | KeyCode::F(2) => model.actions.close_menu(),
        KeyCode::Up | KeyCode::Char('k') => model.actions.menu_select_prev(),
        KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => model.actions.menu_select_next(),
        KeyCode::Enter => {
            let command = model.actions.activate_menu_item(&model.log);
            return (model, command.into());
        }
        KeyCode::Char(ch) if ch.is_ascii_digit() => {
            let index = ch.to_digit(10).map(|d| d as usize).unwrap_or(0);
            if index > 0 {
                let command = model.actions.activate_menu_index(&model.log, index - 1);
                return (model, command.into());
            }
        }
        _ => {}
    }
    (model, AppCommand::None)
}

fn update_delete_dialog<T: ChatTransport>(
    mut model: ChatApp<T>,
    key: KeyEvent,
) -> (ChatApp<T>, AppCommand) {
    if model.actions.delete_dialog().is_some_and(|dialog| dialog.pending) {
        if key.code == KeyCode::Esc {
            model.actions.cancel_delete();
        }
        return (model, AppCommand::None);
    }

    match key.code {
        KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => model.actions.cancel_delete(),
        KeyCode::Left | KeyCode::Up | KeyCode::BackTab => model.actions.delete_select_prev(),
        KeyCode::Right | KeyCode::Down | KeyCode::Tab => model.actions.delete_select_next(),
        KeyCode::Enter => {
            let command = model.actions.confirm_delete_choice(&mut model.log);
            model.clamp_selection();
            return (model, command.into());
        }
        KeyCode::Char('m') | KeyCode::Char('M') => {
            let command = model.actions.delete_for_me();
            return (model, command.into());
        }
        KeyCode::Char('e') | KeyCode::Char('E') => {
            model.actions.delete_for_everyone(&mut model.log);
        }
        _ => {}
    }
    (model, AppCommand::None)
}

fn update_forward_dialog<T: ChatTransport>(
    mut model: ChatApp<T>,
    key: KeyEvent,
) -> (ChatApp<T>, AppCommand) {
    match key.code {
        KeyCode::Esc => model.actions.cancel_forward(),
        KeyCode::Up | KeyCode::Char('k') => {
            model.actions.move_forward_destination(&model.conversations, -1);
        }
        KeyCode::Down | KeyCode::Char('j') => {
            model.actions.move_forward_destination(&model.conversations, 1);
        }
        KeyCode::Char(digit @ '1'..='9') => {
            let index = (digit as usize) - ('1' as usize);
            if let Some(conversation) = model.conversations.get(index) {
                let destination = conversation.id.clone();
                model.actions.choose_forward_destination(Some(destination));
            }
        }
        KeyCode::Backspace => model.actions.choose_forward_destination(None),
        KeyCode::Enter => {
            let sent = model.actions.confirm_forward();
            model.notice = Some(match sent {
                0 => "Choose a destination first".to_string(),
                1 => "Forwarded 1 message".to_string(),
                n => format!("Forwarded {n} messages"),
            });
        }
        _ => {}
    }
    (model, AppCommand::None)
}

fn update_selection_mode<T: ChatTransport>(
    mut model: ChatApp<T>,
    key: KeyEvent,
) -> (ChatApp<T>, AppCommand) {
    match key.code {
        KeyCode::Esc => model.actions.toggle_selection_mode(),
        KeyCode::Char(' ') => {
            if let Some(message_id) = model.selected_message().map(|m| m.id.clone()) {
                model.actions.toggle_selected(&message_id);
            }
        }
        KeyCode::Enter | KeyCode::Char('f') => {
            if !model.actions.forward_selected(&model.log) {
                model.notice = Some("Nothing forwardable selected".to_string());
            }
        }
        _ => {}
    }
    (model, AppCommand::None)
}

fn update_on_paste<T: ChatTransport>(
    mut model: ChatApp<T>,
    text: String,
) -> (ChatApp<T>, AppCommand) {
    if model.help_open
        || model.actions.menu().is_some()
        || model.actions.has_dialog()
        || model.actions.selection().is_some()
    {
        return (model, AppCommand::None);
    }
    model.actions.composer_mut().insert_str(&text);
    (model, AppCommand::None)
}

fn open_menu_on_selected<T: ChatTransport>(model: &mut ChatApp<T>) {
    let Some(message_id) = model.selected_message().map(|m| m.id.clone()) else {
        return;
    };
    let anchor = model.selected_anchor();
    let viewport = model.viewport();
    model.actions.open_menu(&model.log, &message_id, anchor, viewport);
}

fn switch_conversation<T: ChatTransport>(
    mut model: ChatApp<T>,
    delta: isize,
) -> (ChatApp<T>, AppCommand) {
    if model.conversations.len() < 2 {
        return (model, AppCommand::None);
    }
    let len = model.conversations.len() as isize;
    let current = model
        .conversations
        .iter()
        .position(|conversation| &conversation.id == model.conversation_id())
        .map(|index| index as isize)
        .unwrap_or(0);
    let next = (current + delta).rem_euclid(len) as usize;
    let conversation_id = model.conversations[next].id.clone();
    model.conversations[next].unread = 0;

    model.actions.switch_conversation(conversation_id.clone());
    model.log = MessageLog::default();
    model.selected = 0;
    model.loading = true;
    model.load_error = None;
    (model, AppCommand::LoadMessages { conversation_id })
}

fn update_on_transport<T: ChatTransport>(
    mut model: ChatApp<T>,
    event: TransportEvent,
) -> ChatApp<T> {
    match event {
        TransportEvent::Connected => {
            model.connection = ConnectionStatus::Online;
            model.actions.mark_read();
        }
        TransportEvent::Disconnected { reason } => {
            model.connection = ConnectionStatus::Offline { reason };
        }
        TransportEvent::MessageCreated {
            conversation_id,
            message,
        } => {
            if is_current(&model, &conversation_id) {
                let follow = model.is_at_tail();
                model.log.upsert(message);
                if follow {
                    model.select_last();
                }
            } else if let Some(conversation) = model
                .conversations
                .iter_mut()
                .find(|conversation| conversation.id == conversation_id)
            {
                conversation.unread = conversation.unread.saturating_add(1);
            }
        }
        TransportEvent::MessageAcknowledged {
            conversation_id,
            temp_id,
            message_id,
            created_at,
        } => {
            if is_current(&model, &conversation_id)
                && !model.log.acknowledge(&temp_id, message_id, created_at)
            {
                warn!(temp_id = %temp_id, "ack for unknown temporary message");
            }
            model.clamp_selection();
        }
        TransportEvent::MessageEdited {
            conversation_id,
            message_id,
            content,
        } => {
            if is_current(&model, &conversation_id) {
                model.log.apply_edit(&message_id, &content);
            }
        }
        TransportEvent::MessageDeleted {
            conversation_id,
            message_id,
        } => {
            if is_current(&model, &conversation_id) {
                model.log.mark_deleted(&message_id);
                model.actions.forget_message(&message_id);
            }
        }
        TransportEvent::ServerError { code, message } => {
            warn!(%code, %message, "server reported an error");
            model.notice = Some(format!("Server error ({code}): {message}"));
        }
    }
    model
}

fn is_current<T: ChatTransport>(model: &ChatApp<T>, conversation_id: &ConversationId) -> bool {
    conversation_id.as_str().is_empty() || conversation_id == model.conversation_id()
}

fn update_on_delete_finished<T: ChatTransport>(
    mut model: ChatApp<T>,
    conversation_id: ConversationId,
    message_id: MessageId,
    result: Result<(), String>,
) -> ChatApp<T> {
    if &conversation_id != model.conversation_id() {
        info!(message_id = %message_id, "delete finished after leaving the conversation");
        return model;
    }
    if result.is_err() {
        model.notice = Some("Could not delete the message".to_string());
    }
    model
        .actions
        .finish_delete_for_me(&mut model.log, &message_id, result);
    model.clamp_selection();
    model
}

fn update_on_messages_loaded<T: ChatTransport>(
    mut model: ChatApp<T>,
    conversation_id: ConversationId,
    result: Result<Vec<Message>, String>,
) -> ChatApp<T> {
    if &conversation_id != model.conversation_id() {
        return model;
    }
    model.loading = false;
    match result {
        Ok(messages) => {
            model.log.replace_history(messages);
            model.load_error = None;
            model.select_last();
            model.actions.mark_read();
        }
        Err(error) => {
            warn!(conversation_id = %conversation_id, %error, "failed to load messages");
            model.load_error = Some(error);
        }
    }
    model
}

fn is_text_input_char(character: char) -> bool {
    !character.is_control()
}

/// Screen regions of the chat view. The message list and composer are bordered blocks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChatLayout {
    pub header: Rect,
    pub messages: Rect,
    pub composer: Rect,
    pub footer: Rect,
}

pub fn chat_layout(terminal_size: (u16, u16)) -> ChatLayout {
    let (width, height) = terminal_size;
    let full = Rect {
        x: 0,
        y: 0,
        width,
        height,
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(full);
    ChatLayout {
        header: chunks[0],
        messages: chunks[1],
        composer: chunks[2],
        footer: chunks[3],
    }
}

pub fn message_list_inner(terminal_size: (u16, u16)) -> Rect {
    let messages = chat_layout(terminal_size).messages;
    Rect {
        x: messages.x.saturating_add(1),
        y: messages.y.saturating_add(1),
        width: messages.width.saturating_sub(2),
        height: messages.height.saturating_sub(2),
    }
}

/// First visible row when `selected` is kept on screen, matching ratatui's list scrolling
/// for a freshly created `ListState`.
pub fn list_offset(selected: usize, viewport_height: usize, total: usize) -> usize {
    if viewport_height == 0 || total <= viewport_height {
        return 0;
    }
    let max_offset = total.saturating_sub(viewport_height);
    let raw_offset = selected.saturating_add(1).saturating_sub(viewport_height);
    raw_offset.min(max_offset)
}

fn page_step(terminal_size: (u16, u16)) -> usize {
    usize::from(message_list_inner(terminal_size).height.saturating_sub(1)).max(1)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::{Participant, UserId};
    use crate::infra::TransportOp;
    use std::cell::RefCell;

    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        ops: RefCell<Vec<TransportOp>>,
    }

    impl RecordingTransport {
        pub(crate) fn sent(&self) -> Vec<TransportOp> {
            self.ops.borrow().clone()
        }
    }

    impl ChatTransport for RecordingTransport {
        fn send(&self, op: TransportOp) {
            self.ops.borrow_mut().push(op);
        }

        fn is_ready(&self) -> bool {
            true
        }
    }

    pub(crate) fn message(id: &str, sender: &str, content: &str) -> Message {
        Message {
            id: MessageId::new(id),
            sender_id: UserId::new(sender),
            content: content.to_string(),
            deleted: false,
            edited: false,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    pub(crate) fn conversation(id: &str, name: &str) -> Conversation {
        Conversation {
            id: ConversationId::new(id),
            participant: Participant {
                name: name.to_string(),
                avatar_url: None,
            },
            unread: 0,
        }
    }

    /// Viewer "me" in conversation "c1", 80x24 terminal, messages already loaded.
    pub(crate) fn chat_app(messages: Vec<Message>) -> ChatApp<RecordingTransport> {
        let actions = ActionController::new(
            RecordingTransport::default(),
            UserId::new("me"),
            ConversationId::new("c1"),
        );
        let mut app = ChatApp::new(
            actions,
            vec![conversation("c1", "Ann"), conversation("c2", "Bob")],
        );
        app.set_terminal_size(80, 24);
        let (app, _) = update(
            app,
            AppEvent::MessagesLoaded {
                conversation_id: ConversationId::new("c1"),
                result: Ok(messages),
            },
            Instant::now(),
        );
        app
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{chat_app, message};
    use super::*;
    use crate::infra::TransportOp;

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(ch: char) -> AppEvent {
        AppEvent::Key(KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL))
    }

    fn press<T: ChatTransport>(app: ChatApp<T>, event: AppEvent) -> (ChatApp<T>, AppCommand) {
        update(app, event, Instant::now())
    }

    #[test]
    fn loading_selects_newest_message_and_marks_read() {
        let app = chat_app(vec![message("1", "ann", "a"), message("2", "ann", "b")]);
        assert_eq!(app.selected, 1);
        assert!(!app.loading);
        assert_eq!(
            app.actions.transport().sent(),
            vec![TransportOp::MarkRead {
                conversation_id: ConversationId::new("c1")
            }]
        );
    }

    #[test]
    fn typing_and_enter_sends_optimistic_message() {
        let mut app = chat_app(vec![message("1", "ann", "a")]);
        for ch in "yo".chars() {
            (app, _) = press(app, key(KeyCode::Char(ch)));
        }
        let (app, cmd) = press(app, key(KeyCode::Enter));
        assert_eq!(cmd, AppCommand::None);
        assert_eq!(app.log.visible_len(), 2);
        assert_eq!(app.selected, 1);
        let sent = app.selected_message().expect("message");
        assert!(sent.id.is_temporary());
        assert_eq!(sent.content, "yo");
        assert!(app.actions.composer().is_blank());
    }

    #[test]
    fn ack_event_reconciles_temp_id() {
        let mut app = chat_app(Vec::new());
        app.actions.composer_mut().insert_str("hello");
        let (app, _) = press(app, key(KeyCode::Enter));
        let temp_id = app.selected_message().map(|m| m.id.clone()).expect("temp");

        let (app, _) = press(
            app,
            AppEvent::Transport(TransportEvent::MessageAcknowledged {
                conversation_id: ConversationId::new("c1"),
                temp_id,
                message_id: MessageId::new("42"),
                created_at: None,
            }),
        );
        assert_eq!(
            app.selected_message().map(|m| m.id.clone()),
            Some(MessageId::new("42"))
        );
    }

    #[test]
    fn history_arriving_after_a_send_keeps_the_pending_row() {
        let mut app = chat_app(Vec::new());
        app.loading = true;
        for ch in "early".chars() {
            (app, _) = press(app, key(KeyCode::Char(ch)));
        }
        let (app, _) = press(app, key(KeyCode::Enter));

        let (app, _) = press(
            app,
            AppEvent::MessagesLoaded {
                conversation_id: ConversationId::new("c1"),
                result: Ok(vec![message("1", "ann", "hi")]),
            },
        );
        assert_eq!(app.log.visible_len(), 2);
        let pending = app.log.visible_at(1).expect("pending row");
        assert!(pending.id.is_temporary());
        assert_eq!(pending.content, "early");
    }

    #[test]
    fn f2_opens_menu_on_selected_message_and_enter_copies() {
        let app = chat_app(vec![message("1", "ann", "copy me")]);
        let (app, _) = press(app, key(KeyCode::F(2)));
        let menu = app.actions.menu().expect("menu");
        assert_eq!(menu.message_id, MessageId::new("1"));

        let (app, cmd) = press(app, key(KeyCode::Enter));
        assert_eq!(
            cmd,
            AppCommand::CopyToClipboard {
                text: "copy me".to_string()
            }
        );
        assert!(app.actions.menu().is_none());
    }

    #[test]
    fn delete_key_then_m_requests_delete_for_me() {
        let app = chat_app(vec![message("1", "ann", "x")]);
        let (app, _) = press(app, key(KeyCode::Delete));
        assert!(app.actions.delete_dialog().is_some());

        let (app, cmd) = press(app, key(KeyCode::Char('m')));
        assert_eq!(
            cmd,
            AppCommand::DeleteForMe {
                conversation_id: ConversationId::new("c1"),
                message_id: MessageId::new("1"),
            }
        );

        let (app, _) = press(
            app,
            AppEvent::DeleteFinished {
                conversation_id: ConversationId::new("c1"),
                message_id: MessageId::new("1"),
                result: Ok(()),
            },
        );
        assert!(app.actions.delete_dialog().is_none());
        assert_eq!(app.log.visible_len(), 0);
    }

    #[test]
    fn stale_delete_result_is_ignored_after_switch() {
        let app = chat_app(vec![message("1", "ann", "x")]);
        let (app, _) = press(app, key(KeyCode::Delete));
        let (app, _) = press(app, key(KeyCode::Char('m')));
        let (app, cmd) = press(app, ctrl('n'));
        assert_eq!(
            cmd,
            AppCommand::LoadMessages {
                conversation_id: ConversationId::new("c2")
            }
        );
        assert!(app.actions.delete_dialog().is_none());

        let (app, _) = press(
            app,
            AppEvent::DeleteFinished {
                conversation_id: ConversationId::new("c1"),
                message_id: MessageId::new("1"),
                result: Ok(()),
            },
        );
        assert!(app.log.hidden().is_empty());
    }

    #[test]
    fn remote_delete_closes_menu_on_that_message() {
        let app = chat_app(vec![message("1", "ann", "x")]);
        let (app, _) = press(app, key(KeyCode::F(2)));
        assert!(app.actions.menu().is_some());

        let (app, _) = press(
            app,
            AppEvent::Transport(TransportEvent::MessageDeleted {
                conversation_id: ConversationId::new("c1"),
                message_id: MessageId::new("1"),
            }),
        );
        assert!(app.actions.menu().is_none());
        assert!(app.log.get(&MessageId::new("1")).is_some_and(|m| m.deleted));
    }

    #[test]
    fn message_for_other_conversation_bumps_unread() {
        let app = chat_app(Vec::new());
        let (app, _) = press(
            app,
            AppEvent::Transport(TransportEvent::MessageCreated {
                conversation_id: ConversationId::new("c2"),
                message: message("9", "bob", "hey"),
            }),
        );
        assert_eq!(app.log.visible_len(), 0);
        assert_eq!(app.conversations[1].unread, 1);
    }

    #[test]
    fn digit_keys_pick_a_forward_destination() {
        let mut app = chat_app(vec![message("1", "ann", "x")]);
        assert!(app.actions.forward_message(&app.log, &MessageId::new("1")));

        let (app, _) = press(app, key(KeyCode::Char('2')));
        let dialog = app.actions.forward_dialog().expect("forward dialog");
        assert_eq!(dialog.destination, Some(ConversationId::new("c2")));

        let (app, _) = press(app, key(KeyCode::Backspace));
        let dialog = app.actions.forward_dialog().expect("forward dialog");
        assert_eq!(dialog.destination, None);

        let (app, _) = press(app, key(KeyCode::Char('9')));
        assert_eq!(app.actions.forward_dialog().expect("dialog").destination, None);
    }

    #[test]
    fn selection_mode_space_and_enter_open_forward_picker() {
        let app = chat_app(vec![message("1", "ann", "x"), message("2", "ann", "y")]);
        let (app, _) = press(app, ctrl('s'));
        let (app, _) = press(app, key(KeyCode::Char(' ')));
        let (app, _) = press(app, key(KeyCode::Up));
        let (app, _) = press(app, key(KeyCode::Char(' ')));
        let (app, _) = press(app, key(KeyCode::Enter));

        let dialog = app.actions.forward_dialog().expect("forward dialog");
        assert_eq!(
            dialog.message_ids,
            vec![MessageId::new("1"), MessageId::new("2")]
        );

        let (app, _) = press(app, key(KeyCode::Down));
        let (app, _) = press(app, key(KeyCode::Enter));
        assert!(app.actions.forward_dialog().is_none());
        assert!(app.actions.selection().is_none());
        let forwards = app
            .actions
            .transport()
            .sent()
            .into_iter()
            .filter(|op| {
                matches!(op, TransportOp::ForwardMessage { conversation_id, .. }
                    if conversation_id.as_str() == "c2")
            })
            .count();
        assert_eq!(forwards, 2);
    }

    #[test]
    fn list_offset_keeps_selection_visible() {
        assert_eq!(list_offset(0, 5, 20), 0);
        assert_eq!(list_offset(4, 5, 20), 0);
        assert_eq!(list_offset(5, 5, 20), 1);
        assert_eq!(list_offset(19, 5, 20), 15);
        assert_eq!(list_offset(3, 5, 3), 0);
    }
}
