use super::composer::Composer;
use crate::domain::{
    CellPoint, CellSize, Conversation, ConversationId, LongPressConfig, LongPressTracker,
    MENU_PADDING, Message, MessageId, MessageLog, PointerPosition, PressRelease, UserId, Viewport,
    estimate_menu_size, place_menu,
};
use crate::infra::{ChatTransport, TransportOp};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Nominal pixel size of one terminal cell, used to apply the long-press jitter radius.
pub const CELL_WIDTH_PX: f64 = 8.0;
pub const CELL_HEIGHT_PX: f64 = 16.0;

pub fn cell_to_pointer(cell: CellPoint) -> PointerPosition {
    PointerPosition::new(
        f64::from(cell.col) * CELL_WIDTH_PX,
        f64::from(cell.row) * CELL_HEIGHT_PX,
    )
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MenuItem {
    Copy,
    Edit,
    Delete,
    Forward,
    Select,
}

impl MenuItem {
    pub fn label(self) -> &'static str {
        match self {
            Self::Copy => "Copy",
            Self::Edit => "Edit",
            Self::Delete => "Delete…",
            Self::Forward => "Forward…",
            Self::Select => "Select",
        }
    }
}

/// Items offered for `message` when viewed by `viewer`, in display order.
pub fn menu_items(message: &Message, viewer: &UserId) -> Vec<MenuItem> {
    let confirmed = !message.id.is_temporary();
    let mut items = Vec::new();
    if !message.deleted {
        items.push(MenuItem::Copy);
    }
    if confirmed && !message.deleted && message.is_from(viewer) {
        items.push(MenuItem::Edit);
    }
    if confirmed {
        items.push(MenuItem::Delete);
    }
    if confirmed && !message.deleted {
        items.push(MenuItem::Forward);
        items.push(MenuItem::Select);
    }
    items
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActionMenu {
    pub message_id: MessageId,
    pub anchor: CellPoint,
    pub origin: CellPoint,
    pub size: CellSize,
    pub viewport: Viewport,
    pub items: Vec<MenuItem>,
    pub selected: usize,
    /// Set once the origin has been re-clamped against the rendered size.
    pub corrected: bool,
}

impl ActionMenu {
    pub fn contains(&self, point: CellPoint) -> bool {
        Viewport::new(self.origin.col, self.origin.row, self.size.width, self.size.height)
            .contains(point)
    }

    /// Item under `point`, skipping the border.
    pub fn item_at(&self, point: CellPoint) -> Option<usize> {
        if !self.contains(point) {
            return None;
        }
        let first_row = self.origin.row.saturating_add(1);
        if point.row < first_row
            || point.col == self.origin.col
            || point.col + 1 >= self.origin.col.saturating_add(self.size.width)
        {
            return None;
        }
        let index = usize::from(point.row - first_row);
        (index < self.items.len()).then_some(index)
    }

    pub fn selected_item(&self) -> Option<MenuItem> {
        self.items.get(self.selected).copied()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeleteChoice {
    ForMe,
    ForEveryone,
    Cancel,
}

impl DeleteChoice {
    pub fn label(self) -> &'static str {
        match self {
            Self::ForMe => "Delete for me",
            Self::ForEveryone => "Delete for everyone",
            Self::Cancel => "Cancel",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteDialog {
    pub message_id: MessageId,
    pub allow_everyone: bool,
    pub selection: DeleteChoice,
    /// A delete-for-me request is in flight.
    pub pending: bool,
}

impl DeleteDialog {
    pub fn choices(&self) -> Vec<DeleteChoice> {
        if self.allow_everyone {
            vec![DeleteChoice::ForMe, DeleteChoice::ForEveryone, DeleteChoice::Cancel]
        } else {
            vec![DeleteChoice::ForMe, DeleteChoice::Cancel]
        }
    }

    fn step(&mut self, forward: bool) {
        let choices = self.choices();
        let current = choices
            .iter()
            .position(|choice| *choice == self.selection)
            .unwrap_or(0);
        let next = if forward {
            (current + 1) % choices.len()
        } else {
            (current + choices.len() - 1) % choices.len()
        };
        self.selection = choices[next];
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForwardDialog {
    pub message_ids: Vec<MessageId>,
    pub destination: Option<ConversationId>,
}

/// Work the controller cannot finish on the UI thread.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ActionCommand {
    None,
    Copy {
        text: String,
    },
    DeleteForMe {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
}

/// Per-message actions for one chat view: context menu, long-press, copy, edit, delete and
/// forward. Owns every transient slot (menu, edit target, delete target, forward selection);
/// each slot holds at most one value and a newer action replaces it.
pub struct ActionController<T> {
    transport: T,
    viewer: UserId,
    conversation_id: ConversationId,
    long_press: LongPressTracker<(MessageId, CellPoint)>,
    menu: Option<ActionMenu>,
    editing: Option<MessageId>,
    delete_target: Option<DeleteDialog>,
    forward: Option<ForwardDialog>,
    selection: Option<BTreeSet<MessageId>>,
    composer: Composer,
}

impl<T: ChatTransport> ActionController<T> {
    pub fn new(transport: T, viewer: UserId, conversation_id: ConversationId) -> Self {
        Self {
            transport,
            viewer,
            conversation_id,
            long_press: LongPressTracker::new(LongPressConfig::default()),
            menu: None,
            editing: None,
            delete_target: None,
            forward: None,
            selection: None,
            composer: Composer::new(),
        }
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Hands the transport back for teardown.
    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn transport_ready(&self) -> bool {
        self.transport.is_ready()
    }

    pub fn viewer(&self) -> &UserId {
        &self.viewer
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn menu(&self) -> Option<&ActionMenu> {
        self.menu.as_ref()
    }

    pub fn editing(&self) -> Option<&MessageId> {
        self.editing.as_ref()
    }

    pub fn delete_dialog(&self) -> Option<&DeleteDialog> {
        self.delete_target.as_ref()
    }

    pub fn forward_dialog(&self) -> Option<&ForwardDialog> {
        self.forward.as_ref()
    }

    pub fn selection(&self) -> Option<&BTreeSet<MessageId>> {
        self.selection.as_ref()
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    pub fn has_dialog(&self) -> bool {
        self.delete_target.is_some() || self.forward.is_some()
    }

    /// Opens the menu for `message_id` at `anchor`, replacing any open menu or dialog.
    /// Refused while a delete-for-me request is in flight.
    pub fn open_menu(
        &mut self,
        log: &MessageLog,
        message_id: &MessageId,
        anchor: CellPoint,
        viewport: Viewport,
    ) -> bool {
        if self.delete_target.as_ref().is_some_and(|dialog| dialog.pending) {
            return false;
        }
        let Some(message) = log.get(message_id) else {
            return false;
        };
        if log.is_hidden(message_id) {
            return false;
        }
        let items = menu_items(message, &self.viewer);
        if items.is_empty() {
            return false;
        }

        self.long_press.cancel();
        self.delete_target = None;
        self.forward = None;

        let labels: Vec<&str> = items.iter().map(|item| item.label()).collect();
        let size = estimate_menu_size(&labels);
        self.menu = Some(ActionMenu {
            message_id: message_id.clone(),
            anchor,
            origin: place_menu(anchor, size, viewport, MENU_PADDING),
            size,
            viewport,
            items,
            selected: 0,
            corrected: false,
        });
        true
    }

    /// Re-clamps the open menu using the size it actually rendered at. Returns true when the
    /// origin moved.
    pub fn correct_menu_position(&mut self, rendered: CellSize) -> bool {
        let Some(menu) = self.menu.as_mut() else {
            return false;
        };
        if menu.corrected && menu.size == rendered {
            return false;
        }
        let origin = place_menu(menu.anchor, rendered, menu.viewport, MENU_PADDING);
        let moved = origin != menu.origin;
        menu.size = rendered;
        menu.origin = origin;
        menu.corrected = true;
        moved
    }

    /// Keeps the menu inside a resized viewport.
    pub fn resize_viewport(&mut self, viewport: Viewport) {
        if let Some(menu) = self.menu.as_mut() {
            menu.viewport = viewport;
            menu.origin = place_menu(menu.anchor, menu.size, viewport, MENU_PADDING);
        }
    }

    pub fn close_menu(&mut self) {
        self.menu = None;
    }

    pub fn menu_select_next(&mut self) {
        if let Some(menu) = self.menu.as_mut() {
            if !menu.items.is_empty() {
                menu.selected = (menu.selected + 1) % menu.items.len();
            }
        }
    }

    pub fn menu_select_prev(&mut self) {
        if let Some(menu) = self.menu.as_mut() {
            if !menu.items.is_empty() {
                menu.selected = (menu.selected + menu.items.len() - 1) % menu.items.len();
            }
        }
    }

    pub fn activate_menu_item(&mut self, log: &MessageLog) -> ActionCommand {
        let Some(menu) = self.menu.as_ref() else {
            return ActionCommand::None;
        };
        let Some(item) = menu.selected_item() else {
            return ActionCommand::None;
        };
        let message_id = menu.message_id.clone();
        self.close_menu();

        match item {
            MenuItem::Copy => self.copy(log, &message_id),
            MenuItem::Edit => {
                self.start_edit(log, &message_id);
                ActionCommand::None
            }
            MenuItem::Delete => {
                self.open_delete_dialog(log, &message_id);
                ActionCommand::None
            }
            MenuItem::Forward => {
                self.forward_message(log, &message_id);
                ActionCommand::None
            }
            MenuItem::Select => {
                self.selection = Some(BTreeSet::from([message_id]));
                ActionCommand::None
            }
        }
    }

    pub fn activate_menu_index(&mut self, log: &MessageLog, index: usize) -> ActionCommand {
        match self.menu.as_mut() {
            Some(menu) if index < menu.items.len() => menu.selected = index,
            _ => return ActionCommand::None,
        }
        self.activate_menu_item(log)
    }

    pub fn pointer_down(&mut self, message_id: MessageId, cell: CellPoint, now: Instant) {
        self.long_press
            .press((message_id, cell), cell_to_pointer(cell), now);
    }

    /// Returns true when the move cancelled a pending long-press.
    pub fn pointer_move(&mut self, cell: CellPoint) -> bool {
        self.long_press.moved(cell_to_pointer(cell))
    }

    pub fn pointer_up(&mut self) -> PressRelease<(MessageId, CellPoint)> {
        self.long_press.release()
    }

    /// Opens the menu once an armed press has dwelt long enough.
    pub fn tick(&mut self, log: &MessageLog, viewport: Viewport, now: Instant) -> bool {
        let Some(press) = self.long_press.poll(now) else {
            return false;
        };
        let (message_id, anchor) = press.target;
        debug!(message_id = %message_id, "long-press fired");
        self.open_menu(log, &message_id, anchor, viewport)
    }

    pub fn long_press_remaining(&self, now: Instant) -> Option<Duration> {
        self.long_press.remaining(now)
    }

    pub fn copy(&mut self, log: &MessageLog, message_id: &MessageId) -> ActionCommand {
        self.close_menu();
        match log.get(message_id) {
            Some(message) if !message.deleted => ActionCommand::Copy {
                text: message.content.clone(),
            },
            _ => ActionCommand::None,
        }
    }

    pub fn start_edit(&mut self, log: &MessageLog, message_id: &MessageId) -> bool {
        let Some(message) = log.get(message_id) else {
            return false;
        };
        if message.deleted || message.id.is_temporary() || !message.is_from(&self.viewer) {
            return false;
        }

        self.close_menu();
        self.delete_target = None;
        self.forward = None;
        self.editing = Some(message_id.clone());
        self.composer.seed(&message.content);
        true
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
        self.composer.clear();
    }

    /// Sends the composer text as the new content. An empty or unchanged buffer cancels.
    pub fn submit_edit(&mut self, log: &mut MessageLog) -> bool {
        let Some(message_id) = self.editing.take() else {
            return false;
        };
        let content = self.composer.take_text().trim().to_string();
        let unchanged = log
            .get(&message_id)
            .is_none_or(|message| message.content.trim() == content);
        if content.is_empty() || unchanged {
            return false;
        }
        if !log.apply_edit(&message_id, &content) {
            return false;
        }

        self.transport.send(TransportOp::EditMessage {
            conversation_id: self.conversation_id.clone(),
            message_id,
            content,
        });
        true
    }

    /// Records the delete target. Ignored while the forward dialog is open.
    pub fn open_delete_dialog(&mut self, log: &MessageLog, message_id: &MessageId) -> bool {
        self.close_menu();
        if self.forward.is_some() {
            return false;
        }
        let Some(message) = log.get(message_id) else {
            return false;
        };
        if message.id.is_temporary() {
            return false;
        }

        self.delete_target = Some(DeleteDialog {
            message_id: message_id.clone(),
            allow_everyone: message.is_from(&self.viewer) && !message.deleted,
            selection: DeleteChoice::ForMe,
            pending: false,
        });
        true
    }

    pub fn delete_select_next(&mut self) {
        if let Some(dialog) = self.delete_target.as_mut() {
            dialog.step(true);
        }
    }

    pub fn delete_select_prev(&mut self) {
        if let Some(dialog) = self.delete_target.as_mut() {
            dialog.step(false);
        }
    }

    pub fn confirm_delete_choice(&mut self, log: &mut MessageLog) -> ActionCommand {
        let Some(dialog) = self.delete_target.as_ref() else {
            return ActionCommand::None;
        };
        match dialog.selection {
            DeleteChoice::ForMe => self.delete_for_me(),
            DeleteChoice::ForEveryone => {
                self.delete_for_everyone(log);
                ActionCommand::None
            }
            DeleteChoice::Cancel => {
                self.cancel_delete();
                ActionCommand::None
            }
        }
    }

    /// Marks the dialog pending and hands the request to the caller; the result comes back
    /// through `finish_delete_for_me`.
    pub fn delete_for_me(&mut self) -> ActionCommand {
        let Some(dialog) = self.delete_target.as_mut() else {
            return ActionCommand::None;
        };
        if dialog.pending {
            return ActionCommand::None;
        }
        dialog.pending = true;
        ActionCommand::DeleteForMe {
            conversation_id: self.conversation_id.clone(),
            message_id: dialog.message_id.clone(),
        }
    }

    pub fn finish_delete_for_me(
        &mut self,
        log: &mut MessageLog,
        message_id: &MessageId,
        result: Result<(), String>,
    ) {
        match result {
            Ok(()) => {
                log.hide(message_id.clone());
                if self.editing.as_ref() == Some(message_id) {
                    self.cancel_edit();
                }
            }
            Err(error) => {
                warn!(message_id = %message_id, %error, "delete for me failed");
            }
        }
        if self
            .delete_target
            .as_ref()
            .is_some_and(|dialog| dialog.pending && &dialog.message_id == message_id)
        {
            self.delete_target = None;
        }
    }

    /// Sender-only hard delete: emits the op and blanks the local copy without waiting.
    pub fn delete_for_everyone(&mut self, log: &mut MessageLog) -> bool {
        let Some(dialog) = self.delete_target.as_ref() else {
            return false;
        };
        if !dialog.allow_everyone || dialog.pending {
            return false;
        }
        let message_id = dialog.message_id.clone();
        if !log
            .get(&message_id)
            .is_some_and(|message| message.is_from(&self.viewer))
        {
            return false;
        }

        self.transport.send(TransportOp::DeleteMessage {
            conversation_id: self.conversation_id.clone(),
            message_id: message_id.clone(),
            mine_only: false,
        });
        log.mark_deleted(&message_id);
        self.delete_target = None;
        if self.editing.as_ref() == Some(&message_id) {
            self.cancel_edit();
        }
        true
    }

    pub fn cancel_delete(&mut self) {
        self.delete_target = None;
    }

    pub fn forward_message(&mut self, log: &MessageLog, message_id: &MessageId) -> bool {
        self.forward_messages(log, std::slice::from_ref(message_id))
    }

    /// Opens the forward picker for the confirmed ids in `ids`, preselecting the current
    /// conversation. Nothing opens when no id survives the filter.
    pub fn forward_messages(&mut self, log: &MessageLog, ids: &[MessageId]) -> bool {
        self.close_menu();
        let message_ids = log.forwardable(ids);
        if message_ids.is_empty() {
            return false;
        }

        self.delete_target = None;
        self.forward = Some(ForwardDialog {
            message_ids,
            destination: Some(self.conversation_id.clone()),
        });
        true
    }

    pub fn choose_forward_destination(&mut self, destination: Option<ConversationId>) {
        if let Some(dialog) = self.forward.as_mut() {
            dialog.destination = destination;
        }
    }

    /// Moves the destination by `delta` rows through `conversations`, wrapping.
    pub fn move_forward_destination(&mut self, conversations: &[Conversation], delta: isize) {
        let Some(dialog) = self.forward.as_mut() else {
            return;
        };
        if conversations.is_empty() {
            return;
        }
        let len = conversations.len() as isize;
        let current = dialog
            .destination
            .as_ref()
            .and_then(|id| conversations.iter().position(|c| &c.id == id))
            .map(|index| index as isize);
        let next = match current {
            Some(index) => (index + delta).rem_euclid(len),
            None if delta < 0 => len - 1,
            None => 0,
        };
        dialog.destination = Some(conversations[next as usize].id.clone());
    }

    /// Emits one forward op per queued id and clears the picker. Returns the number of ops
    /// sent; zero (and the picker stays open) without a destination.
    pub fn confirm_forward(&mut self) -> usize {
        let Some(dialog) = self.forward.as_ref() else {
            return 0;
        };
        let Some(destination) = dialog.destination.clone() else {
            return 0;
        };
        if dialog.message_ids.is_empty() {
            return 0;
        }

        let Some(dialog) = self.forward.take() else {
            return 0;
        };
        let count = dialog.message_ids.len();
        for message_id in dialog.message_ids {
            self.transport.send(TransportOp::ForwardMessage {
                conversation_id: destination.clone(),
                message_id,
            });
        }
        self.selection = None;
        count
    }

    pub fn cancel_forward(&mut self) {
        self.forward = None;
    }

    pub fn toggle_selection_mode(&mut self) {
        self.selection = match self.selection.take() {
            Some(_) => None,
            None => Some(BTreeSet::new()),
        };
    }

    pub fn toggle_selected(&mut self, message_id: &MessageId) {
        let Some(selection) = self.selection.as_mut() else {
            return;
        };
        if !selection.remove(message_id) {
            selection.insert(message_id.clone());
        }
    }

    /// Forwards the selected messages in conversation order.
    pub fn forward_selected(&mut self, log: &MessageLog) -> bool {
        let Some(selection) = self.selection.as_ref() else {
            return false;
        };
        let ids: Vec<MessageId> = log
            .visible()
            .filter(|message| selection.contains(&message.id))
            .map(|message| message.id.clone())
            .collect();
        self.forward_messages(log, &ids)
    }

    /// Sends the composer text as a new optimistic message.
    pub fn send_composed(
        &mut self,
        log: &mut MessageLog,
        now: OffsetDateTime,
    ) -> Option<MessageId> {
        if self.composer.is_blank() {
            return None;
        }
        let content = self.composer.take_text().trim().to_string();
        let temp_id = log.push_local(self.viewer.clone(), content.clone(), now);
        self.transport.send(TransportOp::SendMessage {
            conversation_id: self.conversation_id.clone(),
            temp_id: temp_id.clone(),
            content,
        });
        Some(temp_id)
    }

    pub fn mark_read(&self) {
        self.transport.send(TransportOp::MarkRead {
            conversation_id: self.conversation_id.clone(),
        });
    }

    /// Drops transient state that points at `message_id` after it was deleted remotely.
    pub fn forget_message(&mut self, message_id: &MessageId) {
        if self.menu.as_ref().is_some_and(|menu| &menu.message_id == message_id) {
            self.menu = None;
        }
        if self.editing.as_ref() == Some(message_id) {
            self.cancel_edit();
        }
        if self
            .delete_target
            .as_ref()
            .is_some_and(|dialog| &dialog.message_id == message_id && !dialog.pending)
        {
            self.delete_target = None;
        }
        if let Some(dialog) = self.forward.as_mut() {
            dialog.message_ids.retain(|id| id != message_id);
            if dialog.message_ids.is_empty() {
                self.forward = None;
            }
        }
        if let Some(selection) = self.selection.as_mut() {
            selection.remove(message_id);
        }
    }

    /// Clears every transient slot, including a pending long-press and the composer.
    pub fn reset(&mut self) {
        self.long_press.cancel();
        self.menu = None;
        self.editing = None;
        self.delete_target = None;
        self.forward = None;
        self.selection = None;
        self.composer.clear();
    }

    pub fn switch_conversation(&mut self, conversation_id: ConversationId) {
        self.reset();
        self.conversation_id = conversation_id;
    }
}
