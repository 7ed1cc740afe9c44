use super::{AppCommand, ChatApp, list_offset, message_list_inner};
use crate::domain::{CellPoint, PressRelease};
use crate::infra::ChatTransport;
use crossterm::event::{MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use std::time::Instant;

const SCROLL_STEP: usize = 3;

pub(super) fn update_on_mouse<T: ChatTransport>(
    mut model: ChatApp<T>,
    mouse: MouseEvent,
    now: Instant,
) -> (ChatApp<T>, AppCommand) {
    if model.terminal_size.0 == 0 || model.terminal_size.1 == 0 {
        return (model, AppCommand::None);
    }
    if model.help_open {
        if matches!(mouse.kind, MouseEventKind::Down(_)) {
            model.help_open = false;
        }
        return (model, AppCommand::None);
    }
    // Dialogs are keyboard-driven.
    if model.actions.has_dialog() {
        return (model, AppCommand::None);
    }

    let point = CellPoint::new(mouse.column, mouse.row);
    match mouse.kind {
        MouseEventKind::ScrollUp => apply_scroll(&mut model, ScrollDirection::Up),
        MouseEventKind::ScrollDown => apply_scroll(&mut model, ScrollDirection::Down),
        MouseEventKind::Down(MouseButton::Left) => return apply_left_down(model, point, now),
        MouseEventKind::Drag(MouseButton::Left) => {
            model.actions.pointer_move(point);
        }
        MouseEventKind::Up(MouseButton::Left) => {
            if let PressRelease::Click((message_id, _)) = model.actions.pointer_up() {
                model.actions.toggle_selected(&message_id);
            }
        }
        MouseEventKind::Down(MouseButton::Right) => apply_right_click(&mut model, point),
        _ => {}
    }

    (model, AppCommand::None)
}

#[derive(Clone, Copy, Debug)]
enum ScrollDirection {
    Up,
    Down,
}

fn apply_scroll<T: ChatTransport>(model: &mut ChatApp<T>, direction: ScrollDirection) {
    if model.actions.menu().is_some() {
        match direction {
            ScrollDirection::Up => model.actions.menu_select_prev(),
            ScrollDirection::Down => model.actions.menu_select_next(),
        }
        return;
    }
    model.selected = scroll_index(model.selected, model.log.visible_len(), direction);
}

fn apply_left_down<T: ChatTransport>(
    mut model: ChatApp<T>,
    point: CellPoint,
    now: Instant,
) -> (ChatApp<T>, AppCommand) {
    if let Some(menu) = model.actions.menu() {
        if let Some(index) = menu.item_at(point) {
            let command = model.actions.activate_menu_index(&model.log, index);
            return (model, command.into());
        }
        if !menu.contains(point) {
            model.actions.close_menu();
        }
        return (model, AppCommand::None);
    }

    if let Some(index) = hit_test_message(&model, point) {
        model.selected = index;
        if let Some(message_id) = model.selected_message().map(|m| m.id.clone()) {
            model.actions.pointer_down(message_id, point, now);
        }
    }
    (model, AppCommand::None)
}

fn apply_right_click<T: ChatTransport>(model: &mut ChatApp<T>, point: CellPoint) {
    let Some(index) = hit_test_message(model, point) else {
        model.actions.close_menu();
        return;
    };
    model.selected = index;
    let Some(message_id) = model.selected_message().map(|m| m.id.clone()) else {
        return;
    };
    let viewport = model.viewport();
    model.actions.open_menu(&model.log, &message_id, point, viewport);
}

fn hit_test_message<T: ChatTransport>(model: &ChatApp<T>, point: CellPoint) -> Option<usize> {
    let list = message_list_inner(model.terminal_size);
    hit_test_list_click(list, model.selected, model.log.visible_len(), point.col, point.row)
}

/// Row index under `(col, row)` inside the unbordered list area `list`.
fn hit_test_list_click(
    list: Rect,
    selected: usize,
    total: usize,
    col: u16,
    row: u16,
) -> Option<usize> {
    if total == 0 || list.width == 0 || list.height == 0 {
        return None;
    }
    if !rect_contains(list, col, row) {
        return None;
    }

    let clicked_row = usize::from(row - list.y);
    let offset = list_offset(selected, usize::from(list.height), total);
    let index = offset.saturating_add(clicked_row);
    if index >= total { None } else { Some(index) }
}

fn scroll_index(selected: usize, total: usize, direction: ScrollDirection) -> usize {
    if total == 0 {
        return 0;
    }

    match direction {
        ScrollDirection::Up => selected.saturating_sub(SCROLL_STEP),
        ScrollDirection::Down => selected
            .saturating_add(SCROLL_STEP)
            .min(total.saturating_sub(1)),
    }
}

fn rect_contains(area: Rect, col: u16, row: u16) -> bool {
    col >= area.x
        && col < area.x.saturating_add(area.width)
        && row >= area.y
        && row < area.y.saturating_add(area.height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::{chat_app, message};
    use crate::app::{AppEvent, MenuItem, update};
    use crate::domain::MessageId;
    use crossterm::event::KeyModifiers;
    use std::time::Duration;

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> AppEvent {
        AppEvent::Mouse(MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        })
    }

    fn three_messages() -> Vec<crate::domain::Message> {
        vec![
            message("1", "ann", "first"),
            message("2", "me", "second"),
            message("3", "ann", "third"),
        ]
    }

    #[test]
    fn click_message_list_selects_row() {
        let app = chat_app(three_messages());
        let list = message_list_inner(app.terminal_size);
        let (app, cmd) = update(
            app,
            mouse(MouseEventKind::Down(MouseButton::Left), list.x + 3, list.y),
            Instant::now(),
        );
        assert_eq!(cmd, AppCommand::None);
        assert_eq!(app.selected, 0);
        assert!(app.actions.menu().is_none());
    }

    #[test]
    fn right_click_opens_menu_at_pointer() {
        let app = chat_app(three_messages());
        let list = message_list_inner(app.terminal_size);
        let (app, _) = update(
            app,
            mouse(MouseEventKind::Down(MouseButton::Right), list.x + 4, list.y + 1),
            Instant::now(),
        );
        let menu = app.actions.menu().expect("menu");
        assert_eq!(menu.message_id, MessageId::new("2"));
        assert_eq!(menu.anchor, CellPoint::new(list.x + 4, list.y + 1));
        assert!(menu.items.contains(&MenuItem::Edit));
    }

    #[test]
    fn holding_the_button_opens_menu_after_dwell() {
        let app = chat_app(three_messages());
        let list = message_list_inner(app.terminal_size);
        let start = Instant::now();
        let (app, _) = update(
            app,
            mouse(MouseEventKind::Down(MouseButton::Left), list.x + 2, list.y + 2),
            start,
        );
        let (app, _) = update(app, AppEvent::Tick, start + Duration::from_millis(300));
        assert!(app.actions.menu().is_none());
        let (app, _) = update(app, AppEvent::Tick, start + Duration::from_millis(520));
        assert_eq!(
            app.actions.menu().map(|menu| menu.message_id.clone()),
            Some(MessageId::new("3"))
        );
    }

    #[test]
    fn dragging_away_cancels_long_press() {
        let app = chat_app(three_messages());
        let list = message_list_inner(app.terminal_size);
        let start = Instant::now();
        let (app, _) = update(
            app,
            mouse(MouseEventKind::Down(MouseButton::Left), list.x + 2, list.y + 2),
            start,
        );
        let (app, _) = update(
            app,
            mouse(MouseEventKind::Drag(MouseButton::Left), list.x + 4, list.y + 2),
            start + Duration::from_millis(100),
        );
        let (app, _) = update(app, AppEvent::Tick, start + Duration::from_millis(700));
        assert!(app.actions.menu().is_none());
    }

    #[test]
    fn click_outside_menu_closes_it() {
        let app = chat_app(three_messages());
        let list = message_list_inner(app.terminal_size);
        let (app, _) = update(
            app,
            mouse(MouseEventKind::Down(MouseButton::Right), list.x + 2, list.y),
            Instant::now(),
        );
        assert!(app.actions.menu().is_some());
        let (app, _) = update(
            app,
            mouse(MouseEventKind::Down(MouseButton::Left), 70, 20),
            Instant::now(),
        );
        assert!(app.actions.menu().is_none());
    }

    #[test]
    fn click_on_first_menu_item_copies() {
        let app = chat_app(three_messages());
        let list = message_list_inner(app.terminal_size);
        let (app, _) = update(
            app,
            mouse(MouseEventKind::Down(MouseButton::Right), list.x + 2, list.y),
            Instant::now(),
        );
        let origin = app.actions.menu().expect("menu").origin;
        let (app, cmd) = update(
            app,
            mouse(
                MouseEventKind::Down(MouseButton::Left),
                origin.col + 2,
                origin.row + 1,
            ),
            Instant::now(),
        );
        assert_eq!(
            cmd,
            AppCommand::CopyToClipboard {
                text: "first".to_string()
            }
        );
        assert!(app.actions.menu().is_none());
    }

    #[test]
    fn click_in_selection_mode_toggles_message() {
        let mut app = chat_app(three_messages());
        app.actions.toggle_selection_mode();
        let list = message_list_inner(app.terminal_size);
        let now = Instant::now();
        let (app, _) = update(
            app,
            mouse(MouseEventKind::Down(MouseButton::Left), list.x + 2, list.y + 1),
            now,
        );
        let (app, _) = update(
            app,
            mouse(MouseEventKind::Up(MouseButton::Left), list.x + 2, list.y + 1),
            now + Duration::from_millis(80),
        );
        assert!(
            app.actions
                .selection()
                .is_some_and(|selection| selection.contains(&MessageId::new("2")))
        );
    }

    #[test]
    fn scroll_moves_selection_by_step() {
        let messages = (0..10)
            .map(|index| message(&index.to_string(), "ann", "x"))
            .collect();
        let app = chat_app(messages);
        assert_eq!(app.selected, 9);
        let (app, _) = update(app, mouse(MouseEventKind::ScrollUp, 10, 10), Instant::now());
        assert_eq!(app.selected, 6);
    }
}
