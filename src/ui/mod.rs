mod theme;

use crate::app::{
    ActionMenu, ChatApp, ConnectionStatus, DeleteChoice, DeleteDialog, ForwardDialog, chat_layout,
};
use crate::domain::{CellSize, Message};
use crate::infra::ChatTransport;
use ratatui::prelude::*;
use ratatui::widgets::*;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use unicode_width::UnicodeWidthStr;

const TIME_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");

/// What the frame actually drew, fed back into the model after `draw`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RenderReport {
    pub menu_size: Option<CellSize>,
}

pub fn render<T: ChatTransport>(frame: &mut Frame, model: &ChatApp<T>) -> RenderReport {
    let mut report = RenderReport::default();
    let full_area = frame.area();
    if full_area.width == 0 || full_area.height == 0 {
        return report;
    }

    let layout = chat_layout((full_area.width, full_area.height));
    render_header(frame, layout.header, model);
    render_messages(frame, layout.messages, model);
    render_composer(frame, layout.composer, model);
    render_footer(frame, layout.footer, model);

    if let Some(menu) = model.actions.menu() {
        report.menu_size = Some(render_action_menu(frame, full_area, menu));
    }
    if let Some(dialog) = model.actions.delete_dialog() {
        render_delete_dialog(frame, full_area, model, dialog);
    }
    if let Some(dialog) = model.actions.forward_dialog() {
        render_forward_dialog(frame, full_area, model, dialog);
    }
    if model.help_open {
        render_help_overlay(frame, full_area);
    }

    report
}

fn render_header<T: ChatTransport>(frame: &mut Frame, area: Rect, model: &ChatApp<T>) {
    let title = model
        .current_conversation()
        .map(|conversation| conversation.title().to_string())
        .unwrap_or_else(|| model.conversation_id().to_string());
    let unread_elsewhere: u32 = model
        .conversations
        .iter()
        .filter(|conversation| &conversation.id != model.conversation_id())
        .map(|conversation| conversation.unread)
        .sum();

    let (status, status_color) = match &model.connection {
        ConnectionStatus::Connecting => ("connecting…".to_string(), theme::MUTED),
        ConnectionStatus::Online if !model.actions.transport_ready() => {
            ("reconnecting…".to_string(), theme::MUTED)
        }
        ConnectionStatus::Online => ("● online".to_string(), theme::SUCCESS),
        ConnectionStatus::Offline { .. } => ("○ offline".to_string(), theme::ERROR),
    };

    let mut spans = vec![
        Span::styled(
            " cardchat ",
            Style::default()
                .fg(theme::ACCENT)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("· "),
        Span::styled(title, Style::default().fg(theme::FG).add_modifier(Modifier::BOLD)),
    ];
    if unread_elsewhere > 0 {
        spans.push(Span::styled(
            format!("  ({unread_elsewhere} unread elsewhere)"),
            Style::default().fg(theme::ACCENT),
        ));
    }

    let left_width: usize = spans.iter().map(|span| span.width()).sum();
    let padding = (area.width as usize)
        .saturating_sub(left_width)
        .saturating_sub(UnicodeWidthStr::width(status.as_str()) + 1);
    spans.push(Span::raw(" ".repeat(padding)));
    spans.push(Span::styled(status, Style::default().fg(status_color)));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(theme::BAR_BG));
    frame.render_widget(header, area);
}

fn render_messages<T: ChatTransport>(frame: &mut Frame, area: Rect, model: &ChatApp<T>) {
    let title = match model.actions.selection() {
        Some(selection) => format!("Select messages ({} chosen)", selection.len()),
        None => "Messages".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme::BORDER))
        .title(title);

    if model.loading {
        let loading = Paragraph::new("Loading…")
            .style(Style::default().fg(theme::MUTED))
            .block(block);
        frame.render_widget(loading, area);
        return;
    }
    if let Some(error) = &model.load_error {
        let error = Paragraph::new(format!("Failed to load messages: {error}"))
            .style(Style::default().fg(theme::ERROR))
            .wrap(Wrap { trim: false })
            .block(block);
        frame.render_widget(error, area);
        return;
    }

    let inner_width = area.width.saturating_sub(2) as usize;
    let items: Vec<ListItem> = model
        .log
        .visible()
        .map(|message| message_list_item(model, message, inner_width))
        .collect();
    if items.is_empty() {
        let empty = Paragraph::new("No messages yet. Say hi!")
            .style(Style::default().fg(theme::DIM))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(theme::ACCENT_BG).add_modifier(Modifier::BOLD));
    let mut state = ListState::default();
    state.select(Some(model.selected.min(model.log.visible_len().saturating_sub(1))));
    frame.render_stateful_widget(list, area, &mut state);
}

fn message_list_item<T: ChatTransport>(
    model: &ChatApp<T>,
    message: &Message,
    max_width: usize,
) -> ListItem<'static> {
    let own = message.is_from(model.actions.viewer());
    let mut spans = Vec::new();

    if let Some(selection) = model.actions.selection() {
        let mark = if selection.contains(&message.id) {
            "[x] "
        } else {
            "[ ] "
        };
        spans.push(Span::styled(mark, Style::default().fg(theme::ACCENT)));
    }

    let time = message.created_at.format(TIME_FORMAT).unwrap_or_default();
    spans.push(Span::styled(format!("{time} "), Style::default().fg(theme::DIM)));

    let sender = if own {
        "you".to_string()
    } else {
        model
            .current_conversation()
            .map(|conversation| conversation.title().to_string())
            .unwrap_or_else(|| message.sender_id.to_string())
    };
    let sender_color = if own { theme::OWN_MESSAGE } else { theme::ACCENT };
    spans.push(Span::styled(
        format!("{sender}: "),
        Style::default().fg(sender_color).add_modifier(Modifier::BOLD),
    ));

    let used: usize = spans.iter().map(|span| span.width()).sum();
    let budget = max_width.saturating_sub(used);
    if message.deleted {
        spans.push(Span::styled(
            "message deleted",
            Style::default().fg(theme::DIM).add_modifier(Modifier::ITALIC),
        ));
    } else {
        let mut suffix = String::new();
        if message.edited {
            suffix.push_str(" (edited)");
        }
        if message.id.is_temporary() {
            suffix.push_str(" …");
        }
        let body_budget = budget.saturating_sub(UnicodeWidthStr::width(suffix.as_str()));
        spans.push(Span::styled(
            truncate_end(&message.content, body_budget),
            Style::default().fg(theme::FG),
        ));
        if !suffix.is_empty() {
            spans.push(Span::styled(suffix, Style::default().fg(theme::DIM)));
        }
    }

    if model.actions.editing() == Some(&message.id) {
        spans.push(Span::styled(" ✎", Style::default().fg(theme::ACCENT)));
    }

    ListItem::new(Line::from(spans))
}

fn render_composer<T: ChatTransport>(frame: &mut Frame, area: Rect, model: &ChatApp<T>) {
    let editing = model.actions.editing().is_some();
    let title = if editing {
        "Editing (Enter saves, Esc cancels)"
    } else {
        "Message"
    };
    let border_color = if editing { theme::ACCENT } else { theme::BORDER };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);
    let inner = block.inner(area);

    let composer = model.actions.composer();
    let before_cursor: String = composer.text.chars().take(composer.cursor_col).collect();
    let cursor_width = UnicodeWidthStr::width(before_cursor.as_str()) as u16;
    let scroll = cursor_width.saturating_sub(inner.width.saturating_sub(1));

    let paragraph = Paragraph::new(composer.text.clone())
        .style(Style::default().fg(theme::FG))
        .scroll((0, scroll))
        .block(block);
    frame.render_widget(paragraph, area);

    let input_focused = model.actions.menu().is_none()
        && !model.actions.has_dialog()
        && model.actions.selection().is_none()
        && !model.help_open;
    if input_focused && inner.width > 0 && inner.height > 0 {
        frame.set_cursor_position((
            inner.x.saturating_add(cursor_width.saturating_sub(scroll)),
            inner.y,
        ));
    }
}

fn render_footer<T: ChatTransport>(frame: &mut Frame, area: Rect, model: &ChatApp<T>) {
    let base = if model.actions.selection().is_some() {
        "Space select  Enter forward  Esc done".to_string()
    } else {
        "F2/right-click/hold menu  Ctrl+E edit  Del delete  Ctrl+F forward  Ctrl+S select  \
         Ctrl+N/P switch  F1 help"
            .to_string()
    };
    let offline = match &model.connection {
        ConnectionStatus::Offline { reason } => Some(format!("offline: {reason}")),
        _ => None,
    };
    let text = footer_with_notices(base, [model.notice.as_deref(), offline.as_deref()]);
    let footer = Paragraph::new(text).style(Style::default().fg(theme::DIM));
    frame.render_widget(footer, area);
}

fn footer_with_notices(mut base: String, notices: [Option<&str>; 2]) -> String {
    for notice in notices {
        let Some(message) = notice else {
            continue;
        };
        if message.trim().is_empty() {
            continue;
        }
        base.push_str("  ·  ");
        base.push_str(message);
    }
    base
}

/// Draws the context menu at its current origin and returns the size it wanted, before
/// clipping to the frame.
fn render_action_menu(frame: &mut Frame, area: Rect, menu: &ActionMenu) -> CellSize {
    let max_label_width = menu
        .items
        .iter()
        .map(|item| UnicodeWidthStr::width(item.label()))
        .max()
        .unwrap_or(0);
    let hotkey_width = 1usize;
    let inner_width = max_label_width.saturating_add(2).saturating_add(hotkey_width);
    let desired = CellSize::new(
        u16::try_from(inner_width.saturating_add(4)).unwrap_or(u16::MAX),
        u16::try_from(menu.items.len().saturating_add(2)).unwrap_or(u16::MAX),
    );

    let popup = Rect::new(menu.origin.col, menu.origin.row, desired.width, desired.height)
        .intersection(area);
    if popup.width == 0 || popup.height == 0 {
        return desired;
    }
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme::ACCENT))
        .padding(Padding::horizontal(1));
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let list_items: Vec<ListItem> = menu
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let label = item.label();
            let gap = inner_width
                .saturating_sub(UnicodeWidthStr::width(label) + hotkey_width)
                .max(1);
            ListItem::new(Line::from(vec![
                Span::raw(label.to_string()),
                Span::raw(" ".repeat(gap)),
                Span::styled((index + 1).to_string(), Style::default().fg(theme::DIM)),
            ]))
        })
        .collect();

    let list = List::new(list_items).highlight_style(
        Style::default()
            .add_modifier(Modifier::REVERSED)
            .add_modifier(Modifier::BOLD),
    );
    let mut state = ListState::default();
    state.select(Some(menu.selected.min(menu.items.len().saturating_sub(1))));
    frame.render_stateful_widget(list, inner, &mut state);

    desired
}

fn render_delete_dialog<T: ChatTransport>(
    frame: &mut Frame,
    area: Rect,
    model: &ChatApp<T>,
    dialog: &DeleteDialog,
) {
    let popup = centered_rect(60, 40, area);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .padding(Padding::horizontal(1))
        .title("Delete Message");
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(inner);

    let preview = model
        .log
        .get(&dialog.message_id)
        .map(|message| message.content.as_str())
        .unwrap_or("");
    let preview = truncate_end(preview, (chunks[0].width as usize).saturating_sub(2));

    let mut message = vec![
        Line::from("Delete this message?"),
        Line::from(""),
        Line::from(Span::styled(
            format!("\"{preview}\""),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    if dialog.allow_everyone {
        message.push(Line::from(Span::styled(
            "\"For everyone\" removes it for all participants.",
            Style::default().fg(theme::ACCENT),
        )));
    } else {
        message.push(Line::from(Span::styled(
            "\"For me\" hides it only on your side.",
            Style::default().fg(theme::MUTED),
        )));
    }
    let paragraph = Paragraph::new(message).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, chunks[0]);

    if dialog.pending {
        let waiting = Paragraph::new("Deleting…")
            .style(Style::default().fg(theme::MUTED))
            .alignment(Alignment::Center);
        frame.render_widget(waiting, chunks[1]);
    } else {
        let mut spans = Vec::new();
        for (index, choice) in dialog.choices().into_iter().enumerate() {
            if index > 0 {
                spans.push(Span::raw("   "));
            }
            let base = match choice {
                DeleteChoice::ForEveryone => Style::default().fg(theme::ERROR),
                _ => Style::default(),
            };
            let style = if choice == dialog.selection {
                base.add_modifier(Modifier::REVERSED)
                    .add_modifier(Modifier::BOLD)
            } else {
                base
            };
            spans.push(Span::styled(format!("[ {} ]", choice.label()), style));
        }
        let buttons = Paragraph::new(Line::from(spans)).alignment(Alignment::Center);
        frame.render_widget(buttons, chunks[1]);
    }

    let hint = if dialog.allow_everyone {
        "Keys: ←/→ choose  Enter confirm  m for me  e for everyone  Esc cancel"
    } else {
        "Keys: ←/→ choose  Enter confirm  m for me  Esc cancel"
    };
    let hint = Paragraph::new(hint)
        .style(Style::default().fg(theme::DIM))
        .alignment(Alignment::Center);
    frame.render_widget(hint, chunks[2]);
}

fn render_forward_dialog<T: ChatTransport>(
    frame: &mut Frame,
    area: Rect,
    model: &ChatApp<T>,
    dialog: &ForwardDialog,
) {
    let popup = centered_rect(50, 60, area);
    frame.render_widget(Clear, popup);

    let count = dialog.message_ids.len();
    let title = if count == 1 {
        "Forward 1 message to…".to_string()
    } else {
        format!("Forward {count} messages to…")
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .padding(Padding::horizontal(1))
        .title(title);
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(inner);

    let items: Vec<ListItem> = model
        .conversations
        .iter()
        .map(|conversation| {
            let mut spans = vec![Span::raw(conversation.title().to_string())];
            if &conversation.id == model.conversation_id() {
                spans.push(Span::styled(" (this chat)", Style::default().fg(theme::DIM)));
            }
            if conversation.unread > 0 {
                spans.push(Span::styled(
                    format!("  {}", conversation.unread),
                    Style::default().fg(theme::ACCENT),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let selected = dialog.destination.as_ref().and_then(|destination| {
        model
            .conversations
            .iter()
            .position(|conversation| &conversation.id == destination)
    });
    let list = List::new(items)
        .highlight_style(
            Style::default()
                .fg(theme::ACCENT)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    let mut state = ListState::default();
    state.select(selected);
    frame.render_stateful_widget(list, chunks[0], &mut state);

    let hint = if dialog.destination.is_some() {
        "↑/↓ or 1-9 choose  Enter send  Esc cancel"
    } else {
        "↑/↓ or 1-9 choose a destination  Esc cancel"
    };
    let hint = Paragraph::new(hint)
        .style(Style::default().fg(theme::DIM))
        .alignment(Alignment::Center);
    frame.render_widget(hint, chunks[1]);
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup = centered_rect(70, 70, area);
    frame.render_widget(Clear, popup);

    let text = vec![
        Line::from("Messages"),
        Line::from("  - ↑/↓, PgUp/PgDn, mouse wheel: move selection"),
        Line::from("  - F2, right-click, or press and hold: message menu"),
        Line::from("  - Menu: ↑/↓ choose, Enter or 1-5 activates, Esc closes"),
        Line::from(""),
        Line::from("Actions"),
        Line::from("  - Ctrl+Y: copy selected message"),
        Line::from("  - Ctrl+E: edit your message (Enter saves, Esc cancels)"),
        Line::from("  - Del (empty input): delete selected message"),
        Line::from("  - Ctrl+F: forward selected message"),
        Line::from("  - Ctrl+S: select several messages, Space toggles, Enter forwards"),
        Line::from(""),
        Line::from("Global"),
        Line::from("  - Enter: send"),
        Line::from("  - Ctrl+N / Ctrl+P: next / previous conversation"),
        Line::from("  - Ctrl+Q or Ctrl+C: quit"),
        Line::from(""),
        Line::from("Help"),
        Line::from("  - F1: toggle this help"),
    ];

    let paragraph = Paragraph::new(text).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .padding(Padding::horizontal(1))
            .title("Help (F1 to close)"),
    );
    frame.render_widget(paragraph, popup);
}

fn truncate_end(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if UnicodeWidthStr::width(text) <= max_width {
        return text.to_string();
    }
    let ellipsis = "…";
    let available = max_width.saturating_sub(UnicodeWidthStr::width(ellipsis));
    let mut out = String::new();
    let mut width = 0usize;
    for ch in text.chars() {
        let ch_width = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + ch_width > available {
            break;
        }
        width += ch_width;
        out.push(ch);
    }
    out.push_str(ellipsis);
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::{chat_app, message};
    use crate::domain::{CellPoint, MessageId};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn truncate_end_respects_width() {
        assert_eq!(truncate_end("hello world", 6), "hello…");
        assert_eq!(truncate_end("short", 10), "short");
        assert_eq!(truncate_end("anything", 0), "");
    }

    #[test]
    fn renders_messages_and_reports_menu_size() {
        let mut app = chat_app(vec![message("1", "ann", "hello there"), message("2", "me", "hi")]);
        let viewport = app.viewport();
        app.actions
            .open_menu(&app.log, &MessageId::new("1"), CellPoint::new(40, 10), viewport);

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).expect("terminal");
        let mut report = RenderReport::default();
        terminal
            .draw(|frame| report = render(frame, &app))
            .expect("draw");

        let text = buffer_text(&terminal);
        assert!(text.contains("hello there"));
        assert!(text.contains("you: hi"));
        assert!(text.contains("Forward…"));
        // "Forward…" is 8 cells: label + gap + hotkey + padding + borders.
        assert_eq!(report.menu_size, Some(CellSize::new(15, 6)));
    }

    #[test]
    fn delete_dialog_for_non_sender_has_no_everyone_button() {
        let mut app = chat_app(vec![message("1", "ann", "hello")]);
        app.actions.open_delete_dialog(&app.log, &MessageId::new("1"));

        let mut terminal = Terminal::new(TestBackend::new(100, 30)).expect("terminal");
        terminal
            .draw(|frame| {
                render(frame, &app);
            })
            .expect("draw");

        let text = buffer_text(&terminal);
        assert!(text.contains("Delete for me"));
        assert!(!text.contains("Delete for everyone"));
    }
}
