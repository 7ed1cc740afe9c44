use std::cmp::min;

/// Single-line message input shared by "send" and "edit".
#[derive(Clone, Debug, Default)]
pub struct Composer {
    pub text: String,
    pub cursor_col: usize,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the buffer and parks the cursor at the end.
    pub fn seed(&mut self, text: &str) {
        self.text = flatten_newlines(text);
        self.cursor_col = self.text.chars().count();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor_col = 0;
    }

    pub fn take_text(&mut self) -> String {
        self.cursor_col = 0;
        std::mem::take(&mut self.text)
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn insert_char(&mut self, ch: char) {
        let mut buffer = [0u8; 4];
        self.insert_str(ch.encode_utf8(&mut buffer));
    }

    pub fn insert_str(&mut self, text: &str) {
        let flattened = flatten_newlines(text);
        if flattened.is_empty() {
            return;
        }

        self.clamp_cursor();
        let byte_index = char_to_byte_index(&self.text, self.cursor_col);
        self.text.insert_str(byte_index, &flattened);
        self.cursor_col += flattened.chars().count();
    }

    pub fn backspace(&mut self) {
        self.clamp_cursor();
        if self.cursor_col == 0 {
            return;
        }

        let byte_index = char_to_byte_index(&self.text, self.cursor_col - 1);
        self.text.remove(byte_index);
        self.cursor_col -= 1;
    }

    pub fn delete_forward(&mut self) {
        self.clamp_cursor();
        if self.cursor_col >= self.text.chars().count() {
            return;
        }

        let byte_index = char_to_byte_index(&self.text, self.cursor_col);
        self.text.remove(byte_index);
    }

    /// Ctrl+W: removes trailing spaces before the cursor, then the word before them.
    pub fn delete_word_back(&mut self) {
        self.clamp_cursor();
        let chars: Vec<char> = self.text.chars().collect();
        let mut start = self.cursor_col;
        while start > 0 && chars[start - 1].is_whitespace() {
            start -= 1;
        }
        while start > 0 && !chars[start - 1].is_whitespace() {
            start -= 1;
        }
        if start == self.cursor_col {
            return;
        }

        let from = char_to_byte_index(&self.text, start);
        let to = char_to_byte_index(&self.text, self.cursor_col);
        self.text.replace_range(from..to, "");
        self.cursor_col = start;
    }

    pub fn move_left(&mut self) {
        self.clamp_cursor();
        self.cursor_col = self.cursor_col.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.clamp_cursor();
        self.cursor_col = (self.cursor_col + 1).min(self.text.chars().count());
    }

    pub fn move_home(&mut self) {
        self.cursor_col = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor_col = self.text.chars().count();
    }

    fn clamp_cursor(&mut self) {
        let len = self.text.chars().count();
        self.cursor_col = min(self.cursor_col, len);
    }
}

fn flatten_newlines(text: &str) -> String {
    text.chars()
        .filter(|ch| *ch != '\r')
        .map(|ch| if ch == '\n' || ch == '\t' { ' ' } else { ch })
        .collect()
}

fn char_to_byte_index(text: &str, char_index: usize) -> usize {
    match text.char_indices().nth(char_index) {
        Some((idx, _)) => idx,
        None => text.len(),
    }
}
