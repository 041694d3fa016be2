/// Read-only view over recognized text with line endings unified.
#[derive(Debug, Clone)]
pub struct NormalizedText {
    text: String,
}

impl NormalizedText {
    pub fn new(raw: &str) -> Self {
        let text = raw
            .replace("\r\n", "\n")
            .replace('\r', "\n")
            .replace('\u{feff}', "");
        Self { text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Lines in document order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
