const DEFAULT_ENCODING: &str = "UTF-8";

/// Page orientation requested for a render.
///
/// Unrecognized values are carried through as [`Orientation::Custom`] and
/// handed to the renderer unchanged; whether they mean anything is the
/// renderer's business, not ours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
    Custom(String),
}

impl Orientation {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "portrait" => Self::Portrait,
            "landscape" => Self::Landscape,
            _ => Self::Custom(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Portrait => "Portrait",
            Self::Landscape => "Landscape",
            Self::Custom(value) => value,
        }
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::Portrait
    }
}

/// The unit of work submitted for conversion: raw markup plus rendering
/// options. Content is fixed at construction; orientation and encoding are
/// configuration applied before the render and never touched afterwards.
#[derive(Debug, Clone)]
pub struct Document {
    content: String,
    orientation: Orientation,
    encoding: String,
}

impl Document {
    /// Always succeeds; empty content is a valid document.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            orientation: Orientation::default(),
            encoding: DEFAULT_ENCODING.to_string(),
        }
    }

    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
    }

    pub fn set_encoding(&mut self, encoding: impl Into<String>) {
        self.encoding = encoding.into();
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn orientation(&self) -> &Orientation {
        &self.orientation
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }
}
