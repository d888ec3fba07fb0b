//! Cell comments and popup attachments
//!
//! Both are opaque to the computation core: it never interprets their
//! contents, only preserves them, moves them with their anchor cell
//! through structural mutation, and restores them on undo.

/// A cell comment (note)
#[derive(Debug, Clone, PartialEq)]
pub struct CellComment {
    /// Author of the comment
    pub author: String,
    /// Comment text content
    pub text: String,
}

impl CellComment {
    /// Create a new comment with the given author and text
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
        }
    }

    /// Create a comment with just text (empty author)
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            author: String::new(),
            text: text.into(),
        }
    }

    /// Check if this comment has an author
    pub fn has_author(&self) -> bool {
        !self.author.is_empty()
    }
}

impl std::fmt::Display for CellComment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_author() {
            write!(f, "[{}]: {}", self.author, self.text)
        } else {
            write!(f, "{}", self.text)
        }
    }
}

/// An opaque popup/validation attachment.
///
/// The payload belongs to an external collaborator (a validation rule, a
/// picker definition, ...); this core passes it through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupAttachment {
    /// Attachment kind tag, interpreted only by the owner
    pub kind: String,
    /// Opaque payload
    pub payload: String,
}

impl PopupAttachment {
    /// Create a new attachment
    pub fn new(kind: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }
}
