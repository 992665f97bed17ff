use std::fmt;

/// Errors with a meaning of their own, beyond plain IO failures.
#[derive(Debug)]
pub enum RenderError {
    /// An input structure (NBT, cached image) does not look like it should.
    InputMalformed(String),
    /// The image cache handshake was called out of sequence.
    State(&'static str),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::InputMalformed(what) => write!(f, "malformed input: {}", what),
            RenderError::State(what) => write!(f, "image cache used out of sequence: {}", what),
        }
    }
}

impl std::error::Error for RenderError {}
