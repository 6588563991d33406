use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error(transparent)]
    Framer(#[from] tedium_framer::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("the emulated framer has at most 8 channels, {0} requested")]
    TooManyChannels(usize),
    #[error("{0} thread panicked")]
    ThreadPanic(&'static str),
}

pub type Result<T> = std::result::Result<T, ToolError>;
