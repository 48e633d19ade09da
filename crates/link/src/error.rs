use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("connect to {router} failed: {message}")]
    Connect { router: String, message: String },

    #[error("link is not connected")]
    NotConnected,

    #[error(transparent)]
    Wire(#[from] mudgate_wire::WireError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
