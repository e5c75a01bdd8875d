use thiserror::Error;

/// Failures of the display collaborator. `InvalidScreen` is a usage
/// error; the rest mean the display cannot be driven.
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("cannot connect to the wayland display: {0}")]
    Connect(#[from] wayland_client::ConnectError),

    #[error("wayland connection: {0}")]
    Wayland(#[from] wayland_client::backend::WaylandError),

    #[error("wayland dispatch: {0}")]
    Dispatch(#[from] wayland_client::DispatchError),

    #[error("compositor lacks wlr-gamma-control-unstable-v1")]
    MissingGammaManager,

    #[error("invalid screen index: {index} (display has {count})")]
    InvalidScreen { index: usize, count: usize },

    #[error("ramp of {got} entries does not fit controller of size {expected}")]
    RampSize { expected: usize, got: usize },

    #[error("gamma table I/O: {0}")]
    Io(#[from] std::io::Error),
}
