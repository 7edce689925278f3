// Typed error enum derived with thiserror
use thiserror::Error;

// Standard I/O error type wrapped by most variants
use std::io;

// Identity of a single client link, used to name the connection an error belongs to
use crate::server::connection::ConnectionId;

/// Every failure the chat programs can surface.
///
/// Startup failures (`Bind`, `Connect`, `Runtime`) are terminal for the
/// component that hit them. The connection-scoped variants never travel past
/// the worker that owns the connection.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The listener could not be bound; the server aborts startup.
    #[error("cannot bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// A client or the bot could not reach the server.
    #[error("unable to connect to server at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The tokio runtime could not be built.
    #[error("failed to build tokio runtime: {0}")]
    Runtime(#[source] io::Error),

    /// Registration refused because teardown has already sealed the registry.
    #[error("registry is closed; connection {0} was refused")]
    RegistryClosed(ConnectionId),

    /// A connection tried to register twice.
    #[error("connection {0} is already registered")]
    DuplicateConnection(ConnectionId),

    /// A write was attempted on a connection that is no longer active.
    #[error("connection {0} is no longer active")]
    ConnectionClosed(ConnectionId),

    #[error(transparent)]
    Io(#[from] io::Error),
}
