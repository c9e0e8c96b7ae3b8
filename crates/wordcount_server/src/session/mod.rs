//! Game sessions.
//!
//! Each session is an actor spawned by the Directory. Connections talk to it
//! through a [`SessionHandle`]; the session answers through the reply slot of
//! each command and pushes everything else into player mailboxes.

mod actor;
mod handle;
mod roster;
mod state;
mod words;

pub(crate) use actor::{spawn, SessionSettings};
pub use handle::{SessionExit, SessionHandle, SessionView, UploadTicket};
pub use state::SessionState;
pub use words::WordTable;
