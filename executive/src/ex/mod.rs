//! Executive Support (ex)
//!
//! Services the I/O manager leans on but does not own:
//!
//! - **Activities**: run identity and cooperative termination
//! - **Console**: operator read-reply prompts and response sets
//! - **Stop**: whole-system fault codes

pub mod activity;
pub mod console;
pub mod stop;

pub use activity::Activity;
pub use console::{
    ConsoleCollaborator,
    ConsoleExchange,
    ExchangeState,
    OperatorResponse,
    ReadReplyMessage,
    ResponseSet,
    NOT_UNDERSTOOD_MARKER,
};
pub use stop::SystemFault;
