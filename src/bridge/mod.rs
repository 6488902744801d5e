//! Host/UI message bridge: envelopes, command routing, and window fan-out.

pub mod channel;
pub mod contract;
pub mod messaging;
pub mod stdio;
pub mod window;

pub use channel::{CommandHandler, HostCommandClient, HostCommandServer, command_channel};
pub use contract::{
    CommandEnvelope, CommandName, CommandOutcome, EventEnvelope, ResponseEnvelope,
    UpdateEventName,
};
pub use messaging::MessagingChannel;
pub use window::{BroadcastWindow, ChannelWindow, WindowId, WindowRegistry, WindowSink};
