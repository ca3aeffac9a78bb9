mod channel;
mod event;

pub use channel::{EventChannel, EventPublisher, EventSubscriber};
pub use event::{EventInfo, TrellisEvent};

#[cfg(test)]
mod tests;
