use crate::errors::SiteError;
use crate::events::Event;
use crate::persistence::StoredMessage;
use crate::state::AppState;

/// Bump the visit counter and announce the new value.
///
/// The event is published while the counter lock is still held, so two
/// increments reach every subscriber in the order they were applied.
/// Nothing is published when the durable write fails.
pub fn increment_count(state: &AppState) -> Result<u64, SiteError> {
    state.site.increment_count_then(|count| {
        state.broadcaster.publish(Event::CountChanged(count));
    })
}

/// Replace the guestbook message and announce its rendered form.
pub fn post_message(state: &AppState, text: String) -> Result<StoredMessage, SiteError> {
    state.site.post_message_then(text, |message| {
        state
            .broadcaster
            .publish(Event::MessageChanged(message.render()));
    })
}

pub fn read_count(state: &AppState) -> u64 {
    state.site.read_count()
}

/// Rendered last message, or an empty string.
pub fn read_last_message(state: &AppState) -> String {
    state.site.rendered_last_message()
}
