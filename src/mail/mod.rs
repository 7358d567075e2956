//! Mail module for postbox.
//!
//! Physical mail items and their forwarding requests:
//! - A single lifecycle table shared by user, admin and webhook routes
//! - Forward requests with destination address and dispatch tracking
//! - Soft deletion

mod lifecycle;
mod repository;
mod service;
mod types;

pub use lifecycle::{Actor, Lifecycle, MailAction, Transition, TransitionError};
pub use repository::{ForwardingRequestRepository, MailItemRepository};
pub use service::MailService;
pub use types::{
    ForwardAddress, ForwardingRequest, ForwardingStatus, MailItem, MailStatus, NewMailItem,
    MAX_ADDRESS_FIELD_LENGTH, MAX_NOTE_LENGTH, MAX_TAG_LENGTH,
};
