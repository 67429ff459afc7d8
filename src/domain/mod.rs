mod event;

pub use event::{Batch, Event, Login, Meta, PhoneNumbers};
