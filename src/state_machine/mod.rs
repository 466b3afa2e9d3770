mod state;
mod update;

pub use state::{Event, RESCHEDULE_DELAY_DAYS, StateMachine, Transition};
pub use update::ItemUpdate;
