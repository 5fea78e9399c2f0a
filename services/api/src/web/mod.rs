pub mod rest;
pub mod state;

pub use rest::{
    active_session_handler, calendar_handler, day_progress_handler, start_session_handler,
    stop_session_handler, today_handler,
};
