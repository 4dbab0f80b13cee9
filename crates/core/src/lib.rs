#![forbid(unsafe_code)]

//! Functional core of the TC seeker: slot model, change detection, preference
//! filtering, reply resolution and the single-reservation ownership token.
//!
//! Nothing in this crate performs I/O. The daemon crate is the imperative shell
//! that fetches pages, books slots and talks to the user.

pub mod detect;
pub mod error;
pub mod filter;
pub mod hold;
pub mod model;
pub mod notice;
pub mod resolve;
pub mod transfer;

mod util;

pub use detect::*;
pub use error::*;
pub use filter::*;
pub use hold::*;
pub use model::*;
pub use notice::*;
pub use resolve::*;
pub use transfer::*;
pub use util::{escape_html, new_question_id, now_ms};
